// Data-access seam between the service and whatever stores the cats.

use anyhow::Result;

use crate::cat::Cat;

/// Storage operations the service depends on.
///
/// Lookups return every matching record; an empty `Vec` means "no match" and
/// is never an error at this layer.
pub trait CatMapper {
    fn find_all(&self) -> Result<Vec<Cat>>;

    fn find_by_name(&self, name: &str) -> Result<Vec<Cat>>;

    fn find_by_sex(&self, sex: &str) -> Result<Vec<Cat>>;

    fn find_by_age(&self, age: i32) -> Result<Vec<Cat>>;

    /// Store a new cat. Fails if the name is already taken.
    fn insert(&self, cat: &Cat) -> Result<()>;

    /// Replace sex and age of the cat with the same name.
    fn update(&self, cat: &Cat) -> Result<()>;

    fn delete(&self, name: &str) -> Result<()>;
}
