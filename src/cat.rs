// 🐈 Cat Entity - the single record this registry manages
//
// Identity is the name. The store enforces uniqueness; the service only
// checks existence before it mutates anything.

use serde::{Deserialize, Serialize};

/// A cat record: `{name, sex, age}`
///
/// Equality compares all three fields, so two records built from the same
/// values are interchangeable (the mapper tests rely on this).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cat {
    /// Identity key (unique in the store)
    pub name: String,

    pub sex: String,

    /// Age in years
    pub age: i32,
}

impl Cat {
    pub fn new(name: impl Into<String>, sex: impl Into<String>, age: i32) -> Self {
        Cat {
            name: name.into(),
            sex: sex.into(),
            age,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sex(&self) -> &str {
        &self.sex
    }

    pub fn age(&self) -> i32 {
        self.age
    }
}
