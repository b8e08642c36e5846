// Cat Service - lookup filters, existence checks, pass-through mutations
//
// All storage goes through the mapper. The service keeps no state of its own.

use tracing::{debug, info};

use crate::cat::Cat;
use crate::error::{CatServiceError, ServiceResult};
use crate::mapper::CatMapper;

pub struct CatService<M: CatMapper> {
    mapper: M,
}

impl<M: CatMapper> CatService<M> {
    pub fn new(mapper: M) -> Self {
        CatService { mapper }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Find cats by one optional filter.
    ///
    /// With no filter every cat is returned (an empty store is not an error).
    /// When several filters are given, the first present one wins in the
    /// order name, sex, age.
    pub fn find_cat(
        &self,
        name: Option<&str>,
        sex: Option<&str>,
        age: Option<i32>,
    ) -> ServiceResult<Vec<Cat>> {
        if let Some(name) = name {
            return self.find_by_name(name);
        }

        if let Some(sex) = sex {
            let cats = self.mapper.find_by_sex(sex)?;
            if cats.is_empty() {
                return Err(CatServiceError::NotFound(format!(
                    "現在、性別が{}のねこはいません。",
                    sex
                )));
            }
            return Ok(cats);
        }

        if let Some(age) = age {
            let cats = self.mapper.find_by_age(age)?;
            if cats.is_empty() {
                return Err(CatServiceError::NotFound(format!(
                    "現在、{}才のねこはいません。",
                    age
                )));
            }
            return Ok(cats);
        }

        let cats = self.mapper.find_all()?;
        debug!(count = cats.len(), "listed all cats");
        Ok(cats)
    }

    pub fn insert_cat(&self, name: &str, sex: &str, age: i32) -> ServiceResult<Cat> {
        let cat = Cat::new(name, sex, age);
        self.mapper.insert(&cat)?;

        info!(name, "cat inserted");
        Ok(cat)
    }

    /// Replace sex and age of an existing cat.
    pub fn update_cat(&self, name: &str, sex: &str, age: i32) -> ServiceResult<()> {
        self.find_by_name(name)?;

        let updated = Cat::new(name, sex, age);
        self.mapper.update(&updated)?;

        info!(name, age, "cat updated");
        Ok(())
    }

    pub fn delete_cat(&self, name: &str) -> ServiceResult<()> {
        self.find_by_name(name)?;
        self.mapper.delete(name)?;

        info!(name, "cat deleted");
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> ServiceResult<Vec<Cat>> {
        let cats = self.mapper.find_by_name(name)?;
        if cats.is_empty() {
            return Err(CatServiceError::NotFound(format!(
                "{}という名前のねこは存在しません。",
                name
            )));
        }
        Ok(cats)
    }
}
