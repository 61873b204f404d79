//! The process-wide dataset catalog (spec.md §4.4). Datasets are few, so lookups are
//! a linear scan rather than an index; every mutation holds a single lock
//! (spec.md §5, "the dataset catalog is guarded by a single mutex").

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use stratum_base::{err_kind, ErrorKind, Result, Uid};
use tracing::debug;

use crate::dataset::Dataset;

pub struct Catalog {
    working_directory: PathBuf,
    datasets: Mutex<Vec<Dataset>>,
}

impl Catalog {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Catalog { working_directory: working_directory.into(), datasets: Mutex::new(Vec::new()) }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn dataset_directory(&self, uid: Uid) -> PathBuf {
        self.working_directory.join(uid.to_hex())
    }

    pub fn stripe_path(&self, dataset_uid: Uid, stripe_uid: Uid) -> PathBuf {
        self.dataset_directory(dataset_uid).join(format!("{}.stripe", stripe_uid.to_hex()))
    }

    pub fn add(&self, dataset: Dataset) -> Result<()> {
        let mut datasets = self.datasets.lock().unwrap();
        if datasets.iter().any(|d| d.uid == dataset.uid) {
            return Err(err_kind(ErrorKind::Other, "dataset with this UID is already registered"));
        }
        debug!(uid = %dataset.uid, name = %dataset.name, "catalog: registering dataset");
        datasets.push(dataset);
        Ok(())
    }

    pub fn get(&self, uid: Uid) -> Option<Dataset> {
        self.datasets.lock().unwrap().iter().find(|d| d.uid == uid).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Dataset> {
        self.datasets.lock().unwrap().iter().find(|d| d.name == name).cloned()
    }

    pub fn list(&self) -> Vec<Dataset> {
        self.datasets.lock().unwrap().clone()
    }

    /// Replaces an already-registered dataset's entry in place (e.g. the loader
    /// appending newly cut stripes, or the cast pass swapping in a typed dataset).
    pub fn replace(&self, dataset: Dataset) -> Result<()> {
        let mut datasets = self.datasets.lock().unwrap();
        let slot = datasets
            .iter_mut()
            .find(|d| d.uid == dataset.uid)
            .ok_or_else(|| err_kind(ErrorKind::Other, "no such dataset to replace"))?;
        *slot = dataset;
        Ok(())
    }

    /// Removes a dataset from the catalog and deletes its on-disk stripe directory
    /// (spec.md §4.4).
    pub fn remove(&self, uid: Uid) -> Result<()> {
        let mut datasets = self.datasets.lock().unwrap();
        let Some(pos) = datasets.iter().position(|d| d.uid == uid) else {
            return Err(err_kind(ErrorKind::Other, "no such dataset"));
        };
        datasets.remove(pos);
        let dir = self.dataset_directory(uid);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        debug!(uid = %uid, "catalog: removed dataset");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_base::{Dtype, Schema, TableSchema, UidTag};
    use test_log::test;

    fn schema() -> TableSchema {
        TableSchema::new(vec![Schema::new("a", Dtype::Int, false)])
    }

    #[test]
    fn test_add_and_get() {
        let tmp = std::env::temp_dir().join(format!("stratum-catalog-test-{}", Uid::new(UidTag::Dataset)));
        let cat = Catalog::new(&tmp);
        let d = Dataset::new(Uid::new(UidTag::Dataset), "events", schema());
        let uid = d.uid;
        cat.add(d).unwrap();
        assert!(cat.get(uid).is_some());
        assert!(cat.get_by_name("events").is_some());
    }

    #[test]
    fn test_add_duplicate_uid_errors() {
        let tmp = std::env::temp_dir().join(format!("stratum-catalog-test-{}", Uid::new(UidTag::Dataset)));
        let cat = Catalog::new(&tmp);
        let d = Dataset::new(Uid::new(UidTag::Dataset), "events", schema());
        cat.add(d.clone()).unwrap();
        assert!(cat.add(d).is_err());
    }

    #[test]
    fn test_remove_deletes_directory() {
        let tmp = std::env::temp_dir().join(format!("stratum-catalog-test-{}", Uid::new(UidTag::Dataset)));
        let cat = Catalog::new(&tmp);
        let d = Dataset::new(Uid::new(UidTag::Dataset), "events", schema());
        let uid = d.uid;
        let dir = cat.dataset_directory(uid);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stripe.bin"), b"x").unwrap();
        cat.add(d).unwrap();
        cat.remove(uid).unwrap();
        assert!(cat.get(uid).is_none());
        assert!(!dir.exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
