//! Embeds the catalog, loader, and query runner behind a single facade: open a
//! working directory, load datasets into it, and run queries against them
//! (spec.md §4, §9).

use std::path::{Path, PathBuf};

use stratum_base::{CancelToken, Result, TableSchema};
use stratum_catalog::{Catalog, Dataset};
use stratum_lang::{parse_query, Query};
use stratum_loader::{load_auto, load_with_schema, RowSource, Settings};
use stratum_query::{run_query, QueryResult};

/// An open database: a catalog rooted at a working directory, plus the settings the
/// loader uses to cut new stripes.
pub struct Database {
    catalog: Catalog,
    settings: Settings,
}

impl Database {
    /// Opens (or creates) a database rooted at `working_directory`, using default
    /// stripe-cutting settings.
    pub fn open(working_directory: impl Into<PathBuf>) -> Self {
        Database::with_settings(working_directory, Settings::default())
    }

    pub fn with_settings(working_directory: impl Into<PathBuf>, settings: Settings) -> Self {
        Database { catalog: Catalog::new(working_directory), settings }
    }

    pub fn working_directory(&self) -> &Path {
        self.catalog.working_directory()
    }

    /// Loads `source` with type inference over a string-typed intermediate pass
    /// (spec.md §4.5) and registers the result under `name`.
    pub fn load_auto(&self, source: &mut dyn RowSource, name: &str) -> Result<Dataset> {
        self.load_auto_cancellable(source, name, &CancelToken::new())
    }

    /// Same as `load_auto`, but honours `cancel` between stripes in every pass
    /// (spec.md §5): on cancellation no dataset is added to the catalog.
    pub fn load_auto_cancellable(&self, source: &mut dyn RowSource, name: &str, cancel: &CancelToken) -> Result<Dataset> {
        load_auto(source, &self.settings, &self.catalog, name, cancel)
    }

    /// Loads `source` directly against a caller-supplied schema, with no inference
    /// pass (spec.md §4.5).
    pub fn load_with_schema(&self, source: &mut dyn RowSource, schema: TableSchema, name: &str) -> Result<Dataset> {
        self.load_with_schema_cancellable(source, schema, name, &CancelToken::new())
    }

    /// Same as `load_with_schema`, but honours `cancel` between stripes (spec.md §5):
    /// on cancellation no dataset is added to the catalog.
    pub fn load_with_schema_cancellable(
        &self,
        source: &mut dyn RowSource,
        schema: TableSchema,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<Dataset> {
        load_with_schema(source, schema, &self.settings, &self.catalog, name, cancel)
    }

    /// Parses and runs a query given as source text.
    pub fn query(&self, text: &str) -> Result<QueryResult> {
        let query = parse_query(text)?;
        self.run(&query)
    }

    /// Runs an already-parsed query.
    pub fn run(&self, query: &Query) -> Result<QueryResult> {
        self.run_cancellable(query, &CancelToken::new())
    }

    /// Same as `run`, but honours `cancel` between stripes and between the per-column
    /// chunk reads within a stripe (spec.md §5), returning `ErrorKind::Cancelled`
    /// without returning any partial result.
    pub fn run_cancellable(&self, query: &Query, cancel: &CancelToken) -> Result<QueryResult> {
        run_query(query, &self.catalog, cancel)
    }

    pub fn dataset(&self, name: &str) -> Option<Dataset> {
        self.catalog.get_by_name(name)
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.catalog.list()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_base::Uid;
    use stratum_loader::VecRowSource;
    use test_log::test;

    fn tmp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("stratum-db-test-{}", Uid::new(stratum_base::UidTag::Dataset)))
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect()
    }

    #[test]
    fn test_load_and_query_roundtrip() {
        let dir = tmp_dir();
        let db = Database::open(&dir);
        let mut src = VecRowSource::new(cols(&["id", "name"]), rows(&[&["1", "alice"], &["2", "bob"], &["3", "carol"]]));
        db.load_auto(&mut src, "people").unwrap();

        assert!(db.dataset("people").is_some());
        assert_eq!(db.datasets().len(), 1);

        let result = db.query("select name from people where id > 1").unwrap();
        assert_eq!(result.num_rows(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_query_unknown_dataset_errors() {
        let dir = tmp_dir();
        let db = Database::open(&dir);
        assert!(db.query("select * from nope").is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cancelled_query_returns_cancelled_error() {
        let dir = tmp_dir();
        let db = Database::open(&dir);
        let mut src = VecRowSource::new(cols(&["id"]), rows(&[&["1"], &["2"]]));
        db.load_auto(&mut src, "people").unwrap();

        let query = parse_query("select id from people").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = db.run_cancellable(&query, &cancel).unwrap_err();
        assert_eq!(err.kind(), stratum_base::ErrorKind::Cancelled);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
