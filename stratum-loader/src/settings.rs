//! Loader configuration (spec.md §4.5, §6). Where a dataset's stripes live on disk is
//! the catalog's concern, not the loader's; `Settings` only controls how the loader
//! cuts stripes.

#[derive(Clone, Debug)]
pub struct Settings {
    pub max_rows_per_stripe: usize,
    pub max_bytes_per_stripe: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings { max_rows_per_stripe: 100_000, max_bytes_per_stripe: 10_000_000 }
    }
}
