//! The loader's input boundary (spec.md §4.5): something that yields a header row of
//! column names followed by a sequence of string-valued rows. Decouples the loader
//! from wherever the rows actually come from (file, network, in-memory test fixture).

use stratum_base::Result;

pub trait RowSource {
    fn columns(&self) -> &[String];
    fn next_row(&mut self) -> Result<Option<Vec<String>>>;
}

/// An in-memory row source, mainly useful for tests and small one-shot loads.
pub struct VecRowSource {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<String>>,
}

impl VecRowSource {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        VecRowSource { columns, rows: rows.into_iter() }
    }
}

impl RowSource for VecRowSource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.rows.next())
    }
}
