//! Query execution over cataloged datasets (spec.md §4.11): resolves a dataset,
//! reads only the columns a query touches, and runs filter/group/aggregate/project/
//! limit.

mod cols;
mod runner;
mod safety;

pub use runner::{run_query, QueryResult};
