//! Row source ingestion: the two-pass type-inferring loader and the schema-supplied
//! direct loader (spec.md §4.5).

mod guess;
mod loader;
mod row_source;
mod settings;

pub use loader::{load_auto, load_with_schema};
pub use row_source::{RowSource, VecRowSource};
pub use settings::Settings;
