//! The dataset catalog: dataset identity, schema, stripe list, and on-disk layout
//! (spec.md §4.4).

mod catalog;
mod dataset;

pub use catalog::Catalog;
pub use dataset::Dataset;
