//! Type checking, row-wise evaluation, and per-group aggregation for the expression
//! language (spec.md §4.8-§4.10).

mod aggregate;
mod evaluator;
mod typecheck;

pub use aggregate::{AggKind, Aggregator};
pub use evaluator::{evaluate, evaluate_over_groups, ColumnMap};
pub use typecheck::{contains_aggregate, typecheck};
