//! Typed columnar chunk storage and the on-disk stripe format (spec.md §4.2, §4.3).

mod chunk;
mod stripe;

pub use chunk::{
    cmp_bool, cmp_bytes, cmp_f64, cmp_i64, looks_like_datetime, BoolChunk, Chunk, CompareOp, FloatChunk, IntChunk,
    NullsChunk, StringChunk,
};
pub use stripe::{Stripe, STRIPE_FORMAT_VERSION};
