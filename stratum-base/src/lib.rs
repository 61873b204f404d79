//! Base types and ubiquitous definitions shared by every crate in the workspace:
//! the bitmap primitive, UIDs, the dtype/schema data model, and the error taxonomy.

mod bitmap;
mod cancel;
mod error;
pub mod ioutil;
mod schema;
mod uid;

pub use bitmap::Bitmap;
pub use cancel::CancelToken;
pub use error::{err, err_kind, is_runtime_or_io, Error, ErrorKind, Result};
pub use schema::{Dtype, Schema, TableSchema};
pub use uid::{Uid, UidTag};
