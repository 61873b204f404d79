//! Typed columnar chunk storage (spec.md §4.2). A `Chunk` is one column's worth of
//! values for one stripe: fixed dtype, optional nullability bitmap, and a
//! dtype-specific payload. `int` and `datetime` share a backing representation
//! (microseconds since the epoch) and differ only in text parsing/formatting.

mod bool_chunk;
mod int;
mod nulls;
mod op;
mod string;

pub use bool_chunk::BoolChunk;
pub use int::{looks_like_datetime, FloatChunk, IntChunk};
pub use nulls::NullsChunk;
pub use op::{cmp_bool, cmp_bytes, cmp_f64, cmp_i64, CompareOp};
pub use string::StringChunk;

use std::io::{Read as _, Write as _};

use stratum_base::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use stratum_base::{err_kind, Bitmap, Dtype, ErrorKind, Result};

/// Contribution a null value makes to a composite row hash (spec.md §4.2): fixed so
/// that two null cells always agree, and chosen away from zero so an all-zero row of
/// actual data doesn't collide with an all-null row.
pub(crate) const NULL_HASH_SENTINEL: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    Int(IntChunk),
    Float(FloatChunk),
    Bool(BoolChunk),
    String(StringChunk),
    Datetime(IntChunk),
    Nulls(NullsChunk),
}

impl Chunk {
    pub fn new(dtype: Dtype, nullable: bool) -> Chunk {
        match dtype {
            Dtype::Int => Chunk::Int(IntChunk::new(Dtype::Int, nullable)),
            Dtype::Datetime => Chunk::Datetime(IntChunk::new(Dtype::Datetime, nullable)),
            Dtype::Float => Chunk::Float(FloatChunk::new(nullable)),
            Dtype::Bool => Chunk::Bool(BoolChunk::new(nullable)),
            Dtype::String => Chunk::String(StringChunk::new(nullable)),
            Dtype::Null | Dtype::Invalid => Chunk::Nulls(NullsChunk::new()),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Chunk::Int(_) => Dtype::Int,
            Chunk::Float(_) => Dtype::Float,
            Chunk::Bool(_) => Dtype::Bool,
            Chunk::String(_) => Dtype::String,
            Chunk::Datetime(_) => Dtype::Datetime,
            Chunk::Nulls(_) => Dtype::Null,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Chunk::Int(c) | Chunk::Datetime(c) => c.len(),
            Chunk::Float(c) => c.len(),
            Chunk::Bool(c) => c.len(),
            Chunk::String(c) => c.len(),
            Chunk::Nulls(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append_value(&mut self, text: &str) -> Result<()> {
        match self {
            Chunk::Int(c) | Chunk::Datetime(c) => c.append_value(text),
            Chunk::Float(c) => c.append_value(text),
            Chunk::Bool(c) => c.append_value(text),
            Chunk::String(c) => c.append_value(text),
            Chunk::Nulls(c) => c.append_value(text),
        }
    }

    pub fn append_values(&mut self, texts: &[&str]) -> Result<()> {
        match self {
            Chunk::Int(c) | Chunk::Datetime(c) => c.append_values(texts),
            Chunk::Float(c) => c.append_values(texts),
            Chunk::Bool(c) => c.append_values(texts),
            Chunk::String(c) => c.append_values(texts),
            Chunk::Nulls(c) => c.append_values(texts),
        }
    }

    pub fn append(&mut self, other: &Chunk) -> Result<()> {
        match (self, other) {
            (Chunk::Int(a), Chunk::Int(b)) => a.append(b),
            (Chunk::Datetime(a), Chunk::Datetime(b)) => a.append(b),
            (Chunk::Float(a), Chunk::Float(b)) => a.append(b),
            (Chunk::Bool(a), Chunk::Bool(b)) => a.append(b),
            (Chunk::String(a), Chunk::String(b)) => a.append(b),
            (Chunk::Nulls(a), Chunk::Nulls(b)) => a.append(b),
            _ => Err(err_kind(ErrorKind::TypeMismatch, "cannot append chunks of differing dtype")),
        }
    }

    pub fn filter(&self, op: CompareOp, literal: &str) -> Result<Option<Bitmap>> {
        match self {
            Chunk::Int(c) | Chunk::Datetime(c) => c.filter(op, literal),
            Chunk::Float(c) => c.filter(op, literal),
            Chunk::Bool(c) => c.filter(op, literal),
            Chunk::String(c) => c.filter(op, literal),
            Chunk::Nulls(c) => c.filter(op, literal),
        }
    }

    pub fn prune(&self, bm: &Bitmap) -> Result<Chunk> {
        Ok(match self {
            Chunk::Int(c) => Chunk::Int(c.prune(bm)?),
            Chunk::Datetime(c) => Chunk::Datetime(c.prune(bm)?),
            Chunk::Float(c) => Chunk::Float(c.prune(bm)?),
            Chunk::Bool(c) => Chunk::Bool(c.prune(bm)?),
            Chunk::String(c) => Chunk::String(c.prune(bm)?),
            Chunk::Nulls(c) => Chunk::Nulls(c.prune(bm)?),
        })
    }

    pub fn hash_into(&self, out: &mut [u64]) {
        match self {
            Chunk::Int(c) | Chunk::Datetime(c) => c.hash_into(out),
            Chunk::Float(c) => c.hash_into(out),
            Chunk::Bool(c) => c.hash_into(out),
            Chunk::String(c) => c.hash_into(out),
            Chunk::Nulls(c) => c.hash_into(out),
        }
    }

    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        match self {
            Chunk::Int(c) | Chunk::Datetime(c) => c.marshal_binary(wr),
            Chunk::Float(c) => c.marshal_binary(wr),
            Chunk::Bool(c) => c.marshal_binary(wr),
            Chunk::String(c) => c.marshal_binary(wr),
            Chunk::Nulls(c) => c.marshal_binary(wr),
        }
    }

    pub fn marshal_json(&self) -> Result<Vec<u8>> {
        let values: Vec<serde_json::Value> = match self {
            Chunk::Int(c) | Chunk::Datetime(c) => (0..c.len())
                .map(|i| match c.get(i) {
                    Some(v) => serde_json::Value::from(v),
                    None => serde_json::Value::Null,
                })
                .collect(),
            Chunk::Float(c) => (0..c.len())
                .map(|i| match c.get(i) {
                    Some(v) => serde_json::json!(v),
                    None => serde_json::Value::Null,
                })
                .collect(),
            Chunk::Bool(c) => (0..c.len())
                .map(|i| match c.get(i) {
                    Some(v) => serde_json::Value::from(v),
                    None => serde_json::Value::Null,
                })
                .collect(),
            Chunk::String(c) => (0..c.len())
                .map(|i| match c.get(i) {
                    Some(v) => serde_json::Value::from(v),
                    None => serde_json::Value::Null,
                })
                .collect(),
            Chunk::Nulls(c) => (0..c.len()).map(|_| serde_json::Value::Null).collect(),
        };
        serde_json::to_vec(&values).map_err(|e| err_kind(ErrorKind::Other, format!("{e}")))
    }

    pub fn deserialize(rd: &mut impl Reader, dtype: Dtype) -> Result<Chunk> {
        if matches!(dtype, Dtype::Null | Dtype::Invalid) {
            return Ok(Chunk::Nulls(NullsChunk::deserialize(rd)?));
        }
        let (nullable, nulls) = read_nullable_prefix(rd)?;
        Ok(match dtype {
            Dtype::Int => Chunk::Int(IntChunk::deserialize(rd, Dtype::Int, nullable, nulls)?),
            Dtype::Datetime => Chunk::Datetime(IntChunk::deserialize(rd, Dtype::Datetime, nullable, nulls)?),
            Dtype::Float => Chunk::Float(FloatChunk::deserialize(rd, nullable, nulls)?),
            Dtype::Bool => Chunk::Bool(BoolChunk::deserialize(rd, nullable, nulls)?),
            Dtype::String => Chunk::String(StringChunk::deserialize(rd, nullable, nulls)?),
            Dtype::Null | Dtype::Invalid => unreachable!("handled above"),
        })
    }
}

/// `u8 nullable`, then the nullability bitmap (spec.md §4.2). The bitmap is padded to
/// exactly `len` bits regardless of where its last set bit fell, so every chunk's
/// on-disk nullability mask has a predictable size.
pub(crate) fn write_nullable_prefix(nullable: bool, nulls: &Bitmap, len: usize, wr: &mut impl Writer) -> Result<()> {
    wr.write_all(&[nullable as u8])?;
    let mut padded = Bitmap::new(len);
    for i in 0..nulls.cap().min(len) {
        if nulls.get(i) {
            padded.set(i, true);
        }
    }
    padded.marshal_binary(wr)
}

fn read_nullable_prefix(rd: &mut impl Reader) -> Result<(bool, Bitmap)> {
    let mut b = [0u8; 1];
    rd.read_exact(&mut b)?;
    let nullable = b[0] != 0;
    let nulls = Bitmap::deserialize(rd)?;
    Ok((nullable, nulls))
}
