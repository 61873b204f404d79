use stratum_base::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use stratum_base::{err_kind, Bitmap, ErrorKind, Result};

use super::op::CompareOp;
use super::NULL_HASH_SENTINEL;

/// The all-null column: every declared `null` dtype column, and the degenerate case of
/// a typed column loaded with zero non-null values (spec.md §4.5 inference, "a column
/// with no sampled values infers as null"). Carries only a row count.
#[derive(Clone, Debug, PartialEq)]
pub struct NullsChunk {
    pub(crate) len: usize,
}

impl NullsChunk {
    pub fn new() -> Self {
        NullsChunk { len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn append_value(&mut self, text: &str) -> Result<()> {
        if !text.is_empty() {
            return Err(err_kind(ErrorKind::ColumnNotNullable, "null column received a non-empty value"));
        }
        self.len += 1;
        Ok(())
    }

    pub fn append_values(&mut self, texts: &[&str]) -> Result<()> {
        for t in texts {
            self.append_value(t)?;
        }
        Ok(())
    }

    pub fn append(&mut self, other: &NullsChunk) -> Result<()> {
        self.len += other.len;
        Ok(())
    }

    /// Every row is null, so no literal comparison can ever select one: this pattern
    /// has no useful result, distinct from "selects nothing" (an empty `Some` bitmap
    /// would read the same as "selects nothing" to a caller, which is misleading here).
    pub fn filter(&self, _op: CompareOp, _literal: &str) -> Result<Option<Bitmap>> {
        Err(err_kind(ErrorKind::QueryPatternNotSupported, "cannot filter a null column against a literal"))
    }

    pub fn prune(&self, bm: &Bitmap) -> Result<NullsChunk> {
        if bm.cap() != self.len {
            return Err(err_kind(ErrorKind::TypeMismatch, "prune bitmap length mismatch"));
        }
        Ok(NullsChunk { len: bm.count() })
    }

    pub fn hash_into(&self, out: &mut [u64]) {
        for h in out.iter_mut().take(self.len) {
            *h ^= NULL_HASH_SENTINEL;
        }
    }

    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_u32_le(self.len as u32)?;
        Ok(())
    }

    pub fn deserialize(rd: &mut impl Reader) -> Result<Self> {
        let len = rd.read_u32_le()? as usize;
        Ok(NullsChunk { len })
    }
}

impl Default for NullsChunk {
    fn default() -> Self {
        Self::new()
    }
}
