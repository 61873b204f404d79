use std::io::Write as _;

use stratum_base::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use stratum_base::{err_kind, Bitmap, ErrorKind, Result};

use super::op::{cmp_bytes, CompareOp};
use super::NULL_HASH_SENTINEL;

/// String columns store an empty string as the null marker (spec.md §4.2): a column
/// declared non-nullable rejects empty values outright rather than silently storing
/// them.
#[derive(Clone, Debug, PartialEq)]
pub struct StringChunk {
    pub(crate) nullable: bool,
    pub(crate) nulls: Bitmap,
    pub(crate) data: Vec<String>,
}

impl StringChunk {
    pub fn new(nullable: bool) -> Self {
        StringChunk { nullable, nulls: Bitmap::new(0), data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nullable && self.nulls.get(i)
    }

    pub fn get(&self, i: usize) -> Option<&str> {
        if self.is_null(i) {
            None
        } else {
            Some(&self.data[i])
        }
    }

    pub fn append_value(&mut self, text: &str) -> Result<()> {
        let row = self.data.len();
        if text.is_empty() {
            if !self.nullable {
                return Err(err_kind(ErrorKind::ColumnNotNullable, "column not declared nullable"));
            }
            self.data.push(String::new());
            self.nulls.set(row, true);
        } else {
            self.data.push(text.to_owned());
            if self.nullable {
                self.nulls.set(row, false);
            }
        }
        Ok(())
    }

    pub fn append_values(&mut self, texts: &[&str]) -> Result<()> {
        for t in texts {
            self.append_value(t)?;
        }
        Ok(())
    }

    pub fn append(&mut self, other: &StringChunk) -> Result<()> {
        if self.nullable != other.nullable {
            return Err(err_kind(ErrorKind::TypeMismatch, "chunk nullability mismatch in append"));
        }
        let base = self.data.len();
        self.data.extend(other.data.iter().cloned());
        if self.nullable {
            for i in 0..other.data.len() {
                if other.nulls.get(i) {
                    self.nulls.set(base + i, true);
                }
            }
        }
        Ok(())
    }

    pub fn filter(&self, op: CompareOp, literal: &str) -> Result<Option<Bitmap>> {
        if matches!(op, CompareOp::Eq | CompareOp::Ne) && !literal.is_empty() {
            // A row can only equal `literal` if its bytes contain `literal` as a
            // substring, so one memchr pass over the chunk rules out the whole
            // column before touching any row individually (spec.md §4.3).
            let mut haystack = Vec::new();
            for i in 0..self.len() {
                if self.is_null(i) {
                    continue;
                }
                haystack.extend_from_slice(self.data[i].as_bytes());
                haystack.push(0);
            }
            if memchr::memmem::find(&haystack, literal.as_bytes()).is_none() {
                return match op {
                    CompareOp::Eq => Ok(None),
                    CompareOp::Ne => {
                        let mut bm = Bitmap::new(self.len());
                        let mut any = false;
                        for i in 0..self.len() {
                            if !self.is_null(i) {
                                bm.set(i, true);
                                any = true;
                            }
                        }
                        Ok(if any { Some(bm) } else { None })
                    }
                    _ => unreachable!(),
                };
            }
        }
        let mut bm = Bitmap::new(self.len());
        let mut any = false;
        for i in 0..self.len() {
            if self.is_null(i) {
                continue;
            }
            if cmp_bytes(op, self.data[i].as_bytes(), literal.as_bytes()) {
                bm.set(i, true);
                any = true;
            }
        }
        Ok(if any { Some(bm) } else { None })
    }

    pub fn prune(&self, bm: &Bitmap) -> Result<StringChunk> {
        if bm.cap() != self.len() {
            return Err(err_kind(ErrorKind::TypeMismatch, "prune bitmap length mismatch"));
        }
        let mut out = StringChunk::new(self.nullable);
        for i in bm.iter_set() {
            out.data.push(self.data[i].clone());
            if self.nullable && self.nulls.get(i) {
                out.nulls.set(out.data.len() - 1, true);
            }
        }
        Ok(out)
    }

    pub fn hash_into(&self, out: &mut [u64]) {
        for i in 0..self.len() {
            let h = if self.is_null(i) {
                NULL_HASH_SENTINEL
            } else {
                rapidhash::rapidhash(self.data[i].as_bytes())
            };
            out[i] ^= h;
        }
    }

    /// `u32 offset_count`, `offset_count` x `u32` offsets (CSR-style: `offsets[0] == 0`,
    /// `offsets[i+1] - offsets[i]` is the byte length of string `i`), `u32 data_len`,
    /// then `data_len` concatenated bytes.
    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        super::write_nullable_prefix(self.nullable, &self.nulls, self.len(), wr)?;
        let mut offsets = Vec::with_capacity(self.data.len() + 1);
        let mut off = 0u32;
        offsets.push(off);
        for s in &self.data {
            off += s.len() as u32;
            offsets.push(off);
        }
        wr.write_u32_le(offsets.len() as u32)?;
        for o in &offsets {
            wr.write_u32_le(*o)?;
        }
        wr.write_u32_le(off)?;
        for s in &self.data {
            wr.write_all(s.as_bytes())?;
        }
        Ok(())
    }

    pub fn deserialize(rd: &mut impl Reader, nullable: bool, nulls: Bitmap) -> Result<Self> {
        let offset_count = rd.read_u32_le()? as usize;
        if offset_count == 0 {
            return Err(err_kind(ErrorKind::InvalidOffsetData, "string chunk offset_count must be >= 1"));
        }
        let mut offsets = Vec::with_capacity(offset_count);
        for _ in 0..offset_count {
            offsets.push(rd.read_u32_le()?);
        }
        let data_len = rd.read_u32_le()?;
        let bytes = rd.read_bytes_exact(data_len as usize)?;
        let mut data = Vec::with_capacity(offset_count - 1);
        for w in offsets.windows(2) {
            let (start, end) = (w[0], w[1]);
            if end < start || end as usize > bytes.len() {
                return Err(err_kind(ErrorKind::InvalidOffsetData, "string chunk offsets out of range"));
            }
            let s = String::from_utf8(bytes[start as usize..end as usize].to_vec())
                .map_err(|e| err_kind(ErrorKind::IncompatibleOnDiskFormat, format!("{e}")))?;
            data.push(s);
        }
        Ok(StringChunk { nullable, nulls, data })
    }
}
