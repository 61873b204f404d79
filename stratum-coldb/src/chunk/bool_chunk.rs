use stratum_base::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use stratum_base::{err_kind, Bitmap, ErrorKind, Result};

use super::op::{cmp_bool, CompareOp};
use super::NULL_HASH_SENTINEL;

#[derive(Clone, Debug, PartialEq)]
pub struct BoolChunk {
    pub(crate) nullable: bool,
    pub(crate) nulls: Bitmap,
    pub(crate) data: Bitmap,
    pub(crate) len: usize,
}

impl BoolChunk {
    pub fn new(nullable: bool) -> Self {
        BoolChunk { nullable, nulls: Bitmap::new(0), data: Bitmap::new(0), len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nullable && self.nulls.get(i)
    }

    pub fn get(&self, i: usize) -> Option<bool> {
        if self.is_null(i) {
            None
        } else {
            Some(self.data.get(i))
        }
    }

    pub fn append_value(&mut self, text: &str) -> Result<()> {
        let row = self.len;
        self.len += 1;
        if text.is_empty() {
            if !self.nullable {
                return Err(err_kind(ErrorKind::ColumnNotNullable, "column not declared nullable"));
            }
            self.nulls.set(row, true);
            return Ok(());
        }
        let v = match text {
            "true" | "True" | "TRUE" | "1" => true,
            "false" | "False" | "FALSE" | "0" => false,
            _ => return Err(err_kind(ErrorKind::InvalidLiteral, format!("invalid bool {text:?}"))),
        };
        self.data.set(row, v);
        if self.nullable {
            self.nulls.set(row, false);
        }
        Ok(())
    }

    pub fn append_values(&mut self, texts: &[&str]) -> Result<()> {
        for t in texts {
            self.append_value(t)?;
        }
        Ok(())
    }

    pub fn append(&mut self, other: &BoolChunk) -> Result<()> {
        if self.nullable != other.nullable {
            return Err(err_kind(ErrorKind::TypeMismatch, "chunk nullability mismatch in append"));
        }
        let base = self.len;
        for i in 0..other.len {
            self.data.set(base + i, other.data.get(i));
            if self.nullable && other.nulls.get(i) {
                self.nulls.set(base + i, true);
            }
        }
        self.len += other.len;
        Ok(())
    }

    pub fn filter(&self, op: CompareOp, literal: &str) -> Result<Option<Bitmap>> {
        if literal.is_empty() || literal.eq_ignore_ascii_case("null") {
            // A bool column carries no null-aware equality, so a comparison against
            // the literal `null` can never select a row (spec.md §4.2).
            return Ok(None);
        }
        let lit = match literal {
            "true" | "True" | "TRUE" | "1" => true,
            "false" | "False" | "FALSE" | "0" => false,
            _ => return Err(err_kind(ErrorKind::InvalidLiteral, format!("invalid bool {literal:?}"))),
        };
        let mut bm = Bitmap::new(self.len);
        let mut any = false;
        for i in 0..self.len {
            if self.is_null(i) {
                continue;
            }
            if let Some(true) = cmp_bool(op, self.data.get(i), lit) {
                bm.set(i, true);
                any = true;
            }
        }
        Ok(if any { Some(bm) } else { None })
    }

    pub fn prune(&self, bm: &Bitmap) -> Result<BoolChunk> {
        if bm.cap() != self.len {
            return Err(err_kind(ErrorKind::TypeMismatch, "prune bitmap length mismatch"));
        }
        let mut out = BoolChunk::new(self.nullable);
        for i in bm.iter_set() {
            out.data.set(out.len, self.data.get(i));
            if self.nullable && self.nulls.get(i) {
                out.nulls.set(out.len, true);
            }
            out.len += 1;
        }
        Ok(out)
    }

    pub fn hash_into(&self, out: &mut [u64]) {
        for i in 0..self.len {
            let h = if self.is_null(i) {
                NULL_HASH_SENTINEL
            } else {
                rapidhash::rapidhash(&[self.data.get(i) as u8])
            };
            out[i] ^= h;
        }
    }

    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        super::write_nullable_prefix(self.nullable, &self.nulls, self.len, wr)?;
        wr.write_u32_le(self.len as u32)?;
        self.data.marshal_binary(wr)?;
        Ok(())
    }

    pub fn deserialize(rd: &mut impl Reader, nullable: bool, nulls: Bitmap) -> Result<Self> {
        let len = rd.read_u32_le()? as usize;
        let data = Bitmap::deserialize(rd)?;
        Ok(BoolChunk { nullable, nulls, data, len })
    }
}
