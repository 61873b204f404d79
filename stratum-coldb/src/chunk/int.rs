use stratum_base::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use stratum_base::{err_kind, Bitmap, Dtype, ErrorKind, Result};

use super::op::{cmp_f64, cmp_i64, CompareOp};
use super::NULL_HASH_SENTINEL;

/// Storage shared by `int` and `datetime` columns: both are arrays of `i64` with a
/// nullability bitmap, differing only in how text values parse and print
/// (spec.md §3.1 supplement: datetime is stored as microseconds-since-epoch).
#[derive(Clone, Debug, PartialEq)]
pub struct IntChunk {
    pub(crate) dtype: Dtype,
    pub(crate) nullable: bool,
    pub(crate) nulls: Bitmap,
    pub(crate) data: Vec<i64>,
}

impl IntChunk {
    pub fn new(dtype: Dtype, nullable: bool) -> Self {
        IntChunk { dtype, nullable, nulls: Bitmap::new(0), data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nullable && self.nulls.get(i)
    }

    pub fn get(&self, i: usize) -> Option<i64> {
        if self.is_null(i) {
            None
        } else {
            Some(self.data[i])
        }
    }

    fn parse(&self, text: &str) -> Result<Option<i64>> {
        if text.is_empty() {
            return Ok(None);
        }
        match self.dtype {
            Dtype::Int => text
                .parse::<i64>()
                .map(Some)
                .map_err(|e| err_kind(ErrorKind::InvalidLiteral, format!("invalid int {text:?}: {e}"))),
            Dtype::Datetime => parse_datetime_micros(text)
                .map(Some)
                .ok_or_else(|| err_kind(ErrorKind::InvalidLiteral, format!("invalid datetime {text:?}"))),
            _ => unreachable!("IntChunk only backs Int/Datetime"),
        }
    }

    pub fn append_value(&mut self, text: &str) -> Result<()> {
        let row = self.data.len();
        match self.parse(text)? {
            Some(v) => {
                self.data.push(v);
                if self.nullable {
                    self.nulls.set(row, false);
                }
            }
            None => {
                if !self.nullable {
                    return Err(err_kind(ErrorKind::ColumnNotNullable, "column not declared nullable"));
                }
                self.data.push(0);
                self.nulls.set(row, true);
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

    pub fn append(&mut self, other: &IntChunk) -> Result<()> {
        if self.dtype != other.dtype || self.nullable != other.nullable {
            return Err(err_kind(ErrorKind::TypeMismatch, "chunk dtype/nullability mismatch in append"));
        }
        let base = self.data.len();
        self.data.extend_from_slice(&other.data);
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
        if literal.eq_ignore_ascii_case("null") {
            return Ok(None);
        }
        let lit = self.parse(literal)?;
        let Some(lit) = lit else {
            return Ok(None);
        };
        let mut bm = Bitmap::new(self.len());
        let mut any = false;
        for i in 0..self.len() {
            if self.is_null(i) {
                continue;
            }
            if cmp_i64(op, self.data[i], lit) {
                bm.set(i, true);
                any = true;
            }
        }
        Ok(if any { Some(bm) } else { None })
    }

    pub fn prune(&self, bm: &Bitmap) -> Result<IntChunk> {
        if bm.cap() != self.len() {
            return Err(err_kind(ErrorKind::TypeMismatch, "prune bitmap length mismatch"));
        }
        let mut out = IntChunk::new(self.dtype, self.nullable);
        for i in bm.iter_set() {
            out.data.push(self.data[i]);
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
                rapidhash::rapidhash(&self.data[i].to_le_bytes())
            };
            out[i] ^= h;
        }
    }

    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        super::write_nullable_prefix(self.nullable, &self.nulls, self.len(), wr)?;
        wr.write_u32_le(self.data.len() as u32)?;
        for v in &self.data {
            wr.write_i64_le(*v)?;
        }
        Ok(())
    }

    pub fn deserialize(rd: &mut impl Reader, dtype: Dtype, nullable: bool, nulls: Bitmap) -> Result<Self> {
        let length = rd.read_u32_le()? as usize;
        let mut data = Vec::with_capacity(length);
        for _ in 0..length {
            data.push(rd.read_i64_le()?);
        }
        Ok(IntChunk { dtype, nullable, nulls, data })
    }

}

/// Same storage, floating-point flavour.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatChunk {
    pub(crate) nullable: bool,
    pub(crate) nulls: Bitmap,
    pub(crate) data: Vec<f64>,
}

impl FloatChunk {
    pub fn new(nullable: bool) -> Self {
        FloatChunk { nullable, nulls: Bitmap::new(0), data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nullable && self.nulls.get(i)
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        if self.is_null(i) {
            None
        } else {
            Some(self.data[i])
        }
    }

    pub fn append_value(&mut self, text: &str) -> Result<()> {
        let row = self.data.len();
        if text.is_empty() {
            if !self.nullable {
                return Err(err_kind(ErrorKind::ColumnNotNullable, "column not declared nullable"));
            }
            self.data.push(0.0);
            self.nulls.set(row, true);
            return Ok(());
        }
        let v: f64 = text
            .parse()
            .map_err(|e| err_kind(ErrorKind::InvalidLiteral, format!("invalid float {text:?}: {e}")))?;
        if v.is_nan() {
            if !self.nullable {
                return Err(err_kind(ErrorKind::ColumnNotNullable, "column not declared nullable"));
            }
            self.data.push(0.0);
            self.nulls.set(row, true);
        } else {
            self.data.push(v);
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

    pub fn append(&mut self, other: &FloatChunk) -> Result<()> {
        if self.nullable != other.nullable {
            return Err(err_kind(ErrorKind::TypeMismatch, "chunk nullability mismatch in append"));
        }
        let base = self.data.len();
        self.data.extend_from_slice(&other.data);
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
        if literal.is_empty() || literal.eq_ignore_ascii_case("null") {
            return Ok(None);
        }
        let lit: f64 = literal
            .parse()
            .map_err(|e| err_kind(ErrorKind::InvalidLiteral, format!("invalid float {literal:?}: {e}")))?;
        let mut bm = Bitmap::new(self.len());
        let mut any = false;
        for i in 0..self.len() {
            if self.is_null(i) {
                continue;
            }
            if cmp_f64(op, self.data[i], lit) {
                bm.set(i, true);
                any = true;
            }
        }
        Ok(if any { Some(bm) } else { None })
    }

    pub fn prune(&self, bm: &Bitmap) -> Result<FloatChunk> {
        if bm.cap() != self.len() {
            return Err(err_kind(ErrorKind::TypeMismatch, "prune bitmap length mismatch"));
        }
        let mut out = FloatChunk::new(self.nullable);
        for i in bm.iter_set() {
            out.data.push(self.data[i]);
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
                rapidhash::rapidhash(&self.data[i].to_le_bytes())
            };
            out[i] ^= h;
        }
    }

    pub fn marshal_binary(&self, wr: &mut impl Writer) -> Result<()> {
        super::write_nullable_prefix(self.nullable, &self.nulls, self.len(), wr)?;
        wr.write_u32_le(self.data.len() as u32)?;
        for v in &self.data {
            wr.write_f64_le(*v)?;
        }
        Ok(())
    }

    pub fn deserialize(rd: &mut impl Reader, nullable: bool, nulls: Bitmap) -> Result<Self> {
        let length = rd.read_u32_le()? as usize;
        let mut data = Vec::with_capacity(length);
        for _ in 0..length {
            data.push(rd.read_f64_le()?);
        }
        Ok(FloatChunk { nullable, nulls, data })
    }
}

/// Whether `text` parses as the restricted RFC 3339 subset datetime columns accept,
/// exposed so the loader's type inference can recognize datetime columns without
/// duplicating the parsing logic (spec.md §4.5 supplement).
pub fn looks_like_datetime(text: &str) -> bool {
    parse_datetime_micros(text).is_some()
}

fn parse_datetime_micros(text: &str) -> Option<i64> {
    // Restricted RFC 3339: YYYY-MM-DDTHH:MM:SS[.fff]Z
    let bytes = text.as_bytes();
    if bytes.len() < 20 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' {
        return None;
    }
    if !text.ends_with('Z') {
        return None;
    }
    let year: i64 = text.get(0..4)?.parse().ok()?;
    let month: i64 = text.get(5..7)?.parse().ok()?;
    let day: i64 = text.get(8..10)?.parse().ok()?;
    let hour: i64 = text.get(11..13)?.parse().ok()?;
    let minute: i64 = text.get(14..16)?.parse().ok()?;
    let second: i64 = text.get(17..19)?.parse().ok()?;
    let mut micros = 0i64;
    let rest = text.get(19..text.len() - 1)?;
    if let Some(frac) = rest.strip_prefix('.') {
        let mut digits = frac.to_string();
        while digits.len() < 6 {
            digits.push('0');
        }
        micros = digits.get(0..6)?.parse().ok()?;
    } else if !rest.is_empty() {
        return None;
    }
    let days = days_from_civil(year, month, day)?;
    let secs_of_day = hour * 3600 + minute * 60 + second;
    Some((days * 86_400 + secs_of_day) * 1_000_000 + micros)
}

fn format_datetime_micros(micros: i64) -> String {
    let mut days = micros.div_euclid(86_400_000_000);
    let mut rem = micros.rem_euclid(86_400_000_000);
    let frac_micros = rem % 1_000_000;
    rem /= 1_000_000;
    let second = rem % 60;
    rem /= 60;
    let minute = rem % 60;
    rem /= 60;
    let hour = rem;
    let (y, m, d) = civil_from_days(days);
    let _ = &mut days;
    if frac_micros == 0 {
        format!("{y:04}-{m:02}-{d:02}T{hour:02}:{minute:02}:{second:02}Z")
    } else {
        format!("{y:04}-{m:02}-{d:02}T{hour:02}:{minute:02}:{second:02}.{frac_micros:06}Z")
    }
}

// Howard Hinnant's civil-from-days / days-from-civil algorithm (public domain), used
// verbatim so datetime handling has no calendar-arithmetic dependency.
fn days_from_civil(y: i64, m: i64, d: i64) -> Option<i64> {
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Some(era * 146_097 + doe - 719_468)
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_datetime_roundtrip() {
        let s = "2024-01-15T12:30:00Z";
        let micros = parse_datetime_micros(s).unwrap();
        assert_eq!(format_datetime_micros(micros), s);
    }

    #[test]
    fn test_datetime_with_fraction() {
        let s = "2024-01-15T12:30:00.500000Z";
        let micros = parse_datetime_micros(s).unwrap();
        assert_eq!(format_datetime_micros(micros), s);
    }

    #[test]
    fn test_int_append_and_null() {
        let mut c = IntChunk::new(Dtype::Int, true);
        c.append_values(&["1", "", "3"]).unwrap();
        assert_eq!(c.get(0), Some(1));
        assert_eq!(c.get(1), None);
        assert_eq!(c.get(2), Some(3));
    }

    #[test]
    fn test_int_not_nullable_rejects_empty() {
        let mut c = IntChunk::new(Dtype::Int, false);
        assert!(c.append_value("").is_err());
    }

    #[test]
    fn test_float_nan_becomes_null() {
        let mut c = FloatChunk::new(true);
        c.append_value("nan").unwrap();
        assert_eq!(c.get(0), None);
    }
}
