//! The stripe file format (spec.md §4.3): one file per stripe, one chunk per column,
//! each chunk individually checksummed, with an offset table at the end so a writer
//! never needs to seek backwards and a single-column read touches only two regions of
//! the file.

use std::io::Write as _;

use stratum_base::ioutil::{Reader, ReaderExt, Writer, WriterExt};
use stratum_base::{err_kind, Dtype, ErrorKind, Result};
use tracing::debug;

use crate::chunk::Chunk;

pub const STRIPE_FORMAT_VERSION: u16 = 1;

pub struct Stripe {
    pub columns: Vec<Chunk>,
}

impl Stripe {
    pub fn new(columns: Vec<Chunk>) -> Self {
        Stripe { columns }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Writes `u16 version`, then for every column `u32 crc32 | chunk_bytes`, then the
    /// trailing absolute-offset table. Fsyncs on close (spec.md §4.3 write path).
    pub fn write(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_u16_le(STRIPE_FORMAT_VERSION)?;
        let mut offsets = Vec::with_capacity(self.columns.len() + 1);
        offsets.push(2u64);
        for chunk in &self.columns {
            let mut buf = stratum_base::ioutil::MemWriter::new();
            chunk.marshal_binary(&mut buf)?;
            let bytes = buf.into_inner();
            let crc = crc32fast::hash(&bytes);
            wr.write_u32_le(crc)?;
            wr.write_all(&bytes)?;
            let prev = *offsets.last().unwrap();
            offsets.push(prev + 4 + bytes.len() as u64);
        }
        for off in &offsets {
            wr.write_u64_le(*off)?;
        }
        wr.sync()?;
        debug!(n_columns = self.columns.len(), rows = self.num_rows(), "wrote stripe");
        Ok(())
    }

    /// Reads every column (a convenience over the single-column path below, used by
    /// tests and by small-dataset load paths where whole-stripe materialisation is
    /// cheap enough not to bother with per-column seeks).
    pub fn read_all(rd: &mut impl Reader, dtypes: &[Dtype]) -> Result<Stripe> {
        let offsets = read_offsets(rd, dtypes.len())?;
        let mut columns = Vec::with_capacity(dtypes.len());
        for (i, dtype) in dtypes.iter().enumerate() {
            columns.push(read_column(rd, &offsets, i, *dtype)?);
        }
        Ok(Stripe { columns })
    }

    /// Reads a single column by index, touching only the offset table and that
    /// column's byte range (spec.md §4.3 "single-column reads touch only two regions
    /// of the file").
    pub fn read_column(rd: &mut impl Reader, n_columns: usize, index: usize, dtype: Dtype) -> Result<Chunk> {
        let offsets = read_offsets(rd, n_columns)?;
        read_column(rd, &offsets, index, dtype)
    }
}

fn read_offsets(rd: &mut impl Reader, n_columns: usize) -> Result<Vec<u64>> {
    use std::io::{Seek, SeekFrom};

    rd.seek(SeekFrom::Start(0))?;
    let version = rd.read_u16_le()?;
    if version != STRIPE_FORMAT_VERSION {
        return Err(err_kind(
            ErrorKind::IncompatibleOnDiskFormat,
            format!("stripe format version {version} unsupported (expected {STRIPE_FORMAT_VERSION})"),
        ));
    }

    let table_bytes = 8 * (n_columns as u64 + 1);
    rd.seek(SeekFrom::End(-(table_bytes as i64)))?;
    let mut offsets = Vec::with_capacity(n_columns + 1);
    for _ in 0..=n_columns {
        offsets.push(rd.read_u64_le()?);
    }
    for w in offsets.windows(2) {
        let (a, b) = (w[0], w[1]);
        if b < a {
            return Err(err_kind(ErrorKind::InvalidOffsetData, "stripe offsets decrease"));
        }
        if b - a < 4 {
            return Err(err_kind(ErrorKind::InvalidOffsetData, "stripe chunk shorter than its crc32 prefix"));
        }
        if b - a > u32::MAX as u64 {
            return Err(err_kind(ErrorKind::InvalidOffsetData, "stripe chunk size implausibly large"));
        }
    }
    Ok(offsets)
}

fn read_column(rd: &mut impl Reader, offsets: &[u64], index: usize, dtype: Dtype) -> Result<Chunk> {
    use std::io::{Seek, SeekFrom};

    let start = offsets[index];
    let end = offsets[index + 1];
    rd.seek(SeekFrom::Start(start))?;
    let crc_expected = rd.read_u32_le()?;
    let payload = rd.read_bytes_exact((end - start - 4) as usize)?;
    let crc_actual = crc32fast::hash(&payload);
    if crc_actual != crc_expected {
        return Err(err_kind(
            ErrorKind::IncorrectChecksum,
            format!("stripe column {index} failed checksum (expected {crc_expected:08x}, got {crc_actual:08x})"),
        ));
    }
    let mut payload_rd = stratum_base::ioutil::MemReader::from(payload);
    Chunk::deserialize(&mut payload_rd, dtype)
}

#[cfg(test)]
mod test {
    use super::*;
    use stratum_base::ioutil::{MemReader, MemWriter};
    use test_log::test;

    fn sample_stripe() -> (Stripe, Vec<Dtype>) {
        let mut a = Chunk::new(Dtype::Int, false);
        a.append_values(&["1", "2", "3"]).unwrap();
        let mut b = Chunk::new(Dtype::String, true);
        b.append_values(&["x", "", "z"]).unwrap();
        (Stripe::new(vec![a, b]), vec![Dtype::Int, Dtype::String])
    }

    #[test]
    fn test_stripe_roundtrip() {
        let (stripe, dtypes) = sample_stripe();
        let mut w = MemWriter::new();
        stripe.write(&mut w).unwrap();
        let bytes = w.into_inner();
        let mut r = MemReader::from(bytes);
        let back = Stripe::read_all(&mut r, &dtypes).unwrap();
        assert_eq!(back.columns, stripe.columns);
    }

    #[test]
    fn test_stripe_single_column_read() {
        let (stripe, dtypes) = sample_stripe();
        let mut w = MemWriter::new();
        stripe.write(&mut w).unwrap();
        let bytes = w.into_inner();
        let mut r = MemReader::from(bytes);
        let col1 = Stripe::read_column(&mut r, dtypes.len(), 1, Dtype::String).unwrap();
        assert_eq!(col1, stripe.columns[1]);
    }

    #[test]
    fn test_stripe_bitflip_detected() {
        let (stripe, dtypes) = sample_stripe();
        let mut w = MemWriter::new();
        stripe.write(&mut w).unwrap();
        let mut bytes = w.into_inner();
        // Flip a byte inside the first column's payload, well clear of the version
        // header and trailing offset table.
        bytes[4] ^= 0xFF;
        let mut r = MemReader::from(bytes);
        let err = Stripe::read_all(&mut r, &dtypes).unwrap_err();
        assert_eq!(err.kind(), stratum_base::ErrorKind::IncorrectChecksum);
    }

    #[test]
    fn test_stripe_wrong_version_rejected() {
        let mut w = MemWriter::new();
        w.write_u16_le(99).unwrap();
        w.write_u64_le(2).unwrap();
        let bytes = w.into_inner();
        let mut r = MemReader::from(bytes);
        let err = Stripe::read_all(&mut r, &[]).unwrap_err();
        assert_eq!(err.kind(), stratum_base::ErrorKind::IncompatibleOnDiskFormat);
    }
}
