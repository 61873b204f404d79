// I/O abstractions shared by every on-disk format in the workspace (bitmaps, chunks,
// stripes). Kept deliberately thin: a `Reader`/`Writer` pair that can be backed by an
// in-memory buffer (for tests and round-trip checks) or a real file (for stripes), plus
// a handful of little-endian primitive helpers used by every binary codec.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Result as IoResult, Seek, SeekFrom, Write},
    path::Path,
    sync::Arc,
};

pub trait Reader: Read + Seek + Send {}

pub trait Writer: Write + Seek + Send {
    fn sync(&mut self) -> IoResult<()>;
}

// MemReader / MemWriter

pub struct MemReader {
    mem: Cursor<Arc<[u8]>>,
}

impl MemReader {
    pub fn new(mem: Arc<[u8]>) -> Self {
        Self { mem: Cursor::new(mem) }
    }
}

impl From<Vec<u8>> for MemReader {
    fn from(vec: Vec<u8>) -> Self {
        Self::new(Arc::from(vec))
    }
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.mem.read(buf)
    }
}
impl Seek for MemReader {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.mem.seek(pos)
    }
}
impl Reader for MemReader {}

#[derive(Default)]
pub struct MemWriter {
    mem: Cursor<Vec<u8>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn into_inner(self) -> Vec<u8> {
        self.mem.into_inner()
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.mem.write(buf)
    }
    fn flush(&mut self) -> IoResult<()> {
        self.mem.flush()
    }
}
impl Seek for MemWriter {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.mem.seek(pos)
    }
}
impl Writer for MemWriter {
    fn sync(&mut self) -> IoResult<()> {
        self.flush()
    }
}

// FileReader / FileWriter

pub struct FileReader {
    file: BufReader<File>,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> IoResult<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(Self { file })
    }
}
impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.file.read(buf)
    }
}
impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.file.seek(pos)
    }
}
impl Reader for FileReader {}

pub struct FileWriter {
    file: BufWriter<File>,
}

impl FileWriter {
    /// Stripe files are never partially referenced: a writer only ever creates a new
    /// file named by a fresh UID, so a half-written file is harmless until the catalog
    /// records its UID (spec.md §3, "Stripe").
    pub fn create_new(path: impl AsRef<Path>) -> IoResult<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self { file: BufWriter::new(file) })
    }
}
impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> IoResult<()> {
        self.file.flush()
    }
}
impl Seek for FileWriter {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.file.seek(pos)
    }
}
impl Writer for FileWriter {
    fn sync(&mut self) -> IoResult<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()
    }
}

// Little-endian primitive helpers, used by every binary codec in the workspace.

pub trait ReaderExt: Read {
    fn read_u16_le(&mut self) -> IoResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }
    fn read_u32_le(&mut self) -> IoResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
    fn read_u64_le(&mut self) -> IoResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
    fn read_i64_le(&mut self) -> IoResult<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }
    fn read_f64_le(&mut self) -> IoResult<f64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }
    fn read_bytes_exact(&mut self, len: usize) -> IoResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}
impl<R: Read + ?Sized> ReaderExt for R {}

pub trait WriterExt: Write {
    fn write_u16_le(&mut self, v: u16) -> IoResult<()> {
        self.write_all(&v.to_le_bytes())
    }
    fn write_u32_le(&mut self, v: u32) -> IoResult<()> {
        self.write_all(&v.to_le_bytes())
    }
    fn write_u64_le(&mut self, v: u64) -> IoResult<()> {
        self.write_all(&v.to_le_bytes())
    }
    fn write_i64_le(&mut self, v: i64) -> IoResult<()> {
        self.write_all(&v.to_le_bytes())
    }
    fn write_f64_le(&mut self, v: f64) -> IoResult<()> {
        self.write_all(&v.to_le_bytes())
    }
}
impl<W: Write + ?Sized> WriterExt for W {}
