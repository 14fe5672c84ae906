//! Random-access read capability.
//!
//! Every other component in this crate is generic over [`ByteSource`] rather
//! than over a concrete reader, mirroring the ambient `io.ReaderAt`-style
//! abstraction the design notes call out: a capability that lets a caller
//! share one read-only handle across worker threads without a shared cursor.

use std::fs::File;
use std::io;
#[cfg(not(unix))]
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

pub trait ByteSource: Send + Sync {
    /// Reads into `buf` starting at `offset`, returning the number of bytes
    /// actually read. Short reads are only expected at end-of-file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Reads exactly `buf.len()` bytes at `offset`, or fails.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let n = self.read_at(buf, offset)?;
        if n != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from byte source",
            ));
        }
        Ok(())
    }
}

/// Zero-copy source over an in-memory buffer, for tests and embedded files.
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data }
    }
}

impl<'a> ByteSource for SliceSource<'a> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[offset..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

/// `std::fs::File`-backed source. Wrapped in a mutex so it remains `Sync`
/// on platforms (e.g. non-Unix) without a lock-free positional read.
pub struct FileSource {
    #[cfg(unix)]
    file: File,
    #[cfg(not(unix))]
    file: Mutex<File>,
}

impl FileSource {
    pub fn new(file: File) -> Self {
        #[cfg(unix)]
        {
            FileSource { file }
        }
        #[cfg(not(unix))]
        {
            FileSource {
                file: Mutex::new(file),
            }
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(FileSource::new(File::open(path)?))
    }
}

impl ByteSource for FileSource {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::io::{Read, Seek, SeekFrom};
        let mut guard = self.file.lock().expect("byte source mutex poisoned");
        guard.seek(SeekFrom::Start(offset))?;
        guard.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_reads_within_bounds() {
        let data = [1u8, 2, 3, 4, 5];
        let src = SliceSource::new(&data);
        let mut buf = [0u8; 3];
        src.read_exact_at(&mut buf, 1).unwrap();
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn slice_source_short_read_at_eof() {
        let data = [1u8, 2, 3];
        let src = SliceSource::new(&data);
        let mut buf = [0u8; 4];
        let n = src.read_at(&mut buf, 1).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn slice_source_past_end_is_empty() {
        let data = [1u8, 2, 3];
        let src = SliceSource::new(&data);
        let mut buf = [0u8; 4];
        let n = src.read_at(&mut buf, 10).unwrap();
        assert_eq!(n, 0);
    }
}
