//! Random-access byte sources backing volume decoding.
//!
//! Three realizations are provided: a copy-on-write memory mapping
//! (preferred — fixup patching never dirties the backing file), a seekable
//! file handle, and an owned in-memory buffer for already-materialized
//! sub-blocks (private file-record/INDX copies).

use crate::error::{NtfsError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Capability to read byte ranges from a volume.
///
/// A short read at EOF is not an error: `read` returns as many bytes as are
/// available, and a read starting past the end of the source returns an
/// empty vector.
pub trait ByteSource {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
    fn size(&self) -> u64;
}

/// Copy-on-write memory-mapped volume image.
pub struct MmapSource {
    mmap: Mmap,
    size: u64,
}

impl MmapSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        // SAFETY: the file is not expected to be modified while mapped; this
        // parser never writes through the mapping (fixup always patches a
        // private copy, see `fixup::apply_fixup`).
        let mmap = unsafe { Mmap::map(&file) }?;

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        Ok(Self { mmap, size })
    }

    fn slice(&self, offset: u64, len: u64) -> &[u8] {
        let start = (offset as usize).min(self.mmap.len());
        let end = start.saturating_add(len as usize).min(self.mmap.len());
        &self.mmap[start..end]
    }
}

impl ByteSource for MmapSource {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        Ok(self.slice(offset, length).to_vec())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Seekable-file-handle backed source, for platforms or devices where
/// memory-mapping is unavailable.
pub struct FileSource {
    file: std::sync::Mutex<File>,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: std::sync::Mutex::new(file),
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut file = self.file.lock().expect("file source mutex poisoned");
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        let mut read_so_far = 0;
        loop {
            match file.read(&mut buf[read_so_far..]) {
                Ok(0) => break,
                Ok(n) => read_so_far += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NtfsError::Io(e)),
            }
        }
        buf.truncate(read_so_far);
        Ok(buf)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Owned in-memory buffer, used for already-materialized sub-blocks (a
/// private fixed-up file-record or INDX copy).
pub struct BufferSource {
    data: Vec<u8>,
}

impl BufferSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for BufferSource {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(length as usize).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mmap_source_reads_bytes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        f.flush().unwrap();

        let src = MmapSource::open(f.path()).unwrap();
        assert_eq!(src.size(), 11);
        assert_eq!(src.read(0, 5).unwrap(), b"hello");
        assert_eq!(src.read(6, 5).unwrap(), b"world");
    }

    #[test]
    fn mmap_source_short_read_at_eof() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"short").unwrap();
        f.flush().unwrap();

        let src = MmapSource::open(f.path()).unwrap();
        assert_eq!(src.read(0, 100).unwrap(), b"short");
        assert_eq!(src.read(100, 10).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn file_source_reads_bytes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        f.flush().unwrap();

        let src = FileSource::open(f.path()).unwrap();
        assert_eq!(src.read(6, 5).unwrap(), b"world");
    }

    #[test]
    fn buffer_source_reads_bytes() {
        let src = BufferSource::new(b"abcdef".to_vec());
        assert_eq!(src.read(2, 3).unwrap(), b"cde");
        assert_eq!(src.read(10, 3).unwrap(), Vec::<u8>::new());
    }
}
