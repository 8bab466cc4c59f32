//! Backing-store contract
//!
//! The cache populates chunks by reading from a `BlockSource`: the source of
//! truth for an object's bytes, typically a table file or a cloud object.
//! Any read error is treated as a fetch failure; the cache never interprets
//! error kinds.

use std::fs::File;
use std::io;
use std::path::Path;

/// A logical block the cache can fetch from.
///
/// Implementations must support concurrent positioned reads; the cache calls
/// `read` from multiple threads with no lock held.
pub trait BlockSource: Send + Sync {
    /// Object name; the first `OBJECT_NAME_MAX` bytes contribute to chunk
    /// identity.
    fn name(&self) -> &str;

    /// Total object size in bytes.
    fn size(&self) -> u64;

    /// Read exactly `dst.len()` bytes starting at `offset`.
    fn read(&self, offset: u64, dst: &mut [u8]) -> io::Result<()>;
}

/// File-backed block source.
pub struct FileBlock {
    name: String,
    file: File,
    size: u64,
}

impl FileBlock {
    /// Open `path` read-only and take its current length as the object size.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self { name, file, size })
    }

    /// Wrap an already-open file under an explicit object name.
    pub fn with_name(name: impl Into<String>, file: File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            name: name.into(),
            file,
            size,
        })
    }
}

impl BlockSource for FileBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    #[cfg(unix)]
    fn read(&self, offset: u64, dst: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(dst, offset)
    }

    #[cfg(windows)]
    fn read(&self, offset: u64, dst: &mut [u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut pos = offset;
        let mut buf = dst;
        while !buf.is_empty() {
            match self.file.seek_read(buf, pos)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "short read from backing file",
                    ))
                }
                n => {
                    pos += n as u64;
                    buf = &mut buf[n..];
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pattern_file(len: usize) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_file_block_open() {
        let f = pattern_file(4096);
        let block = FileBlock::open(f.path()).unwrap();
        assert_eq!(block.size(), 4096);
        assert!(!block.name().is_empty());
    }

    #[test]
    fn test_file_block_positioned_read() {
        let f = pattern_file(4096);
        let block = FileBlock::open(f.path()).unwrap();

        let mut buf = [0u8; 16];
        block.read(100, &mut buf).unwrap();
        for (i, b) in buf.iter().enumerate() {
            assert_eq!(*b, ((100 + i) % 251) as u8);
        }

        // Reads are stateless; an earlier read does not move a cursor.
        let mut buf2 = [0u8; 16];
        block.read(0, &mut buf2).unwrap();
        assert_eq!(buf2[0], 0);
        assert_eq!(buf2[15], 15);
    }

    #[test]
    fn test_file_block_read_past_end_fails() {
        let f = pattern_file(128);
        let block = FileBlock::open(f.path()).unwrap();

        let mut buf = [0u8; 64];
        assert!(block.read(100, &mut buf).is_err());
    }
}
