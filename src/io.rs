//! Positioned file I/O.
//!
//! Grounded on `original_source/Sakha/os_posix.c`: `open()` retries on
//! `EINTR`, a short read is zero-padded and reported distinctly from a hard
//! read error, and a write that cannot make full progress is reported as
//! "device full" rather than a generic I/O error.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::IoError;

/// Mirrors the `SAKHADB_OPEN_*` flags from `sakhadb.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u8);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(1);
    pub const WRITE: OpenFlags = OpenFlags(2);
    pub const CREATE: OpenFlags = OpenFlags(4);
    pub const EXCLUSIVE: OpenFlags = OpenFlags(8);

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// A single open file, addressed by absolute byte offset rather than a
/// shared cursor — every `read`/`write` call seeks first, matching the
/// `pread`/`pwrite`-style contract of the original implementation.
pub struct FileIo {
    file: File,
    filename: PathBuf,
}

impl FileIo {
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self, IoError> {
        let path = path.as_ref();
        info!("opening file {path:?}");

        let mut opts = OpenOptions::new();
        opts.read(true);
        opts.write(flags.contains(OpenFlags::WRITE));
        opts.create(flags.contains(OpenFlags::CREATE) && flags.contains(OpenFlags::WRITE));
        opts.create_new(flags.contains(OpenFlags::EXCLUSIVE) && flags.contains(OpenFlags::CREATE));

        let file = robust_open(&opts, path)?;
        Ok(FileIo {
            file,
            filename: path.to_path_buf(),
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Reads exactly `buf.len()` bytes starting at `offset`. A short read —
    /// the file ends before `buf` is filled — zero-pads the remainder and
    /// returns `Ok(false)`; a full read returns `Ok(true)`.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<bool, IoError> {
        info!(
            "read {} bytes from {:?} at {offset}",
            buf.len(),
            self.filename
        );
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(IoError::Read)?;

        let mut got = 0;
        loop {
            match self.file.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoError::Read(e)),
            }
            if got == buf.len() {
                break;
            }
        }

        if got < buf.len() {
            warn!(
                "short read on {:?}: expected {} got {got}",
                self.filename,
                buf.len()
            );
            buf[got..].fill(0);
            return Ok(false);
        }
        Ok(true)
    }

    /// Writes `buf` at `offset`, retrying on partial writes. Returns
    /// [`IoError::Full`] if a write stops making progress without an
    /// underlying OS error (the original's "disk full" signal).
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<(), IoError> {
        info!(
            "write {} bytes to {:?} at {offset}",
            buf.len(),
            self.filename
        );
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(IoError::Write)?;

        let mut written = 0;
        while written < buf.len() {
            match self.file.write(&buf[written..]) {
                Ok(0) => return Err(IoError::Full),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(IoError::Write(e)),
            }
        }
        Ok(())
    }

    pub fn size(&self) -> Result<u64, IoError> {
        self.file.metadata().map(|m| m.len()).map_err(IoError::Fstat)
    }

    pub fn sync(&mut self) -> Result<(), IoError> {
        self.file.sync_all().map_err(IoError::Write)
    }
}

fn robust_open(opts: &OpenOptions, path: &Path) -> Result<File, IoError> {
    loop {
        match opts.open(path) {
            Ok(f) => return Ok(f),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return Err(IoError::CantOpen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn scratch() -> (TempDir, PathBuf) {
        let dir = TempDir::new("sakhadb-io").unwrap();
        let path = dir.path().join("data.db");
        (dir, path)
    }

    #[test]
    fn write_then_read_back() {
        let (_dir, path) = scratch();
        let flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE;
        let mut f = FileIo::open(&path, flags).unwrap();
        f.write_at(b"hello world", 0).unwrap();

        let mut buf = [0u8; 11];
        let full = f.read_at(&mut buf, 0).unwrap();
        assert!(full);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn read_past_end_is_short_and_zero_padded() {
        let (_dir, path) = scratch();
        let flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE;
        let mut f = FileIo::open(&path, flags).unwrap();
        f.write_at(b"ab", 0).unwrap();

        let mut buf = [0xffu8; 8];
        let full = f.read_at(&mut buf, 0).unwrap();
        assert!(!full);
        assert_eq!(&buf[..2], b"ab");
        assert_eq!(&buf[2..], &[0u8; 6]);
    }

    #[test]
    fn size_reflects_writes() {
        let (_dir, path) = scratch();
        let flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE;
        let mut f = FileIo::open(&path, flags).unwrap();
        assert_eq!(f.size().unwrap(), 0);
        f.write_at(b"0123456789", 4).unwrap();
        assert_eq!(f.size().unwrap(), 14);
    }

    #[test]
    fn open_without_create_fails_on_missing_file() {
        let (_dir, path) = scratch();
        let err = FileIo::open(&path, OpenFlags::READ).unwrap_err();
        assert!(matches!(err, IoError::CantOpen));
    }
}
