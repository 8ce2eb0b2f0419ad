// src/range_source.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! The seam between caches and transports: one metadata probe, then any
//! number of byte-range fetches.

use bytes::Bytes;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{RemoteIoError, Result};

/// What the metadata probe learned about an object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub total_size: Option<u64>,
    pub supports_range: bool,
}

impl ObjectMeta {
    /// Record a size unless one was already captured; later answers (e.g. the
    /// `Content-Length` of a ranged GET) describe a chunk, not the object.
    pub fn set_size_once(&mut self, size: u64) {
        if self.total_size.is_none() {
            self.total_size = Some(size);
        }
    }
}

/// Synchronous byte-range reader for one object.
///
/// Implementations block the calling thread for at most the configured
/// timeout per call and never retry.
pub trait RangeSource: Send + Sync {
    fn probe_metadata(&self) -> Result<ObjectMeta>;

    /// Exactly `length` bytes starting at `offset`, or an error.
    fn fetch_range(&self, offset: u64, length: u64) -> Result<Bytes>;

    /// Human readable location, for logs and errors.
    fn describe(&self) -> String;
}

/// Positional reads against a local file.
pub struct LocalFileSource {
    path: PathBuf,
    file: Mutex<File>,
}

impl LocalFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        if !file.metadata()?.is_file() {
            return Err(RemoteIoError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl RangeSource for LocalFileSource {
    fn probe_metadata(&self) -> Result<ObjectMeta> {
        let file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        Ok(ObjectMeta {
            total_size: Some(file.metadata()?.len()),
            supports_range: true,
        })
    }

    fn fetch_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        use std::io::{Read, Seek, SeekFrom};

        let mut buf = vec![0u8; length as usize];
        let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
