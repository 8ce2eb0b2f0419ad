// src/vfd.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Read-only storage adapter for an embedded file-format library.
//!
//! This is the one place where [`RemoteIoError`] is translated into the
//! status-code convention of a callback table: every failure becomes a
//! [`VfdError`] with a negative status, and the last HTTP status/message is
//! remembered for callers that can only see the status code.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::config::RemoteConfig;
use crate::error::RemoteIoError;
use crate::file_handle::FileHandle;
use crate::handle_cache::FileHandleCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    Create,
    Truncate,
}

impl OpenMode {
    pub fn is_read_only(self) -> bool {
        self == OpenMode::ReadOnly
    }
}

/// Failure category carried across the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfdErrorKind {
    SchemeUnsupported,
    MetadataProbe,
    RangeFetch,
    SigningConfig,
    UnsupportedMode,
    CacheConsistency,
    OutOfBounds,
    InvalidArgument,
    Io,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfdError {
    kind: VfdErrorKind,
    http_status: Option<u16>,
    message: String,
}

impl VfdError {
    fn new(kind: VfdErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> VfdErrorKind {
        self.kind
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status code for a C-style callback table; always negative.
    pub fn as_status(&self) -> i32 {
        -1
    }
}

impl fmt::Display for VfdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for VfdError {}

impl From<RemoteIoError> for VfdError {
    fn from(e: RemoteIoError) -> Self {
        let kind = match &e {
            RemoteIoError::SchemeUnsupported { .. } => VfdErrorKind::SchemeUnsupported,
            RemoteIoError::MetadataProbe { .. } => VfdErrorKind::MetadataProbe,
            RemoteIoError::RangeFetch { .. } => VfdErrorKind::RangeFetch,
            RemoteIoError::SigningConfig(_) => VfdErrorKind::SigningConfig,
            RemoteIoError::UnsupportedMode(_) => VfdErrorKind::UnsupportedMode,
            RemoteIoError::CacheConsistency { .. } => VfdErrorKind::CacheConsistency,
            RemoteIoError::ReadOutOfBounds { .. } => VfdErrorKind::OutOfBounds,
            RemoteIoError::InvalidUrl(_) | RemoteIoError::InvalidConfig(_) => {
                VfdErrorKind::InvalidArgument
            }
            RemoteIoError::Io(_) => VfdErrorKind::Io,
            RemoteIoError::Runtime(_) => VfdErrorKind::Internal,
        };
        Self {
            kind,
            http_status: e.http_status(),
            message: e.to_string(),
        }
    }
}

/// An open file as seen by the embedded library.
#[derive(Debug)]
pub struct VfdFile {
    handle: Arc<FileHandle>,
    eoa: u64,
}

impl VfdFile {
    pub fn handle(&self) -> &Arc<FileHandle> {
        &self.handle
    }
}

#[derive(Debug, Default)]
struct LastError {
    http_status: Option<u16>,
    message: Option<String>,
}

/// Open/close/read/size callbacks over a shared [`FileHandleCache`].
pub struct RemoteVfd {
    cache: Arc<FileHandleCache>,
    config: RemoteConfig,
    last_error: Mutex<LastError>,
}

impl RemoteVfd {
    pub fn new(cache: Arc<FileHandleCache>, config: RemoteConfig) -> Self {
        Self {
            cache,
            config,
            last_error: Mutex::new(LastError::default()),
        }
    }

    /// Adapter configured entirely from the environment (and `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(FileHandleCache::from_env()?),
            RemoteConfig::from_env()?,
        ))
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FileHandleCache> {
        &self.cache
    }

    fn record(&self, e: RemoteIoError) -> VfdError {
        let err = VfdError::from(e);
        let mut last = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        if err.http_status.is_some() {
            last.http_status = err.http_status;
        }
        last.message = Some(err.message.clone());
        err
    }

    pub fn open(&self, name: &str, mode: OpenMode) -> Result<VfdFile, VfdError> {
        if !mode.is_read_only() {
            warn!("refusing {:?} open of {}", mode, name);
            return Err(self.record(RemoteIoError::UnsupportedMode(mode)));
        }
        match self.cache.open(name, &self.config) {
            Ok(handle) => Ok(VfdFile { handle, eoa: 0 }),
            Err(e) => {
                error!("open {} failed: {}", name, e);
                Err(self.record(e))
            }
        }
    }

    /// Drops this file's reference; the handle may stay alive in the
    /// keep-alive ring or with other openers.
    pub fn close(&self, file: VfdFile) -> Result<(), VfdError> {
        drop(file);
        Ok(())
    }

    pub fn get_eof(&self, file: &VfdFile) -> u64 {
        file.handle.total_size()
    }

    pub fn get_eoa(&self, file: &VfdFile) -> u64 {
        file.eoa
    }

    pub fn set_eoa(&self, file: &mut VfdFile, addr: u64) -> Result<(), VfdError> {
        file.eoa = addr;
        Ok(())
    }

    /// Fill all of `buf` (which must be `size` bytes) from `addr`.
    pub fn read(&self, file: &VfdFile, addr: u64, size: usize, buf: &mut [u8]) -> Result<(), VfdError> {
        if buf.len() != size {
            let err = VfdError::new(
                VfdErrorKind::InvalidArgument,
                format!("buffer of {} bytes for a {} byte read", buf.len(), size),
            );
            self.last_error.lock().unwrap_or_else(|p| p.into_inner()).message = Some(err.message.clone());
            return Err(err);
        }
        file.handle.read_into(addr, buf).map_err(|e| {
            error!("read {}+{} of {} failed: {}", addr, size, file.handle.path(), e);
            self.record(e)
        })
    }

    pub fn write(&self, file: &mut VfdFile, addr: u64, buf: &[u8]) -> Result<(), VfdError> {
        warn!("write of {} bytes at {} to read-only {}", buf.len(), addr, file.handle.path());
        Err(self.record(RemoteIoError::UnsupportedMode(OpenMode::ReadWrite)))
    }

    /// Status of the most recent failed HTTP exchange.
    pub fn last_http_status(&self) -> Option<u16> {
        self.last_error.lock().unwrap_or_else(|p| p.into_inner()).http_status
    }

    pub fn last_error_message(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|p| p.into_inner()).message.clone()
    }

    pub fn clear_last_error(&self) {
        *self.last_error.lock().unwrap_or_else(|p| p.into_inner()) = LastError::default();
    }
}
