// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy shared by every layer below the storage adapter.

use thiserror::Error;

use crate::uri_utils::Scheme;
use crate::vfd::OpenMode;

pub type Result<T> = std::result::Result<T, RemoteIoError>;

#[derive(Error, Debug)]
pub enum RemoteIoError {
    /// Signing was requested for a scheme that cannot be signed (e.g. `gs://`).
    #[error("{scheme:?} does not support authenticated access: {reason}")]
    SchemeUnsupported { scheme: Scheme, reason: String },

    #[error("metadata probe failed for {url}{}: {message}", status_suffix(.status))]
    MetadataProbe {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("range fetch {offset}+{length} failed for {url}{}: {message}", status_suffix(.status))]
    RangeFetch {
        url: String,
        offset: u64,
        length: u64,
        status: Option<u16>,
        message: String,
    },

    #[error("signing configuration error: {0}")]
    SigningConfig(String),

    #[error("unsupported open mode {0:?}: backend is read-only")]
    UnsupportedMode(OpenMode),

    /// A block reported resident vanished before it was copied. Unreachable
    /// while a handle is driven by one reader at a time.
    #[error("block cache inconsistency at block {block_index}")]
    CacheConsistency { block_index: u64 },

    #[error("read {offset}+{length} is past end of object ({total_size} bytes)")]
    ReadOutOfBounds {
        offset: u64,
        length: u64,
        total_size: u64,
    },

    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("global runtime task crashed: {0}")]
    Runtime(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl RemoteIoError {
    /// HTTP status observed when the error was produced, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RemoteIoError::MetadataProbe { status, .. } => *status,
            RemoteIoError::RangeFetch { status, .. } => *status,
            _ => None,
        }
    }
}

/// User-facing explanation for an HTTP failure status.
pub fn http_error_message(status: u16, url: &str) -> String {
    match status {
        400 => format!("Bad request for {url}. Check the URL and region"),
        401 | 403 => format!(
            "Access denied to {url} (HTTP {status}). Check credentials, region and bucket policy"
        ),
        404 => format!("Object not found: {url}"),
        416 => format!("Requested byte range is not satisfiable for {url}"),
        429 | 503 => format!("Server throttled the request to {url} (HTTP {status}); try again later"),
        500..=599 => format!("Server error (HTTP {status}) while reading {url}"),
        _ => format!("HTTP error {status} while reading {url}"),
    }
}
