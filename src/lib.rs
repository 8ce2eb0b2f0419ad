// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: module declarations plus public re-exports.
//
// Read-only remote backend for an embedded file-format library: S3, GCS and
// HTTP(S) objects (plus local files) behind an open/close/read/size contract,
// served through a per-object LRU block cache.

// ===== Adapter boundary =====
pub mod vfd;

// ===== Caches =====
pub mod block_cache;
pub mod file_handle;
pub mod handle_cache;

// ===== Transport =====
pub mod http;
pub mod range_source;
pub mod runtime;
pub mod sigv4;

// ===== Addressing and configuration =====
pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod uri_utils;

pub use block_cache::{BlockCache, BlockCacheStats};
pub use config::RemoteConfig;
pub use endpoint::{RemoteEndpoint, Tunables};
pub use error::{http_error_message, RemoteIoError, Result};
pub use file_handle::FileHandle;
pub use handle_cache::{default_source_factory, FileHandleCache, SourceFactory};
pub use http::{HttpClientConfig, HttpRangeClient};
pub use range_source::{LocalFileSource, ObjectMeta, RangeSource};
pub use sigv4::S3Credentials;
pub use uri_utils::{infer_scheme, Scheme};
pub use vfd::{OpenMode, RemoteVfd, VfdError, VfdErrorKind, VfdFile};
