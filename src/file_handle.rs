// src/file_handle.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// One opened object: resolved endpoint, probed size, and (for remote
// objects) the block cache every read goes through.

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::block_cache::{BlockCache, BlockCacheStats};
use crate::endpoint::RemoteEndpoint;
use crate::error::{RemoteIoError, Result};
use crate::range_source::RangeSource;
use crate::uri_utils::Scheme;

/// Shared, read-only view of one object.
///
/// Remote handles own a [`BlockCache`] behind a mutex, so concurrent reads
/// of the same handle are serialized. Local handles read the file directly.
pub struct FileHandle {
    endpoint: RemoteEndpoint,
    source: Arc<dyn RangeSource>,
    total_size: u64,
    supports_range: bool,
    cache: Option<Mutex<BlockCache>>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.endpoint.path())
            .field("scheme", &self.endpoint.scheme())
            .field("total_size", &self.total_size)
            .field("supports_range", &self.supports_range)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl FileHandle {
    /// Probe the object and, for remote schemes, warm the cache with the
    /// first `prefetch_size` bytes. A failed prefetch fails the open.
    pub fn open(endpoint: RemoteEndpoint, source: Arc<dyn RangeSource>) -> Result<Self> {
        let meta = source.probe_metadata()?;
        let total_size = meta.total_size.ok_or_else(|| RemoteIoError::MetadataProbe {
            url: source.describe(),
            status: None,
            message: "object size is unknown".into(),
        })?;

        let cache = if endpoint.scheme() == Scheme::Local {
            None
        } else {
            let t = endpoint.tunables();
            Some(Mutex::new(BlockCache::new(t.block_size, t.max_blocks)?))
        };

        let handle = Self {
            endpoint,
            source,
            total_size,
            supports_range: meta.supports_range,
            cache,
        };
        info!(
            "opened {} ({} bytes, range support: {})",
            handle.endpoint.path(),
            total_size,
            meta.supports_range
        );
        handle.prefetch()?;
        Ok(handle)
    }

    fn prefetch(&self) -> Result<()> {
        let Some(cache) = self.cache.as_ref() else {
            return Ok(());
        };
        let t = self.endpoint.tunables();
        let capacity = (t.block_size as u64).saturating_mul(t.max_blocks as u64);
        let len = (t.prefetch_size as u64).min(self.total_size).min(capacity);
        if len == 0 {
            return Ok(());
        }
        debug!("prefetching {} bytes of {}", len, self.endpoint.path());
        let mut cache = cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.read(0, len, self.total_size, self.source.as_ref())?;
        Ok(())
    }

    pub fn path(&self) -> &str {
        self.endpoint.path()
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Object size captured by the open-time probe; never re-probed.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn supports_range(&self) -> bool {
        self.supports_range
    }

    pub fn is_remote(&self) -> bool {
        self.cache.is_some()
    }

    pub fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        match self.cache.as_ref() {
            Some(cache) => {
                let mut cache = cache.lock().unwrap_or_else(|p| p.into_inner());
                cache.read(offset, length, self.total_size, self.source.as_ref())
            }
            None => {
                if length == 0 {
                    return Ok(Bytes::new());
                }
                if offset.checked_add(length).map_or(true, |end| end > self.total_size) {
                    return Err(RemoteIoError::ReadOutOfBounds {
                        offset,
                        length,
                        total_size: self.total_size,
                    });
                }
                self.source.fetch_range(offset, length)
            }
        }
    }

    /// Fill `buf` from `offset`.
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.read(offset, buf.len() as u64)?;
        buf.copy_from_slice(&data);
        Ok(())
    }

    pub fn cache_stats(&self) -> Option<BlockCacheStats> {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|p| p.into_inner()).stats())
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache
            .as_ref()
            .map_or(0, |c| c.lock().unwrap_or_else(|p| p.into_inner()).len())
    }
}
