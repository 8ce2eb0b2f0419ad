// src/block_cache.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Fixed-capacity LRU cache of fixed-size blocks for one remote object.
//!
//! Arbitrary `(offset, length)` reads are mapped onto block indices
//! `offset / block_size`. Blocks hold exactly `block_size` bytes except the
//! last one of the object, and are never modified once stored.
//!
//! The cache does no locking of its own; `FileHandle` serializes access.

use bytes::{Bytes, BytesMut};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

use crate::error::{RemoteIoError, Result};
use crate::range_source::RangeSource;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub fetches: u64,
}

pub struct BlockCache {
    block_size: u64,
    max_blocks: NonZeroUsize,
    blocks: LruCache<u64, Bytes>,
    stats: BlockCacheStats,
}

impl BlockCache {
    pub fn new(block_size: usize, max_blocks: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(RemoteIoError::InvalidConfig("block_size must be > 0".into()));
        }
        let max_blocks = NonZeroUsize::new(max_blocks)
            .ok_or_else(|| RemoteIoError::InvalidConfig("max_blocks must be > 0".into()))?;
        Ok(Self {
            block_size: block_size as u64,
            max_blocks,
            blocks: LruCache::new(max_blocks),
            stats: BlockCacheStats::default(),
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn max_blocks(&self) -> usize {
        self.max_blocks.get()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Residency check that does not touch recency.
    pub fn contains(&self, block_index: u64) -> bool {
        self.blocks.contains(&block_index)
    }

    pub fn stats(&self) -> BlockCacheStats {
        self.stats
    }

    /// Inclusive block range covering `[offset, offset + length)`; `length > 0`.
    /// `None` when the range does not fit in `u64`.
    fn span(&self, offset: u64, length: u64) -> Option<(u64, u64)> {
        let last_byte = offset.checked_add(length - 1)?;
        Some((offset / self.block_size, last_byte / self.block_size))
    }

    /// Serve `[offset, offset + length)` entirely from resident blocks.
    ///
    /// All-or-nothing: if any block of the span is absent nothing is copied
    /// and recency is left untouched. On a hit every block is moved to MRU.
    pub fn try_read(&mut self, offset: u64, length: u64) -> Option<Bytes> {
        if length == 0 {
            return Some(Bytes::new());
        }
        let Some((first, last)) = self.span(offset, length) else {
            self.stats.misses += 1;
            return None;
        };
        if !(first..=last).all(|idx| self.blocks.contains(&idx)) {
            self.stats.misses += 1;
            trace!("block cache miss {}+{} (blocks {}..={})", offset, length, first, last);
            return None;
        }

        let end = offset.saturating_add(length);
        let bs = self.block_size;
        let mut out = if first == last { None } else { Some(BytesMut::with_capacity(length as usize)) };

        for idx in first..=last {
            let block = self.blocks.get(&idx)?;
            let block_start = idx * bs;
            let from = (offset.max(block_start) - block_start) as usize;
            let to = (end.min(block_start.saturating_add(bs)) - block_start) as usize;
            if to > block.len() {
                // shorter than the span needs: the read runs past the object
                return None;
            }
            match out.as_mut() {
                Some(buf) => buf.extend_from_slice(&block[from..to]),
                None => {
                    self.stats.hits += 1;
                    return Some(block.slice(from..to));
                }
            }
        }

        self.stats.hits += 1;
        trace!("block cache hit {}+{}", offset, length);
        out.map(BytesMut::freeze)
    }

    /// Absent blocks of the span as `(block_start, block_len)`, clipped so the
    /// final block of the object is `total_size - block_start` long.
    pub fn missing_ranges(&self, offset: u64, length: u64, total_size: u64) -> Vec<(u64, u64)> {
        if length == 0 {
            return Vec::new();
        }
        let Some((first, last)) = self.span(offset, length) else {
            return Vec::new();
        };
        (first..=last)
            .filter(|idx| !self.blocks.contains(idx))
            .map(|idx| {
                let start = idx * self.block_size;
                (start, self.block_size.min(total_size.saturating_sub(start)))
            })
            .filter(|&(_, len)| len > 0)
            .collect()
    }

    /// Insert or replace one block, evicting the LRU block when full.
    pub fn store_block(&mut self, block_index: u64, data: Bytes) {
        if let Some((evicted, _)) = self.blocks.push(block_index, data) {
            if evicted != block_index {
                self.stats.evictions += 1;
                debug!("block cache evicted block {}", evicted);
            }
        }
    }

    fn promote_span(&mut self, offset: u64, length: u64) {
        let Some((first, last)) = self.span(offset, length) else {
            return;
        };
        for idx in first..=last {
            self.blocks.promote(&idx);
        }
    }

    /// Read through the cache, fetching absent blocks from `source`.
    ///
    /// Blocks fetched before a failing sub-fetch stay cached; they are valid
    /// and immutable, so a retried read starts from there.
    pub fn read(
        &mut self,
        offset: u64,
        length: u64,
        total_size: u64,
        source: &dyn RangeSource,
    ) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        if offset.checked_add(length).map_or(true, |end| end > total_size) {
            return Err(RemoteIoError::ReadOutOfBounds { offset, length, total_size });
        }
        if let Some(hit) = self.try_read(offset, length) {
            return Ok(hit);
        }

        let Some((first, last)) = self.span(offset, length) else {
            return Err(RemoteIoError::ReadOutOfBounds { offset, length, total_size });
        };
        let window_blocks = self.max_blocks.get() as u64;
        if last - first < window_blocks {
            return self.read_window(offset, length, total_size, source);
        }

        // The span is larger than the cache can hold at once; serve it in
        // windows so each window's blocks are still resident when copied.
        let end = offset + length;
        let mut out = BytesMut::with_capacity(length as usize);
        let mut pos = offset;
        while pos < end {
            let window_end = ((pos / self.block_size + window_blocks) * self.block_size).min(end);
            let chunk = self.read_window(pos, window_end - pos, total_size, source)?;
            out.extend_from_slice(&chunk);
            pos = window_end;
        }
        Ok(out.freeze())
    }

    fn read_window(
        &mut self,
        offset: u64,
        length: u64,
        total_size: u64,
        source: &dyn RangeSource,
    ) -> Result<Bytes> {
        if let Some(hit) = self.try_read(offset, length) {
            return Ok(hit);
        }

        // Resident blocks of this window become MRU so storing the missing
        // ones evicts only blocks outside the window.
        self.promote_span(offset, length);

        for (block_start, block_len) in self.missing_ranges(offset, length, total_size) {
            let data = source.fetch_range(block_start, block_len)?;
            if data.len() as u64 != block_len {
                return Err(RemoteIoError::RangeFetch {
                    url: source.describe(),
                    offset: block_start,
                    length: block_len,
                    status: None,
                    message: format!("source returned {} bytes", data.len()),
                });
            }
            self.stats.fetches += 1;
            self.store_block(block_start / self.block_size, data);
        }

        self.try_read(offset, length).ok_or_else(|| {
            let first = offset / self.block_size;
            let block_index = self
                .span(offset, length)
                .and_then(|(first, last)| (first..=last).find(|idx| !self.blocks.contains(idx)))
                .unwrap_or(first);
            RemoteIoError::CacheConsistency { block_index }
        })
    }
}
