// src/constants.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Centralized defaults for remote byte-range I/O, so tunables are not
// hardcoded throughout the crate.

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Bytes read from offset 0 right after a remote handle is created (16 MiB).
/// Structural readers hit the superblock and root metadata first, so warming
/// this window absorbs their initial burst of tiny reads.
pub const DEFAULT_PREFETCH_SIZE: usize = 16 * 1024 * 1024;

/// Size of one cache block (1 MiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Blocks retained per handle (64 × 1 MiB = 64 MiB per handle).
pub const DEFAULT_MAX_BLOCKS: usize = 64;

/// Per-request network timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Strong references the handle cache keeps alive between independent opens.
pub const DEFAULT_KEEP_ALIVE: usize = 8;

/// Hex SHA-256 of the empty payload. Every request we sign is a body-less GET/HEAD.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Host used for anonymous `gs://` access.
pub const GCS_PUBLIC_HOST: &str = "storage.googleapis.com";

// ============================================================================
// Environment variables
// ============================================================================

pub const ENV_PREFETCH_SIZE: &str = "REMOTE_VFD_PREFETCH_SIZE";
pub const ENV_BLOCK_SIZE: &str = "REMOTE_VFD_BLOCK_SIZE";
pub const ENV_MAX_BLOCKS: &str = "REMOTE_VFD_MAX_BLOCKS";
pub const ENV_TIMEOUT_SECS: &str = "REMOTE_VFD_TIMEOUT_SECS";
pub const ENV_KEEP_ALIVE: &str = "REMOTE_VFD_KEEP_ALIVE";

/// Overrides the worker thread count of the global runtime.
pub const ENV_RT_THREADS: &str = "REMOTE_VFD_RT_THREADS";
