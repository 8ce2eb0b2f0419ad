// src/handle_cache.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Process-wide map from path to shared file handle.
//
// Repeated opens of the same path return the same handle (and therefore the
// same block cache) for as long as any caller or the keep-alive ring still
// holds it. The map itself only keeps weak references.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

use crate::config::{keep_alive_from_env, RemoteConfig};
use crate::constants::DEFAULT_KEEP_ALIVE;
use crate::endpoint::RemoteEndpoint;
use crate::error::Result;
use crate::file_handle::FileHandle;
use crate::http::HttpRangeClient;
use crate::range_source::{LocalFileSource, RangeSource};
use crate::uri_utils::Scheme;

/// Builds the transport for a resolved endpoint.
pub type SourceFactory =
    Arc<dyn Fn(&RemoteEndpoint) -> Result<Arc<dyn RangeSource>> + Send + Sync>;

/// Local files go through [`LocalFileSource`], everything else over HTTP(S).
pub fn default_source_factory() -> SourceFactory {
    Arc::new(|endpoint: &RemoteEndpoint| -> Result<Arc<dyn RangeSource>> {
        match endpoint.scheme() {
            Scheme::Local => {
                let path = endpoint.path();
                let path = path.strip_prefix("file://").unwrap_or(path);
                Ok(Arc::new(LocalFileSource::open(path)?))
            }
            _ => Ok(Arc::new(HttpRangeClient::for_endpoint(endpoint)?)),
        }
    })
}

#[derive(Default)]
struct CacheState {
    handles: HashMap<String, Weak<FileHandle>>,
    /// Most recently opened first.
    keep_alive: VecDeque<Arc<FileHandle>>,
}

/// Shared handle cache.
///
/// ```no_run
/// use remote_vfd::{FileHandleCache, RemoteConfig};
///
/// # fn example() -> remote_vfd::Result<()> {
/// let cache = FileHandleCache::new();
/// let cfg = RemoteConfig::default().with_region("us-west-2");
/// let a = cache.open("s3://bucket/data.h5", &cfg)?;
/// let b = cache.open("s3://bucket/data.h5", &cfg)?;
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// # Ok(())
/// # }
/// ```
pub struct FileHandleCache {
    state: Mutex<CacheState>,
    keep_alive: usize,
    factory: SourceFactory,
}

impl Default for FileHandleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandleCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            keep_alive: DEFAULT_KEEP_ALIVE,
            factory: default_source_factory(),
        }
    }

    /// Cache with the keep-alive capacity from `REMOTE_VFD_KEEP_ALIVE`.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new().with_keep_alive(keep_alive_from_env()?))
    }

    /// Number of recently opened handles kept alive after callers drop them.
    pub fn with_keep_alive(mut self, keep_alive: usize) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_source_factory(mut self, factory: SourceFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Return the live handle for `path`, or resolve, probe and prefetch a
    /// new one.
    ///
    /// The cache key is the path alone: a second open with different
    /// credentials gets the existing handle. Call [`invalidate`] first to
    /// force a reconnect.
    ///
    /// The lock is held while a new handle is built, so concurrent opens of
    /// a path never create two handles.
    ///
    /// [`invalidate`]: FileHandleCache::invalidate
    pub fn open(&self, path: &str, config: &RemoteConfig) -> Result<Arc<FileHandle>> {
        let mut state = self.lock();

        if let Some(handle) = state.handles.get(path).and_then(Weak::upgrade) {
            debug!("handle cache hit for {}", path);
            Self::touch(&mut state.keep_alive, &handle);
            return Ok(handle);
        }

        let endpoint = RemoteEndpoint::resolve(path, config)?;
        let source = (self.factory)(&endpoint)?;
        let handle = Arc::new(FileHandle::open(endpoint, source)?);

        state.handles.retain(|_, weak| weak.strong_count() > 0);
        state.handles.insert(path.to_string(), Arc::downgrade(&handle));
        Self::touch(&mut state.keep_alive, &handle);
        while state.keep_alive.len() > self.keep_alive {
            if let Some(old) = state.keep_alive.pop_back() {
                debug!("keep-alive released {}", old.path());
            }
        }
        info!("handle cache opened {} ({} live)", path, state.handles.len());
        Ok(handle)
    }

    fn touch(keep_alive: &mut VecDeque<Arc<FileHandle>>, handle: &Arc<FileHandle>) {
        keep_alive.retain(|h| !Arc::ptr_eq(h, handle));
        keep_alive.push_front(Arc::clone(handle));
    }

    /// Forget `path` so the next open builds a fresh handle. Callers holding
    /// the old handle keep using it. Returns whether an entry was removed.
    pub fn invalidate(&self, path: &str) -> bool {
        let mut state = self.lock();
        state.keep_alive.retain(|h| h.path() != path);
        let removed = state.handles.remove(path).is_some();
        if removed {
            debug!("handle cache invalidated {}", path);
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.keep_alive.clear();
        state.handles.clear();
    }

    /// Entries whose handle is still referenced somewhere.
    pub fn live_handles(&self) -> usize {
        self.lock()
            .handles
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn keep_alive_len(&self) -> usize {
        self.lock().keep_alive.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
