// src/runtime.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Blocking bridge onto a single global multi-thread Tokio runtime.
//!
//! The storage adapter contract is synchronous: every network call blocks the
//! calling OS thread until it completes or times out. The HTTP stack itself is
//! async, so each call is spawned on this runtime and awaited from the caller.

use std::sync::mpsc;
use std::thread;
use tokio::runtime::{Builder as TokioBuilder, Handle};
use tokio::sync::oneshot;
use tracing::debug;

use crate::constants::ENV_RT_THREADS;
use crate::error::{RemoteIoError, Result};

static RT_HANDLE: once_cell::sync::OnceCell<Handle> = once_cell::sync::OnceCell::new();

// Create (once) a background runtime thread and return its Handle.
fn global_rt_handle() -> Result<&'static Handle> {
    RT_HANDLE.get_or_try_init(|| {
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("remote-vfd-rt".to_string())
            .spawn(move || {
                let threads = get_runtime_threads();
                debug!("Creating Tokio runtime with {} worker threads", threads);

                let rt = match TokioBuilder::new_multi_thread()
                    .enable_io()
                    .enable_time()
                    .worker_threads(threads)
                    .thread_name("remote-vfd-rt-worker")
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = tx.send(Err(e.to_string()));
                        return;
                    }
                };

                // Hand a Handle back to the creator, then park the runtime forever.
                let _ = tx.send(Ok(rt.handle().clone()));
                rt.block_on(std::future::pending::<()>());
            })
            .map_err(|e| RemoteIoError::Runtime(format!("failed to spawn runtime thread: {e}")))?;

        rx.recv()
            .map_err(|_| RemoteIoError::Runtime("runtime thread exited during startup".into()))?
            .map_err(|e| RemoteIoError::Runtime(format!("failed to build runtime: {e}")))
    })
}

/// Worker count, overridable through `REMOTE_VFD_RT_THREADS`.
fn get_runtime_threads() -> usize {
    std::env::var(ENV_RT_THREADS)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or_else(|| num_cpus::get().clamp(2, 16))
}

/// Run `fut` on the global runtime and block the current thread until it
/// completes. Works from plain threads and from inside another runtime.
pub fn run_on_global_rt<F, T>(fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = global_rt_handle()?.clone();

    match Handle::try_current() {
        Ok(_) => {
            // blocking_recv panics inside a runtime; a std channel does not.
            let (tx, rx) = mpsc::channel();
            handle.spawn(async move {
                let _ = tx.send(fut.await);
            });
            rx.recv()
                .map_err(|_| RemoteIoError::Runtime("task dropped before completing".into()))?
        }
        Err(_) => {
            let (tx, rx) = oneshot::channel();
            handle.spawn(async move {
                let _ = tx.send(fut.await);
            });
            rx.blocking_recv()
                .map_err(|_| RemoteIoError::Runtime("task dropped before completing".into()))?
        }
    }
}
