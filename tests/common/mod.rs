// tests/common/mod.rs
//
// Shared fixtures: a counting in-memory range source and a small axum
// object server with HEAD and Range support.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use remote_vfd::{ObjectMeta, RangeSource, RemoteIoError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

/// Deterministic object contents.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Range source over a byte vector that records every fetch.
pub struct MemorySource {
    data: Bytes,
    pub probes: AtomicUsize,
    pub fetches: Mutex<Vec<(u64, u64)>>,
    fail_fetches: Mutex<bool>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: Bytes::from(data),
            probes: AtomicUsize::new(0),
            fetches: Mutex::new(Vec::new()),
            fail_fetches: Mutex::new(false),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail_fetches.lock().unwrap() = failing;
    }
}

impl RangeSource for MemorySource {
    fn probe_metadata(&self) -> Result<ObjectMeta> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectMeta {
            total_size: Some(self.data.len() as u64),
            supports_range: true,
        })
    }

    fn fetch_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        if *self.fail_fetches.lock().unwrap() {
            return Err(RemoteIoError::RangeFetch {
                url: "memory".into(),
                offset,
                length,
                status: Some(503),
                message: "injected failure".into(),
            });
        }
        self.fetches.lock().unwrap().push((offset, length));
        let start = offset as usize;
        Ok(self.data.slice(start..start + length as usize))
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names lower-cased.
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Knobs a test can flip while the server runs.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Answer ranged GETs with `200` and the whole body.
    pub ignore_range: bool,
    /// Leave `Content-Length` off HEAD answers.
    pub head_without_length: bool,
    /// Status to return for every GET instead of serving data.
    pub get_status: Option<u16>,
    /// Reject HEAD and GET requests whose Authorization does not name this
    /// access key.
    pub required_access_key: Option<String>,
}

#[derive(Default)]
pub struct Counters {
    pub head: AtomicUsize,
    pub get_range: AtomicUsize,
    pub get_full: AtomicUsize,
}

/// Object served by [`RangeServer`]; large objects are generated on demand.
pub enum Object {
    Stored(Vec<u8>),
    Pattern(usize),
}

impl Object {
    fn len(&self) -> usize {
        match self {
            Object::Stored(v) => v.len(),
            Object::Pattern(n) => *n,
        }
    }

    fn slice(&self, start: usize, end: usize) -> Vec<u8> {
        match self {
            Object::Stored(v) => v[start..end].to_vec(),
            Object::Pattern(_) => (start..end).map(|i| (i % 251) as u8).collect(),
        }
    }
}

struct Shared {
    object: Object,
    counters: Arc<Counters>,
    behavior: Arc<Mutex<Behavior>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Serves one object at every path on an ephemeral localhost port. The
/// server lives on its own runtime so blocking tests can drive it.
pub struct RangeServer {
    pub base: String,
    pub counters: Arc<Counters>,
    pub behavior: Arc<Mutex<Behavior>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _rt: Runtime,
}

impl RangeServer {
    pub fn start(data: Vec<u8>) -> Self {
        Self::serve_object(Object::Stored(data))
    }

    /// Serve `len` bytes of [`pattern`] without materializing them.
    pub fn start_pattern(len: usize) -> Self {
        Self::serve_object(Object::Pattern(len))
    }

    fn serve_object(object: Object) -> Self {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let listener = rt.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let shared = Arc::new(Shared {
            object,
            counters: Arc::new(Counters::default()),
            behavior: Arc::new(Mutex::new(Behavior::default())),
            requests: Arc::new(Mutex::new(Vec::new())),
        });
        let app = Router::new().fallback(handle).with_state(shared.clone());
        rt.spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base,
            counters: shared.counters.clone(),
            behavior: shared.behavior.clone(),
            requests: shared.requests.clone(),
            _rt: rt,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn set(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut self.behavior.lock().unwrap());
    }

    pub fn heads(&self) -> usize {
        self.counters.head.load(Ordering::SeqCst)
    }

    pub fn range_gets(&self) -> usize {
        self.counters.get_range.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Most recent request with `method`.
    pub fn last(&self, method: &str) -> Option<RecordedRequest> {
        self.recorded().into_iter().rev().find(|r| r.method == method)
    }
}

async fn handle(State(shared): State<Arc<Shared>>, req: Request) -> Response {
    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let method = req.method().clone();
    shared.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: req.uri().path().to_string(),
        headers: headers.clone(),
    });
    let behavior = shared.behavior.lock().unwrap().clone();

    if let Some(key) = behavior.required_access_key.as_deref() {
        let ok = headers
            .get("authorization")
            .is_some_and(|a| a.contains(&format!("Credential={key}/")));
        if !ok {
            return (StatusCode::FORBIDDEN, "AccessDenied").into_response();
        }
    }

    let object = &shared.object;
    let total = object.len();
    match method {
        Method::HEAD => {
            shared.counters.head.fetch_add(1, Ordering::SeqCst);
            let builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::ACCEPT_RANGES, "bytes");
            if behavior.head_without_length {
                // streamed body: no length is known, so none is sent
                let empty = futures::stream::empty::<std::result::Result<Bytes, std::io::Error>>();
                builder.body(Body::from_stream(empty)).unwrap()
            } else {
                builder
                    .header(header::CONTENT_LENGTH, total)
                    .body(Body::empty())
                    .unwrap()
            }
        }
        Method::GET => {
            if let Some(status) = behavior.get_status {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                return (status, "denied").into_response();
            }
            let range = headers.get("range").and_then(|r| parse_range(r, total));
            match range {
                Some((start, end)) if !behavior.ignore_range => {
                    shared.counters.get_range.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::PARTIAL_CONTENT,
                        [(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end - 1, total))],
                        object.slice(start, end),
                    )
                        .into_response()
                }
                _ => {
                    shared.counters.get_full.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, object.slice(0, total)).into_response()
                }
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// `bytes=a-b` to a half-open range, clipped to the object.
fn parse_range(value: &str, total: usize) -> Option<(usize, usize)> {
    let (a, b) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = a.parse().ok()?;
    let end: usize = b.parse::<usize>().ok()?.min(total.checked_sub(1)?) + 1;
    (start < end).then_some((start, end))
}
