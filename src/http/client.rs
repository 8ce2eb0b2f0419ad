// src/http/client.rs
//
// Range fetch client: one metadata probe plus authenticated or anonymous
// byte-range GETs over reqwest.

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, RANGE,
};
use reqwest::{ClientBuilder, Method, RequestBuilder, StatusCode};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::endpoint::RemoteEndpoint;
use crate::error::{http_error_message, RemoteIoError, Result};
use crate::range_source::{ObjectMeta, RangeSource};
use crate::runtime::run_on_global_rt;
use crate::sigv4::{sign_request, S3Credentials};

/// Transport settings for one range client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout; bounds how long a probe or fetch may block
    pub request_timeout: Duration,
    /// TCP keepalive settings
    pub tcp_keepalive: Option<Duration>,
    /// Pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::with_timeout_secs(crate::constants::DEFAULT_TIMEOUT_SECS)
    }
}

impl HttpClientConfig {
    pub fn with_timeout_secs(secs: u64) -> Self {
        let request_timeout = Duration::from_secs(secs);
        Self {
            connect_timeout: request_timeout.min(Duration::from_secs(10)),
            request_timeout,
            tcp_keepalive: Some(Duration::from_secs(60)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }

    fn build(&self) -> Result<reqwest::Client> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .tcp_nodelay(true)
            .use_rustls_tls();

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }
        if let Some(idle_timeout) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle_timeout);
        }

        builder
            .build()
            .map_err(|e| RemoteIoError::InvalidConfig(format!("failed to build HTTP client: {e}")))
    }
}

/// Blocking range client for one HTTP(S) URL, optionally SigV4-signed.
pub struct HttpRangeClient {
    client: reqwest::Client,
    url: Url,
    credentials: Option<S3Credentials>,
    meta: Mutex<ObjectMeta>,
}

impl HttpRangeClient {
    pub fn new(url: Url, credentials: Option<S3Credentials>, config: &HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: config.build()?,
            url,
            credentials,
            meta: Mutex::new(ObjectMeta::default()),
        })
    }

    pub fn for_endpoint(endpoint: &RemoteEndpoint) -> Result<Self> {
        let url = endpoint.url().cloned().ok_or_else(|| {
            RemoteIoError::InvalidUrl(format!("{} is not a remote path", endpoint.path()))
        })?;
        let config = HttpClientConfig::with_timeout_secs(endpoint.tunables().timeout_seconds);
        Self::new(url, endpoint.credentials().cloned(), &config)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_signed(&self) -> bool {
        self.credentials.is_some()
    }
}

impl RangeSource for HttpRangeClient {
    fn probe_metadata(&self) -> Result<ObjectMeta> {
        let known = *self.meta.lock().unwrap_or_else(|p| p.into_inner());
        let probed = run_on_global_rt(probe_async(
            self.client.clone(),
            self.url.clone(),
            self.credentials.clone(),
            known,
        ))?;

        let mut meta = self.meta.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(size) = probed.total_size {
            meta.set_size_once(size);
        }
        meta.supports_range |= probed.supports_range;
        Ok(*meta)
    }

    fn fetch_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        run_on_global_rt(fetch_range_async(
            self.client.clone(),
            self.url.clone(),
            self.credentials.clone(),
            offset,
            length,
        ))
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Attach either signed headers or just the plain `Range` header.
///
/// Signed requests build every header by hand: the values sent must be the
/// exact strings that went into the canonical request.
fn prepare(
    client: &reqwest::Client,
    method: Method,
    url: &Url,
    credentials: Option<&S3Credentials>,
    range: Option<&str>,
) -> Result<RequestBuilder> {
    let mut req = client.request(method.clone(), url.clone());
    match credentials {
        Some(creds) => {
            let signed = sign_request(method.as_str(), url, range, creds)?;
            for (name, value) in signed.headers {
                req = req.header(name, value);
            }
            req = req.header(AUTHORIZATION, signed.authorization);
        }
        None => {
            if let Some(r) = range {
                req = req.header(RANGE, r);
            }
        }
    }
    Ok(req)
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Total object size from `Content-Range: bytes a-b/<total>`.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

fn absorb_headers(meta: &mut ObjectMeta, headers: &HeaderMap) {
    if let Some(len) = header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()) {
        meta.set_size_once(len);
    }
    if header_str(headers, ACCEPT_RANGES).is_some_and(|v| v.to_ascii_lowercase().contains("bytes")) {
        meta.supports_range = true;
    }
}

async fn probe_async(
    client: reqwest::Client,
    url: Url,
    credentials: Option<S3Credentials>,
    known: ObjectMeta,
) -> Result<ObjectMeta> {
    let probe_err = |status: Option<u16>, message: String| RemoteIoError::MetadataProbe {
        url: url.to_string(),
        status,
        message,
    };

    let resp = prepare(&client, Method::HEAD, &url, credentials.as_ref(), None)?
        .send()
        .await
        .map_err(|e| probe_err(None, e.to_string()))?;

    let status = resp.status();
    debug!("HEAD {} -> {}", url, status);
    if status.as_u16() >= 400 {
        return Err(probe_err(Some(status.as_u16()), http_error_message(status.as_u16(), url.as_str())));
    }

    let mut meta = known;
    absorb_headers(&mut meta, resp.headers());
    if meta.total_size.is_some() {
        return Ok(meta);
    }

    // No Content-Length on HEAD (e.g. chunked answers): ask for one byte and
    // read the total from Content-Range. The Content-Length of that answer
    // is the chunk length and must not be taken as the object size.
    let resp = prepare(&client, Method::GET, &url, credentials.as_ref(), Some("bytes=0-0"))?
        .send()
        .await
        .map_err(|e| probe_err(None, e.to_string()))?;
    let status = resp.status();
    debug!("GET {} bytes=0-0 (size probe) -> {}", url, status);
    match status {
        StatusCode::PARTIAL_CONTENT => {
            meta.supports_range = true;
            let total = header_str(resp.headers(), CONTENT_RANGE).and_then(parse_content_range_total);
            match total {
                Some(t) => meta.set_size_once(t),
                None => return Err(probe_err(Some(206), "missing or unparsable Content-Range".into())),
            }
        }
        StatusCode::OK => {
            // full representation, so Content-Length is the object size
            absorb_headers(&mut meta, resp.headers());
        }
        s => {
            return Err(probe_err(Some(s.as_u16()), http_error_message(s.as_u16(), url.as_str())));
        }
    }

    if meta.total_size.is_none() {
        return Err(probe_err(Some(status.as_u16()), "server did not report the object size".into()));
    }
    Ok(meta)
}

async fn fetch_range_async(
    client: reqwest::Client,
    url: Url,
    credentials: Option<S3Credentials>,
    offset: u64,
    length: u64,
) -> Result<Bytes> {
    let fetch_err = |status: Option<u16>, message: String| RemoteIoError::RangeFetch {
        url: url.to_string(),
        offset,
        length,
        status,
        message,
    };

    let end = offset
        .checked_add(length - 1)
        .ok_or_else(|| fetch_err(None, "range end overflows u64".into()))?;
    let range = format!("bytes={offset}-{end}");

    let resp = prepare(&client, Method::GET, &url, credentials.as_ref(), Some(&range))?
        .send()
        .await
        .map_err(|e| fetch_err(None, e.to_string()))?;

    let status = resp.status();
    debug!("GET {} {} -> {}", url, range, status);
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(fetch_err(Some(status.as_u16()), http_error_message(status.as_u16(), url.as_str())));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| fetch_err(Some(status.as_u16()), format!("failed reading body: {e}")))?;
    let len = length as usize;

    if status == StatusCode::PARTIAL_CONTENT {
        if body.len() < len {
            return Err(fetch_err(Some(206), format!("short body: {} of {} bytes", body.len(), len)));
        }
        return Ok(body.slice(..len));
    }

    // 200: the server ignored Range and sent the whole object.
    let start = offset as usize;
    if body.len() >= start + len {
        if offset > 0 || body.len() > len {
            warn!("{} ignored Range; slicing {} from {} byte body", url, range, body.len());
        }
        Ok(body.slice(start..start + len))
    } else if body.len() == len {
        Ok(body)
    } else {
        Err(fetch_err(Some(200), format!("body of {} bytes does not cover {}", body.len(), range)))
    }
}
