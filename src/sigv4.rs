// src/sigv4.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! AWS Signature Version 4 for body-less S3 requests (GET / HEAD).
//!
//! Every call recomputes the timestamp, canonical request and signature;
//! nothing is cached between requests.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::RemoteConfig;
use crate::constants::EMPTY_PAYLOAD_SHA256;
use crate::error::{RemoteIoError, Result};
use crate::uri_utils::{resolve_region, uri_encode_path};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub region: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .finish()
    }
}

impl S3Credentials {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            region: region.into(),
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let access_key = config
            .access_key()
            .ok_or_else(|| RemoteIoError::SigningConfig("missing S3 access key".into()))?;
        let secret_key = config
            .secret_key()
            .ok_or_else(|| RemoteIoError::SigningConfig("missing S3 secret key".into()))?;
        let creds = Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            session_token: config.session_token().map(str::to_string),
            region: resolve_region(config.region(), config.endpoint()),
        };
        creds.check()?;
        Ok(creds)
    }

    fn check(&self) -> Result<()> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(RemoteIoError::SigningConfig("access key and secret key are required".into()));
        }
        if self.region.is_empty() {
            return Err(RemoteIoError::SigningConfig("region is required for signing".into()));
        }
        if self.access_key.contains(['/', ',', ' ']) {
            return Err(RemoteIoError::SigningConfig("malformed access key".into()));
        }
        Ok(())
    }
}

/// Headers to attach to one signed request. Values match the canonical
/// request byte for byte.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub authorization: String,
    pub headers: Vec<(&'static str, String)>,
}

/// Sign `method url` at the current time.
pub fn sign_request(
    method: &str,
    url: &Url,
    range: Option<&str>,
    creds: &S3Credentials,
) -> Result<SignedRequest> {
    sign_request_at(method, url, range, creds, Utc::now())
}

/// Sign with an explicit timestamp.
pub fn sign_request_at(
    method: &str,
    url: &Url,
    range: Option<&str>,
    creds: &S3Credentials,
    now: DateTime<Utc>,
) -> Result<SignedRequest> {
    creds.check()?;

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let host = host_header(url)?;

    // Sorted by name.
    let mut headers: Vec<(&'static str, String)> = Vec::with_capacity(5);
    headers.push(("host", host));
    if let Some(r) = range {
        headers.push(("range", r.to_string()));
    }
    headers.push(("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()));
    headers.push(("x-amz-date", amz_date.clone()));
    if let Some(token) = creds.session_token.as_deref().filter(|t| !t.is_empty()) {
        headers.push(("x-amz-security-token", token.to_string()));
    }

    let signed_headers = headers.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(";");
    let creq = canonical_request(method, url, &headers, &signed_headers);
    let scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", creds.region);
    let sts = string_to_sign(&amz_date, &scope, &creq);
    let key = signing_key(&creds.secret_key, &date_stamp, &creds.region);
    let signature = hex::encode(hmac_sha256(&key, sts.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key
    );
    Ok(SignedRequest { authorization, headers })
}

/// `host[:port]` as the HTTP client will send it (default ports omitted).
pub fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| RemoteIoError::InvalidUrl(format!("{url}: missing host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

pub fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(&'static str, String)],
    signed_headers: &str,
) -> String {
    let mut canonical_headers = String::new();
    for (name, value) in headers {
        canonical_headers.push_str(name);
        canonical_headers.push(':');
        canonical_headers.push_str(value.trim());
        canonical_headers.push('\n');
    }
    format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{EMPTY_PAYLOAD_SHA256}",
        uri_encode_path(url.path()),
        canonical_query(url.query().unwrap_or("")),
    )
}

fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (encode_query_component(k), encode_query_component(v))
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

// Same rules as the path, except '/' is escaped too.
fn encode_query_component(s: &str) -> String {
    urlencoding::encode_binary(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

pub fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    )
}

pub fn signing_key(secret_key: &str, date_stamp: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
