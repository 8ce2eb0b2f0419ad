// src/uri_utils.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Scheme classification and URL rewriting.
//!
//! Paths are opaque strings handed over by the file-format reader. Anything
//! that does not carry a recognized remote prefix is treated as a local path.

use crate::constants::{DEFAULT_REGION, GCS_PUBLIC_HOST};
use crate::error::{RemoteIoError, Result};

/// Transport selected for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Local,
    S3,
    Https,
    Http,
    Gcs,
}

impl Scheme {
    pub fn is_remote(self) -> bool {
        self != Scheme::Local
    }
}

/// Literal prefix match; unknown prefixes fall through to `Local`.
pub fn infer_scheme(path: &str) -> Scheme {
    if path.starts_with("s3://") || path.starts_with("s3a://") {
        Scheme::S3
    } else if path.starts_with("https://") {
        Scheme::Https
    } else if path.starts_with("http://") {
        Scheme::Http
    } else if path.starts_with("gs://") {
        Scheme::Gcs
    } else {
        Scheme::Local
    }
}

/// Split `s3://bucket/key` (or `s3a://`) into `(bucket, key)`. The key may be empty.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let trimmed = uri
        .strip_prefix("s3://")
        .or_else(|| uri.strip_prefix("s3a://"))
        .ok_or_else(|| RemoteIoError::InvalidUrl(format!("{uri}: expected s3:// or s3a://")))?;
    split_bucket_key(uri, trimmed)
}

fn split_bucket_key(uri: &str, rest: &str) -> Result<(String, String)> {
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(RemoteIoError::InvalidUrl(format!("{uri}: missing bucket")));
    }
    Ok((bucket.to_owned(), key.to_owned()))
}

/// Strip an optional `http(s)://` prefix and trailing slashes from an endpoint.
pub fn normalize_endpoint(endpoint: &str) -> &str {
    let e = endpoint.trim();
    let e = e
        .strip_prefix("https://")
        .or_else(|| e.strip_prefix("http://"))
        .unwrap_or(e);
    e.trim_end_matches('/')
}

/// True when `endpoint` is empty or just names the public AWS S3 domain.
pub fn is_default_aws_endpoint(endpoint: Option<&str>) -> bool {
    let Some(endpoint) = endpoint else {
        return true;
    };
    let e = normalize_endpoint(endpoint).to_ascii_lowercase();
    if e.is_empty() || e == "s3.amazonaws.com" {
        return true;
    }
    region_from_endpoint(Some(&e)).is_some()
}

/// Region named by a regional AWS endpoint such as `s3.eu-west-1.amazonaws.com`.
pub fn region_from_endpoint(endpoint: Option<&str>) -> Option<String> {
    let e = normalize_endpoint(endpoint?).to_ascii_lowercase();
    e.strip_prefix("s3.")
        .and_then(|r| r.strip_suffix(".amazonaws.com"))
        .filter(|r| !r.is_empty() && !r.contains('.'))
        .map(str::to_string)
}

/// Configured region, else the one named by the endpoint, else `us-east-1`.
pub fn resolve_region(region: Option<&str>, endpoint: Option<&str>) -> String {
    region
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .or_else(|| region_from_endpoint(endpoint))
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Rewrite `s3://bucket/key` into an HTTP(S) URL.
///
/// Without a custom endpoint this yields virtual-hosted style
/// `https://bucket.s3.<region>.amazonaws.com/key`; with one, path style
/// `https://<endpoint>/bucket/key`.
pub fn rewrite_s3_url(
    uri: &str,
    region: Option<&str>,
    endpoint: Option<&str>,
    use_ssl: bool,
) -> Result<String> {
    let (bucket, key) = parse_s3_uri(uri)?;
    let key = encode_key(&key);
    let proto = if use_ssl { "https" } else { "http" };

    if is_default_aws_endpoint(endpoint) {
        let region = resolve_region(region, endpoint);
        Ok(format!("{proto}://{bucket}.s3.{region}.amazonaws.com/{key}"))
    } else {
        // checked by is_default_aws_endpoint above
        let endpoint = normalize_endpoint(endpoint.unwrap_or_default());
        Ok(format!("{proto}://{endpoint}/{bucket}/{key}"))
    }
}

/// Rewrite `gs://bucket/key` to the public XML API host.
pub fn rewrite_gcs_url(uri: &str) -> Result<String> {
    let rest = uri
        .strip_prefix("gs://")
        .ok_or_else(|| RemoteIoError::InvalidUrl(format!("{uri}: expected gs://")))?;
    let (bucket, key) = split_bucket_key(uri, rest)?;
    Ok(format!("https://{GCS_PUBLIC_HOST}/{bucket}/{}", encode_key(&key)))
}

/// Percent-encode one path segment or query component. Only unreserved
/// characters (`A-Z a-z 0-9 - _ . ~`) stay literal.
pub fn uri_encode_component(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Encode a raw object key for use as a URL path; `/` separates segments.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(uri_encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// S3 canonical URI encoding of an already-formed URL path. Each segment is
/// decoded first so existing escapes are not encoded twice.
pub fn uri_encode_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode_binary(&urlencoding::decode_binary(seg.as_bytes())).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
