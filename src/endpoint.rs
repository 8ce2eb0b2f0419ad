// src/endpoint.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Resolved, immutable description of where a path's bytes live.

use url::Url;

use crate::config::RemoteConfig;
use crate::error::{RemoteIoError, Result};
use crate::sigv4::S3Credentials;
use crate::uri_utils::{infer_scheme, resolve_region, rewrite_gcs_url, rewrite_s3_url, Scheme};

/// Tunables copied from the config when the endpoint is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub prefetch_size: usize,
    pub block_size: usize,
    pub max_blocks: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    scheme: Scheme,
    path: String,
    url: Option<Url>,
    region: String,
    credentials: Option<S3Credentials>,
    tunables: Tunables,
}

impl RemoteEndpoint {
    /// Classify `path`, rewrite it to HTTP(S) where needed and capture the
    /// credentials it will be signed with.
    ///
    /// Fails fast on credential problems so no request is ever sent with a
    /// half-configured signer.
    pub fn resolve(path: &str, config: &RemoteConfig) -> Result<Self> {
        config.validate()?;
        let scheme = infer_scheme(path);
        let region = resolve_region(config.region(), config.endpoint());

        let (http_url, credentials) = match scheme {
            Scheme::Local => (None, None),
            Scheme::Http | Scheme::Https => (Some(path.to_string()), None),
            Scheme::Gcs => {
                if config.has_credentials() {
                    return Err(RemoteIoError::SchemeUnsupported {
                        scheme,
                        reason: "gs:// paths are read anonymously; remove the S3 credentials".into(),
                    });
                }
                (Some(rewrite_gcs_url(path)?), None)
            }
            Scheme::S3 => {
                let url = rewrite_s3_url(
                    path,
                    config.region(),
                    config.endpoint(),
                    config.s3_use_ssl,
                )?;
                let creds = if config.has_credentials() {
                    Some(S3Credentials::from_config(config)?)
                } else {
                    None
                };
                (Some(url), creds)
            }
        };

        let url = http_url
            .map(|u| Url::parse(&u).map_err(|e| RemoteIoError::InvalidUrl(format!("{u}: {e}"))))
            .transpose()?;

        Ok(Self {
            scheme,
            path: path.to_string(),
            url,
            region,
            credentials,
            tunables: Tunables {
                prefetch_size: config.prefetch_size,
                block_size: config.block_size,
                max_blocks: config.max_blocks,
                timeout_seconds: config.timeout_seconds,
            },
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The path exactly as the caller passed it.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP(S) URL for remote schemes, `None` for local paths.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn credentials(&self) -> Option<&S3Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn tunables(&self) -> Tunables {
        self.tunables
    }
}
