// src/config.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Connection and tuning parameters for opening remote objects.

use anyhow::{Context, Result as AnyResult};
use std::env;
use std::str::FromStr;

use crate::constants::*;
use crate::error::{RemoteIoError, Result};

/// Credentials and tunables supplied by the surrounding system.
///
/// Empty strings and `None` are equivalent for the optional S3 fields; both
/// mean "not configured".
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub s3_region: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_session_token: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_use_ssl: bool,

    pub prefetch_size: usize,
    pub block_size: usize,
    pub max_blocks: usize,
    pub timeout_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            s3_region: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_session_token: None,
            s3_endpoint: None,
            s3_use_ssl: true,
            prefetch_size: DEFAULT_PREFETCH_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks: DEFAULT_MAX_BLOCKS,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("s3_region", &self.s3_region)
            .field("s3_access_key", &self.s3_access_key)
            .field("s3_secret_key", &self.s3_secret_key.as_ref().map(|_| "<redacted>"))
            .field("s3_session_token", &self.s3_session_token.as_ref().map(|_| "<redacted>"))
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_use_ssl", &self.s3_use_ssl)
            .field("prefetch_size", &self.prefetch_size)
            .field("block_size", &self.block_size)
            .field("max_blocks", &self.max_blocks)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

impl RemoteConfig {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.s3_region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.s3_access_key = Some(access_key.into());
        self.s3_secret_key = Some(secret_key.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.s3_session_token = Some(token.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_use_ssl(mut self, use_ssl: bool) -> Self {
        self.s3_use_ssl = use_ssl;
        self
    }

    pub fn with_prefetch_size(mut self, bytes: usize) -> Self {
        self.prefetch_size = bytes;
        self
    }

    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    pub fn with_max_blocks(mut self, blocks: usize) -> Self {
        self.max_blocks = blocks;
        self
    }

    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(&self.s3_region)
    }

    pub fn endpoint(&self) -> Option<&str> {
        non_empty(&self.s3_endpoint)
    }

    pub fn access_key(&self) -> Option<&str> {
        non_empty(&self.s3_access_key)
    }

    pub fn secret_key(&self) -> Option<&str> {
        non_empty(&self.s3_secret_key)
    }

    pub fn session_token(&self) -> Option<&str> {
        non_empty(&self.s3_session_token)
    }

    /// Either half of the key pair is set. Anything less means anonymous access.
    pub fn has_credentials(&self) -> bool {
        self.access_key().is_some() || self.secret_key().is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(RemoteIoError::InvalidConfig("block_size must be > 0".into()));
        }
        if self.max_blocks == 0 {
            return Err(RemoteIoError::InvalidConfig("max_blocks must be > 0".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(RemoteIoError::InvalidConfig("timeout_seconds must be > 0".into()));
        }
        Ok(())
    }

    /// Build a config from the process environment (after loading `.env`).
    ///
    /// Reads the standard `AWS_*` variables plus the `REMOTE_VFD_*` tunables.
    pub fn from_env() -> AnyResult<Self> {
        dotenvy::dotenv().ok();

        let mut cfg = Self {
            s3_access_key: env_string("AWS_ACCESS_KEY_ID"),
            s3_secret_key: env_string("AWS_SECRET_ACCESS_KEY"),
            s3_session_token: env_string("AWS_SESSION_TOKEN"),
            s3_region: env_string("AWS_REGION").or_else(|| env_string("AWS_DEFAULT_REGION")),
            s3_endpoint: env_string("AWS_ENDPOINT_URL"),
            ..Self::default()
        };

        if let Some(v) = env_string("AWS_USE_SSL") {
            cfg.s3_use_ssl = parse_bool(&v)
                .with_context(|| format!("AWS_USE_SSL has an invalid value: {v}"))?;
        }
        if let Some(v) = env_parse::<usize>(ENV_PREFETCH_SIZE)? {
            cfg.prefetch_size = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_BLOCK_SIZE)? {
            cfg.block_size = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_MAX_BLOCKS)? {
            cfg.max_blocks = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_TIMEOUT_SECS)? {
            cfg.timeout_seconds = v;
        }

        cfg.validate().context("invalid remote configuration from environment")?;
        Ok(cfg)
    }
}

/// Keep-alive capacity for the handle cache, from `REMOTE_VFD_KEEP_ALIVE`.
pub fn keep_alive_from_env() -> AnyResult<usize> {
    Ok(env_parse::<usize>(ENV_KEEP_ALIVE)?.unwrap_or(DEFAULT_KEEP_ALIVE))
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> AnyResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_string(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value: {v}"))
        })
        .transpose()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
