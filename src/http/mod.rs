// src/http/mod.rs
//
// HTTP range transport for remote objects

pub mod client;

pub use client::{HttpClientConfig, HttpRangeClient};
