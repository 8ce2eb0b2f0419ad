// tests/test_http_range.rs
//
// Range fetch client and signed S3 access against a local HTTP server.

mod common;

use common::{pattern, RangeServer};
use remote_vfd::{
    FileHandleCache, HttpRangeClient, OpenMode, RangeSource, RemoteConfig, RemoteEndpoint,
    RemoteIoError, RemoteVfd, VfdErrorKind,
};
use std::sync::Arc;

const MIB: usize = 1024 * 1024;
const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

fn s3_config(server: &RangeServer) -> RemoteConfig {
    RemoteConfig::default()
        .with_region("us-east-1")
        .with_endpoint(server.base.clone())
        .with_use_ssl(false)
        .with_prefetch_size(0)
        .with_timeout_seconds(10)
}

fn client_for(path: &str, cfg: &RemoteConfig) -> HttpRangeClient {
    let ep = RemoteEndpoint::resolve(path, cfg).unwrap();
    HttpRangeClient::for_endpoint(&ep).unwrap()
}

#[test]
fn head_probe_reports_size_and_range_support() {
    common::init_tracing();
    let server = RangeServer::start_pattern(104_857_600);
    let client = client_for("s3://b/obj", &s3_config(&server));

    let meta = client.probe_metadata().unwrap();
    assert_eq!(meta.total_size, Some(104_857_600));
    assert!(meta.supports_range);
    assert_eq!(server.heads(), 1);

    let req = &server.recorded()[0];
    assert_eq!(req.method, "HEAD");
    assert_eq!(req.path, "/b/obj");
    assert!(req.header("authorization").is_none());
}

#[test]
fn twenty_blocks_then_sub_window_is_served_locally() {
    common::init_tracing();
    let server = RangeServer::start_pattern(32 * MIB);
    let cfg = RemoteConfig::default()
        .with_block_size(MIB)
        .with_max_blocks(64)
        .with_prefetch_size(0);
    let cache = FileHandleCache::new();
    let handle = cache.open(&server.url("data.bin"), &cfg).unwrap();

    let data = handle.read(0, 20 * MIB as u64).unwrap();
    assert_eq!(data.len(), 20 * MIB);
    assert!(data == pattern(20 * MIB));
    assert_eq!(server.range_gets(), 20);

    let ranges: Vec<String> = server
        .recorded()
        .into_iter()
        .filter(|r| r.method == "GET")
        .map(|r| r.headers["range"].clone())
        .collect();
    for k in 0..20 {
        let expected = format!("bytes={}-{}", k * MIB, (k + 1) * MIB - 1);
        assert!(ranges.contains(&expected), "missing {expected}");
    }

    let window = handle.read(5 * MIB as u64 + 100, 1024).unwrap();
    assert_eq!(&window[..], &pattern(5 * MIB + 1124)[5 * MIB + 100..]);
    assert_eq!(server.range_gets(), 20);
}

#[test]
fn forbidden_head_and_get_then_corrected_credentials() {
    common::init_tracing();
    let server = RangeServer::start(pattern(4096));
    server.set(|b| b.required_access_key = Some("GOODKEY".into()));
    let path = "s3://bucket/obj.h5";
    let cache = Arc::new(FileHandleCache::new());
    let cfg = |key: &str| {
        s3_config(&server)
            .with_credentials(key, "secret")
            .with_block_size(1024)
    };

    // wrong key: the signed HEAD is refused and no handle is kept
    let vfd = RemoteVfd::new(cache.clone(), cfg("BADKEY"));
    let err = vfd.open(path, OpenMode::ReadOnly).unwrap_err();
    assert_eq!(err.kind(), VfdErrorKind::MetadataProbe);
    assert_eq!(err.http_status(), Some(403));
    assert!(err.as_status() < 0);
    assert_eq!(vfd.last_http_status(), Some(403));
    assert_eq!(cache.live_handles(), 0);

    let head = server.last("HEAD").unwrap();
    let auth = head.header("authorization").unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=BADKEY/"));
    assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date,"));
    assert!(head.header("x-amz-date").is_some());
    assert_eq!(head.header("x-amz-content-sha256"), Some(EMPTY_SHA256));

    // key rotated after open: the ranged GET is refused and nothing is cached
    let vfd = RemoteVfd::new(cache.clone(), cfg("GOODKEY"));
    let file = vfd.open(path, OpenMode::ReadOnly).unwrap();
    server.set(|b| b.required_access_key = Some("NEWKEY".into()));
    let mut buf = vec![0u8; 100];
    let err = vfd.read(&file, 0, 100, &mut buf).unwrap_err();
    assert_eq!(err.kind(), VfdErrorKind::RangeFetch);
    assert_eq!(err.http_status(), Some(403));
    assert_eq!(vfd.last_http_status(), Some(403));
    assert_eq!(file.handle().cached_blocks(), 0);

    assert!(cache.invalidate(path));
    let vfd = RemoteVfd::new(cache.clone(), cfg("NEWKEY"));
    let file = vfd.open(path, OpenMode::ReadOnly).unwrap();
    vfd.read(&file, 0, 100, &mut buf).unwrap();
    assert_eq!(buf, pattern(100));
    assert_eq!(vfd.last_http_status(), None);

    let signed = server.last("GET").unwrap();
    let auth = signed.header("authorization").unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=NEWKEY/"));
    assert!(auth.contains("/us-east-1/s3/aws4_request"));
    assert!(auth.contains("SignedHeaders=host;range;x-amz-content-sha256;x-amz-date,"));
    assert!(signed.header("x-amz-date").is_some());
    assert_eq!(signed.header("x-amz-content-sha256"), Some(EMPTY_SHA256));
    assert_eq!(signed.header("range"), Some("bytes=0-1023"));
}

#[test]
fn session_token_is_sent_and_signed() {
    let server = RangeServer::start(pattern(2048));
    server.set(|b| b.required_access_key = Some("AKID".into()));
    let cfg = s3_config(&server)
        .with_credentials("AKID", "secret")
        .with_session_token("TOKEN123")
        .with_block_size(512);
    let handle = FileHandleCache::new().open("s3://bucket/tok.h5", &cfg).unwrap();
    assert_eq!(handle.read(0, 10).unwrap(), pattern(10));

    let head = server.last("HEAD").unwrap();
    assert_eq!(head.header("x-amz-security-token"), Some("TOKEN123"));
    assert!(head
        .header("authorization")
        .unwrap()
        .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token,"));

    let get = server.last("GET").unwrap();
    assert_eq!(get.header("x-amz-security-token"), Some("TOKEN123"));
    assert!(get
        .header("authorization")
        .unwrap()
        .contains("SignedHeaders=host;range;x-amz-content-sha256;x-amz-date;x-amz-security-token,"));
}

#[test]
fn reserved_characters_in_keys_reach_the_server_encoded() {
    let server = RangeServer::start(pattern(300));
    let cfg = s3_config(&server).with_credentials("AKID", "secret").with_block_size(128);
    let handle = FileHandleCache::new()
        .open("s3://bucket/dir/a b?v=1#frag%.h5", &cfg)
        .unwrap();
    assert_eq!(handle.read(0, 5).unwrap(), pattern(5));

    let expected = "/bucket/dir/a%20b%3Fv%3D1%23frag%25.h5";
    assert_eq!(server.last("HEAD").unwrap().path, expected);
    assert_eq!(server.last("GET").unwrap().path, expected);
}

#[test]
fn server_ignoring_range_is_sliced() {
    let server = RangeServer::start(pattern(1000));
    server.set(|b| b.ignore_range = true);
    let cfg = RemoteConfig::default().with_block_size(256).with_prefetch_size(0);
    let client = client_for(&server.url("f"), &cfg);

    assert_eq!(client.fetch_range(300, 100).unwrap(), pattern(400)[300..]);
    assert_eq!(server.counters.get_full.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn missing_content_length_falls_back_to_range_probe() {
    let server = RangeServer::start(pattern(777));
    server.set(|b| b.head_without_length = true);
    let client = client_for(&server.url("chunked"), &RemoteConfig::default());

    let meta = client.probe_metadata().unwrap();
    assert_eq!(meta.total_size, Some(777));
    assert!(meta.supports_range);
    let probe = server.recorded().into_iter().find(|r| r.method == "GET").unwrap();
    assert_eq!(probe.headers["range"], "bytes=0-0");
}

#[test]
fn error_status_on_fetch_is_not_cached() {
    let server = RangeServer::start(pattern(2048));
    let cfg = RemoteConfig::default().with_block_size(512).with_prefetch_size(0);
    let cache = FileHandleCache::new();
    let handle = cache.open(&server.url("obj"), &cfg).unwrap();

    server.set(|b| b.get_status = Some(503));
    match handle.read(0, 10) {
        Err(RemoteIoError::RangeFetch { status, message, .. }) => {
            assert_eq!(status, Some(503));
            assert!(message.contains("503"));
        }
        other => panic!("expected RangeFetch, got {other:?}"),
    }
    assert_eq!(handle.cached_blocks(), 0);

    server.set(|b| b.get_status = None);
    assert_eq!(handle.read(0, 10).unwrap(), pattern(10));
}

#[test]
fn unreachable_host_fails_the_probe() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let cfg = RemoteConfig::default().with_timeout_seconds(5);
    let client = client_for(&format!("http://127.0.0.1:{port}/x"), &cfg);
    match client.probe_metadata() {
        Err(RemoteIoError::MetadataProbe { status, .. }) => assert_eq!(status, None),
        other => panic!("expected MetadataProbe, got {other:?}"),
    }
}
