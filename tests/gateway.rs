//! End-to-end exercises of the gateway router over the in-memory store
//! driver.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use wuzei::cache::CachePool;
use wuzei::config::Settings;
use wuzei::middleware::auth::sign;
use wuzei::services::DdosGuard;
use wuzei::store::{MemStore, StoreDriver};
use wuzei::{routes, AppState};

const SECRET: &str = "swordfish";

fn test_settings() -> Settings {
    Settings {
        name: "wuzei-test".into(),
        cache_size_mbytes: 4,
        cache_chunk_size_kbytes: 64,
        cache_max_object_size_kbytes: 1024,
        my_ip_addr: "10.0.0.1".into(),
        port: 8001,
        peers: vec!["10.0.0.1".into()],
        listen_port: 3000,
        socket_timeout: 10,
        queue_length: 16,
        secret_key: SECRET.into(),
        ddos: false,
        throttle_interval: 10,
        throttle_nums: 3,
    }
}

fn state_for(settings: Settings, whitelist: &[&str]) -> AppState {
    let cache = Arc::new(CachePool::new(
        settings.name.as_str(),
        settings.my_ip_addr.as_str(),
        settings.peers.clone(),
        settings.port,
        settings.cache_budget_bytes(),
        settings.cache_chunk_bytes(),
    ));
    let store: Arc<dyn StoreDriver> = Arc::new(MemStore::default());
    let ddos = settings.ddos.then(|| {
        Arc::new(DdosGuard::new(
            whitelist.iter().map(|ip| ip.parse().unwrap()).collect(),
        ))
    });
    AppState::new(store, cache, settings, ddos)
}

fn app(settings: Settings) -> Router {
    routes::router(state_for(settings, &[]))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    (status, headers, body)
}

fn signed_put(path: &str, body: impl Into<Body>, content_range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(path)
        .header(header::AUTHORIZATION, sign(SECRET, path));
    if let Some(range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, range);
    }
    builder.body(body.into()).unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn get_from(path: &str, peer: &str) -> Request<Body> {
    let mut request = get(path);
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn identity_and_stats_endpoints() {
    let app = app(test_settings());

    let (status, _, body) = send(&app, get("/whoareyou")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"I AM WUZEI");

    let (status, _, body) = send(&app, get("/blocksize")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], br#"{"blocksize":33554432}"#);

    let (status, _, body) = send(&app, get("/threads")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"0\n");

    let (status, _, _) = send(&app, get("/cachestats")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, get("/cephstatus")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unranged_upload_and_read_back() {
    let app = app(test_settings());
    let payload = Bytes::from(vec![0x41u8; 10 << 20]);

    let (status, headers, _) =
        send(&app, signed_put("/pA/obj1", payload.clone(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::RANGE).is_none());

    let (status, _, body) = send(&app, get("/info/pA/obj1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], br#"{"size":10485760}"#);

    // 10 MiB is over the cache threshold: the direct buffered path serves it.
    let (status, headers, body) = send(&app, get("/pA/obj1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_LENGTH).unwrap().to_str().unwrap(),
        "10485760"
    );
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=obj1"
    );
    assert_eq!(body, payload);
}

#[tokio::test]
async fn small_object_served_through_the_cache() {
    let app = app(test_settings());
    let payload = Bytes::from_static(b"hello world");

    send(&app, signed_put("/pA/small", payload.clone(), None)).await;

    let (status, _, body) = send(&app, get("/pA/small")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, payload);

    // Second read is a cache hit and must be identical.
    let (_, _, body) = send(&app, get("/pA/small")).await;
    assert_eq!(body, payload);
}

#[tokio::test]
async fn ranged_download() {
    let app = app(test_settings());
    send(&app, signed_put("/pA/ranged", Bytes::from_static(b"abcdefghij"), None)).await;

    let mut request = get("/pA/ranged");
    request
        .headers_mut()
        .insert(header::RANGE, "bytes=2-5".parse().unwrap());
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers.get(header::CONTENT_RANGE).unwrap(), "bytes 2-5/10");
    assert_eq!(&body[..], b"cdef");

    let mut request = get("/pA/ranged");
    request
        .headers_mut()
        .insert(header::RANGE, "bytes=100-".parse().unwrap());
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers.get(header::CONTENT_RANGE).unwrap(), "bytes */10");
}

#[tokio::test]
async fn resumable_upload_in_two_parts() {
    let app = app(test_settings());
    let half = 4 << 20;
    let total = 2 * half;

    let (status, headers, _) = send(
        &app,
        signed_put(
            "/pA/obj2",
            Bytes::from(vec![0x41u8; half]),
            Some(&format!("bytes 0-{}/{}", half - 1, total)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::RANGE).unwrap().to_str().unwrap(),
        format!("0-{}/{}", half - 1, total)
    );

    let (status, _, _) = send(
        &app,
        signed_put(
            "/pA/obj2",
            Bytes::from(vec![0x42u8; half]),
            Some(&format!("bytes {}-{}/{}", half, total - 1, total)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, body) = send(&app, get("/info/pA/obj2")).await;
    assert_eq!(&body[..], format!(r#"{{"size":{total}}}"#).as_bytes());

    // The concatenation reads back as one object.
    let (_, _, body) = send(&app, get("/pA/obj2")).await;
    assert_eq!(body.len(), total);
    assert_eq!(body[0], 0x41);
    assert_eq!(body[half - 1], 0x41);
    assert_eq!(body[half], 0x42);
    assert_eq!(body[total - 1], 0x42);
}

#[tokio::test]
async fn oversent_ranged_upload_is_clipped() {
    let app = app(test_settings());

    let (status, headers, _) = send(
        &app,
        signed_put(
            "/pA/obj3",
            Bytes::from(vec![0x41u8; 500]),
            Some("bytes 0-99/100"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::RANGE).unwrap(), "0-99/100");

    let (_, _, body) = send(&app, get("/info/pA/obj3")).await;
    assert_eq!(&body[..], br#"{"size":100}"#);
}

#[tokio::test]
async fn undersent_ranged_upload_acks_what_was_stored() {
    let app = app(test_settings());

    let (status, headers, _) = send(
        &app,
        signed_put(
            "/pA/obj4",
            Bytes::from(vec![0x41u8; 400]),
            Some("bytes 0-999/1000"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::RANGE).unwrap(), "0-399/1000");

    let (_, _, body) = send(&app, get("/info/pA/obj4")).await;
    assert_eq!(&body[..], br#"{"size":400}"#);
}

#[tokio::test]
async fn malformed_content_range_is_rejected() {
    let app = app(test_settings());
    let (status, _, _) = send(
        &app,
        signed_put("/pA/obj5", Bytes::from_static(b"x"), Some("bytes 0-99")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn digest_full_and_ranged() {
    let app = app(test_settings());

    send(&app, signed_put("/pA/obj1", Bytes::from(vec![0x41u8; 10 << 20]), None)).await;
    send(&app, signed_put("/pA/text", Bytes::from_static(b"hello world"), None)).await;

    let (status, _, body) = send(&app, get("/calcmd5/pA/text")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], br#"{"md5":"5eb63bbbe01eeed093cb22bb8f5acdc3"}"#);

    let mut request = get("/calcmd5/pA/obj1");
    request
        .headers_mut()
        .insert(header::RANGE, "bytes 0-1023".parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], br#"{"md5":"c9a5a6878d97b48cc965c1e41859f034"}"#);

    let mut request = get("/calcmd5/pA/obj1");
    request
        .headers_mut()
        .insert(header::RANGE, "bytes 0-x".parse().unwrap());
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, get("/calcmd5/pA/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn info_of_missing_object_is_404() {
    let app = app(test_settings());
    let (status, _, body) = send(&app, get("/info/pA/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(&body[..], b"object not found");
}

#[tokio::test]
async fn invalid_pool_names_are_rejected() {
    let app = app(test_settings());
    let (status, _, _) = send(&app, get("/p-A/obj")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mutations_require_a_valid_signature() {
    let app = app(test_settings());
    send(&app, signed_put("/pA/obj1", Bytes::from_static(b"data"), None)).await;

    // No Authorization header.
    let request = Request::builder()
        .method("DELETE")
        .uri("/pA/obj1")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(&body[..], b"UnAuthorized");

    // Signature for a different path.
    let request = Request::builder()
        .method("DELETE")
        .uri("/pA/obj1")
        .header(header::AUTHORIZATION, sign(SECRET, "/pA/other"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct signature deletes the object.
    let request = Request::builder()
        .method("DELETE")
        .uri("/pA/obj1")
        .header(header::AUTHORIZATION, sign(SECRET, "/pA/obj1"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, get("/info/pA/obj1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_of_missing_object_is_404() {
    let app = app(test_settings());
    let request = Request::builder()
        .method("DELETE")
        .uri("/pA/ghost")
        .header(header::AUTHORIZATION, sign(SECRET, "/pA/ghost"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ddos_trip_blackens_the_url() {
    let mut settings = test_settings();
    settings.ddos = true;
    let state = state_for(settings, &["9.9.9.9"]);
    let app = routes::router(state);

    send(&app, signed_put("/pA/obj1", Bytes::from_static(b"data"), None)).await;

    for _ in 0..3 {
        let (status, _, _) = send(&app, get_from("/pA/obj1", "1.2.3.4:5000")).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Fourth access within the window trips the throttle: connection-close
    // rejection with no body.
    let (status, headers, body) = send(&app, get_from("/pA/obj1", "1.2.3.4:5000")).await;
    assert_eq!(status.as_u16(), 444);
    assert_eq!(headers.get(header::CONNECTION).unwrap(), "close");
    assert!(body.is_empty());

    // Blackened: rejected even for a different client.
    let (status, _, _) = send(&app, get_from("/pA/obj1", "5.6.7.8:5000")).await;
    assert_eq!(status.as_u16(), 444);

    // The whitelisted IP is never filtered.
    let (status, _, _) = send(&app, get_from("/pA/obj1", "9.9.9.9:5000")).await;
    assert_eq!(status, StatusCode::OK);

    // Other URLs are unaffected.
    let (status, _, _) = send(&app, get_from("/info/pA/obj1", "1.2.3.4:5000")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn admission_timeout_returns_408() {
    let mut settings = test_settings();
    settings.queue_length = 1;
    let state = state_for(settings, &[]);
    let app = routes::router(state.clone());

    // A stuck upload holds the only slot.
    let _slot = state.admission.acquire().await.expect("slot");

    let (status, _, body) = send(&app, get("/pA/obj1")).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(&body[..], b"server is too busy,timeout");

    // Stats endpoints bypass the queue.
    let (status, _, body) = send(&app, get("/threads")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"1\n");
}

#[tokio::test]
async fn resumable_parts_equal_one_shot_upload() {
    let app = app(test_settings());
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

    send(&app, signed_put("/pA/whole", Bytes::from(payload.clone()), None)).await;

    let total = payload.len();
    let step = 30_000;
    let mut offset = 0;
    while offset < total {
        let end = (offset + step).min(total);
        send(
            &app,
            signed_put(
                "/pA/parts",
                Bytes::copy_from_slice(&payload[offset..end]),
                Some(&format!("bytes {}-{}/{}", offset, end - 1, total)),
            ),
        )
        .await;
        offset = end;
    }

    let (_, _, whole) = send(&app, get("/pA/whole")).await;
    let (_, _, parts) = send(&app, get("/pA/parts")).await;
    assert_eq!(whole, parts);
    assert_eq!(whole.len(), total);
}
