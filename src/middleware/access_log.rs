use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::header,
    middleware::Next,
    response::Response,
};

/// Client address for log lines: `X-Real-IP`, then `X-Forwarded-For`, then
/// the socket peer.
pub fn client_addr(request: &Request) -> String {
    for name in ["x-real-ip", "x-forwarded-for"] {
        if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok()) {
            let value = value.split(',').next().unwrap_or(value).trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    remote_ip(request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Socket peer address only. The DDoS whitelist keys on this, never on
/// forwarding headers a client could spoof.
pub fn remote_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

/// One line per finished request, in the historical access-log shape.
pub async fn access_log(request: Request, next: Next) -> Response {
    let start = std::time::Instant::now();
    let addr = client_addr(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let bytes = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("0")
        .to_string();
    tracing::info!(
        "COMPLETE {addr} {method} {path} {} {bytes} in {:?}",
        response.status().as_u16(),
        start.elapsed()
    );
    response
}
