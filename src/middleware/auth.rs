use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::AppState;

type HmacSha1 = Hmac<Sha1>;

/// Signature expected for a state-changing request:
/// `base64(HMAC-SHA1(secret, path))`. Signing the path is sufficient — it
/// encodes `(pool, object)` and the operation is method-qualified.
pub fn sign(secret: &str, path: &str) -> String {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("hmac takes any key length");
    mac.update(path.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Constant-time signature check; a missing header compares as empty.
pub fn verify(secret: &str, path: &str, given: &str) -> bool {
    let expected = sign(secret, path);
    given.len() == expected.len() && bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}

/// Reject unsigned mutations. Reads pass through untouched.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }

    let settings = state.settings();
    let given = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify(&settings.secret_key, request.uri().path(), given) {
        tracing::warn!("URL: {}, bad request signature", request.uri());
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}
