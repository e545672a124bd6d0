//! Server-side MD5 over an object or a byte range of it.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
};
use md5::{Digest, Md5};

use crate::error::ApiError;
use crate::utils::range::parse_digest_range;
use crate::utils::validation::is_valid_pool_name;
use crate::{AppState, BUFFER_SIZE};

pub async fn handle(
    State(state): State<AppState>,
    Path((pool, oid)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<String, ApiError> {
    if !is_valid_pool_name(&pool) {
        return Err(ApiError::NotFound);
    }

    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("unreadable Range".into()))?;
            Some(
                parse_digest_range(value)
                    .ok_or_else(|| ApiError::BadRequest(format!("malformed Range {value:?}")))?,
            )
        }
        None => None,
    };

    let pool_handle = state.store.open_pool(&pool).await?;
    let striper = pool_handle.create_striper().await?;

    let (mut offset, end) = range.unwrap_or((0, 0));
    let mut hasher = Md5::new();

    loop {
        if range.is_some() && offset > end {
            break;
        }
        let data = striper.read(&oid, offset, BUFFER_SIZE).await.map_err(|err| {
            tracing::warn!("failed to read {pool}/{oid} for md5: {err}");
            ApiError::NotFound
        })?;
        if data.is_empty() {
            break;
        }
        let count = data.len() as u64;
        // The striper hands back whole stripes; clip the tail read to the
        // requested range before hashing.
        let take = match range {
            Some((_, end)) if offset + count > end => (end - offset + 1) as usize,
            _ => data.len(),
        };
        hasher.update(&data[..take]);
        offset += count;
    }

    Ok(format!("{{\"md5\":\"{}\"}}", hex::encode(hasher.finalize())))
}
