//! Resumable chunked upload.
//!
//! The body is consumed in bounded reads and flushed to the store as
//! fixed-size async striped writes. Completions are awaited strictly in
//! submission order, which is also destination-offset order. Back-pressure
//! is two-stage: finished head completions are reaped opportunistically,
//! and once more than [`AIO_CONCURRENT`] writes are outstanding the next
//! dispatch blocks on the head.

use std::collections::VecDeque;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, StatusCode},
    response::Response,
};
use bytes::BytesMut;
use futures::StreamExt;

use crate::error::ApiError;
use crate::store::{Completion, StoreError, StripeLayout};
use crate::utils::range::{parse_content_range, ContentRange};
use crate::utils::validation::is_valid_pool_name;
use crate::{AppState, AIO_CONCURRENT, MAX_CHUNK_SIZE};

fn pending_has_completed(pending: &mut VecDeque<Completion>) -> bool {
    pending.front_mut().is_some_and(|c| c.is_complete())
}

async fn wait_pending_front(pending: &mut VecDeque<Completion>) -> Result<(), StoreError> {
    match pending.pop_front() {
        Some(completion) => completion.wait().await,
        None => Ok(()),
    }
}

/// Release every outstanding completion, reporting the first failure.
async fn drain_pending(pending: &mut VecDeque<Completion>) -> Result<(), StoreError> {
    let mut result = Ok(());
    while let Some(completion) = pending.pop_front() {
        if let Err(err) = completion.wait().await {
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}

pub async fn handle(
    State(state): State<AppState>,
    Path((pool, oid)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    if !is_valid_pool_name(&pool) {
        return Err(ApiError::NotFound);
    }

    let range: Option<ContentRange> = match request.headers().get(header::CONTENT_RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("unreadable Content-Range".into()))?;
            Some(
                parse_content_range(value)
                    .ok_or_else(|| ApiError::BadRequest(format!("malformed Content-Range {value:?}")))?,
            )
        }
        None => None,
    };

    let pool_handle = state.store.open_pool(&pool).await?;
    let mut striper = pool_handle.create_striper().await?;
    striper.set_layout(StripeLayout::default())?;

    let uri = request.uri().clone();
    let mut stream = request.into_body().into_data_stream();

    let (start, end) = match range {
        Some(r) => (r.start, r.end),
        None => (0, 0),
    };
    let mut src_offset = start;
    let mut dest_offset = start;
    let mut pending_data = BytesMut::new();
    let mut pending: VecDeque<Completion> = VecDeque::new();

    loop {
        if range.is_some() && src_offset > end {
            break;
        }
        let Some(chunk) = stream.next().await else {
            break;
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!("URL: {uri}, failed to read body: {err}");
                let _ = drain_pending(&mut pending).await;
                return Err(ApiError::BadRequest("body read failed".into()));
            }
        };
        if chunk.is_empty() {
            continue;
        }

        let count = chunk.len() as u64;
        // The client may send more than the declared range; the excess is
        // consumed but never stored.
        let available = if range.is_some() {
            count.min(end - src_offset + 1) as usize
        } else {
            chunk.len()
        };
        pending_data.extend_from_slice(&chunk[..available]);
        src_offset += count;

        while pending_data.len() >= MAX_CHUNK_SIZE {
            let block = pending_data.split_to(MAX_CHUNK_SIZE).freeze();
            match striper.write_aio(&oid, block, dest_offset) {
                Ok(completion) => pending.push_back(completion),
                Err(err) => {
                    tracing::warn!("URL: {uri}, failed to submit async write: {err}");
                    let _ = drain_pending(&mut pending).await;
                    return Err(ApiError::AioSubmit);
                }
            }
            dest_offset += MAX_CHUNK_SIZE as u64;

            // Reap writes the store already finished without blocking.
            while pending_has_completed(&mut pending) {
                if wait_pending_front(&mut pending).await.is_err() {
                    tracing::warn!("URL: {uri}, async write failed");
                    let _ = drain_pending(&mut pending).await;
                    return Err(ApiError::UploadFailed);
                }
            }

            if pending.len() > AIO_CONCURRENT {
                tracing::debug!("input stream is ahead of the store, waiting on head write");
                if wait_pending_front(&mut pending).await.is_err() {
                    tracing::warn!("URL: {uri}, async write failed");
                    let _ = drain_pending(&mut pending).await;
                    return Err(ApiError::UploadFailed);
                }
            }
        }
    }

    if !pending_data.is_empty() {
        match striper.write_aio(&oid, pending_data.freeze(), dest_offset) {
            Ok(completion) => pending.push_back(completion),
            Err(err) => {
                tracing::warn!("URL: {uri}, failed to submit final write: {err}");
                let _ = drain_pending(&mut pending).await;
                return Err(ApiError::AioSubmit);
            }
        }
    }

    if drain_pending(&mut pending).await.is_err() {
        tracing::warn!("URL: {uri}, async write failed while draining");
        return Err(ApiError::UploadFailed);
    }

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream");
    if let Some(r) = range {
        // Acknowledge how much was actually stored; a short body yields a
        // shorter window than the client declared.
        let acked_end = src_offset.saturating_sub(1).min(r.end);
        response = response.header(header::RANGE, format!("{}-{}/{}", r.start, acked_end, r.total));
    }
    response.body(Body::empty()).map_err(|_| ApiError::Internal)
}
