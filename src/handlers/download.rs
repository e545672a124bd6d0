//! Streaming object download.
//!
//! Small objects go through the peer group cache with a chunk-aligned
//! reader; everything else streams straight off the striper through a
//! read-ahead buffer. Both paths hand the HTTP layer bounded chunks and
//! honor single-range requests.

use std::io::SeekFrom;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::Stream;

use crate::cache::ChunkAlignedReader;
use crate::error::ApiError;
use crate::middleware::access_log::remote_ip;
use crate::store::{StoreError, Striper};
use crate::utils::range::{resolve_http_range, HttpRange};
use crate::utils::validation::is_valid_pool_name;
use crate::{AppState, BUFFER_SIZE};

/// Buffered sequential reader over a striper.
///
/// Refills with one striped read of [`BUFFER_SIZE`] when drained. A read
/// larger than what the buffer holds returns just what is available; the
/// serving loop calls back for the rest.
pub struct StriperReader {
    striper: Box<dyn Striper>,
    oid: String,
    offset: u64,
    buffer: Bytes,
    low: usize,
    high: usize,
}

impl StriperReader {
    pub fn new(striper: Box<dyn Striper>, oid: impl Into<String>) -> Self {
        Self {
            striper,
            oid: oid.into(),
            offset: 0,
            buffer: Bytes::new(),
            low: 0,
            high: 0,
        }
    }

    /// Read up to `want` bytes. Empty result means end of object.
    pub async fn read(&mut self, want: usize) -> Result<Bytes, StoreError> {
        if want == 0 {
            return Ok(Bytes::new());
        }
        if self.low == self.high {
            let data = self.striper.read(&self.oid, self.offset, BUFFER_SIZE).await?;
            if data.is_empty() {
                return Ok(Bytes::new());
            }
            self.offset += data.len() as u64;
            self.high = data.len();
            self.low = 0;
            self.buffer = data;
        }
        let n = want.min(self.high - self.low);
        let out = self.buffer.slice(self.low..self.low + n);
        self.low += n;
        Ok(out)
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, StoreError> {
        self.offset = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self
                .offset
                .checked_add_signed(delta)
                .ok_or_else(|| StoreError::Backend("seek out of range".into()))?,
            SeekFrom::End(delta) => {
                let size = self.striper.state(&self.oid).await?.size;
                size.checked_add_signed(delta)
                    .ok_or_else(|| StoreError::Backend("seek out of range".into()))?
            }
        };
        self.low = 0;
        self.high = 0;
        self.buffer = Bytes::new();
        Ok(self.offset)
    }
}

pub async fn handle(
    State(state): State<AppState>,
    Path((pool, oid)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let settings = state.settings();

    if settings.ddos {
        if let Some(guard) = &state.ddos {
            let uri = request.uri().to_string();
            if guard.should_block(
                remote_ip(&request),
                &uri,
                settings.throttle_window(),
                settings.throttle_nums,
            ) {
                tracing::warn!("see {uri}, blacklist it");
                return Err(ApiError::Rejected);
            }
        }
    }

    if !is_valid_pool_name(&pool) {
        return Err(ApiError::NotFound);
    }
    let pool_handle = state.store.open_pool(&pool).await?;
    let striper = pool_handle.create_striper().await?;
    let size = striper.state(&oid).await?.size;

    let range_header = request
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let (status, start, end) = match resolve_http_range(range_header, size) {
        HttpRange::Full => (StatusCode::OK, 0, size.saturating_sub(1)),
        HttpRange::Span(start, end) => (StatusCode::PARTIAL_CONTENT, start, end),
        HttpRange::Unsatisfiable => {
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                .body(Body::empty())
                .map_err(|_| ApiError::Internal);
        }
    };
    let content_length = if size == 0 { 0 } else { end - start + 1 };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={oid}"),
        )
        .header(header::CONTENT_LENGTH, content_length);
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"));
    }

    let body = if content_length == 0 {
        Body::empty()
    } else if size <= settings.cache_max_object_bytes() {
        let reader =
            ChunkAlignedReader::new(state.cache.clone(), striper, pool.as_str(), oid.as_str(), size);
        cached_body(reader, start, content_length)
    } else {
        direct_body(StriperReader::new(striper, oid.as_str()), start, content_length)
    };

    builder.body(body).map_err(|_| ApiError::Internal)
}

/// Read-through body for cacheable objects.
fn cached_body(reader: ChunkAlignedReader, start: u64, len: u64) -> Body {
    Body::from_stream(cached_body_stream(reader, start, len))
}

fn cached_body_stream(
    reader: ChunkAlignedReader,
    start: u64,
    len: u64,
) -> impl Stream<Item = Result<Bytes, StoreError>> {
    async_stream::try_stream! {
        let end = start + len;
        let mut pos = start;
        while pos < end {
            let want = (end - pos).min(BUFFER_SIZE as u64) as usize;
            let chunk = reader.read_at(pos, want).await?;
            if chunk.is_empty() {
                break;
            }
            pos += chunk.len() as u64;
            yield chunk;
        }
    }
}

/// Direct striper body for everything above the cache threshold.
fn direct_body(reader: StriperReader, start: u64, len: u64) -> Body {
    Body::from_stream(direct_body_stream(reader, start, len))
}

fn direct_body_stream(
    mut reader: StriperReader,
    start: u64,
    len: u64,
) -> impl Stream<Item = Result<Bytes, StoreError>> {
    async_stream::try_stream! {
        reader.seek(SeekFrom::Start(start)).await?;
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(BUFFER_SIZE as u64) as usize;
            let chunk = reader.read(want).await?;
            if chunk.is_empty() {
                break;
            }
            remaining -= chunk.len() as u64;
            yield chunk;
        }
    }
}
