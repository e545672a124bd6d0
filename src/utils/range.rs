/// Parsed upload header `Content-Range: bytes S-E/T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

/// Parse `bytes S-E/T`: trim the `bytes` prefix, split on `/`, split the
/// left side on `-`, parse three integers. Anything else is malformed.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let value = value.strip_prefix("bytes")?.trim();
    let (range, total) = value.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some(ContentRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total: total.trim().parse().ok()?,
    })
}

/// Parse the digest header `Range: bytes S-E`. Both bounds are required.
pub fn parse_digest_range(value: &str) -> Option<(u64, u64)> {
    let value = value.strip_prefix("bytes")?.trim();
    let (start, end) = value.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Resolution of a standard download `Range` header against an object of
/// `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpRange {
    /// No header: serve the whole object.
    Full,
    /// Inclusive window within the object.
    Span(u64, u64),
    /// Malformed or out of bounds: 416.
    Unsatisfiable,
}

/// Resolve `bytes=S-E`, `bytes=S-`, or `bytes=-N`. Only the first range of
/// a multi-range header is honored.
pub fn resolve_http_range(header: Option<&str>, size: u64) -> HttpRange {
    let Some(value) = header else {
        return HttpRange::Full;
    };
    let Some(spec) = value.strip_prefix("bytes=") else {
        return HttpRange::Unsatisfiable;
    };
    let spec = spec.split(',').next().unwrap_or(spec).trim();

    let Some((start, end)) = spec.split_once('-') else {
        return HttpRange::Unsatisfiable;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix form: the last N bytes.
        let Ok(suffix) = end.parse::<u64>() else {
            return HttpRange::Unsatisfiable;
        };
        if suffix == 0 || size == 0 {
            return HttpRange::Unsatisfiable;
        }
        return HttpRange::Span(size.saturating_sub(suffix), size - 1);
    }

    let Ok(start) = start.parse::<u64>() else {
        return HttpRange::Unsatisfiable;
    };
    if start >= size {
        return HttpRange::Unsatisfiable;
    }
    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return HttpRange::Unsatisfiable,
        }
    };
    HttpRange::Span(start, end)
}
