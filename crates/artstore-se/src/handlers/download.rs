//! Byte-range-aware blob serving with checksum ETags.

use std::sync::Arc;

use artstore_auth::require_role_or_scope;
use artstore_model::{AuthClaims, FileStatus, OperationKind, Role};
use axum::{
    Extension,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SeState;

const READ_ROLES: &[Role] = &[Role::Admin, Role::Readonly];
const READ_SCOPES: &[&str] = &["files:read"];

/// Resolved byte window, end inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteWindow {
    start: i64,
    end: i64,
}

pub(crate) async fn download_file(
    State(state): State<Arc<SeState>>,
    claims: Option<Extension<AuthClaims>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_role_or_scope(claims.as_ref().map(|ext| &ext.0), READ_ROLES, READ_SCOPES)?;
    if !state.can_perform(OperationKind::Download) {
        return Err(ApiError::mode_not_allowed(
            "download not allowed in current mode",
        ));
    }

    let meta = state
        .index
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("file {id} not found")))?;
    if meta.status != FileStatus::Active {
        return Err(ApiError::mode_not_allowed(format!(
            "file {id} is {} and can no longer be downloaded",
            meta.status
        )));
    }

    let etag = format!("\"{}\"", meta.checksum);
    if if_none_match_matches(&headers, &meta.checksum) {
        let response = Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, &etag)
            .body(Body::empty())
            .map_err(|_| ApiError::internal("failed to build response"))?;
        return Ok(response);
    }

    let window = match headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
    {
        Some(raw) => match parse_range(raw, meta.size) {
            RangeOutcome::Window(window) => Some(window),
            RangeOutcome::Ignored => None,
            RangeOutcome::Unsatisfiable => {
                return Err(ApiError::range_not_satisfiable(format!(
                    "range outside 0..{}",
                    meta.size
                )));
            }
        },
        None => None,
    };

    let mut file = state.blobs.open(&meta.storage_path).await?;
    state.metrics.inc_file_operation("download");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        meta.original_filename.replace('"', "")
    );
    let builder = Response::builder()
        .header(header::CONTENT_TYPE, &meta.content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::ETAG, &etag)
        .header(header::ACCEPT_RANGES, "bytes");

    // A range covering the full extent is served as a plain 200.
    let response = match window {
        Some(window) if window.start != 0 || window.end != meta.size - 1 => {
            file.seek(std::io::SeekFrom::Start(
                u64::try_from(window.start).unwrap_or_default(),
            ))
            .await
            .map_err(|err| {
                ApiError::internal(format!("failed to seek blob: {err}"))
            })?;
            let length = window.end - window.start + 1;
            let limited = file.take(u64::try_from(length).unwrap_or_default());
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", window.start, window.end, meta.size),
                )
                .header(header::CONTENT_LENGTH, length)
                .body(Body::from_stream(ReaderStream::new(limited)))
        }
        _ => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, meta.size)
            .body(Body::from_stream(ReaderStream::new(file))),
    };

    response.map_err(|_| ApiError::internal("failed to build response"))
}

fn if_none_match_matches(headers: &HeaderMap, checksum: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|raw| {
            raw.split(',').any(|candidate| {
                let candidate = candidate
                    .trim()
                    .trim_start_matches("W/")
                    .trim_matches('"');
                candidate == checksum || candidate == "*"
            })
        })
}

enum RangeOutcome {
    Window(ByteWindow),
    Ignored,
    Unsatisfiable,
}

/// Parse a single-range `Range` header against a blob of `size` bytes.
///
/// Malformed headers and multi-range requests are ignored (the full body is
/// served); a syntactically valid range that selects no bytes is
/// unsatisfiable.
fn parse_range(raw: &str, size: i64) -> RangeOutcome {
    let Some(byte_range) = raw.strip_prefix("bytes=") else {
        return RangeOutcome::Ignored;
    };
    if byte_range.contains(',') || size <= 0 {
        return RangeOutcome::Ignored;
    }
    let Some((start_raw, end_raw)) = byte_range.split_once('-') else {
        return RangeOutcome::Ignored;
    };

    match (start_raw.trim(), end_raw.trim()) {
        ("", "") => RangeOutcome::Ignored,
        ("", suffix) => match suffix.parse::<i64>() {
            Ok(suffix) if suffix > 0 => {
                let start = (size - suffix).max(0);
                RangeOutcome::Window(ByteWindow {
                    start,
                    end: size - 1,
                })
            }
            Ok(_) => RangeOutcome::Unsatisfiable,
            Err(_) => RangeOutcome::Ignored,
        },
        (start, "") => match start.parse::<i64>() {
            Ok(start) if start < size => RangeOutcome::Window(ByteWindow {
                start,
                end: size - 1,
            }),
            Ok(_) => RangeOutcome::Unsatisfiable,
            Err(_) => RangeOutcome::Ignored,
        },
        (start, end) => match (start.parse::<i64>(), end.parse::<i64>()) {
            (Ok(start), Ok(end)) => {
                if start > end || start >= size {
                    RangeOutcome::Unsatisfiable
                } else {
                    RangeOutcome::Window(ByteWindow {
                        start,
                        end: end.min(size - 1),
                    })
                }
            }
            _ => RangeOutcome::Ignored,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_extent_range_is_a_window_over_everything() {
        match parse_range("bytes=0-10", 11) {
            RangeOutcome::Window(window) => {
                assert_eq!(window, ByteWindow { start: 0, end: 10 });
            }
            _ => panic!("expected window"),
        }
    }

    #[test]
    fn sub_range_and_suffix_forms_resolve() {
        match parse_range("bytes=2-4", 11) {
            RangeOutcome::Window(window) => {
                assert_eq!(window, ByteWindow { start: 2, end: 4 });
            }
            _ => panic!("expected window"),
        }
        match parse_range("bytes=6-", 11) {
            RangeOutcome::Window(window) => {
                assert_eq!(window, ByteWindow { start: 6, end: 10 });
            }
            _ => panic!("expected window"),
        }
        match parse_range("bytes=-3", 11) {
            RangeOutcome::Window(window) => {
                assert_eq!(window, ByteWindow { start: 8, end: 10 });
            }
            _ => panic!("expected window"),
        }
    }

    #[test]
    fn end_past_extent_is_clamped() {
        match parse_range("bytes=5-500", 11) {
            RangeOutcome::Window(window) => {
                assert_eq!(window, ByteWindow { start: 5, end: 10 });
            }
            _ => panic!("expected window"),
        }
    }

    #[test]
    fn out_of_bounds_start_is_unsatisfiable() {
        assert!(matches!(
            parse_range("bytes=11-", 11),
            RangeOutcome::Unsatisfiable
        ));
        assert!(matches!(
            parse_range("bytes=7-3", 11),
            RangeOutcome::Unsatisfiable
        ));
    }

    #[test]
    fn malformed_and_multi_ranges_are_ignored() {
        assert!(matches!(parse_range("items=0-4", 11), RangeOutcome::Ignored));
        assert!(matches!(
            parse_range("bytes=0-2,4-6", 11),
            RangeOutcome::Ignored
        ));
        assert!(matches!(parse_range("bytes=a-b", 11), RangeOutcome::Ignored));
    }

    #[test]
    fn if_none_match_accepts_quoted_weak_and_star() {
        let checksum = "b94d27b9";
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            format!("\"{checksum}\"").parse().expect("header"),
        );
        assert!(if_none_match_matches(&headers, checksum));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            format!("W/\"{checksum}\"").parse().expect("header"),
        );
        assert!(if_none_match_matches(&headers, checksum));

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, "\"other\"".parse().expect("header"));
        assert!(!if_none_match_matches(&headers, checksum));
    }
}
