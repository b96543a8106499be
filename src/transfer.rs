//! Response body construction: in-memory transcoding or chunked streaming.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::encoding::transcode_to_utf8;
use crate::error::ServerError;
use crate::renderer::{Disposition, FileDeliveryPlan};

/// Disk read size for streamed transfers.
const STREAM_CHUNK_SIZE: usize = 8192;

/// Sends one file according to its delivery plan.
///
/// Inline text is read fully into memory so it can be transcoded to UTF-8
/// when the plan asks for it. Everything else streams straight from disk in
/// fixed-size chunks with the original bytes untouched. Content-Length is
/// always the byte count actually transmitted.
pub async fn deliver(path: &Path, plan: &FileDeliveryPlan) -> Result<Response, ServerError> {
    match plan.disposition {
        Disposition::Inline => {
            let raw = fs::read(path).await?;
            let body = match &plan.transcode_from {
                Some(guess) => {
                    debug!(
                        encoding = %guess.name,
                        confidence = guess.confidence,
                        "transcoding inline text to utf-8"
                    );
                    transcode_to_utf8(raw, guess)
                }
                None => raw,
            };

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, plan.content_type.clone()),
                    (header::CONTENT_LENGTH, body.len().to_string()),
                ],
                body,
            )
                .into_response())
        }
        Disposition::Attachment => {
            let file = fs::File::open(path).await?;
            let stream = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE);
            let body = Body::from_stream(stream);

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, plan.content_type.clone()),
                    (header::CONTENT_LENGTH, plan.size_bytes.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!(
                            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                            plan.filename_primary, plan.filename_encoded
                        ),
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}
