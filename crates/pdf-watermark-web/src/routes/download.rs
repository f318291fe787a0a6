//! Streaming the finished bundle back to the client.

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use pdf_watermark_core::OutputBundle;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::helpers::{ResultExt, RouteResult};
use crate::session_store::RetireGuard;

/// Read size for streamed responses.
const CHUNK_SIZE: usize = 64 * 1024;

/// Stream a bundle from disk.
///
/// The guard travels with the body; once the body is dropped (fully sent or
/// the client disconnected) the session directory is scheduled for removal.
#[allow(tail_expr_drop_order)] // Drop order change in async_stream macro is harmless here
pub async fn stream_bundle(bundle: &OutputBundle, guard: RetireGuard) -> RouteResult<Response> {
    let mut file = tokio::fs::File::open(bundle.path()).await.or_internal_error()?;
    let length = file.metadata().await.or_internal_error()?.len();

    debug!("Streaming {} ({} bytes)", bundle.file_name(), length);

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield Ok::<Bytes, std::io::Error>(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, bundle.content_type())
        .header(header::CONTENT_DISPOSITION, bundle.content_disposition())
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(stream))
        .or_internal_error()
}
