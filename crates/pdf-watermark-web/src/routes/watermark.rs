//! Watermark route - multipart upload, sequential compositing, packaged reply.

use axum::{extract::State, response::Response};
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::MultipartRejection;
use bytes::Bytes;
use pdf_watermark_core::{
    Appearance, Error as CoreError, OutputBundle, WatermarkRequest, package, parse_phrases,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::download::stream_bundle;
use crate::helpers::{ApiError, RouteResult};
use crate::session_store::{RetireGuard, Session, SessionState};
use crate::state::AppState;

const PDF_MIME: &str = "application/pdf";

/// Name of the uploaded source inside the session directory.
const SOURCE_FILE: &str = "source.pdf";

/// Per-phrase outputs live here so no phrase can clobber the source.
const OUTPUT_DIR: &str = "output";

/// The uploaded file part.
struct UploadedFile {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Bytes,
}

impl UploadedFile {
    /// Declared content type without parameters, or the one guessed from
    /// the file name.
    fn mime(&self) -> Option<String> {
        let declared = self
            .content_type
            .as_deref()
            .and_then(|m| m.split(';').next())
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        declared.or_else(|| {
            self.file_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|m| m.essence_str().to_string())
        })
    }
}

/// Raw multipart fields, before validation.
#[derive(Default)]
struct UploadForm {
    pdf: Option<UploadedFile>,
    phrases: Option<String>,
    font_size: Option<String>,
    angle: Option<String>,
    opacity: Option<String>,
    pos_x: Option<String>,
    pos_y: Option<String>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> RouteResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "pdf" | "file" => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    form.pdf = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                "watermarks" | "phrases" => form.phrases = Some(field.text().await?),
                "fontSize" => form.font_size = Some(field.text().await?),
                "angle" => form.angle = Some(field.text().await?),
                "opacity" => form.opacity = Some(field.text().await?),
                "posX" => form.pos_x = Some(field.text().await?),
                "posY" => form.pos_y = Some(field.text().await?),
                _ => {}
            }
        }

        Ok(form)
    }

    fn into_request(self) -> RouteResult<WatermarkRequest> {
        let pdf = self
            .pdf
            .ok_or_else(|| ApiError::bad_request("A PDF file is required"))?;

        let is_pdf_mime = pdf
            .mime()
            .is_some_and(|m| m.eq_ignore_ascii_case(PDF_MIME));
        if !is_pdf_mime {
            return Err(CoreError::NotPdf.into());
        }

        let appearance = Appearance::from_fields(
            self.font_size.as_deref(),
            self.angle.as_deref(),
            self.opacity.as_deref(),
            self.pos_x.as_deref(),
            self.pos_y.as_deref(),
        );
        let phrases = parse_phrases(self.phrases.as_deref().unwrap_or_default());

        Ok(WatermarkRequest::new(pdf.bytes, phrases, appearance)?)
    }
}

/// Watermark an uploaded PDF once per phrase.
///
/// Replies with the PDF itself for one phrase, or a ZIP of all results.
pub async fn watermark_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> RouteResult<Response> {
    let mut multipart = multipart?;
    let request = UploadForm::read(&mut multipart).await?.into_request()?;

    let session = state
        .sessions
        .create()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to create session: {e}")))?;

    info!(
        "Session {}: {} bytes, {} phrase(s)",
        session.id,
        request.source().len(),
        request.effective_phrase_count()
    );

    // Covers the future being dropped mid-pipeline (client gone)
    let guard = RetireGuard::new(
        Arc::clone(&state.sessions),
        session.id.clone(),
        Duration::ZERO,
    );

    let bundle = match populate(&state, &session, &request).await {
        Ok(bundle) => bundle,
        Err(e) => {
            error!("Session {} failed: {}", session.id, e);
            state.sessions.retire(&session.id).await;
            guard.disarm();
            return Err(e.into());
        }
    };

    state
        .sessions
        .set_state(&session.id, SessionState::Streaming)
        .await;
    let guard = guard.with_delay(state.cleanup_delay());

    match stream_bundle(&bundle, guard).await {
        Ok(response) => {
            info!("Session {}: sending {}", session.id, bundle.file_name());
            Ok(response)
        }
        Err(e) => {
            state.sessions.retire(&session.id).await;
            Err(e)
        }
    }
}

/// Write the source, run every phrase, and package the results.
async fn populate(
    state: &AppState,
    session: &Session,
    request: &WatermarkRequest,
) -> Result<OutputBundle, CoreError> {
    state
        .sessions
        .set_state(&session.id, SessionState::Populating)
        .await;

    tokio::fs::write(session.dir.join(SOURCE_FILE), request.source()).await?;

    let output_dir = session.dir.join(OUTPUT_DIR);
    tokio::fs::create_dir_all(&output_dir).await?;

    let outputs = state.pipeline.run(request, &output_dir).await?;

    let work_dir = session.dir.clone();
    tokio::task::spawn_blocking(move || package(&outputs, &work_dir))
        .await
        .map_err(|e| CoreError::Archive(format!("Packaging task failed: {e}")))?
}
