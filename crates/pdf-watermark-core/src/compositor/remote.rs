use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::{Compositor, CompositorInfo};
use crate::config::CompositorConfig;
use crate::error::{Error, Result};
use crate::pdf::OverlayDocument;
use crate::request::Appearance;

/// Tokens are refreshed this long before the service says they expire.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Fallback lifetime when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Client for a PDF-services style REST API.
///
/// One `composite` call runs the whole job lifecycle:
/// 1. `POST /token` with client credentials (cached between calls)
/// 2. `POST /assets` + `PUT <uploadUri>` for the source and the overlay
/// 3. `POST /operation/addwatermark` returning a job `Location`
/// 4. `GET <Location>` until the job is `done` or `failed`
/// 5. `GET <downloadUri>` for the stamped document
///
/// Nothing is retried: every failure is surfaced to the caller.
pub struct RemoteCompositor {
    client: Client,
    /// Base URL for the API (e.g., "https://pdf-services.adobe.io")
    api_base: String,
    client_id: String,
    client_secret: String,
    /// Delay between job status polls
    poll_interval: Duration,
    request_timeout_secs: u64,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetRequest<'a> {
    media_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    #[serde(rename = "uploadUri")]
    upload_uri: String,
    #[serde(rename = "assetID")]
    asset_id: String,
}

#[derive(Debug, Serialize)]
struct WatermarkJob<'a> {
    #[serde(rename = "inputDocumentAssetID")]
    input_document_asset_id: &'a str,
    #[serde(rename = "watermarkDocumentAssetID")]
    watermark_document_asset_id: &'a str,
    appearance: JobAppearance,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobAppearance {
    /// Percentage, 0-100
    opacity: u8,
    appear_on_foreground: bool,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    asset: Option<JobAsset>,
    #[serde(default)]
    error: Option<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobAsset {
    #[serde(rename = "downloadUri")]
    download_uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<u16>,
}

impl RemoteCompositor {
    /// Create a remote compositor from configuration.
    ///
    /// Fails when credentials are missing or the HTTP client cannot be built.
    pub fn new(config: &CompositorConfig) -> Result<Self> {
        let (Some(client_id), Some(client_secret)) =
            (config.client_id.clone(), config.client_secret.clone())
        else {
            return Err(Error::CompositorMissingCredentials);
        };

        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(Error::CompositorMissingCredentials);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::CompositorTransfer(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            request_timeout_secs: config.request_timeout_secs,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Get a bearer token, reusing the cached one while it is still fresh.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        debug!("Requesting compositor access token");

        let response = self
            .client
            .post(self.url("token"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let response = check_status(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::CompositorAuth(format!("Invalid token response: {e}")))?;

        let lifetime = token
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .saturating_sub(TOKEN_REFRESH_MARGIN_SECS);

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        Ok(token.access_token)
    }

    /// Register an asset and upload its bytes. Returns the asset id.
    async fn upload_asset(&self, token: &str, bytes: &[u8]) -> Result<String> {
        let response = self
            .client
            .post(self.url("assets"))
            .bearer_auth(token)
            .header("x-api-key", &self.client_id)
            .json(&AssetRequest {
                media_type: PDF_MEDIA_TYPE,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let asset: AssetResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::CompositorTransfer(format!("Invalid asset response: {e}")))?;

        debug!("Uploading {} bytes as asset {}", bytes.len(), asset.asset_id);

        let response = self
            .client
            .put(&asset.upload_uri)
            .header(reqwest::header::CONTENT_TYPE, PDF_MEDIA_TYPE)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        check_status(response).await?;

        Ok(asset.asset_id)
    }

    /// Submit the watermark job. Returns the job status URL.
    async fn submit_job(
        &self,
        token: &str,
        source_id: &str,
        overlay_id: &str,
        appearance: &Appearance,
    ) -> Result<String> {
        let job = WatermarkJob {
            input_document_asset_id: source_id,
            watermark_document_asset_id: overlay_id,
            appearance: JobAppearance {
                opacity: opacity_percent(appearance.opacity),
                appear_on_foreground: false,
            },
        };

        let response = self
            .client
            .post(self.url("operation/addwatermark"))
            .bearer_auth(token)
            .header("x-api-key", &self.client_id)
            .json(&job)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let response = check_status(response).await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::CompositorInvalidJob("job accepted without a Location header".to_string())
            })
    }

    /// Poll the job until it resolves. Returns the result download URL.
    async fn wait_for_job(&self, token: &str, location: &str) -> Result<String> {
        let mut polls = 0u32;

        loop {
            polls += 1;
            let response = self
                .client
                .get(location)
                .bearer_auth(token)
                .header("x-api-key", &self.client_id)
                .send()
                .await
                .map_err(|e| self.transport_error(&e))?;

            let status: JobStatus = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| Error::CompositorTransfer(format!("Invalid job status: {e}")))?;

            match status.status.to_ascii_lowercase().as_str() {
                "done" => {
                    debug!("Watermark job finished after {} polls", polls);
                    return status.asset.map(|a| a.download_uri).ok_or_else(|| {
                        Error::CompositorTransfer("job finished without a result asset".to_string())
                    });
                }
                "failed" => {
                    let error = status.error.unwrap_or_default();
                    warn!("Watermark job failed: {:?}", error);
                    return Err(job_error(error));
                }
                other => {
                    debug!("Watermark job status '{}' (poll {})", other, polls);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;

        Ok(bytes.to_vec())
    }

    async fn run_job(
        &self,
        source: &[u8],
        overlay: &OverlayDocument,
        appearance: &Appearance,
    ) -> Result<Vec<u8>> {
        let token = self.access_token().await?;
        let source_id = self.upload_asset(&token, source).await?;
        let overlay_id = self.upload_asset(&token, &overlay.bytes).await?;
        let location = self
            .submit_job(&token, &source_id, &overlay_id, appearance)
            .await?;
        let download_uri = self.wait_for_job(&token, &location).await?;
        self.download(&download_uri).await
    }

    fn transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::CompositorTimeout(self.request_timeout_secs)
        } else {
            Error::CompositorTransfer(e.to_string())
        }
    }
}

#[async_trait]
impl Compositor for RemoteCompositor {
    fn info(&self) -> CompositorInfo {
        CompositorInfo {
            name: "PDF Services",
            remote: true,
            requires_credentials: true,
        }
    }

    async fn composite(
        &self,
        source: &[u8],
        overlay: &OverlayDocument,
        appearance: &Appearance,
    ) -> Result<Vec<u8>> {
        let result = self.run_job(source, overlay, appearance).await;

        match &result {
            Ok(bytes) => info!(
                "Remote watermark for '{}' complete ({} bytes)",
                overlay.phrase,
                bytes.len()
            ),
            // Force a fresh token next time in case ours was revoked.
            Err(Error::CompositorAuth(_)) => {
                self.token.lock().await.take();
            }
            Err(_) => {}
        }

        result
    }
}

/// Pass successful responses through; turn the rest into typed errors.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    let body = response.text().await.unwrap_or_default();

    Err(status_error(status, retry_after, &body))
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> Error {
    let detail = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.trim())
    };

    match status.as_u16() {
        401 | 403 => Error::CompositorAuth(detail),
        429 => Error::CompositorQuota { retry_after },
        400 | 413 | 415 | 422 => Error::CompositorInvalidJob(detail),
        _ => Error::CompositorTransfer(detail),
    }
}

fn job_error(error: JobError) -> Error {
    let code = error.code.unwrap_or_default();
    let message = error.message.unwrap_or_else(|| "no details".to_string());
    let upper = code.to_ascii_uppercase();

    if upper.contains("QUOTA") || upper.contains("USAGE") {
        return Error::CompositorQuota { retry_after: None };
    }

    match error.status {
        Some(400 | 415 | 422) => Error::CompositorInvalidJob(format!("{code}: {message}")),
        _ if code.is_empty() => Error::CompositorJobFailed(message),
        _ => Error::CompositorJobFailed(format!("{code}: {message}")),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn opacity_percent(opacity: f32) -> u8 {
    // Clamped to 0..=100 first, so the cast cannot truncate
    (opacity.clamp(0.0, 1.0) * 100.0).round() as u8
}
