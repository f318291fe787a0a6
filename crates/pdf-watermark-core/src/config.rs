use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Which compositor backend stamps overlays onto source documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositorBackend {
    /// Remote PDF-services style API (requires credentials)
    #[default]
    Remote,
    /// In-process lopdf merge, no network access
    Local,
}

impl std::fmt::Display for CompositorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Compositor configuration.
///
/// Credentials for the remote backend are normally supplied through the
/// environment rather than the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    #[serde(default)]
    pub backend: CompositorBackend,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Delay between job status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout for each individual HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://pdf-services.adobe.io".to_string()
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_request_timeout_secs() -> u64 {
    60
}

impl CompositorConfig {
    /// Configuration for the in-process backend.
    pub fn local() -> Self {
        Self {
            backend: CompositorBackend::Local,
            ..Default::default()
        }
    }

    /// Configuration for the remote backend with the given credentials.
    pub fn remote(
        api_base: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            backend: CompositorBackend::Remote,
            api_base: api_base.into(),
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Default::default()
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            backend: CompositorBackend::default(),
            api_base: default_api_base(),
            client_id: None,
            client_secret: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for one compositor call, in seconds (0 = unbounded)
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

const fn default_job_timeout_secs() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

/// Session directory lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Root for per-request working directories (defaults to $TMPDIR/pdf-watermark)
    pub root: Option<PathBuf>,
    /// Delay between the end of a response and removal of its directory
    #[serde(default = "default_cleanup_delay_secs")]
    pub cleanup_delay_secs: u64,
    /// Anything under the root older than this is swept
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// How often the sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_cleanup_delay_secs() -> u64 {
    5
}

const fn default_retention_secs() -> u64 {
    3600
}

const fn default_sweep_interval_secs() -> u64 {
    600
}

impl SessionConfig {
    /// Resolved session root.
    pub fn root_dir(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pdf-watermark"))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root: None,
            cleanup_delay_secs: default_cleanup_delay_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_upload_mb() -> usize {
    50
}

impl ServerConfig {
    pub const fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub compositor: CompositorConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub sessions: SessionConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/pdf-watermark/config.toml, ./config.toml)
    pub fn load() -> Self {
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("pdf-watermark").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Reject values that would make the service misbehave silently.
    pub fn validate(&self) -> Result<(), Error> {
        if self.compositor.poll_interval_ms == 0 {
            return Err(Error::ConfigInvalid {
                field: "compositor.poll_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.server.max_upload_mb == 0 {
            return Err(Error::ConfigInvalid {
                field: "server.max_upload_mb".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sessions.retention_secs == 0 {
            return Err(Error::ConfigInvalid {
                field: "sessions.retention_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
