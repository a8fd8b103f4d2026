use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Pinned Uppy release served from the Transloadit CDN.
pub const DEFAULT_ASSET_BASE: &str = "https://releases.transloadit.com/uppy/v3.27.1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("upload directory {path} is not usable: {source}")]
    UploadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Server-side configuration for the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bind host (default: "127.0.0.1")
    pub host: String,

    /// Bind port (default: 3000)
    pub port: u16,

    /// Directory receiving materialized files (default: <tmp>/uppy-bridge)
    pub upload_dir: PathBuf,

    /// Timeout for fetching files from the tus server (default: 300s)
    pub fetch_timeout_secs: u64,

    /// Largest file accepted by the materializer in bytes (default: 1 GB)
    pub max_file_size: u64,

    /// Base URL of the vendored Uppy bundle
    pub asset_base_url: String,

    /// tus endpoint, enables remote mode for the default widget
    pub tus_endpoint: Option<String>,

    /// Companion proxy, enables cloud sources for the default widget
    pub companion_url: Option<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Input id of the widget registered by the binary
    pub default_input_id: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            upload_dir: env::temp_dir().join("uppy-bridge"),
            fetch_timeout_secs: 300,
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            asset_base_url: DEFAULT_ASSET_BASE.to_string(),
            tus_endpoint: None,
            companion_url: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            default_input_id: "files".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: env::var("BRIDGE_HOST").unwrap_or(default.host),

            port: env::var("BRIDGE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            fetch_timeout_secs: env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.fetch_timeout_secs),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            asset_base_url: env::var("UPPY_ASSET_BASE").unwrap_or(default.asset_base_url),

            tus_endpoint: env::var("TUS_ENDPOINT").ok().filter(|v| !v.is_empty()),
            companion_url: env::var("COMPANION_URL").ok().filter(|v| !v.is_empty()),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),

            default_input_id: env::var("DEFAULT_INPUT_ID").unwrap_or(default.default_input_id),
        }
    }

    /// Config for local development and tests: short timeout, small files
    pub fn development() -> Self {
        Self {
            fetch_timeout_secs: 30,
            max_file_size: 64 * 1024 * 1024,
            ..Self::default()
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Checks every setting that would otherwise only fail on first use.
    /// Creates the upload directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "FETCH_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_FILE_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }

        check_http_url("UPPY_ASSET_BASE", &self.asset_base_url)?;
        if let Some(endpoint) = &self.tus_endpoint {
            check_http_url("TUS_ENDPOINT", endpoint)?;
        }
        if let Some(companion) = &self.companion_url {
            check_http_url("COMPANION_URL", companion)?;
        }

        std::fs::create_dir_all(&self.upload_dir).map_err(|source| ConfigError::UploadDir {
            path: self.upload_dir.clone(),
            source,
        })?;

        Ok(())
    }
}

fn check_http_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("'{}' is not a URL: {}", value, e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
