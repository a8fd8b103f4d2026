//! Typed configuration of the Uppy dashboard widget.
//!
//! Every option the widget understands is a field here, checked once in
//! [`UppyConfigBuilder::build`]. Rendering never fails on a built config.

pub mod render;

use crate::utils::validation::is_file_type_pattern;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;
use validator::Validate;

#[derive(Debug, Error)]
pub enum WidgetConfigError {
    #[error("invalid input id '{0}': must start with a letter and contain only letters, digits, '-' or '_'")]
    InvalidInputId(String),

    #[error("invalid option values: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("invalid restrictions: {0}")]
    Restrictions(String),

    #[error("invalid dashboard options: {0}")]
    Dashboard(String),

    #[error("invalid tus options: {0}")]
    Tus(String),

    #[error("sources {0:?} need a companion URL")]
    MissingCompanion(Vec<&'static str>),

    #[error("invalid {option} URL '{value}': {reason}")]
    InvalidUrl {
        option: &'static str,
        value: String,
        reason: String,
    },
}

/// Client-side limits enforced by the widget before anything is uploaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Restrictions {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "must be positive"))]
    pub max_file_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_file_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "must be positive"))]
    pub max_total_file_size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "must be positive"))]
    pub max_number_of_files: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "must be positive"))]
    pub min_number_of_files: Option<u32>,

    /// `image/*`, `application/pdf` or `.csv`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_file_types: Option<Vec<String>>,
}

impl Restrictions {
    fn check(&self) -> Result<(), WidgetConfigError> {
        self.validate()?;

        if let (Some(min), Some(max)) = (self.min_file_size, self.max_file_size)
            && min > max
        {
            return Err(WidgetConfigError::Restrictions(format!(
                "minFileSize {} is above maxFileSize {}",
                min, max
            )));
        }
        if let (Some(min), Some(max)) = (self.min_number_of_files, self.max_number_of_files)
            && min > max
        {
            return Err(WidgetConfigError::Restrictions(format!(
                "minNumberOfFiles {} is above maxNumberOfFiles {}",
                min, max
            )));
        }
        if let (Some(file), Some(total)) = (self.max_file_size, self.max_total_file_size)
            && file > total
        {
            return Err(WidgetConfigError::Restrictions(format!(
                "maxFileSize {} is above maxTotalFileSize {}",
                file, total
            )));
        }
        if let Some(types) = &self.allowed_file_types {
            if types.is_empty() {
                return Err(WidgetConfigError::Restrictions(
                    "allowedFileTypes is empty, no file could be added".to_string(),
                ));
            }
            if let Some(bad) = types.iter().find(|t| !is_file_type_pattern(t)) {
                return Err(WidgetConfigError::Restrictions(format!(
                    "'{}' is neither a MIME type pattern nor an extension",
                    bad
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

/// Appearance of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOptions {
    /// Render in the page instead of a modal behind a trigger button
    pub inline: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 100, max = 10000, message = "must be between 100 and 10000 pixels"))]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 100, max = 10000, message = "must be between 100 and 10000 pixels"))]
    pub height: Option<u32>,

    pub theme: Theme,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub note: Option<String>,

    pub show_progress_details: bool,
    pub hide_upload_button: bool,
    pub proudly_display_powered_by_uppy: bool,

    /// Modal only
    pub close_after_finish: bool,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            inline: true,
            width: None,
            height: Some(470),
            theme: Theme::Light,
            note: None,
            show_progress_details: true,
            hide_upload_button: false,
            proudly_display_powered_by_uppy: false,
            close_after_finish: false,
        }
    }
}

impl DashboardOptions {
    fn check(&self) -> Result<(), WidgetConfigError> {
        self.validate()?;
        if self.inline && self.close_after_finish {
            return Err(WidgetConfigError::Dashboard(
                "closeAfterFinish only applies to the modal dashboard (inline: false)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Acquirer plugins shown next to the local file picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Source {
    Webcam,
    ScreenCapture,
    Url,
    GoogleDrive,
    Dropbox,
    OneDrive,
    Box,
    Instagram,
    Facebook,
    Unsplash,
}

impl Source {
    pub fn plugin_name(self) -> &'static str {
        match self {
            Source::Webcam => "Webcam",
            Source::ScreenCapture => "ScreenCapture",
            Source::Url => "Url",
            Source::GoogleDrive => "GoogleDrive",
            Source::Dropbox => "Dropbox",
            Source::OneDrive => "OneDrive",
            Source::Box => "Box",
            Source::Instagram => "Instagram",
            Source::Facebook => "Facebook",
            Source::Unsplash => "Unsplash",
        }
    }

    /// Remote sources are proxied through Companion.
    pub fn needs_companion(self) -> bool {
        !matches!(self, Source::Webcam | Source::ScreenCapture)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanionOptions {
    pub url: Url,
    /// Passed verbatim as `companionAllowedHosts`
    pub allowed_hosts: Option<String>,
}

/// How file bytes reach the application server.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadMode {
    /// base64 `data:` URLs inside the batch
    Inline,
    /// Resumable upload to a tus server; only the upload URL is sent
    Tus {
        endpoint: Url,
        chunk_size: Option<u64>,
        retry_delays: Vec<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UppyConfig {
    input_id: String,
    auto_proceed: bool,
    allow_multiple_upload_batches: bool,
    restrictions: Restrictions,
    dashboard: DashboardOptions,
    sources: Vec<Source>,
    companion: Option<CompanionOptions>,
    upload_mode: UploadMode,
    locale: BTreeMap<String, String>,
}

impl UppyConfig {
    pub fn builder(input_id: impl Into<String>) -> UppyConfigBuilder {
        UppyConfigBuilder::new(input_id)
    }

    pub fn input_id(&self) -> &str {
        &self.input_id
    }

    pub fn upload_mode(&self) -> &UploadMode {
        &self.upload_mode
    }

    pub fn restrictions(&self) -> &Restrictions {
        &self.restrictions
    }

    pub fn dashboard(&self) -> &DashboardOptions {
        &self.dashboard
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Options object consumed by `attachUppyBridge`.
    pub fn to_options_json(&self) -> Value {
        let plugins: Vec<Value> = self
            .sources
            .iter()
            .map(|source| {
                let mut plugin = json!({ "name": source.plugin_name() });
                if source.needs_companion()
                    && let Some(companion) = &self.companion
                {
                    plugin["companionUrl"] = json!(companion.url.as_str());
                    if let Some(hosts) = &companion.allowed_hosts {
                        plugin["companionAllowedHosts"] = json!(hosts);
                    }
                }
                plugin
            })
            .collect();

        let upload = match &self.upload_mode {
            UploadMode::Inline => json!({ "mode": "inline" }),
            UploadMode::Tus {
                endpoint,
                chunk_size,
                retry_delays,
            } => {
                let mut tus = json!({ "mode": "tus", "endpoint": endpoint.as_str() });
                if let Some(chunk_size) = chunk_size {
                    tus["chunkSize"] = json!(chunk_size);
                }
                if !retry_delays.is_empty() {
                    tus["retryDelays"] = json!(retry_delays);
                }
                tus
            }
        };

        json!({
            "id": self.input_id,
            "autoProceed": self.auto_proceed,
            "allowMultipleUploadBatches": self.allow_multiple_upload_batches,
            "restrictions": self.restrictions,
            "dashboard": self.dashboard,
            "plugins": plugins,
            "upload": upload,
            "locale": { "strings": self.locale },
        })
    }
}

/// Collects widget options; [`build`](Self::build) validates them all at once.
#[derive(Debug, Clone)]
pub struct UppyConfigBuilder {
    input_id: String,
    auto_proceed: bool,
    allow_multiple_upload_batches: bool,
    restrictions: Restrictions,
    dashboard: DashboardOptions,
    sources: Vec<Source>,
    companion_url: Option<String>,
    companion_allowed_hosts: Option<String>,
    tus_endpoint: Option<String>,
    tus_chunk_size: Option<u64>,
    tus_retry_delays: Vec<u64>,
    locale: BTreeMap<String, String>,
}

impl UppyConfigBuilder {
    pub fn new(input_id: impl Into<String>) -> Self {
        Self {
            input_id: input_id.into(),
            auto_proceed: false,
            allow_multiple_upload_batches: true,
            restrictions: Restrictions::default(),
            dashboard: DashboardOptions::default(),
            sources: Vec::new(),
            companion_url: None,
            companion_allowed_hosts: None,
            tus_endpoint: None,
            tus_chunk_size: None,
            tus_retry_delays: Vec::new(),
            locale: BTreeMap::new(),
        }
    }

    /// Start uploading as soon as files are added. Results are still
    /// delivered once per batch.
    pub fn auto_proceed(mut self, enabled: bool) -> Self {
        self.auto_proceed = enabled;
        self
    }

    pub fn allow_multiple_upload_batches(mut self, enabled: bool) -> Self {
        self.allow_multiple_upload_batches = enabled;
        self
    }

    pub fn restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn dashboard(mut self, dashboard: DashboardOptions) -> Self {
        self.dashboard = dashboard;
        self
    }

    pub fn source(mut self, source: Source) -> Self {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
        self
    }

    pub fn companion(mut self, url: impl Into<String>) -> Self {
        self.companion_url = Some(url.into());
        self
    }

    pub fn companion_allowed_hosts(mut self, pattern: impl Into<String>) -> Self {
        self.companion_allowed_hosts = Some(pattern.into());
        self
    }

    /// Switches to remote mode with the given tus endpoint.
    pub fn tus(mut self, endpoint: impl Into<String>) -> Self {
        self.tus_endpoint = Some(endpoint.into());
        self
    }

    pub fn tus_chunk_size(mut self, bytes: u64) -> Self {
        self.tus_chunk_size = Some(bytes);
        self
    }

    pub fn tus_retry_delays(mut self, delays_ms: Vec<u64>) -> Self {
        self.tus_retry_delays = delays_ms;
        self
    }

    /// Overrides one of the widget's locale strings.
    pub fn locale_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.locale.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<UppyConfig, WidgetConfigError> {
        if !is_valid_input_id(&self.input_id) {
            return Err(WidgetConfigError::InvalidInputId(self.input_id));
        }

        self.restrictions.check()?;
        self.dashboard.check()?;

        let companion = match self.companion_url {
            Some(url) => Some(CompanionOptions {
                url: parse_http_url("companion", &url)?,
                allowed_hosts: self.companion_allowed_hosts,
            }),
            None => None,
        };

        let orphans: Vec<&'static str> = self
            .sources
            .iter()
            .filter(|s| s.needs_companion())
            .map(|s| s.plugin_name())
            .collect();
        if companion.is_none() && !orphans.is_empty() {
            return Err(WidgetConfigError::MissingCompanion(orphans));
        }

        let upload_mode = match self.tus_endpoint {
            Some(endpoint) => {
                if self.tus_chunk_size == Some(0) {
                    return Err(WidgetConfigError::Tus(
                        "chunk size must be positive".to_string(),
                    ));
                }
                UploadMode::Tus {
                    endpoint: parse_http_url("tus endpoint", &endpoint)?,
                    chunk_size: self.tus_chunk_size,
                    retry_delays: self.tus_retry_delays,
                }
            }
            None => UploadMode::Inline,
        };

        // Companion sources only work with tus
        if matches!(upload_mode, UploadMode::Inline) && !orphans.is_empty() {
            return Err(WidgetConfigError::Tus(format!(
                "sources {:?} need tus mode",
                orphans
            )));
        }

        Ok(UppyConfig {
            input_id: self.input_id,
            auto_proceed: self.auto_proceed,
            allow_multiple_upload_batches: self.allow_multiple_upload_batches,
            restrictions: self.restrictions,
            dashboard: self.dashboard,
            sources: self.sources,
            companion,
            upload_mode,
            locale: self.locale,
        })
    }
}

pub fn is_valid_input_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && id.len() <= 128
}

fn parse_http_url(option: &'static str, value: &str) -> Result<Url, WidgetConfigError> {
    let url = Url::parse(value).map_err(|e| WidgetConfigError::InvalidUrl {
        option,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(WidgetConfigError::InvalidUrl {
            option,
            value: value.to_string(),
            reason: "must be http or https".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_is_inline() {
        let config = UppyConfig::builder("files").build().unwrap();
        assert_eq!(config.upload_mode(), &UploadMode::Inline);

        let options = config.to_options_json();
        assert_eq!(options["id"], "files");
        assert_eq!(options["upload"]["mode"], "inline");
        assert_eq!(options["dashboard"]["inline"], true);
        assert_eq!(options["restrictions"], json!({}));
    }

    #[test]
    fn test_input_id_is_checked() {
        for bad in ["", "1files", "my files", "a\"><script>"] {
            assert!(matches!(
                UppyConfig::builder(bad).build(),
                Err(WidgetConfigError::InvalidInputId(_))
            ));
        }
        assert!(UppyConfig::builder("upload_1-a").build().is_ok());
    }

    #[test]
    fn test_restrictions_are_serialized_camel_case() {
        let config = UppyConfig::builder("files")
            .restrictions(Restrictions {
                max_file_size: Some(10 * 1024 * 1024),
                max_number_of_files: Some(3),
                allowed_file_types: Some(vec!["image/*".into(), ".pdf".into()]),
                ..Restrictions::default()
            })
            .build()
            .unwrap();

        let restrictions = &config.to_options_json()["restrictions"];
        assert_eq!(restrictions["maxFileSize"], 10 * 1024 * 1024);
        assert_eq!(restrictions["maxNumberOfFiles"], 3);
        assert_eq!(restrictions["allowedFileTypes"], json!(["image/*", ".pdf"]));
        assert!(restrictions.get("minFileSize").is_none());
    }

    #[test]
    fn test_inconsistent_restrictions_fail() {
        let result = UppyConfig::builder("files")
            .restrictions(Restrictions {
                min_number_of_files: Some(5),
                max_number_of_files: Some(2),
                ..Restrictions::default()
            })
            .build();
        assert!(matches!(result, Err(WidgetConfigError::Restrictions(_))));

        let result = UppyConfig::builder("files")
            .restrictions(Restrictions {
                max_number_of_files: Some(0),
                ..Restrictions::default()
            })
            .build();
        assert!(matches!(result, Err(WidgetConfigError::Invalid(_))));

        let result = UppyConfig::builder("files")
            .restrictions(Restrictions {
                allowed_file_types: Some(vec!["pdf".into()]),
                ..Restrictions::default()
            })
            .build();
        assert!(matches!(result, Err(WidgetConfigError::Restrictions(_))));
    }

    #[test]
    fn test_close_after_finish_requires_modal() {
        let result = UppyConfig::builder("files")
            .dashboard(DashboardOptions {
                close_after_finish: true,
                ..DashboardOptions::default()
            })
            .build();
        assert!(matches!(result, Err(WidgetConfigError::Dashboard(_))));

        let result = UppyConfig::builder("files")
            .dashboard(DashboardOptions {
                inline: false,
                close_after_finish: true,
                ..DashboardOptions::default()
            })
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_cloud_sources_need_companion() {
        let result = UppyConfig::builder("files")
            .source(Source::Webcam)
            .source(Source::GoogleDrive)
            .build();
        match result {
            Err(WidgetConfigError::MissingCompanion(sources)) => {
                assert_eq!(sources, vec!["GoogleDrive"])
            }
            other => panic!("expected MissingCompanion, got {:?}", other),
        }

        let config = UppyConfig::builder("files")
            .source(Source::Webcam)
            .source(Source::GoogleDrive)
            .companion("https://companion.example.com")
            .companion_allowed_hosts("\\.example\\.com$")
            .tus("https://tus.example.com/files/")
            .build()
            .unwrap();
        let plugins = &config.to_options_json()["plugins"];
        assert_eq!(plugins[0], json!({"name": "Webcam"}));
        assert_eq!(plugins[1]["name"], "GoogleDrive");
        assert_eq!(plugins[1]["companionUrl"], "https://companion.example.com/");
        assert_eq!(plugins[1]["companionAllowedHosts"], "\\.example\\.com$");
    }

    #[test]
    fn test_cloud_sources_need_tus_mode() {
        let result = UppyConfig::builder("files")
            .source(Source::GoogleDrive)
            .companion("https://c.example.com")
            .build();
        match result {
            Err(WidgetConfigError::Tus(reason)) => assert!(reason.contains("GoogleDrive")),
            other => panic!("expected Tus error, got {:?}", other),
        }

        // Local sources are fine inline
        let result = UppyConfig::builder("files")
            .source(Source::Webcam)
            .source(Source::ScreenCapture)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_tus_mode() {
        let config = UppyConfig::builder("files")
            .tus("https://tus.example.com/files/")
            .tus_chunk_size(5 * 1024 * 1024)
            .tus_retry_delays(vec![0, 1000, 3000])
            .build()
            .unwrap();
        let upload = &config.to_options_json()["upload"];
        assert_eq!(upload["mode"], "tus");
        assert_eq!(upload["endpoint"], "https://tus.example.com/files/");
        assert_eq!(upload["chunkSize"], 5 * 1024 * 1024);
        assert_eq!(upload["retryDelays"], json!([0, 1000, 3000]));
    }

    #[test]
    fn test_bad_tus_endpoint_fails_at_build() {
        let result = UppyConfig::builder("files").tus("").build();
        assert!(matches!(result, Err(WidgetConfigError::InvalidUrl { .. })));
        let result = UppyConfig::builder("files").tus("ws://tus.local/").build();
        assert!(matches!(result, Err(WidgetConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_locale_strings() {
        let config = UppyConfig::builder("files")
            .locale_string("dropPasteFiles", "Drop reports here or %{browseFiles}")
            .build()
            .unwrap();
        assert_eq!(
            config.to_options_json()["locale"]["strings"]["dropPasteFiles"],
            "Drop reports here or %{browseFiles}"
        );
    }
}
