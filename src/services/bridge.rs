//! Client side of the upload contract: turns a completed widget upload into
//! one batch and publishes it exactly once.

use crate::models::{FileDescriptor, FilePayload, FileTable, UploadBatch};
use crate::services::encoding::encode_data_url;
use crate::services::registry::UPPY_FILES;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to read '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{name}' is {size} bytes, above the inline limit of {limit} bytes")]
    TooLargeForInline { name: String, size: u64, limit: u64 },

    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("server URL '{0}' cannot take a path")]
    NotABaseUrl(String),

    #[error("publish failed: {0}")]
    Publish(#[from] reqwest::Error),

    #[error("server rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Where the content of a finished upload can be found.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Local file, read and inlined
    Path(PathBuf),
    /// Bytes already in memory, inlined
    Bytes(Bytes),
    /// Already uploaded to the tus server
    Remote { url: String },
}

/// One successful entry of the widget's `complete` event.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub source: UploadSource,
}

impl CompletedUpload {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            name,
            mime_type: None,
            size: None,
            source: UploadSource::Path(path),
        }
    }

    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            size: None,
            source: UploadSource::Remote { url: url.into() },
        }
    }
}

/// Reads and encodes the files of one upload action.
#[derive(Debug, Clone, Default)]
pub struct BatchCollector {
    max_inline_size: Option<u64>,
}

impl BatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files above this size are left out instead of being inlined.
    pub fn with_max_inline_size(mut self, limit: u64) -> Self {
        self.max_inline_size = Some(limit);
        self
    }

    /// Resolves once every file is either encoded or has failed. Failed files
    /// are logged and omitted; the order of `uploads` is kept.
    pub async fn collect(&self, uploads: Vec<CompletedUpload>) -> UploadBatch {
        let results = join_all(uploads.iter().map(|upload| self.describe(upload))).await;

        let mut files = Vec::with_capacity(results.len());
        for (upload, result) in uploads.iter().zip(results) {
            match result {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!("Omitting '{}' from batch: {}", upload.name, e),
            }
        }

        UploadBatch::new(files)
    }

    async fn describe(&self, upload: &CompletedUpload) -> Result<FileDescriptor, BridgeError> {
        let bytes = match &upload.source {
            UploadSource::Remote { url } => {
                return Ok(FileDescriptor {
                    name: upload.name.clone(),
                    size: upload.size.unwrap_or(0),
                    mime_type: upload.mime_type.clone().unwrap_or_default(),
                    payload: FilePayload::Remote { url: url.clone() },
                });
            }
            UploadSource::Bytes(bytes) => bytes.clone(),
            UploadSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| BridgeError::Read {
                        name: upload.name.clone(),
                        source,
                    })?
                    .into()
            }
        };

        let size = bytes.len() as u64;
        if let Some(limit) = self.max_inline_size
            && size > limit
        {
            return Err(BridgeError::TooLargeForInline {
                name: upload.name.clone(),
                size,
                limit,
            });
        }

        let mime_type = upload
            .mime_type
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| infer::get(&bytes).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

        Ok(FileDescriptor {
            name: upload.name.clone(),
            size,
            payload: FilePayload::Inline {
                data_url: encode_data_url(&mime_type, &bytes),
            },
            mime_type,
        })
    }
}

/// Delivers a completed batch to the server-side input.
#[async_trait]
pub trait BatchPublisher: Send + Sync {
    async fn publish(&self, batch: &UploadBatch) -> Result<FileTable, BridgeError>;
}

/// Publishes to `POST {server}/sessions/{session}/inputs/{input}`.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpPublisher {
    pub fn new(server: &str, session_id: &str, input_id: &str) -> Result<Self, BridgeError> {
        let mut endpoint = Url::parse(server)?;
        endpoint
            .path_segments_mut()
            .map_err(|_| BridgeError::NotABaseUrl(server.to_string()))?
            .pop_if_empty()
            .extend(["sessions", session_id, "inputs", input_id]);
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl BatchPublisher for HttpPublisher {
    async fn publish(&self, batch: &UploadBatch) -> Result<FileTable, BridgeError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "type": UPPY_FILES, "value": batch.to_raw() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<FileTable>().await?)
    }
}

/// Collects the uploads into one batch and publishes it once, even when
/// every file failed.
pub async fn collect_and_publish(
    collector: &BatchCollector,
    uploads: Vec<CompletedUpload>,
    publisher: &dyn BatchPublisher,
) -> Result<FileTable, BridgeError> {
    let batch = collector.collect(uploads).await;
    tracing::info!("Publishing batch {} with {} file(s)", batch.id, batch.len());
    publisher.publish(&batch).await
}
