use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Column names of the table handed to application code, in order.
pub const CANONICAL_COLUMNS: [&str; 5] = ["name", "size", "type", "datapath", "remoteReference"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch payload is not an object with a 'files' array: {0}")]
    NotABatch(String),

    #[error("malformed file entry #{index}: {reason}")]
    MalformedEntry { index: usize, reason: String },

    #[error("unknown input type '{0}'")]
    UnknownInputType(String),
}

/// Where the bytes of an uploaded file live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePayload {
    /// `data:<mime>;base64,<bytes>`
    Inline { data_url: String },
    /// Upload URL returned by the tus server
    Remote { url: String },
}

/// One uploaded file as described by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub payload: FilePayload,
}

impl FileDescriptor {
    pub fn is_remote(&self) -> bool {
        matches!(self.payload, FilePayload::Remote { .. })
    }
}

/// Wire form of a file entry, `{name, size, type, data? | uploadURL?}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RawFileEntry {
    pub name: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(rename = "uploadURL", default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

impl RawFileEntry {
    pub fn into_descriptor(self, index: usize) -> Result<FileDescriptor, BatchError> {
        let malformed = |reason: &str| BatchError::MalformedEntry {
            index,
            reason: reason.to_string(),
        };

        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| malformed("missing 'name'"))?;
        let size = self.size.ok_or_else(|| malformed("missing 'size'"))?;

        let payload = match (self.data, self.upload_url) {
            (Some(data_url), None) => FilePayload::Inline { data_url },
            (None, Some(url)) => FilePayload::Remote { url },
            (Some(_), Some(_)) => return Err(malformed("both 'data' and 'uploadURL' present")),
            (None, None) => return Err(malformed("neither 'data' nor 'uploadURL' present")),
        };

        Ok(FileDescriptor {
            name,
            size,
            mime_type: self.mime_type.unwrap_or_default(),
            payload,
        })
    }
}

impl From<&FileDescriptor> for RawFileEntry {
    fn from(file: &FileDescriptor) -> Self {
        let (data, upload_url) = match &file.payload {
            FilePayload::Inline { data_url } => (Some(data_url.clone()), None),
            FilePayload::Remote { url } => (None, Some(url.clone())),
        };
        Self {
            name: Some(file.name.clone()),
            size: Some(file.size),
            mime_type: Some(file.mime_type.clone()),
            data,
            upload_url,
        }
    }
}

/// Incoming batch. Entries stay untyped until each is checked on its own.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RawBatch {
    #[serde(rename = "batchId", default)]
    pub batch_id: Option<Uuid>,
    #[schema(value_type = Vec<RawFileEntry>)]
    pub files: Vec<serde_json::Value>,
}

/// Files of one user upload action.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub id: Uuid,
    pub files: Vec<FileDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl UploadBatch {
    pub fn new(files: Vec<FileDescriptor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            files,
            created_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Builds a batch from its wire form, skipping malformed entries.
    pub fn from_raw(raw: RawBatch) -> Self {
        let mut files = Vec::with_capacity(raw.files.len());
        for (index, value) in raw.files.into_iter().enumerate() {
            let entry = serde_json::from_value::<RawFileEntry>(value).map_err(|e| {
                BatchError::MalformedEntry {
                    index,
                    reason: e.to_string(),
                }
            });
            match entry.and_then(|entry| entry.into_descriptor(index)) {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!("Skipping file entry: {}", e),
            }
        }

        Self {
            id: raw.batch_id.unwrap_or_else(Uuid::new_v4),
            files,
            created_at: Utc::now(),
        }
    }

    pub fn to_raw(&self) -> RawBatch {
        RawBatch {
            batch_id: Some(self.id),
            files: self
                .files
                .iter()
                .map(|f| serde_json::json!(RawFileEntry::from(f)))
                .collect(),
        }
    }
}

/// A file written to local storage and exposed to application code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MaterializedFile {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[schema(value_type = String)]
    pub datapath: PathBuf,
    #[serde(
        rename = "remoteReference",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_reference: Option<String>,
}

/// Tabular value of an upload input. Never absent: no files is zero rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileTable {
    columns: Vec<String>,
    rows: Vec<MaterializedFile>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl FileTable {
    pub fn empty() -> Self {
        Self::from_rows(Vec::new())
    }

    pub fn from_rows(rows: Vec<MaterializedFile>) -> Self {
        Self {
            columns: CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[MaterializedFile] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column-major view, one array per canonical column.
    pub fn to_columns(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        out.insert(
            "name".into(),
            self.rows.iter().map(|r| r.name.clone()).collect(),
        );
        out.insert("size".into(), self.rows.iter().map(|r| r.size).collect());
        out.insert(
            "type".into(),
            self.rows.iter().map(|r| r.mime_type.clone()).collect(),
        );
        out.insert(
            "datapath".into(),
            self.rows
                .iter()
                .map(|r| r.datapath.to_string_lossy().into_owned())
                .collect(),
        );
        out.insert(
            "remoteReference".into(),
            self.rows
                .iter()
                .map(|r| r.remote_reference.clone())
                .collect(),
        );
        out
    }

    /// Deletes the local files behind every row. Returns how many were removed.
    pub async fn delete_files(&self) -> usize {
        let mut removed = 0;
        for row in &self.rows {
            match tokio::fs::remove_file(&row.datapath).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    "Failed to delete materialized file {}: {}",
                    row.datapath.display(),
                    e
                ),
            }
        }
        removed
    }
}
