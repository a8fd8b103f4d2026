use crate::config::BridgeConfig;
use crate::models::{FileDescriptor, FilePayload, FileTable, MaterializedFile, UploadBatch};
use crate::services::encoding::{EncodingError, decode_data_url};
use crate::services::fetcher::{FetchError, HttpFetcher, RemoteFetcher};
use crate::utils::validation::{extension_suffix, normalize_mime, validate_file_size};
use futures::future::join_all;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Bytes inspected when the MIME type has to be sniffed.
const SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("decode failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Turns upload batches into files on local disk.
///
/// A file is only exposed once its last byte is written: content goes into a
/// `NamedTempFile` that is kept on success and deleted on drop otherwise.
pub struct Materializer {
    upload_dir: PathBuf,
    max_file_size: u64,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl Materializer {
    pub fn new(upload_dir: PathBuf, max_file_size: u64, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            upload_dir,
            max_file_size,
            fetcher,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(config.fetch_timeout())?;
        Ok(Self::new(
            config.upload_dir.clone(),
            config.max_file_size,
            Arc::new(fetcher),
        ))
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Materializes every file of the batch. Failed files are logged and
    /// left out; rows keep the order of the batch.
    pub async fn materialize(&self, batch: &UploadBatch) -> FileTable {
        if batch.is_empty() {
            tracing::debug!("Batch {} is empty", batch.id);
            return FileTable::empty();
        }

        let results = join_all(batch.files.iter().map(|file| self.materialize_file(file))).await;

        let mut rows = Vec::with_capacity(results.len());
        for (file, result) in batch.files.iter().zip(results) {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => tracing::warn!(
                    batch_id = %batch.id,
                    file = %file.name,
                    remote = file.is_remote(),
                    "File omitted from batch: {}",
                    e
                ),
            }
        }

        tracing::info!(
            batch_id = %batch.id,
            materialized = rows.len(),
            failed = batch.len() - rows.len(),
            "Batch materialized"
        );

        FileTable::from_rows(rows)
    }

    pub async fn materialize_file(
        &self,
        file: &FileDescriptor,
    ) -> Result<MaterializedFile, MaterializeError> {
        match &file.payload {
            FilePayload::Inline { data_url } => self.materialize_inline(file, data_url).await,
            FilePayload::Remote { url } => self.materialize_remote(file, url).await,
        }
    }

    async fn materialize_inline(
        &self,
        file: &FileDescriptor,
        data_url: &str,
    ) -> Result<MaterializedFile, MaterializeError> {
        tracing::debug!("Decoding {}", file.name);
        let decoded = decode_data_url(data_url)?;
        let size = decoded.bytes.len() as u64;
        validate_file_size(size, self.max_file_size)
            .map_err(|e| MaterializeError::Rejected(e.to_string()))?;

        if size != file.size {
            tracing::debug!(
                "Declared size {} of {} differs from decoded size {}",
                file.size,
                file.name,
                size
            );
        }

        let mime_type = resolve_mime(
            &file.mime_type,
            decoded.media_type.as_deref(),
            &decoded.bytes[..decoded.bytes.len().min(SNIFF_LEN)],
        );

        let dir = self.upload_dir.clone();
        let suffix = extension_suffix(&file.name);
        let bytes = decoded.bytes;
        let datapath = blocking(move || {
            let mut tmp = new_temp_file(&dir, &suffix)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            keep(tmp)
        })
        .await?;

        Ok(MaterializedFile {
            name: file.name.clone(),
            size,
            mime_type,
            datapath,
            remote_reference: None,
        })
    }

    async fn materialize_remote(
        &self,
        file: &FileDescriptor,
        url: &str,
    ) -> Result<MaterializedFile, MaterializeError> {
        tracing::debug!("Fetching {} from {}", file.name, url);
        let dir = self.upload_dir.clone();
        let suffix = extension_suffix(&file.name);
        let (tmp, std_file) = blocking(move || {
            let tmp = new_temp_file(&dir, &suffix)?;
            let std_file = tmp.as_file().try_clone()?;
            Ok((tmp, std_file))
        })
        .await?;

        let mut sink = tokio::fs::File::from_std(std_file);
        let size = self
            .fetcher
            .fetch_into(url, &mut sink, self.max_file_size)
            .await?;
        sink.sync_all().await?;
        drop(sink);

        let head = read_head(tmp.path()).await?;
        let mime_type = resolve_mime(&file.mime_type, None, &head);
        let datapath = blocking(move || keep(tmp)).await?;

        Ok(MaterializedFile {
            name: file.name.clone(),
            size,
            mime_type,
            datapath,
            remote_reference: Some(url.to_string()),
        })
    }
}

/// Runs blocking file work off the async executor.
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::other(e.to_string()))?
}

fn new_temp_file(dir: &Path, suffix: &str) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("uppy-")
        .suffix(suffix)
        .tempfile_in(dir)
}

fn keep(tmp: NamedTempFile) -> io::Result<PathBuf> {
    let (_file, path) = tmp.keep().map_err(|e| e.error)?;
    Ok(path)
}

async fn read_head(path: &Path) -> io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// Declared type first, then the data URL's media type, then content sniffing.
fn resolve_mime(declared: &str, hinted: Option<&str>, head: &[u8]) -> String {
    let declared = normalize_mime(declared);
    if !declared.is_empty() {
        return declared;
    }
    if let Some(hinted) = hinted.map(normalize_mime).filter(|m| !m.is_empty()) {
        return hinted;
    }
    infer::get(head)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}
