use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid remote URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("remote server answered with status {0}")]
    Status(u16),

    #[error("remote fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote file exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

/// Retrieves files that the widget uploaded out-of-band.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Streams the resource at `url` into `sink` and returns the number of
    /// bytes written. Fails once more than `limit` bytes arrive.
    async fn fetch_into(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        limit: u64,
    ) -> Result<u64, FetchError>;
}

/// Plain HTTP GET with a fixed overall timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err)
        }
    }
}

pub fn parse_remote_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_into(
        &self,
        url: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        limit: u64,
    ) -> Result<u64, FetchError> {
        let url = parse_remote_url(url)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if let Some(length) = response.content_length()
            && length > limit
        {
            return Err(FetchError::TooLarge { limit });
        }

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(e))?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(FetchError::TooLarge { limit });
            }
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        Ok(written)
    }
}
