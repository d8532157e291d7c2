//! Source media download with a hard size cap.

use crate::error::{ApiError, Result};
use async_trait::async_trait;
use futures::StreamExt as _;
use std::path::Path;
use tokio::io::AsyncWriteExt as _;

/// Downloads source media into a local scratch file.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch `url` into `dest`, failing once more than `max_bytes` have
    /// been received. Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<u64>;
}

/// Plain HTTP fetcher streaming the body to disk.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<u64> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ApiError::Http)?;

        // Trust an honest Content-Length to fail fast; the streamed count
        // below still enforces the cap when the header lies or is absent.
        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(ApiError::DownloadTooLarge { limit: max_bytes }.into());
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ApiError::Http)?;
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(ApiError::DownloadTooLarge { limit: max_bytes }.into());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}
