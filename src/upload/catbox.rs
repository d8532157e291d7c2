//! Catbox upload host client.

use crate::error::{ApiError, Result};
use crate::upload::{UploadDestination, UploadHost, UploadedArtifact};
use async_trait::async_trait;

const API_URL: &str = "https://catbox.moe/user/api.php";

/// Catbox file host. Uploads are tied to the configured userhash so they
/// can be deleted later; the delete key is the hosted filename.
pub struct CatboxClient {
    http: reqwest::Client,
    userhash: Option<String>,
}

impl CatboxClient {
    pub fn new(http: reqwest::Client, userhash: Option<String>) -> Self {
        Self { http, userhash }
    }
}

#[async_trait]
impl UploadHost for CatboxClient {
    fn destination(&self) -> UploadDestination {
        UploadDestination::Catbox
    }

    async fn upload(&self, bytes: Vec<u8>, format_hint: &str) -> Result<Option<UploadedArtifact>> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(format!("clip.{format_hint}"));
        let mut form = reqwest::multipart::Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);
        if let Some(userhash) = &self.userhash {
            form = form.text("userhash", userhash.clone());
        }

        let response = self
            .http
            .post(API_URL)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Http)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Http)?;

        if !status.is_success() {
            tracing::warn!(%status, body, "catbox refused upload");
            return Ok(None);
        }
        // The API answers with the bare file URL on success.
        let url = body.trim().to_string();
        if !url.starts_with("https://") {
            return Ok(None);
        }
        let delete_key = url.rsplit('/').next().unwrap_or_default().to_string();
        Ok(Some(UploadedArtifact { url, delete_key }))
    }

    async fn delete(&self, delete_key: &str) -> Result<bool> {
        let Some(userhash) = &self.userhash else {
            // Anonymous uploads cannot be retracted.
            return Ok(false);
        };
        let form = reqwest::multipart::Form::new()
            .text("reqtype", "deletefiles")
            .text("userhash", userhash.clone())
            .text("files", delete_key.to_string());

        let response = self
            .http
            .post(API_URL)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Http)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Http)?;
        Ok(interpret_delete(status, &body)?)
    }
}

/// `Ok(false)` is reserved for "already gone"; transient failures must
/// surface as errors so the deletion is retried on a later sweep.
fn interpret_delete(
    status: reqwest::StatusCode,
    body: &str,
) -> std::result::Result<bool, ApiError> {
    if status.is_success() {
        return Ok(true);
    }
    if body.contains("doesn't exist") {
        return Ok(false);
    }
    Err(ApiError::UnexpectedResponse {
        endpoint: API_URL.to_string(),
        detail: format!("delete returned {status}: {body}"),
    })
}
