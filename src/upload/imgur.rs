//! Imgur upload host client.

use crate::error::{ApiError, Result};
use crate::upload::{UploadDestination, UploadHost, UploadedArtifact};
use async_trait::async_trait;

const UPLOAD_URL: &str = "https://api.imgur.com/3/upload";
const IMAGE_URL: &str = "https://api.imgur.com/3/image";

/// Imgur host. The delete key is the `deletehash` returned at upload time.
pub struct ImgurClient {
    http: reqwest::Client,
    client_id: String,
}

impl ImgurClient {
    pub fn new(http: reqwest::Client, client_id: String) -> Self {
        Self { http, client_id }
    }

    fn auth_header(&self) -> String {
        format!("Client-ID {}", self.client_id)
    }
}

#[async_trait]
impl UploadHost for ImgurClient {
    fn destination(&self) -> UploadDestination {
        UploadDestination::Imgur
    }

    async fn upload(&self, bytes: Vec<u8>, format_hint: &str) -> Result<Option<UploadedArtifact>> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(format!("clip.{format_hint}"));
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .http
            .post(UPLOAD_URL)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Http)?;

        let status = response.status();
        let json: serde_json::Value = match response.json().await {
            Ok(json) => json,
            Err(error) => {
                tracing::warn!(%status, %error, "unparseable imgur upload response");
                return Ok(None);
            }
        };
        if !status.is_success() || !json["success"].as_bool().unwrap_or(false) {
            tracing::warn!(%status, "imgur refused upload");
            return Ok(None);
        }

        let url = json["data"]["link"].as_str().unwrap_or_default().to_string();
        let delete_key = json["data"]["deletehash"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if url.is_empty() || delete_key.is_empty() {
            return Ok(None);
        }
        Ok(Some(UploadedArtifact { url, delete_key }))
    }

    async fn delete(&self, delete_key: &str) -> Result<bool> {
        let response = self
            .http
            .delete(format!("{IMAGE_URL}/{delete_key}"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(ApiError::Http)?;
        Ok(interpret_delete(response.status())?)
    }
}

/// `Ok(false)` is reserved for "already gone" (404); other failures must
/// surface as errors so the deletion is retried on a later sweep.
fn interpret_delete(status: reqwest::StatusCode) -> std::result::Result<bool, ApiError> {
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(false);
    }
    if !status.is_success() {
        return Err(ApiError::UnexpectedResponse {
            endpoint: IMAGE_URL.to_string(),
            detail: format!("delete returned {status}"),
        });
    }
    Ok(true)
}
