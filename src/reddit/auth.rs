//! OAuth token lifecycle for the Reddit script-app grant.

use crate::config::RedditConfig;
use crate::error::ApiError;
use chrono::{DateTime, Duration, Utc};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Access-token state for one client: `NoToken` until the first refresh,
/// then authorized until expiry.
#[derive(Debug, Default)]
pub struct TokenState {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current token, or `None` when absent or expired (with a one
    /// minute buffer so a token never expires mid-request).
    pub fn current(&self) -> Option<&str> {
        let expires_at = self.expires_at?;
        if Utc::now() + Duration::seconds(60) >= expires_at {
            return None;
        }
        self.access_token.as_deref()
    }

    pub fn store(&mut self, access_token: String, expires_in_secs: i64) {
        self.expires_at = Some(Utc::now() + Duration::seconds(expires_in_secs));
        self.access_token = Some(access_token);
    }
}

/// Exchange script-app credentials for a fresh access token.
///
/// Failure here is fatal to the call in progress and surfaces as an
/// authorization error.
pub async fn refresh(
    http: &reqwest::Client,
    config: &RedditConfig,
) -> Result<(String, i64), ApiError> {
    let response = http
        .post(TOKEN_URL)
        .basic_auth(&config.client_id, Some(&config.client_secret))
        .header(reqwest::header::USER_AGENT, &config.user_agent)
        .form(&[
            ("grant_type", "password"),
            ("username", config.username.as_str()),
            ("password", config.password.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Unauthorized(format!(
            "token refresh failed with status {status}: {body}"
        )));
    }

    let json: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| ApiError::Unauthorized(format!("unparseable token response: {e}")))?;
    let access_token = json["access_token"]
        .as_str()
        .ok_or_else(|| ApiError::Unauthorized("missing access_token in response".into()))?
        .to_string();
    let expires_in = json["expires_in"].as_i64().unwrap_or(3600);

    Ok((access_token, expires_in))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_token() {
        let state = TokenState::new();
        assert!(state.current().is_none());
    }

    #[test]
    fn stored_token_is_current_until_expiry_buffer() {
        let mut state = TokenState::new();
        state.store("token".into(), 3600);
        assert_eq!(state.current(), Some("token"));

        // Tokens inside the sixty second buffer count as expired.
        state.store("short".into(), 30);
        assert!(state.current().is_none());
    }
}
