//! Rate-limited Reddit API client.

use crate::Fullname;
use crate::config::RedditConfig;
use crate::error::{ApiError, ContractError, Result};
use crate::ratelimit::RateLimiter;
use crate::reddit::auth::{self, TokenState};
use crate::reddit::types::{AccountInfo, MentionEvent, MentionKind, Post, SocialApi};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

const API_BASE: &str = "https://oauth.reddit.com";

/// Reddit client wrapping every call with token refresh and budget
/// tracking. One instance per process; shared ownership via `Arc`.
pub struct RedditClient {
    http: reqwest::Client,
    config: RedditConfig,
    token: Mutex<TokenState>,
    limiter: RateLimiter,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(ApiError::Http)?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(TokenState::new()),
            limiter: RateLimiter::new(),
        })
    }

    /// A valid bearer token, refreshing when absent or expired.
    async fn bearer(&self) -> std::result::Result<String, ApiError> {
        let mut state = self.token.lock().await;
        if let Some(token) = state.current() {
            return Ok(token.to_string());
        }
        let (token, expires_in) = auth::refresh(&self.http, &self.config).await?;
        state.store(token.clone(), expires_in);
        tracing::debug!(expires_in, "access token refreshed");
        Ok(token)
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<Value, ApiError> {
        let token = self.bearer().await?;
        let builder = self
            .http
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .query(query);
        self.dispatch(path, builder).await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> std::result::Result<Value, ApiError> {
        let token = self.bearer().await?;
        let builder = self
            .http
            .post(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .form(form);
        self.dispatch(path, builder).await
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        builder: reqwest::RequestBuilder,
    ) -> std::result::Result<Value, ApiError> {
        self.limiter.acquire().await;
        let response = builder.send().await?;
        self.observe_budget(response.headers()).await;

        let status = response.status();
        let body = response.text().await?;
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized(format!(
                "{endpoint} returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ApiError::UnexpectedResponse {
                endpoint: endpoint.to_string(),
                detail: format!("status {status}: {body}"),
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            detail: format!("unparseable body: {e}"),
        })
    }

    /// Feed `x-ratelimit-*` response metadata into the limiter.
    async fn observe_budget(&self, headers: &reqwest::header::HeaderMap) {
        let remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let reset = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let (Some(remaining), Some(reset)) = (remaining, reset) {
            self.limiter
                .update(remaining.max(0.0) as u32, Duration::from_secs(reset))
                .await;
        }
    }
}

#[async_trait]
impl SocialApi for RedditClient {
    async fn fetch_unread(&self) -> Result<Vec<MentionEvent>> {
        let json = self
            .get_json("/message/unread", &[("limit", "100")])
            .await?;
        let children = listing_children(&json, "/message/unread")?;
        let (events, malformed) = parse_unread(children);
        // A malformed item must not poison the batch or get refetched
        // forever; mark it read and move on.
        if !malformed.is_empty() {
            if let Err(error) = self.mark_read(&malformed).await {
                tracing::warn!(%error, "failed to mark malformed inbox items read");
            }
        }
        Ok(events)
    }

    async fn mark_read(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let joined = ids.join(",");
        self.post_form("/api/read_message", &[("id", joined.as_str())])
            .await?;
        Ok(())
    }

    async fn get_post(&self, fullname: &str) -> Result<Post> {
        let json = self.get_json("/api/info", &[("id", fullname)]).await?;
        let children = listing_children(&json, "/api/info")?;
        let child = children.first().ok_or_else(|| ApiError::UnexpectedResponse {
            endpoint: "/api/info".into(),
            detail: format!("no thing returned for {fullname}"),
        })?;
        parse_post(child)
    }

    async fn get_account(&self, username: &str) -> Result<AccountInfo> {
        let path = format!("/user/{username}/about");
        let json = self.get_json(&path, &[]).await?;
        let data = &json["data"];
        Ok(AccountInfo {
            username: username.to_string(),
            created_at: parse_created(data),
            combined_karma: data["link_karma"].as_i64().unwrap_or(0)
                + data["comment_karma"].as_i64().unwrap_or(0),
        })
    }

    async fn post_comment(&self, parent_fullname: &str, text: &str) -> Result<Option<Fullname>> {
        let json = self
            .post_form(
                "/api/comment",
                &[
                    ("api_type", "json"),
                    ("thing_id", parent_fullname),
                    ("text", text),
                ],
            )
            .await?;

        let errors = json["json"]["errors"].as_array();
        if errors.is_some_and(|e| !e.is_empty()) {
            tracing::warn!(parent = parent_fullname, ?errors, "reply rejected by platform");
            return Ok(None);
        }
        let name = json["json"]["data"]["things"][0]["data"]["name"]
            .as_str()
            .map(str::to_string);
        Ok(name)
    }

    async fn submit_thread(&self, subreddit: &str, title: &str, body: &str) -> Result<Fullname> {
        let json = self
            .post_form(
                "/api/submit",
                &[
                    ("api_type", "json"),
                    ("sr", subreddit),
                    ("kind", "self"),
                    ("title", title),
                    ("text", body),
                ],
            )
            .await?;
        json["json"]["data"]["name"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::UnexpectedResponse {
                    endpoint: "/api/submit".into(),
                    detail: "no fullname in submit response".into(),
                }
                .into()
            })
    }

    async fn delete_comment(&self, fullname: &str) -> Result<bool> {
        self.post_form("/api/del", &[("id", fullname)]).await?;
        Ok(true)
    }
}

fn listing_children<'a>(
    json: &'a Value,
    endpoint: &str,
) -> std::result::Result<&'a Vec<Value>, ApiError> {
    json["data"]["children"]
        .as_array()
        .ok_or_else(|| ApiError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            detail: "missing data.children listing".into(),
        })
}

/// Parse an unread listing, dropping children that violate the inbox
/// contract. Returns the parsed events plus the ids of dropped items so
/// the caller can retire them.
fn parse_unread(children: &[Value]) -> (Vec<MentionEvent>, Vec<String>) {
    let mut events = Vec::with_capacity(children.len());
    let mut malformed = Vec::new();
    for child in children {
        match parse_mention(child) {
            Ok(event) => events.push(event),
            Err(error) => {
                tracing::error!(
                    %error,
                    item = %child["data"]["name"],
                    "dropping malformed inbox item"
                );
                if let Some(id) = child["data"]["id"].as_str() {
                    malformed.push(id.to_string());
                }
            }
        }
    }
    (events, malformed)
}

fn parse_mention(child: &Value) -> Result<MentionEvent> {
    let kind = MentionKind::parse(child["kind"].as_str().unwrap_or_default())
        .map_err(ContractError::from)?;
    let data = &child["data"];
    Ok(MentionEvent {
        id: text(data, "id"),
        fullname: text(data, "name"),
        kind,
        subject: text(data, "subject"),
        author: text(data, "author"),
        body: text(data, "body"),
        subreddit: text(data, "subreddit"),
        parent_fullname: data["parent_id"].as_str().map(str::to_string),
        permalink: text(data, "context"),
        created_at: parse_created(data),
    })
}

fn parse_post(child: &Value) -> Result<Post> {
    let kind = child["kind"].as_str().unwrap_or_default();
    let data = &child["data"];
    match kind {
        "t1" => Ok(Post::Comment {
            fullname: text(data, "name"),
            author: text(data, "author"),
            body: text(data, "body"),
            score: data["score"].as_i64().unwrap_or(0),
            // `edited` is false or an edit timestamp.
            edited: match &data["edited"] {
                Value::Bool(b) => *b,
                Value::Number(_) => true,
                _ => false,
            },
            parent_fullname: text(data, "parent_id"),
            subreddit: text(data, "subreddit"),
            created_at: parse_created(data),
        }),
        "t3" => Ok(Post::Link {
            fullname: text(data, "name"),
            author: text(data, "author"),
            title: text(data, "title"),
            url: text(data, "url"),
            selftext: text(data, "selftext"),
            score: data["score"].as_i64().unwrap_or(0),
            over_18: data["over_18"].as_bool().unwrap_or(false),
            removed: !data["banned_by"].is_null() || !data["removed_by_category"].is_null(),
            subreddit: text(data, "subreddit"),
            subreddit_subscribers: data["subreddit_subscribers"].as_i64().unwrap_or(0),
            subreddit_public: data["subreddit_type"].as_str().unwrap_or("public") == "public",
            created_at: parse_created(data),
        }),
        other => Err(ContractError::UnknownPostKind(other.to_string()).into()),
    }
}

fn text(data: &Value, key: &str) -> String {
    data[key].as_str().unwrap_or_default().to_string()
}

fn parse_created(data: &Value) -> DateTime<Utc> {
    let epoch = data["created_utc"].as_f64().unwrap_or(0.0);
    DateTime::from_timestamp(epoch as i64, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_comment_mention_from_listing_child() {
        let child = json!({
            "kind": "t1",
            "data": {
                "id": "abc123",
                "name": "t1_abc123",
                "subject": "username mention",
                "author": "someone",
                "body": "u/clipbot -REVERSE",
                "subreddit": "videos",
                "parent_id": "t3_root99",
                "context": "/r/videos/comments/root99/x/abc123/",
                "created_utc": 1724900000.0
            }
        });
        let mention = parse_mention(&child).expect("valid mention");
        assert!(mention.is_mention_comment());
        assert_eq!(mention.parent_fullname.as_deref(), Some("t3_root99"));
    }

    #[test]
    fn private_messages_are_not_mention_comments() {
        let child = json!({
            "kind": "t4",
            "data": {
                "id": "msg1",
                "name": "t4_msg1",
                "subject": "hello",
                "author": "someone",
                "body": "hi there",
                "created_utc": 1724900000.0
            }
        });
        let mention = parse_mention(&child).expect("valid message");
        assert_eq!(mention.kind, MentionKind::PrivateMessage);
        assert!(!mention.is_mention_comment());
    }

    #[test]
    fn unknown_listing_kind_is_a_contract_violation() {
        let child = json!({ "kind": "t9", "data": {} });
        let error = parse_mention(&child).expect_err("t9 must fail");
        assert!(error.to_string().contains("t9"));
    }

    #[test]
    fn one_malformed_child_does_not_poison_the_batch() {
        let children = vec![
            json!({ "kind": "t2", "data": { "id": "zz1", "name": "t2_zz1" } }),
            json!({
                "kind": "t1",
                "data": {
                    "id": "abc123",
                    "name": "t1_abc123",
                    "subject": "username mention",
                    "author": "someone",
                    "body": "u/clipbot -REVERSE",
                    "subreddit": "videos",
                    "parent_id": "t3_root99",
                    "context": "/r/videos/comments/root99/x/abc123/",
                    "created_utc": 1724900000.0
                }
            }),
        ];
        let (events, malformed) = parse_unread(&children);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fullname, "t1_abc123");
        // The bad item's id is retired instead of refetched forever.
        assert_eq!(malformed, vec!["zz1".to_string()]);
    }

    #[test]
    fn parses_link_post_with_removal_state() {
        let child = json!({
            "kind": "t3",
            "data": {
                "name": "t3_root99",
                "author": "op",
                "title": "a clip",
                "url": "https://v.redd.it/xyz",
                "selftext": "",
                "score": 41,
                "over_18": false,
                "banned_by": "a_moderator",
                "removed_by_category": null,
                "subreddit": "videos",
                "subreddit_subscribers": 250000,
                "subreddit_type": "public",
                "created_utc": 1724900000.0
            }
        });
        let post = parse_post(&child).expect("valid link");
        match post {
            Post::Link {
                removed,
                subreddit_public,
                ..
            } => {
                assert!(removed);
                assert!(subreddit_public);
            }
            other => panic!("expected a link, got {other:?}"),
        }
    }

    #[test]
    fn comment_edited_timestamp_counts_as_edited() {
        let child = json!({
            "kind": "t1",
            "data": {
                "name": "t1_c1",
                "author": "op",
                "body": "text",
                "score": 3,
                "edited": 1724905000.0,
                "parent_id": "t3_root99",
                "subreddit": "videos",
                "created_utc": 1724900000.0
            }
        });
        let post = parse_post(&child).expect("valid comment");
        match post {
            Post::Comment { edited, .. } => assert!(edited),
            other => panic!("expected a comment, got {other:?}"),
        }
    }
}
