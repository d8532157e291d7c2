//! The per-mention processing pipeline.

use crate::command::{Operation, parse_command};
use crate::config::Config;
use crate::error::{CommandError, Result};
use crate::pipeline::fallback::FallbackReplier;
use crate::pipeline::fetch::MediaFetcher;
use crate::reddit::{MentionEvent, Post, SocialApi};
use crate::safety::SafetyEvaluator;
use crate::store::{UploadLog, UploadLogStore};
use crate::transform::TransformService;
use crate::upload::UploadHost;
use anyhow::anyhow;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Terminal state of one mention's unit of work.
#[derive(Debug)]
pub enum MentionOutcome {
    Completed { log_id: Uuid },
    Skipped(SkipReason),
    Failed(String),
}

/// Why a mention was not processed. The display form is quoted in the
/// notice sent back to the requestor.
#[derive(Debug)]
pub enum SkipReason {
    BlacklistedRequestor,
    PostTooNew,
    Ineligible,
    InvalidCommand(CommandError),
    NoMediaUrl,
    DownloadFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BlacklistedRequestor => write!(f, "this account is blocked"),
            SkipReason::PostTooNew => write!(f, "the post is too new, try again later"),
            SkipReason::Ineligible => write!(f, "the post doesn't meet the content rules"),
            SkipReason::InvalidCommand(error) => write!(f, "{error}"),
            SkipReason::NoMediaUrl => write!(f, "no media link found on the post"),
            SkipReason::DownloadFailed(detail) => write!(f, "couldn't download the media: {detail}"),
        }
    }
}

/// Counts for one batch of unread inbox events.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub dropped: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The message processor: fetch unread, evaluate, transform, publish,
/// reply, persist. Candidates are handled strictly one at a time; a
/// failure in one never aborts the batch.
pub struct MessageProcessor {
    api: Arc<dyn SocialApi>,
    transformer: Arc<dyn TransformService>,
    fetcher: Arc<dyn MediaFetcher>,
    host: Arc<dyn UploadHost>,
    store: Arc<UploadLogStore>,
    fallback: FallbackReplier,
    config: Arc<Config>,
}

impl MessageProcessor {
    pub fn new(
        api: Arc<dyn SocialApi>,
        transformer: Arc<dyn TransformService>,
        fetcher: Arc<dyn MediaFetcher>,
        host: Arc<dyn UploadHost>,
        store: Arc<UploadLogStore>,
        config: Arc<Config>,
    ) -> Self {
        let fallback = FallbackReplier::new(
            api.clone(),
            store.clone(),
            config.reddit.home_subreddit.clone(),
        );
        Self {
            api,
            transformer,
            fetcher,
            host,
            store,
            fallback,
            config,
        }
    }

    /// One full pass over the unread inbox.
    ///
    /// A mention is marked read exactly once, after its terminal outcome is
    /// known; a crash mid-unit leaves it unread for the next poll.
    pub async fn run_once(&self) -> Result<BatchSummary> {
        let unread = self.api.fetch_unread().await?;
        let mut summary = BatchSummary::default();

        for event in unread {
            if !event.is_mention_comment() {
                self.mark_read(&event).await;
                summary.dropped += 1;
                continue;
            }

            let outcome = match self.process_mention(&event).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(
                        mention = %event.fullname,
                        requestor = %event.author,
                        %error,
                        "mention processing failed"
                    );
                    MentionOutcome::Failed(error.to_string())
                }
            };
            self.mark_read(&event).await;

            match &outcome {
                MentionOutcome::Completed { log_id } => {
                    tracing::info!(mention = %event.fullname, %log_id, "mention completed");
                    summary.completed += 1;
                }
                MentionOutcome::Skipped(reason) => {
                    tracing::info!(mention = %event.fullname, %reason, "mention skipped");
                    summary.skipped += 1;
                }
                MentionOutcome::Failed(_) => summary.failed += 1,
            }
        }

        Ok(summary)
    }

    async fn mark_read(&self, event: &MentionEvent) {
        if let Err(error) = self.api.mark_read(std::slice::from_ref(&event.id)).await {
            tracing::warn!(mention = %event.fullname, %error, "failed to mark mention read");
        }
    }

    async fn process_mention(&self, event: &MentionEvent) -> Result<MentionOutcome> {
        if self.config.blacklist.contains(&event.author) {
            // Blocked accounts get no notice.
            return Ok(MentionOutcome::Skipped(SkipReason::BlacklistedRequestor));
        }
        let whitelisted = self.config.whitelist.contains(&event.author);

        let parent_fullname = event
            .parent_fullname
            .as_deref()
            .ok_or_else(|| anyhow!("mention comment {} has no parent", event.fullname))?;
        let parent = self.api.get_post(parent_fullname).await?;

        if !whitelisted {
            let post_age_minutes = (Utc::now() - parent.created_at()).num_minutes();
            if post_age_minutes < self.config.filters.min_post_age_minutes {
                return self.reject(event, whitelisted, SkipReason::PostTooNew).await;
            }
            let evaluator = SafetyEvaluator::new(self.api.as_ref(), &self.config.filters);
            if !evaluator.is_safe(&parent, true).await? {
                return self.reject(event, whitelisted, SkipReason::Ineligible).await;
            }
        }

        let operations = match parse_command(&event.body) {
            Ok(operations) => operations,
            Err(error) => {
                return self
                    .reject(event, whitelisted, SkipReason::InvalidCommand(error))
                    .await;
            }
        };

        let Some(url) = media_url(&parent) else {
            return self.reject(event, whitelisted, SkipReason::NoMediaUrl).await;
        };

        // Collision-free scratch name; every exit path below removes it.
        let scratch = self
            .config
            .scratch_dir()
            .join(format!("{}.media", Uuid::new_v4().simple()));
        let outcome = self
            .run_media_pipeline(event, &parent, &operations, &url, &scratch)
            .await;
        let _ = tokio::fs::remove_file(&scratch).await;
        outcome
    }

    /// Download, transform chain, upload, reply, persist. Each transform
    /// step deletes its input and renames its output onto the scratch path,
    /// keeping one file in flight per request.
    async fn run_media_pipeline(
        &self,
        event: &MentionEvent,
        parent: &Post,
        operations: &[Operation],
        url: &str,
        scratch: &Path,
    ) -> Result<MentionOutcome> {
        let started = std::time::Instant::now();

        if let Err(error) = self
            .fetcher
            .fetch(
                url,
                scratch,
                self.config.filters.max_download_bytes,
            )
            .await
        {
            let whitelisted = self.config.whitelist.contains(&event.author);
            return self
                .reject(
                    event,
                    whitelisted,
                    SkipReason::DownloadFailed(error.to_string()),
                )
                .await;
        }

        for operation in operations {
            let output = self.transformer.execute(operation, scratch).await?;
            tokio::fs::remove_file(scratch).await?;
            tokio::fs::rename(&output, scratch).await?;
        }

        let bytes = tokio::fs::read(scratch).await?;
        let size_bytes = bytes.len() as u64;
        let artifact = self
            .host
            .upload(bytes, format_hint(url))
            .await?
            .ok_or_else(|| anyhow!("upload host refused the file"))?;

        let elapsed = started.elapsed();
        let reply_text = format!(
            "[Here's your edit!]({}) ({:.1} MB, done in {:.1}s)\n\n\
             *****\n\
             ^(I'm a bot — mention me with commands like `-TRIM start=1 end=5`.)",
            artifact.url,
            size_bytes as f64 / (1024.0 * 1024.0),
            elapsed.as_secs_f64(),
        );
        let reply_fullname = self
            .fallback
            .deliver(event, &reply_text)
            .await?
            .ok_or_else(|| anyhow!("reply could not be delivered, even via fallback"))?;

        let log = UploadLog::new(
            parent.fullname(),
            reply_fullname,
            event.author.clone(),
            self.host.destination(),
            artifact.delete_key,
        );
        self.store.insert(&log).await?;

        Ok(MentionOutcome::Completed { log_id: log.id })
    }

    /// Record a skip, notifying the requestor unless they are whitelisted.
    async fn reject(
        &self,
        event: &MentionEvent,
        whitelisted: bool,
        reason: SkipReason,
    ) -> Result<MentionOutcome> {
        if !whitelisted && !matches!(reason, SkipReason::BlacklistedRequestor) {
            let text = format!("Sorry, I can't process that request: {reason}.");
            if let Err(error) = self.fallback.deliver(event, &text).await {
                tracing::warn!(mention = %event.fullname, %error, "failed to deliver rejection notice");
            }
        }
        Ok(MentionOutcome::Skipped(reason))
    }
}

/// Source media URL for the mentioned post: a link's URL field, or the
/// first absolute http(s) token in a comment's body.
fn media_url(post: &Post) -> Option<String> {
    match post {
        Post::Link { url, .. } => {
            if url.starts_with("http://") || url.starts_with("https://") {
                Some(url.clone())
            } else {
                None
            }
        }
        Post::Comment { body, .. } => body
            .split_whitespace()
            .find(|token| token.starts_with("http://") || token.starts_with("https://"))
            .map(str::to_string),
    }
}

/// File extension hint for the upload host, taken from the source URL.
fn format_hint(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next() {
        Some(ext) if ext.len() <= 4 && !ext.contains('/') => ext,
        _ => "mp4",
    }
}
