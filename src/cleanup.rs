//! Reconciliation sweeps over published uploads.

use crate::config::FilterSettings;
use crate::error::Result;
use crate::reddit::{Post, SocialApi};
use crate::store::{UploadLog, UploadLogStore};
use crate::upload::HostRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Counts for one reconciliation sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Non-finalized rows within the cutoff that were examined.
    pub examined: usize,
    /// Rows that became finalized during this sweep.
    pub finalized: usize,
    /// Rows whose reconciliation failed and will be retried next sweep.
    pub failed: usize,
}

/// Reconciles every non-finalized `UploadLog` against the current state of
/// its post and reply, retracting both sides when warranted.
///
/// The two deletion flags flip independently, so a partial failure only
/// re-attempts the still-pending side on the next sweep. Rows older than
/// the cutoff are left for a wider sweep.
pub struct CleanupManager {
    api: Arc<dyn SocialApi>,
    hosts: HostRegistry,
    store: Arc<UploadLogStore>,
    filters: FilterSettings,
}

impl CleanupManager {
    pub fn new(
        api: Arc<dyn SocialApi>,
        hosts: HostRegistry,
        store: Arc<UploadLogStore>,
        filters: FilterSettings,
    ) -> Self {
        Self {
            api,
            hosts,
            store,
            filters,
        }
    }

    pub async fn reconcile(&self, cutoff: DateTime<Utc>) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();

        for mut log in self.store.get_all().await? {
            if log.finalized() {
                continue;
            }
            if log.uploaded_at < cutoff {
                continue;
            }
            summary.examined += 1;

            match self.reconcile_row(&mut log).await {
                Ok(()) => {
                    if log.finalized() {
                        summary.finalized += 1;
                    }
                }
                Err(error) => {
                    tracing::error!(id = %log.id, %error, "reconciliation failed for row");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            finalized = summary.finalized,
            failed = summary.failed,
            "reconciliation sweep done"
        );
        Ok(summary)
    }

    async fn reconcile_row(&self, log: &mut UploadLog) -> Result<()> {
        let Some(reason) = self.deletion_reason(log).await? else {
            return Ok(());
        };
        tracing::info!(id = %log.id, reason, "upload warrants deletion");

        if !log.upload_deleted {
            // An unregistered destination is a configuration error, fatal
            // to this row but not to the sweep.
            let host = self.hosts.get(log.destination)?;
            match host.delete(&log.delete_key).await {
                Ok(_) => {
                    log.upload_deleted = true;
                    self.store.update(log).await?;
                }
                Err(error) => {
                    tracing::warn!(id = %log.id, %error, "artifact deletion failed, will retry");
                }
            }
        }

        if !log.reply_deleted {
            match self.api.delete_comment(&log.reply_fullname).await {
                Ok(_) => {
                    log.reply_deleted = true;
                    self.store.update(log).await?;
                }
                Err(error) => {
                    tracing::warn!(id = %log.id, %error, "reply deletion failed, will retry");
                }
            }
        }

        if log.finalized() && log.deleted_at.is_none() {
            log.deleted_at = Some(Utc::now());
            log.delete_reason = Some(reason.to_string());
            self.store.update(log).await?;
        }

        Ok(())
    }

    /// Ordered deletion policy; the first matching rule wins.
    async fn deletion_reason(&self, log: &UploadLog) -> Result<Option<&'static str>> {
        let reply = self.api.get_post(&log.reply_fullname).await?;
        if reply.score() < 0 {
            return Ok(Some("reply score below zero"));
        }

        let post = self.api.get_post(&log.post_fullname).await?;
        if post.author_removed() {
            return Ok(Some("post author removed"));
        }
        if let Post::Link { removed: true, .. } = &post {
            return Ok(Some("post removed"));
        }
        if !self.filters.allow_nsfw {
            if let Post::Link {
                over_18, selftext, ..
            } = &post
            {
                if *over_18 || selftext.to_ascii_lowercase().contains("nsfw") {
                    return Ok(Some("post is NSFW"));
                }
            }
        }

        Ok(None)
    }
}
