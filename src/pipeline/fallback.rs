//! Fallback reply delivery for mentions that cannot be answered directly.

use crate::Fullname;
use crate::error::Result;
use crate::reddit::{MentionEvent, SocialApi};
use crate::store::UploadLogStore;
use chrono::Utc;
use std::sync::Arc;

/// How long a fallback thread stays in use before a fresh one is created.
const THREAD_REUSE_DAYS: i64 = 7;

/// Delivers replies to requestors, falling back to a long-lived thread in
/// the bot's home subreddit when the direct reply is blocked (locked or
/// deleted threads). The thread pointer is persisted so restarts keep
/// reusing the same thread.
pub struct FallbackReplier {
    api: Arc<dyn SocialApi>,
    store: Arc<UploadLogStore>,
    home_subreddit: String,
}

impl FallbackReplier {
    pub fn new(api: Arc<dyn SocialApi>, store: Arc<UploadLogStore>, home_subreddit: String) -> Self {
        Self {
            api,
            store,
            home_subreddit,
        }
    }

    /// Reply to the mention directly, or via the fallback thread when the
    /// platform rejects the direct reply. Returns the reply's fullname, or
    /// `None` when even the fallback post was rejected.
    pub async fn deliver(&self, mention: &MentionEvent, text: &str) -> Result<Option<Fullname>> {
        if let Some(fullname) = self.api.post_comment(&mention.fullname, text).await? {
            return Ok(Some(fullname));
        }

        tracing::info!(
            mention = %mention.fullname,
            "direct reply rejected, using fallback thread"
        );
        let thread = self.current_thread().await?;
        let prefixed = format!(
            "u/{} I couldn't reply to [your request]({}) directly, so here it is:\n\n{}",
            mention.author, mention.permalink, text
        );
        self.api.post_comment(&thread, &prefixed).await
    }

    /// The active fallback thread, reusing one created within the last
    /// seven days or submitting a new one.
    async fn current_thread(&self) -> Result<Fullname> {
        if let Some((fullname, created_at)) = self.store.most_recent_fallback_thread().await? {
            if Utc::now() - created_at < chrono::Duration::days(THREAD_REUSE_DAYS) {
                return Ok(fullname);
            }
        }

        let now = Utc::now();
        let title = format!("clipbot replies — week of {}", now.format("%Y-%m-%d"));
        let body = "Replies that couldn't be posted on the original thread end up here.";
        let fullname = self
            .api
            .submit_thread(&self.home_subreddit, &title, body)
            .await?;
        self.store.save_fallback_thread(&fullname, now).await?;
        tracing::info!(thread = %fullname, "created new fallback thread");
        Ok(fullname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSocial, memory_store};

    #[tokio::test]
    async fn direct_reply_wins_when_accepted() {
        let social = Arc::new(FakeSocial::new());
        let store = Arc::new(memory_store().await);
        let replier = FallbackReplier::new(social.clone(), store, "clipbot".into());

        let mention = FakeSocial::mention("m1", "someone", "u/clipbot -REVERSE", "t3_root");
        let reply = replier
            .deliver(&mention, "done!")
            .await
            .expect("delivery works");
        assert!(reply.is_some());
        assert!(social.submitted_threads().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_reply_creates_and_reuses_fallback_thread() {
        let social = Arc::new(FakeSocial::new());
        let store = Arc::new(memory_store().await);
        let replier = FallbackReplier::new(social.clone(), store.clone(), "clipbot".into());

        let mention = FakeSocial::mention("m1", "someone", "u/clipbot -REVERSE", "t3_root");

        // First delivery: direct reply rejected, fallback thread created.
        social.script_reply(None).await;
        let reply = replier
            .deliver(&mention, "done!")
            .await
            .expect("delivery works");
        assert!(reply.is_some());
        assert_eq!(social.submitted_threads().await.len(), 1);

        // Second delivery within the reuse window: same thread, no new
        // submission.
        social.script_reply(None).await;
        replier
            .deliver(&mention, "done again!")
            .await
            .expect("delivery works");
        assert_eq!(social.submitted_threads().await.len(), 1);

        let posted = social.posted_comments().await;
        // Two fallback posts landed under the same thread.
        assert_eq!(posted[1].0, posted[3].0);
        assert!(posted[1].1.contains("u/someone"));
    }

    #[tokio::test]
    async fn stale_fallback_pointer_is_replaced() {
        let social = Arc::new(FakeSocial::new());
        let store = Arc::new(memory_store().await);
        store
            .save_fallback_thread("t3_stale", Utc::now() - chrono::Duration::days(30))
            .await
            .expect("seed pointer");
        let replier = FallbackReplier::new(social.clone(), store.clone(), "clipbot".into());

        let mention = FakeSocial::mention("m1", "someone", "u/clipbot -REVERSE", "t3_root");
        social.script_reply(None).await;
        replier
            .deliver(&mention, "done!")
            .await
            .expect("delivery works");

        assert_eq!(social.submitted_threads().await.len(), 1);
        let (fullname, _) = store
            .most_recent_fallback_thread()
            .await
            .expect("query")
            .expect("pointer exists");
        assert_ne!(fullname, "t3_stale");
    }
}
