//! Recursive safety evaluation of a post and its ancestry chain.

use crate::config::FilterSettings;
use crate::error::Result;
use crate::reddit::{Post, SocialApi};
use chrono::Utc;

/// Walks a post's ancestry toward its root link, checking the eligibility
/// policy at each level and short-circuiting on the first failure.
///
/// Whitelisted requestors never reach this evaluator; the processor
/// bypasses it for them.
pub struct SafetyEvaluator<'a> {
    api: &'a dyn SocialApi,
    filters: &'a FilterSettings,
}

impl<'a> SafetyEvaluator<'a> {
    pub fn new(api: &'a dyn SocialApi, filters: &'a FilterSettings) -> Self {
        Self { api, filters }
    }

    /// `is_root` is true only for the originally mentioned post; ancestor
    /// levels skip the score/author checks and only gate on the chain
    /// terminus rules.
    pub async fn is_safe(&self, post: &Post, is_root: bool) -> Result<bool> {
        if is_root && !self.root_checks(post).await? {
            return Ok(false);
        }

        match post {
            Post::Comment {
                parent_fullname, ..
            } => {
                let parent = self.api.get_post(parent_fullname).await?;
                Box::pin(self.is_safe(&parent, false)).await
            }
            Post::Link {
                over_18,
                subreddit,
                subreddit_subscribers,
                subreddit_public,
                ..
            } => {
                if *over_18 && !self.filters.allow_nsfw {
                    tracing::debug!(subreddit, "rejecting: link flagged over 18");
                    return Ok(false);
                }
                if *subreddit_subscribers < self.filters.min_subreddit_subscribers {
                    tracing::debug!(
                        subreddit,
                        subscribers = subreddit_subscribers,
                        "rejecting: subreddit too small"
                    );
                    return Ok(false);
                }
                if !*subreddit_public && !self.filters.allow_non_public_subreddits {
                    tracing::debug!(subreddit, "rejecting: subreddit not public");
                    return Ok(false);
                }
                Ok(true)
            }
        }
    }

    async fn root_checks(&self, post: &Post) -> Result<bool> {
        if post.score() < self.filters.min_score {
            tracing::debug!(score = post.score(), "rejecting: score below minimum");
            return Ok(false);
        }

        if let Post::Comment { body, edited, .. } = post {
            if *edited && !self.filters.allow_edited {
                tracing::debug!("rejecting: comment was edited");
                return Ok(false);
            }
            if !self.filters.allow_nsfw && declares_nsfw(body) {
                tracing::debug!("rejecting: comment self-declares NSFW");
                return Ok(false);
            }
        }

        let account = self.api.get_account(post.author()).await?;
        if account.combined_karma < self.filters.min_account_karma {
            tracing::debug!(
                author = post.author(),
                karma = account.combined_karma,
                "rejecting: account karma below minimum"
            );
            return Ok(false);
        }
        let account_age_days = (Utc::now() - account.created_at).num_days();
        if account_age_days < self.filters.min_account_age_days {
            tracing::debug!(
                author = post.author(),
                account_age_days,
                "rejecting: account too young"
            );
            return Ok(false);
        }

        Ok(true)
    }
}

fn declares_nsfw(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("nsfw") || lower.contains("nsfl")
}
