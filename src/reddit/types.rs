//! Platform-facing data types and the social API contract.

use crate::Fullname;
use crate::error::{ContractError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Discriminator for inbox items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionKind {
    Comment,
    Link,
    PrivateMessage,
}

impl MentionKind {
    /// Map the platform's type prefix onto a kind. Anything else breaks the
    /// inbox contract.
    pub fn parse(kind: &str) -> std::result::Result<Self, ContractError> {
        match kind {
            "t1" => Ok(MentionKind::Comment),
            "t3" => Ok(MentionKind::Link),
            "t4" => Ok(MentionKind::PrivateMessage),
            other => Err(ContractError::UnknownMentionKind(other.to_string())),
        }
    }
}

/// One inbox item referencing the bot. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct MentionEvent {
    /// Short id used for mark-read.
    pub id: String,
    pub fullname: Fullname,
    pub kind: MentionKind,
    /// Inbox subject line; username mentions carry a fixed subject.
    pub subject: String,
    pub author: String,
    pub body: String,
    pub subreddit: String,
    pub parent_fullname: Option<Fullname>,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}

impl MentionEvent {
    /// Whether this inbox item is a comment that mentions the bot by name,
    /// as opposed to a reply, a modmail, or a private message.
    pub fn is_mention_comment(&self) -> bool {
        self.kind == MentionKind::Comment && self.subject == "username mention"
    }
}

/// A node in an ancestry chain: either an intermediate comment or the root
/// link submission that carries the media.
#[derive(Debug, Clone)]
pub enum Post {
    Comment {
        fullname: Fullname,
        author: String,
        body: String,
        score: i64,
        edited: bool,
        parent_fullname: Fullname,
        subreddit: String,
        created_at: DateTime<Utc>,
    },
    Link {
        fullname: Fullname,
        author: String,
        title: String,
        url: String,
        selftext: String,
        score: i64,
        over_18: bool,
        /// Banned or removed by moderators/admins.
        removed: bool,
        subreddit: String,
        subreddit_subscribers: i64,
        subreddit_public: bool,
        created_at: DateTime<Utc>,
    },
}

impl Post {
    pub fn fullname(&self) -> &str {
        match self {
            Post::Comment { fullname, .. } | Post::Link { fullname, .. } => fullname,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Post::Comment { author, .. } | Post::Link { author, .. } => author,
        }
    }

    pub fn score(&self) -> i64 {
        match self {
            Post::Comment { score, .. } | Post::Link { score, .. } => *score,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Post::Comment { created_at, .. } | Post::Link { created_at, .. } => *created_at,
        }
    }

    /// Accounts show as `[deleted]` once removed.
    pub fn author_removed(&self) -> bool {
        self.author() == "[deleted]"
    }
}

/// Requesting-account metadata, fetched lazily during safety evaluation.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub username: String,
    pub created_at: DateTime<Utc>,
    /// Link karma plus comment karma.
    pub combined_karma: i64,
}

/// The social-platform client contract.
///
/// Every method is subject to the client's rate-limiter and token lifecycle;
/// transient transport failures surface to the caller, which decides whether
/// to retry.
#[async_trait]
pub trait SocialApi: Send + Sync {
    async fn fetch_unread(&self) -> Result<Vec<MentionEvent>>;

    async fn mark_read(&self, ids: &[String]) -> Result<()>;

    /// Fetch a comment or link by fullname.
    async fn get_post(&self, fullname: &str) -> Result<Post>;

    async fn get_account(&self, username: &str) -> Result<AccountInfo>;

    /// Post a reply under the given parent. `None` means the platform
    /// rejected the reply (locked or deleted thread) without a transport
    /// failure; callers fall back to the fallback thread.
    async fn post_comment(&self, parent_fullname: &str, text: &str) -> Result<Option<Fullname>>;

    /// Create a new self-post thread, returning its fullname.
    async fn submit_thread(&self, subreddit: &str, title: &str, body: &str) -> Result<Fullname>;

    /// Delete one of the bot's own comments. Returns false when the comment
    /// was already gone.
    async fn delete_comment(&self, fullname: &str) -> Result<bool>;
}
