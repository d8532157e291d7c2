//! Reddit client, auth lifecycle, and platform types.

pub mod auth;
pub mod client;
pub mod types;

pub use client::RedditClient;
pub use types::{AccountInfo, MentionEvent, MentionKind, Post, SocialApi};
