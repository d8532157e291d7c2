//! Mention-processing pipeline: download, transform chain, upload, reply.

pub mod fallback;
pub mod fetch;
pub mod processor;

pub use fallback::FallbackReplier;
pub use fetch::{HttpFetcher, MediaFetcher};
pub use processor::{BatchSummary, MentionOutcome, MessageProcessor, SkipReason};
