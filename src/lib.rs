//! clipbot: a Reddit mention bot that edits linked media on command and
//! reposts the result to an upload host, with a reconciliation sweep that
//! retracts uploads whose originating posts have gone bad.

pub mod cleanup;
pub mod command;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod ratelimit;
pub mod reddit;
pub mod safety;
pub mod scheduler;
pub mod store;
pub mod transform;
pub mod upload;

#[cfg(test)]
pub mod testing;

pub use error::{Error, Result};

/// Reddit "fullname" identifier (`t1_...` comment, `t3_...` link, etc.).
pub type Fullname = String;
