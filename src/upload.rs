//! Upload-host contract and the destination registry.

pub mod catbox;
pub mod imgur;

use crate::error::{ContractError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Supported hosting services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadDestination {
    Catbox,
    Imgur,
}

impl UploadDestination {
    pub const ALL: [UploadDestination; 2] = [UploadDestination::Catbox, UploadDestination::Imgur];

    pub fn as_str(self) -> &'static str {
        match self {
            UploadDestination::Catbox => "catbox",
            UploadDestination::Imgur => "imgur",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "catbox" => Some(UploadDestination::Catbox),
            "imgur" => Some(UploadDestination::Imgur),
            _ => None,
        }
    }
}

impl std::fmt::Display for UploadDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A successfully published artifact: public link plus the opaque token
/// needed to retract it later.
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    pub url: String,
    pub delete_key: String,
}

/// One hosting service client.
#[async_trait]
pub trait UploadHost: Send + Sync {
    fn destination(&self) -> UploadDestination;

    /// Publish the bytes. `None` means the host refused the upload without
    /// a transport failure (too large, unsupported format).
    async fn upload(&self, bytes: Vec<u8>, format_hint: &str) -> Result<Option<UploadedArtifact>>;

    /// Retract a previously published artifact by its delete key. False
    /// when the artifact was already gone.
    async fn delete(&self, delete_key: &str) -> Result<bool>;
}

/// Destination-indexed host clients, used by the cleanup manager to route
/// artifact deletions.
#[derive(Default)]
pub struct HostRegistry {
    hosts: HashMap<UploadDestination, Arc<dyn UploadHost>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, host: Arc<dyn UploadHost>) {
        self.hosts.insert(host.destination(), host);
    }

    /// An unregistered destination is a configuration error, never a silent
    /// skip.
    pub fn get(&self, destination: UploadDestination) -> Result<&Arc<dyn UploadHost>> {
        self.hosts
            .get(&destination)
            .ok_or_else(|| ContractError::UnknownDestination(destination.to_string()).into())
    }
}
