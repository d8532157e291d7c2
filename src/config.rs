//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// clipbot configuration, loaded once at process start and read-only after.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory (database, scratch space).
    pub data_dir: PathBuf,

    /// Reddit API credentials and identity.
    pub reddit: RedditConfig,

    /// Eligibility thresholds for incoming requests.
    pub filters: FilterSettings,

    /// Upload destination selection and host credentials.
    pub upload: UploadConfig,

    /// External transform worker.
    pub transform: TransformConfig,

    /// Scheduler cadence.
    pub scheduler: SchedulerConfig,

    /// Requestors processed without safety checks.
    pub whitelist: HashSet<String>,

    /// Requestors never processed.
    pub blacklist: HashSet<String>,
}

/// Reddit script-app credentials and bot identity.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    /// Subreddit where fallback threads are created (usually the bot's own).
    pub home_subreddit: String,
}

/// Numeric/boolean thresholds governing request eligibility.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Minimum age of the mentioned post, in minutes.
    pub min_post_age_minutes: i64,
    /// Minimum score of the mentioned post/comment.
    pub min_score: i64,
    /// Minimum age of the requesting account, in days.
    pub min_account_age_days: i64,
    /// Minimum combined (link + comment) karma of the requesting account.
    pub min_account_karma: i64,
    /// Minimum subscriber count of the root link's subreddit.
    pub min_subreddit_subscribers: i64,
    pub allow_nsfw: bool,
    pub allow_edited: bool,
    pub allow_non_public_subreddits: bool,
    /// Maximum source media download size, in bytes.
    pub max_download_bytes: u64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_post_age_minutes: 10,
            min_score: 1,
            min_account_age_days: 30,
            min_account_karma: 100,
            min_subreddit_subscribers: 1000,
            allow_nsfw: false,
            allow_edited: false,
            allow_non_public_subreddits: false,
            max_download_bytes: 200 * 1024 * 1024,
        }
    }
}

/// Upload host selection and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Destination name, matching `UploadDestination::parse`.
    pub destination: String,
    /// Catbox userhash; anonymous uploads when absent.
    #[serde(default)]
    pub catbox_userhash: Option<String>,
    /// Imgur API client id.
    #[serde(default)]
    pub imgur_client_id: Option<String>,
}

/// External transform worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    /// Path to the transform worker binary.
    pub worker_bin: PathBuf,
}

/// Outer loop cadence.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between message-processor iterations.
    pub poll_interval_secs: u64,
    /// Processor iterations per cleanup sweep.
    pub iterations_per_sweep: u32,
    /// Recent-sweep cutoff: rows uploaded within this window are reconciled.
    pub recent_cutoff_hours: i64,
    /// Wide-sweep cutoff, applied every `wide_sweep_every`-th sweep.
    pub wide_cutoff_hours: i64,
    pub wide_sweep_every: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            iterations_per_sweep: 10,
            recent_cutoff_hours: 24,
            wide_cutoff_hours: 24 * 30,
            wide_sweep_every: 12,
        }
    }
}

/// On-disk TOML shape. Secrets may instead come from the environment.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    reddit: RedditFileSection,
    #[serde(default)]
    filters: FilterSettings,
    upload: UploadConfig,
    transform: TransformConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    whitelist: Vec<String>,
    #[serde(default)]
    blacklist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RedditFileSection {
    client_id: Option<String>,
    client_secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
    user_agent: Option<String>,
    home_subreddit: String,
}

impl Config {
    /// Load configuration from the default location
    /// (`$CONFIG_DIR/clipbot/clipbot.toml`).
    pub fn load() -> Result<Self> {
        let path = dirs::config_dir()
            .map(|d| d.join("clipbot").join("clipbot.toml"))
            .unwrap_or_else(|| PathBuf::from("clipbot.toml"));
        Self::load_from_path(&path)
    }

    /// Load from a specific config file path, applying environment overrides
    /// for secrets (`CLIPBOT_CLIENT_ID`, `CLIPBOT_CLIENT_SECRET`,
    /// `CLIPBOT_USERNAME`, `CLIPBOT_PASSWORD`).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.display().to_string(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(ConfigError::Parse)?;

        let data_dir = match file.data_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|d| d.join("clipbot"))
                .unwrap_or_else(|| PathBuf::from("./data")),
        };

        let reddit = RedditConfig {
            client_id: env_or(file.reddit.client_id, "CLIPBOT_CLIENT_ID")?,
            client_secret: env_or(file.reddit.client_secret, "CLIPBOT_CLIENT_SECRET")?,
            username: env_or(file.reddit.username, "CLIPBOT_USERNAME")?,
            password: env_or(file.reddit.password, "CLIPBOT_PASSWORD")?,
            user_agent: file
                .reddit
                .user_agent
                .unwrap_or_else(|| format!("clipbot/{}", env!("CARGO_PKG_VERSION"))),
            home_subreddit: file.reddit.home_subreddit,
        };

        let config = Self {
            data_dir,
            reddit,
            filters: file.filters,
            upload: file.upload,
            transform: file.transform,
            scheduler: file.scheduler,
            whitelist: file.whitelist.into_iter().collect(),
            blacklist: file.blacklist.into_iter().collect(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if crate::upload::UploadDestination::parse(&self.upload.destination).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown upload destination `{}`",
                self.upload.destination
            )));
        }
        if self.scheduler.iterations_per_sweep == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.iterations_per_sweep must be at least 1".into(),
            ));
        }
        if self.scheduler.wide_sweep_every == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.wide_sweep_every must be at least 1".into(),
            ));
        }
        if self.filters.max_download_bytes == 0 {
            return Err(ConfigError::Invalid(
                "filters.max_download_bytes must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("clipbot.db")
    }

    /// Scratch directory for in-flight media files.
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }

    /// The bot's own handle as it appears in mention text (`u/<username>`).
    pub fn handle(&self) -> String {
        format!("u/{}", self.reddit.username)
    }
}

fn env_or(file_value: Option<String>, env_key: &str) -> std::result::Result<String, ConfigError> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.is_empty() {
            return Ok(value);
        }
    }
    file_value.ok_or_else(|| ConfigError::MissingKey(env_key.to_ascii_lowercase()))
}
