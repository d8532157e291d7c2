//! Test infrastructure: recording fakes for the collaborator contracts.
//!
//! Each fake logs its calls and can be scripted with FIFO responses, so
//! tests can assert exactly which remote effects a pipeline run produced.

use crate::Fullname;
use crate::config::{
    Config, FilterSettings, RedditConfig, SchedulerConfig, TransformConfig, UploadConfig,
};
use crate::error::{ApiError, Result, TransformError};
use crate::pipeline::fetch::MediaFetcher;
use crate::reddit::{AccountInfo, MentionEvent, MentionKind, Post, SocialApi};
use crate::store::UploadLogStore;
use crate::transform::TransformService;
use crate::upload::{UploadDestination, UploadHost, UploadedArtifact};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// An initialized store over in-memory SQLite.
pub async fn memory_store() -> UploadLogStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should connect");
    let store = UploadLogStore::new(pool);
    store.initialize().await.expect("schema should initialize");
    store
}

/// A config with test-friendly defaults rooted at `data_dir`.
pub fn test_config(data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        reddit: RedditConfig {
            client_id: "test-id".into(),
            client_secret: "test-secret".into(),
            username: "clipbot".into(),
            password: "test-password".into(),
            user_agent: "clipbot-test".into(),
            home_subreddit: "clipbot".into(),
        },
        filters: FilterSettings::default(),
        upload: UploadConfig {
            destination: "catbox".into(),
            catbox_userhash: None,
            imgur_client_id: None,
        },
        transform: TransformConfig {
            worker_bin: PathBuf::from("/bin/false"),
        },
        scheduler: SchedulerConfig::default(),
        whitelist: Default::default(),
        blacklist: Default::default(),
    }
}

// ---------------------------------------------------------------------------
// FakeSocial
// ---------------------------------------------------------------------------

/// Scriptable in-memory social platform.
pub struct FakeSocial {
    unread: Mutex<Vec<MentionEvent>>,
    posts: Mutex<HashMap<Fullname, Post>>,
    accounts: Mutex<HashMap<String, AccountInfo>>,
    marked: Mutex<Vec<String>>,
    comments: Mutex<Vec<(Fullname, String)>>,
    reply_script: Mutex<VecDeque<Option<Fullname>>>,
    threads: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<Fullname>>,
    delete_script: Mutex<VecDeque<std::result::Result<bool, String>>>,
    counter: AtomicU64,
}

impl FakeSocial {
    pub fn new() -> Self {
        Self {
            unread: Mutex::new(Vec::new()),
            posts: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            marked: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            reply_script: Mutex::new(VecDeque::new()),
            threads: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            delete_script: Mutex::new(VecDeque::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub async fn push_unread(&self, event: MentionEvent) {
        self.unread.lock().await.push(event);
    }

    pub async fn add_post(&self, post: Post) {
        self.posts
            .lock()
            .await
            .insert(post.fullname().to_string(), post);
    }

    pub async fn add_account(&self, account: AccountInfo) {
        self.accounts
            .lock()
            .await
            .insert(account.username.clone(), account);
    }

    /// Script the next `post_comment` result; `None` simulates the platform
    /// rejecting the reply.
    pub async fn script_reply(&self, result: Option<Fullname>) {
        self.reply_script.lock().await.push_back(result);
    }

    /// Script the next `delete_comment` result; `Err` simulates a transport
    /// failure.
    pub async fn script_delete(&self, result: std::result::Result<bool, String>) {
        self.delete_script.lock().await.push_back(result);
    }

    pub async fn marked_read(&self) -> Vec<String> {
        self.marked.lock().await.clone()
    }

    pub async fn posted_comments(&self) -> Vec<(Fullname, String)> {
        self.comments.lock().await.clone()
    }

    pub async fn submitted_threads(&self) -> Vec<(String, String)> {
        self.threads.lock().await.clone()
    }

    pub async fn deleted_comments(&self) -> Vec<Fullname> {
        self.deleted.lock().await.clone()
    }

    // Builders.

    pub fn mention(id: &str, author: &str, body: &str, parent: &str) -> MentionEvent {
        MentionEvent {
            id: id.to_string(),
            fullname: format!("t1_{id}"),
            kind: MentionKind::Comment,
            subject: "username mention".into(),
            author: author.to_string(),
            body: body.to_string(),
            subreddit: "videos".into(),
            parent_fullname: Some(parent.to_string()),
            permalink: format!("/r/videos/comments/root/x/{id}/"),
            created_at: Utc::now(),
        }
    }

    pub fn private_message(id: &str, author: &str, body: &str) -> MentionEvent {
        MentionEvent {
            id: id.to_string(),
            fullname: format!("t4_{id}"),
            kind: MentionKind::PrivateMessage,
            subject: "hello".into(),
            author: author.to_string(),
            body: body.to_string(),
            subreddit: String::new(),
            parent_fullname: None,
            permalink: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn link_post(fullname: &str, author: &str, url: &str) -> Post {
        Post::Link {
            fullname: fullname.to_string(),
            author: author.to_string(),
            title: "a clip".into(),
            url: url.to_string(),
            selftext: String::new(),
            score: 50,
            over_18: false,
            removed: false,
            subreddit: "videos".into(),
            subreddit_subscribers: 250_000,
            subreddit_public: true,
            created_at: Utc::now() - Duration::days(1),
        }
    }

    pub fn link_post_with(
        fullname: &str,
        author: &str,
        score: i64,
        over_18: bool,
        subreddit_subscribers: i64,
        subreddit_public: bool,
    ) -> Post {
        Post::Link {
            fullname: fullname.to_string(),
            author: author.to_string(),
            title: "a clip".into(),
            url: "https://media.example/clip.mp4".into(),
            selftext: String::new(),
            score,
            over_18,
            removed: false,
            subreddit: "videos".into(),
            subreddit_subscribers,
            subreddit_public,
            created_at: Utc::now() - Duration::days(1),
        }
    }

    pub fn comment_post(fullname: &str, author: &str, body: &str, parent: &str) -> Post {
        Post::Comment {
            fullname: fullname.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            score: 10,
            edited: false,
            parent_fullname: parent.to_string(),
            subreddit: "videos".into(),
            created_at: Utc::now() - Duration::days(1),
        }
    }

    pub fn account(username: &str, combined_karma: i64, created_at: chrono::DateTime<Utc>) -> AccountInfo {
        AccountInfo {
            username: username.to_string(),
            created_at,
            combined_karma,
        }
    }

    pub fn established_account(username: &str) -> AccountInfo {
        Self::account(username, 10_000, Utc::now() - Duration::days(365 * 5))
    }
}

impl Default for FakeSocial {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocialApi for FakeSocial {
    async fn fetch_unread(&self) -> Result<Vec<MentionEvent>> {
        Ok(std::mem::take(&mut *self.unread.lock().await))
    }

    async fn mark_read(&self, ids: &[String]) -> Result<()> {
        self.marked.lock().await.extend(ids.iter().cloned());
        Ok(())
    }

    async fn get_post(&self, fullname: &str) -> Result<Post> {
        self.posts
            .lock()
            .await
            .get(fullname)
            .cloned()
            .ok_or_else(|| {
                ApiError::UnexpectedResponse {
                    endpoint: "fake:get_post".into(),
                    detail: format!("no post {fullname}"),
                }
                .into()
            })
    }

    async fn get_account(&self, username: &str) -> Result<AccountInfo> {
        self.accounts
            .lock()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| {
                ApiError::UnexpectedResponse {
                    endpoint: "fake:get_account".into(),
                    detail: format!("no account {username}"),
                }
                .into()
            })
    }

    async fn post_comment(&self, parent_fullname: &str, text: &str) -> Result<Option<Fullname>> {
        self.comments
            .lock()
            .await
            .push((parent_fullname.to_string(), text.to_string()));
        if let Some(scripted) = self.reply_script.lock().await.pop_front() {
            return Ok(scripted);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("t1_reply{n}")))
    }

    async fn submit_thread(&self, subreddit: &str, title: &str, _body: &str) -> Result<Fullname> {
        self.threads
            .lock()
            .await
            .push((subreddit.to_string(), title.to_string()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("t3_fb{n}"))
    }

    async fn delete_comment(&self, fullname: &str) -> Result<bool> {
        if let Some(scripted) = self.delete_script.lock().await.pop_front() {
            return match scripted {
                Ok(deleted) => {
                    self.deleted.lock().await.push(fullname.to_string());
                    Ok(deleted)
                }
                Err(message) => Err(ApiError::Other(anyhow!(message)).into()),
            };
        }
        self.deleted.lock().await.push(fullname.to_string());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

/// Scriptable upload host.
pub struct FakeHost {
    destination: UploadDestination,
    uploads: Mutex<Vec<u64>>,
    refuse_uploads: AtomicBool,
    deletes: Mutex<Vec<String>>,
    delete_script: Mutex<VecDeque<std::result::Result<bool, String>>>,
    counter: AtomicU64,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::for_destination(UploadDestination::Catbox)
    }

    pub fn for_destination(destination: UploadDestination) -> Self {
        Self {
            destination,
            uploads: Mutex::new(Vec::new()),
            refuse_uploads: AtomicBool::new(false),
            deletes: Mutex::new(Vec::new()),
            delete_script: Mutex::new(VecDeque::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn refuse_uploads(&self) {
        self.refuse_uploads.store(true, Ordering::SeqCst);
    }

    pub async fn script_delete(&self, result: std::result::Result<bool, String>) {
        self.delete_script.lock().await.push_back(result);
    }

    pub async fn upload_count(&self) -> usize {
        self.uploads.lock().await.len()
    }

    pub async fn deleted_keys(&self) -> Vec<String> {
        self.deletes.lock().await.clone()
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadHost for FakeHost {
    fn destination(&self) -> UploadDestination {
        self.destination
    }

    async fn upload(&self, bytes: Vec<u8>, format_hint: &str) -> Result<Option<UploadedArtifact>> {
        self.uploads.lock().await.push(bytes.len() as u64);
        if self.refuse_uploads.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(UploadedArtifact {
            url: format!("https://files.example/clip{n}.{format_hint}"),
            delete_key: format!("key-{n}"),
        }))
    }

    async fn delete(&self, delete_key: &str) -> Result<bool> {
        if let Some(scripted) = self.delete_script.lock().await.pop_front() {
            return match scripted {
                Ok(deleted) => {
                    self.deletes.lock().await.push(delete_key.to_string());
                    Ok(deleted)
                }
                Err(message) => Err(ApiError::Other(anyhow!(message)).into()),
            };
        }
        self.deletes.lock().await.push(delete_key.to_string());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// FakeTransformer
// ---------------------------------------------------------------------------

/// Transform service that copies its input to a fresh output file.
pub struct FakeTransformer {
    calls: Mutex<Vec<crate::command::Operation>>,
    fail_next: AtomicBool,
}

impl FakeTransformer {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub async fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<crate::command::Operation> {
        self.calls.lock().await.clone()
    }
}

impl Default for FakeTransformer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransformService for FakeTransformer {
    async fn execute(
        &self,
        operation: &crate::command::Operation,
        input: &Path,
    ) -> Result<PathBuf> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransformError::Failed {
                operation: operation.tag().to_string(),
                detail: "scripted failure".into(),
            }
            .into());
        }
        self.calls.lock().await.push(operation.clone());
        let output = input.with_extension("out");
        tokio::fs::copy(input, &output)
            .await
            .map_err(TransformError::Io)?;
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// FakeFetcher
// ---------------------------------------------------------------------------

/// Media fetcher serving fixed bytes, honoring the size cap.
pub struct FakeFetcher {
    bytes: Vec<u8>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path, max_bytes: u64) -> Result<u64> {
        self.calls.lock().await.push(url.to_string());
        if self.bytes.len() as u64 > max_bytes {
            return Err(ApiError::DownloadTooLarge { limit: max_bytes }.into());
        }
        tokio::fs::write(dest, &self.bytes).await?;
        Ok(self.bytes.len() as u64)
    }
}
