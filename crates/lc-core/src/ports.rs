use std::time::Duration;

use async_trait::async_trait;

use crate::{domain::*, Result};

/// Capabilities / feature flags of a chat platform implementation.
#[derive(Clone, Copy, Debug)]
pub struct PlatformCapabilities {
    pub max_posting_len: usize,
    /// The platform lowercases bucket names on creation (Discord text channels).
    pub folds_bucket_names: bool,
    pub supports_threads: bool,
}

/// One page request over a bucket's history.
///
/// Pages are returned newest first; `before` excludes the cursor itself.
#[derive(Clone, Copy, Debug)]
pub struct HistoryPage {
    pub before: Option<PostingId>,
    pub limit: usize,
}

/// Hexagonal port for the chat platform.
///
/// Discord is the first implementation. Every call goes to the platform; the
/// core never caches the namespace between calls.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn capabilities(&self) -> PlatformCapabilities;

    async fn groupings(&self) -> Result<Vec<Grouping>>;
    async fn create_grouping(&self, name: &str) -> Result<Grouping>;

    async fn buckets(&self, grouping: GroupingId) -> Result<Vec<Bucket>>;
    async fn create_bucket(&self, grouping: GroupingId, name: &str) -> Result<Bucket>;
    async fn delete_bucket(&self, bucket: BucketId) -> Result<()>;

    /// Active threads opened inside `bucket`.
    async fn threads(&self, bucket: BucketId) -> Result<Vec<Thread>>;
    async fn create_thread(&self, bucket: BucketId, name: &str) -> Result<Thread>;

    async fn postings(&self, bucket: BucketId, page: HistoryPage) -> Result<Vec<Posting>>;
    async fn create_posting(&self, bucket: BucketId, content: &str) -> Result<Posting>;
    async fn delete_posting(&self, bucket: BucketId, posting: PostingId) -> Result<()>;

    async fn permissions(&self, scope: Scope) -> Result<Permissions>;
}

#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Port for plain HTTP GETs.
///
/// Non-success statuses are returned as responses; transport failures and
/// timeouts surface as `Error::Fetch`.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchResponse>;
}

/// Port for the text-completion model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Longest prompt (characters) the service accepts. Longer prompts are
    /// rejected without a network call.
    fn prompt_ceiling(&self) -> usize;

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocialCard {
    pub title: Option<String>,
    pub author: Option<String>,
    pub body_html: Option<String>,
}

/// Port for the social-embed (oEmbed) metadata service.
#[async_trait]
pub trait SocialCardService: Send + Sync {
    async fn card(&self, url: &str) -> Result<SocialCard>;
}
