//! Hand-written port fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use std::sync::Arc;

use crate::{
    classifier::{Classifier, ClassifierConfig},
    config::PlacementMode,
    domain::*,
    errors::Error,
    history::HistoryConfig,
    namer::BucketNamer,
    organizer::{Organizer, OrganizerConfig},
    pipeline::LinkPipeline,
    ports::*,
    resolver::{ContentResolver, ResolverConfig},
    Result,
};

#[derive(Default)]
struct State {
    next_id: u64,
    groupings: Vec<Grouping>,
    buckets: Vec<Bucket>,
    threads: Vec<Thread>,
    // Insertion order is chronological order.
    postings: Vec<(BucketId, Posting)>,
    denied: HashMap<Scope, Permissions>,
    failing_deletes: HashSet<PostingId>,
    failing_creates: HashSet<BucketId>,
    unreadable: HashSet<BucketId>,
    unknown_scopes: HashSet<Scope>,
    race_next_bucket: Option<String>,
    bucket_creates: usize,
}

impl State {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct InMemoryPlatform {
    state: Mutex<State>,
    caps: PlatformCapabilities,
    epoch: DateTime<Utc>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::with_caps(PlatformCapabilities {
            max_posting_len: 2000,
            folds_bucket_names: false,
            supports_threads: true,
        })
    }

    pub fn with_caps(caps: PlatformCapabilities) -> Self {
        Self {
            state: Mutex::new(State::default()),
            caps,
            epoch: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn add_grouping(&self, name: &str) -> Grouping {
        let mut st = self.state.lock().unwrap();
        let g = Grouping {
            id: GroupingId(st.alloc()),
            name: name.to_string(),
        };
        st.groupings.push(g.clone());
        g
    }

    pub fn add_bucket(&self, grouping: GroupingId, name: &str) -> Bucket {
        let mut st = self.state.lock().unwrap();
        let b = Bucket {
            id: BucketId(st.alloc()),
            grouping,
            name: name.to_string(),
        };
        st.buckets.push(b.clone());
        b
    }

    pub fn seed(&self, bucket: BucketId, content: &str, author_is_bot: bool) -> Posting {
        let mut st = self.state.lock().unwrap();
        self.push_posting(&mut st, bucket, content, author_is_bot)
    }

    fn push_posting(
        &self,
        st: &mut State,
        bucket: BucketId,
        content: &str,
        author_is_bot: bool,
    ) -> Posting {
        let id = st.alloc();
        let p = Posting {
            id: PostingId(id),
            content: content.to_string(),
            author_is_bot,
            created_at: self.epoch + chrono::Duration::seconds(id as i64),
        };
        st.postings.push((bucket, p.clone()));
        p
    }

    pub fn deny(&self, scope: Scope, perms: Permissions) {
        self.state.lock().unwrap().denied.insert(scope, perms);
    }

    pub fn fail_delete(&self, posting: PostingId) {
        self.state.lock().unwrap().failing_deletes.insert(posting);
    }

    pub fn fail_create(&self, bucket: BucketId) {
        self.state.lock().unwrap().failing_creates.insert(bucket);
    }

    /// History reads of `bucket` fail with a permission error.
    pub fn hide_history(&self, bucket: BucketId) {
        self.state.lock().unwrap().unreadable.insert(bucket);
    }

    /// Permission lookups for `scope` fail outright.
    pub fn break_permissions(&self, scope: Scope) {
        self.state.lock().unwrap().unknown_scopes.insert(scope);
    }

    /// The next `create_bucket` loses a race against a concurrent creator of
    /// a bucket named `name`.
    pub fn race_next_bucket_create(&self, name: &str) {
        self.state.lock().unwrap().race_next_bucket = Some(name.to_string());
    }

    pub fn bucket_creates(&self) -> usize {
        self.state.lock().unwrap().bucket_creates
    }

    pub fn grouping_names(&self) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.groupings.iter().map(|g| g.name.clone()).collect()
    }

    pub fn find_grouping(&self, name: &str) -> Option<Grouping> {
        let st = self.state.lock().unwrap();
        st.groupings.iter().find(|g| g.name == name).cloned()
    }

    pub fn bucket_names(&self, grouping: GroupingId) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.buckets
            .iter()
            .filter(|b| b.grouping == grouping)
            .map(|b| b.name.clone())
            .collect()
    }

    pub fn find_bucket(&self, grouping: GroupingId, name: &str) -> Option<Bucket> {
        let st = self.state.lock().unwrap();
        st.buckets
            .iter()
            .find(|b| b.grouping == grouping && b.name == name)
            .cloned()
    }

    pub fn thread_names(&self, bucket: BucketId) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.threads
            .iter()
            .filter(|t| t.parent == bucket)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn find_thread(&self, bucket: BucketId, name: &str) -> Option<Thread> {
        let st = self.state.lock().unwrap();
        st.threads
            .iter()
            .find(|t| t.parent == bucket && t.name == name)
            .cloned()
    }

    /// Posting contents of `bucket`, oldest first.
    pub fn contents(&self, bucket: BucketId) -> Vec<String> {
        let st = self.state.lock().unwrap();
        st.postings
            .iter()
            .filter(|(b, _)| *b == bucket)
            .map(|(_, p)| p.content.clone())
            .collect()
    }

    fn allowed(st: &State, scope: Scope) -> Permissions {
        st.denied.get(&scope).copied().unwrap_or(Permissions::ALL)
    }
}

#[async_trait]
impl ChatPlatform for InMemoryPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.caps
    }

    async fn groupings(&self) -> Result<Vec<Grouping>> {
        Ok(self.state.lock().unwrap().groupings.clone())
    }

    async fn create_grouping(&self, name: &str) -> Result<Grouping> {
        let mut st = self.state.lock().unwrap();
        if !Self::allowed(&st, Scope::Root).manage_buckets {
            return Err(Error::permission("server"));
        }
        if st.groupings.iter().any(|g| g.name == name) {
            return Err(Error::Conflict(name.to_string()));
        }
        let g = Grouping {
            id: GroupingId(st.alloc()),
            name: name.to_string(),
        };
        st.groupings.push(g.clone());
        Ok(g)
    }

    async fn buckets(&self, grouping: GroupingId) -> Result<Vec<Bucket>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .buckets
            .iter()
            .filter(|b| b.grouping == grouping)
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, grouping: GroupingId, name: &str) -> Result<Bucket> {
        let mut st = self.state.lock().unwrap();
        if !Self::allowed(&st, Scope::Grouping(grouping)).manage_buckets {
            return Err(Error::permission(format!("grouping {}", grouping.0)));
        }
        let name = if self.caps.folds_bucket_names {
            name.to_lowercase()
        } else {
            name.to_string()
        };
        if let Some(rival) = st.race_next_bucket.take() {
            let id = BucketId(st.alloc());
            st.buckets.push(Bucket {
                id,
                grouping,
                name: rival,
            });
        }
        if st
            .buckets
            .iter()
            .any(|b| b.grouping == grouping && b.name == name)
        {
            return Err(Error::Conflict(name));
        }
        st.bucket_creates += 1;
        let b = Bucket {
            id: BucketId(st.alloc()),
            grouping,
            name,
        };
        st.buckets.push(b.clone());
        Ok(b)
    }

    async fn delete_bucket(&self, bucket: BucketId) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let Some(b) = st.buckets.iter().find(|b| b.id == bucket).cloned() else {
            return Err(Error::External(format!("unknown bucket {}", bucket.0)));
        };
        if !Self::allowed(&st, Scope::Grouping(b.grouping)).manage_buckets {
            return Err(Error::permission(format!("grouping {}", b.grouping.0)));
        }
        st.buckets.retain(|b| b.id != bucket);
        st.postings.retain(|(b, _)| *b != bucket);
        Ok(())
    }

    async fn threads(&self, bucket: BucketId) -> Result<Vec<Thread>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .threads
            .iter()
            .filter(|t| t.parent == bucket)
            .cloned()
            .collect())
    }

    async fn create_thread(&self, bucket: BucketId, name: &str) -> Result<Thread> {
        let mut st = self.state.lock().unwrap();
        let t = Thread {
            id: BucketId(st.alloc()),
            parent: bucket,
            name: name.to_string(),
        };
        st.threads.push(t.clone());
        Ok(t)
    }

    async fn postings(&self, bucket: BucketId, page: HistoryPage) -> Result<Vec<Posting>> {
        let st = self.state.lock().unwrap();
        if st.unreadable.contains(&bucket) {
            return Err(Error::permission(format!("bucket {}", bucket.0)));
        }
        Ok(st
            .postings
            .iter()
            .rev()
            .filter(|(b, _)| *b == bucket)
            .filter(|(_, p)| page.before.map(|before| p.id < before).unwrap_or(true))
            .take(page.limit)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn create_posting(&self, bucket: BucketId, content: &str) -> Result<Posting> {
        let mut st = self.state.lock().unwrap();
        if st.failing_creates.contains(&bucket) {
            return Err(Error::External("create rejected".to_string()));
        }
        Ok(self.push_posting(&mut st, bucket, content, true))
    }

    async fn delete_posting(&self, bucket: BucketId, posting: PostingId) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if !Self::allowed(&st, Scope::Bucket(bucket)).manage_postings {
            return Err(Error::permission(format!("bucket {}", bucket.0)));
        }
        if st.failing_deletes.contains(&posting) {
            return Err(Error::External("delete rejected".to_string()));
        }
        st.postings.retain(|(_, p)| p.id != posting);
        Ok(())
    }

    async fn permissions(&self, scope: Scope) -> Result<Permissions> {
        let st = self.state.lock().unwrap();
        if st.unknown_scopes.contains(&scope) {
            return Err(Error::External(format!("unknown channel for {scope}")));
        }
        Ok(Self::allowed(&st, scope))
    }
}

/// Fetcher answering from a fixed table; unknown URLs get a 404.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FetchResponse>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "text/html".to_string())],
                body: html.to_string(),
            },
        );
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchResponse {
                status,
                headers: Vec::new(),
                body: String::new(),
            },
        );
        self
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<FetchResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(self.pages.get(url).cloned().unwrap_or(FetchResponse {
            status: 404,
            headers: Vec::new(),
            body: String::new(),
        }))
    }
}

/// Completion service replaying scripted answers, then a default answer.
pub struct FakeCompletion {
    script: Mutex<VecDeque<Result<String>>>,
    default: String,
    ceiling: usize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn answering(default: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: default.to_string(),
            ceiling: 100_000,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, answer: Result<String>) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    fn prompt_ceiling(&self) -> usize {
        self.ceiling
    }

    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(self.default.clone()),
        }
    }
}

pub struct FakeSocial {
    pub card: SocialCard,
}

#[async_trait]
impl SocialCardService for FakeSocial {
    async fn card(&self, _url: &str) -> Result<SocialCard> {
        Ok(self.card.clone())
    }
}

pub fn instant_history() -> HistoryConfig {
    HistoryConfig {
        page_size: 100,
        page_pacing: Duration::ZERO,
    }
}

/// Full link pipeline over fakes, filing into `CURATED` with no pacing.
pub fn test_pipeline(
    platform: Arc<InMemoryPlatform>,
    fetcher: FakeFetcher,
    completion: Arc<FakeCompletion>,
) -> LinkPipeline {
    let namer = BucketNamer::default();
    let organizer = Arc::new(Organizer::new(
        platform,
        namer.clone(),
        OrganizerConfig {
            grouping_name: "CURATED".to_string(),
            placement: PlacementMode::Flat,
            history: instant_history(),
        },
    ));
    LinkPipeline::new(
        ContentResolver::new(
            Arc::new(fetcher),
            None,
            ResolverConfig {
                timeout: Duration::from_secs(1),
                pacing: Duration::ZERO,
            },
        ),
        Classifier::new(
            completion,
            ClassifierConfig {
                pacing: Duration::ZERO,
                ..ClassifierConfig::default()
            },
        ),
        namer,
        organizer,
    )
}
