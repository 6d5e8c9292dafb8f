use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::*,
    errors::Error,
    ports::{ChatPlatform, HistoryPage, PlatformCapabilities},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two platform calls.
    pub min_interval: Duration,
    /// How many times a `RateLimited` error is retried after its advised delay.
    pub max_retries: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(250),
            max_retries: 1,
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Run `op`, sleeping and retrying when it fails with `RateLimited`.
pub async fn with_backoff<T, F, Fut>(max_retries: usize, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0usize;
    loop {
        match op().await {
            Err(Error::RateLimited { retry_after }) if attempts < max_retries => {
                attempts += 1;
                tracing::warn!(?retry_after, attempts, "rate limited; backing off");
                sleep(retry_after).await;
            }
            other => return other,
        }
    }
}

/// ChatPlatform decorator that spaces out calls and honors retry-after
/// signals.
pub struct ThrottledPlatform {
    inner: Arc<dyn ChatPlatform>,
    cfg: ThrottleConfig,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn ChatPlatform>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            limiter: Mutex::new(IntervalLimiter::new(cfg.min_interval)),
        }
    }

    async fn throttle(&self) {
        let wait = { self.limiter.lock().await.reserve() };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }
    }

    async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_backoff(self.cfg.max_retries, || {
            let fut = op();
            async move {
                self.throttle().await;
                fut.await
            }
        })
        .await
    }
}

#[async_trait]
impl ChatPlatform for ThrottledPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.inner.capabilities()
    }

    async fn groupings(&self) -> Result<Vec<Grouping>> {
        self.call(|| self.inner.groupings()).await
    }

    async fn create_grouping(&self, name: &str) -> Result<Grouping> {
        self.call(|| self.inner.create_grouping(name)).await
    }

    async fn buckets(&self, grouping: GroupingId) -> Result<Vec<Bucket>> {
        self.call(|| self.inner.buckets(grouping)).await
    }

    async fn create_bucket(&self, grouping: GroupingId, name: &str) -> Result<Bucket> {
        self.call(|| self.inner.create_bucket(grouping, name)).await
    }

    async fn delete_bucket(&self, bucket: BucketId) -> Result<()> {
        self.call(|| self.inner.delete_bucket(bucket)).await
    }

    async fn threads(&self, bucket: BucketId) -> Result<Vec<Thread>> {
        self.call(|| self.inner.threads(bucket)).await
    }

    async fn create_thread(&self, bucket: BucketId, name: &str) -> Result<Thread> {
        self.call(|| self.inner.create_thread(bucket, name)).await
    }

    async fn postings(&self, bucket: BucketId, page: HistoryPage) -> Result<Vec<Posting>> {
        self.call(|| self.inner.postings(bucket, page)).await
    }

    async fn create_posting(&self, bucket: BucketId, content: &str) -> Result<Posting> {
        self.call(|| self.inner.create_posting(bucket, content)).await
    }

    async fn delete_posting(&self, bucket: BucketId, posting: PostingId) -> Result<()> {
        self.call(|| self.inner.delete_posting(bucket, posting)).await
    }

    async fn permissions(&self, scope: Scope) -> Result<Permissions> {
        self.call(|| self.inner.permissions(scope)).await
    }
}
