use std::time::Duration;

use tokio::time::sleep;

use crate::{
    domain::{BucketId, Posting},
    ports::{ChatPlatform, HistoryPage},
    Result,
};

/// Paging parameters for history reads.
#[derive(Clone, Copy, Debug)]
pub struct HistoryConfig {
    pub page_size: usize,
    /// Sleep between consecutive page requests.
    pub page_pacing: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_pacing: Duration::from_secs(1),
        }
    }
}

/// Walk a bucket's history newest-first, page by page, until `visit` returns
/// `true` or history runs out. Returns whether `visit` stopped the walk.
pub async fn scan_history(
    platform: &dyn ChatPlatform,
    bucket: BucketId,
    cfg: HistoryConfig,
    mut visit: impl FnMut(&Posting) -> bool + Send,
) -> Result<bool> {
    let limit = cfg.page_size.max(1);
    let mut before = None;
    loop {
        let page = platform.postings(bucket, HistoryPage { before, limit }).await?;
        for posting in &page {
            if visit(posting) {
                return Ok(true);
            }
        }
        if page.len() < limit {
            return Ok(false);
        }
        before = page.last().map(|p| p.id);
        sleep(cfg.page_pacing).await;
    }
}

/// Full history of a bucket, oldest first.
pub async fn collect_history(
    platform: &dyn ChatPlatform,
    bucket: BucketId,
    cfg: HistoryConfig,
) -> Result<Vec<Posting>> {
    let mut all = Vec::new();
    scan_history(platform, bucket, cfg, |p| {
        all.push(p.clone());
        false
    })
    .await?;
    all.reverse();
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPlatform;

    #[tokio::test]
    async fn pages_through_everything_oldest_first() {
        let platform = InMemoryPlatform::new();
        let g = platform.add_grouping("g");
        let b = platform.add_bucket(g.id, "b");
        for i in 0..7 {
            platform.seed(b.id, &format!("m{i}"), false);
        }
        let cfg = HistoryConfig {
            page_size: 3,
            page_pacing: Duration::ZERO,
        };
        let all = collect_history(&platform, b.id, cfg).await.unwrap();
        let contents: Vec<_> = all.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4", "m5", "m6"]);
    }

    #[tokio::test]
    async fn scan_stops_early() {
        let platform = InMemoryPlatform::new();
        let g = platform.add_grouping("g");
        let b = platform.add_bucket(g.id, "b");
        for i in 0..5 {
            platform.seed(b.id, &format!("m{i}"), false);
        }
        let mut seen = 0;
        let found = scan_history(&platform, b.id, HistoryConfig::default(), |p| {
            seen += 1;
            p.content == "m3"
        })
        .await
        .unwrap();
        assert!(found);
        assert_eq!(seen, 2);
    }
}
