use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{BucketId, Posting, PostingId},
    history::{collect_history, HistoryConfig},
    ports::ChatPlatform,
    Result,
};

/// The order a slice of postings is given in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryOrder {
    OldestFirst,
    NewestFirst,
}

/// Postings to delete so that only the earliest posting per URL survives.
///
/// Postings are compared by their extracted URL; postings without a URL are
/// always kept.
pub fn plan_duplicates(postings: &[Posting], order: HistoryOrder) -> Vec<PostingId> {
    let chronological: Box<dyn Iterator<Item = &Posting>> = match order {
        HistoryOrder::OldestFirst => Box::new(postings.iter()),
        HistoryOrder::NewestFirst => Box::new(postings.iter().rev()),
    };

    let mut seen = HashSet::new();
    let mut doomed = Vec::new();
    for posting in chronological {
        let Some(url) = posting.url() else {
            continue;
        };
        if !seen.insert(url) {
            doomed.push(posting.id);
        }
    }
    doomed
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Removes repeated URLs from bucket histories.
pub struct Deduplicator {
    platform: Arc<dyn ChatPlatform>,
    history: HistoryConfig,
    /// Sleep before every delete.
    delete_pacing: Duration,
}

impl Deduplicator {
    pub fn new(platform: Arc<dyn ChatPlatform>, history: HistoryConfig, delete_pacing: Duration) -> Self {
        Self {
            platform,
            history,
            delete_pacing,
        }
    }

    /// Dedup one bucket. Failed deletes are logged and counted; the sweep
    /// carries on.
    pub async fn dedup_bucket(
        &self,
        bucket: BucketId,
        cancel: &CancellationToken,
    ) -> Result<DedupReport> {
        let history = collect_history(self.platform.as_ref(), bucket, self.history).await?;
        let doomed = plan_duplicates(&history, HistoryOrder::OldestFirst);

        let mut report = DedupReport {
            scanned: history.len(),
            ..DedupReport::default()
        };
        for posting in doomed {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            sleep(self.delete_pacing).await;
            match self.platform.delete_posting(bucket, posting).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!(bucket = bucket.0, posting = posting.0, error = %e, "delete failed; continuing");
                    report.failed += 1;
                }
            }
        }
        if report.deleted > 0 {
            tracing::info!(bucket = bucket.0, deleted = report.deleted, "removed duplicate postings");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryPlatform;
    use chrono::{TimeZone, Utc};

    fn posting(id: u64, content: &str) -> Posting {
        Posting {
            id: PostingId(id),
            content: content.to_string(),
            author_is_bot: true,
            created_at: Utc.timestamp_opt(id as i64, 0).unwrap(),
        }
    }

    const A: &str = "A - http://a.example.com/";
    const B: &str = "B - http://b.example.com/";
    const C: &str = "C - http://c.example.com/";

    #[test]
    fn keeps_earliest_occurrence_oldest_first() {
        let history = vec![
            posting(1, A),
            posting(2, B),
            posting(3, A),
            posting(4, C),
            posting(5, B),
        ];
        assert_eq!(
            plan_duplicates(&history, HistoryOrder::OldestFirst),
            vec![PostingId(3), PostingId(5)]
        );
    }

    #[test]
    fn newest_first_input_still_keeps_earliest() {
        let mut history = vec![
            posting(1, A),
            posting(2, B),
            posting(3, A),
            posting(4, C),
            posting(5, B),
        ];
        history.reverse();
        let mut doomed = plan_duplicates(&history, HistoryOrder::NewestFirst);
        doomed.sort();
        assert_eq!(doomed, vec![PostingId(3), PostingId(5)]);
    }

    #[test]
    fn compares_urls_not_surrounding_text() {
        let history = vec![
            posting(1, "look at http://a.example.com/"),
            posting(2, "again: http://a.example.com/ is great"),
            posting(3, "plain chatter"),
            posting(4, "plain chatter"),
        ];
        assert_eq!(
            plan_duplicates(&history, HistoryOrder::OldestFirst),
            vec![PostingId(2)]
        );
    }

    #[tokio::test]
    async fn sweep_leaves_one_posting_per_url() {
        let platform = Arc::new(InMemoryPlatform::new());
        let g = platform.add_grouping("CURATED");
        let b = platform.add_bucket(g.id, "General");
        for content in [A, B, A, C, B] {
            platform.seed(b.id, content, true);
        }
        let dedup = Deduplicator::new(
            platform.clone(),
            HistoryConfig {
                page_size: 2,
                page_pacing: Duration::ZERO,
            },
            Duration::ZERO,
        );
        let report = dedup
            .dedup_bucket(b.id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.deleted, 2);
        assert_eq!(platform.contents(b.id), vec![A, B, C]);
    }

    #[tokio::test]
    async fn failed_deletes_do_not_stop_the_sweep() {
        let platform = Arc::new(InMemoryPlatform::new());
        let g = platform.add_grouping("CURATED");
        let b = platform.add_bucket(g.id, "General");
        platform.seed(b.id, A, true);
        let stuck = platform.seed(b.id, A, true);
        platform.seed(b.id, A, true);
        platform.fail_delete(stuck.id);

        let dedup = Deduplicator::new(
            platform.clone(),
            HistoryConfig {
                page_size: 100,
                page_pacing: Duration::ZERO,
            },
            Duration::ZERO,
        );
        let report = dedup
            .dedup_bucket(b.id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(platform.contents(b.id).len(), 2);
    }

    #[tokio::test]
    async fn cancelled_sweep_stops_before_deleting() {
        let platform = Arc::new(InMemoryPlatform::new());
        let g = platform.add_grouping("CURATED");
        let b = platform.add_bucket(g.id, "General");
        platform.seed(b.id, A, true);
        platform.seed(b.id, A, true);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dedup = Deduplicator::new(platform.clone(), HistoryConfig::default(), Duration::ZERO);
        let report = dedup.dedup_bucket(b.id, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(platform.contents(b.id).len(), 2);
    }
}
