use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    dedup::Deduplicator,
    domain::{Bucket, Grouping, Posting, Scope},
    extractor::extract_urls,
    history::{collect_history, HistoryConfig},
    pipeline::LinkPipeline,
    ports::ChatPlatform,
    report::SweepReport,
    Result,
};

/// Backlog sweeps over every grouping and bucket on the server.
pub struct Reorganizer {
    platform: Arc<dyn ChatPlatform>,
    pipeline: Arc<LinkPipeline>,
    dedup: Deduplicator,
    history: HistoryConfig,
    /// Sleep before every replayed posting and every bucket delete.
    destructive_pacing: Duration,
}

impl Reorganizer {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        pipeline: Arc<LinkPipeline>,
        history: HistoryConfig,
        destructive_pacing: Duration,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(platform.clone(), history, destructive_pacing),
            platform,
            pipeline,
            history,
            destructive_pacing,
        }
    }

    /// Groupings and buckets the bot may work in. Scopes that are denied or
    /// whose lookups fail are recorded in `report` and left out; only the
    /// server-wide grouping list is fatal.
    async fn workable_buckets(
        &self,
        report: &mut SweepReport,
        include_curated: bool,
    ) -> Result<Vec<(Grouping, Vec<Bucket>)>> {
        let curated = self.pipeline.organizer().grouping_name();
        let mut out = Vec::new();
        for grouping in self.platform.groupings().await? {
            if !include_curated && grouping.name == curated {
                continue;
            }
            match self.platform.permissions(Scope::Grouping(grouping.id)).await {
                Ok(perms) if perms.manage_buckets => {}
                Ok(_) => {
                    tracing::warn!(grouping = %grouping.name, "missing permission; skipping grouping");
                    report.skip_scope(&grouping.name);
                    continue;
                }
                Err(e) => {
                    report.scope_failed(&grouping.name, &e);
                    continue;
                }
            }
            let listed = match self.platform.buckets(grouping.id).await {
                Ok(listed) => listed,
                Err(e) => {
                    report.scope_failed(&grouping.name, &e);
                    continue;
                }
            };
            let mut buckets = Vec::new();
            for bucket in listed {
                match self.platform.permissions(Scope::Bucket(bucket.id)).await {
                    Ok(perms) if perms.manage_postings => buckets.push(bucket),
                    Ok(_) => {
                        tracing::warn!(bucket = %bucket.name, "missing permission; skipping bucket");
                        report.skip_scope(&bucket.name);
                    }
                    Err(e) => report.scope_failed(&bucket.name, &e),
                }
            }
            out.push((grouping, buckets));
        }
        Ok(out)
    }

    /// Run every URL in human postings outside the curated grouping through
    /// the pipeline, oldest first.
    pub async fn organize_backlog(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let scopes = self.workable_buckets(&mut report, false).await?;
        'sweep: for (grouping, buckets) in scopes {
            for bucket in buckets {
                tracing::info!(grouping = %grouping.name, bucket = %bucket.name, "organizing backlog");
                let history =
                    match collect_history(self.platform.as_ref(), bucket.id, self.history).await {
                        Ok(history) => history,
                        Err(e) => {
                            report.scope_failed(&bucket.name, &e);
                            continue;
                        }
                    };
                for posting in history.iter().filter(|p| !p.author_is_bot) {
                    for url in extract_urls(&posting.content) {
                        if cancel.is_cancelled() {
                            report.cancelled = true;
                            break 'sweep;
                        }
                        let outcome = self.pipeline.process_url(&url).await;
                        report.record(&outcome);
                    }
                }
            }
        }
        tracing::info!(%report, "backlog sweep finished");
        Ok(report)
    }

    /// Deduplicate every bucket in every grouping.
    pub async fn dedup_all(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let scopes = self.workable_buckets(&mut report, true).await?;
        'sweep: for (_, buckets) in scopes {
            for bucket in buckets {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'sweep;
                }
                match self.dedup.dedup_bucket(bucket.id, cancel).await {
                    Ok(dedup) => report.absorb_dedup(&dedup),
                    Err(e) => {
                        tracing::warn!(bucket = %bucket.name, error = %e, "dedup failed; continuing");
                        report.errored += 1;
                    }
                }
                if report.cancelled {
                    break 'sweep;
                }
            }
        }
        tracing::info!(%report, "dedup sweep finished");
        Ok(report)
    }

    /// Merge buckets that share a name across groupings into the first one
    /// found, then delete the emptied sources.
    pub async fn consolidate(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let scopes = self.workable_buckets(&mut report, true).await?;
        let folds = self.platform.capabilities().folds_bucket_names;
        let key = |name: &str| {
            if folds {
                name.to_lowercase()
            } else {
                name.to_string()
            }
        };

        let mut canonical: Vec<Bucket> = Vec::new();
        for (grouping, buckets) in scopes {
            for bucket in buckets {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    tracing::info!(%report, "consolidation cancelled");
                    return Ok(report);
                }
                let name = key(&bucket.name);
                let Some(idx) = canonical.iter().position(|c| key(&c.name) == name) else {
                    canonical.push(bucket);
                    continue;
                };
                let target = &canonical[idx];
                tracing::info!(
                    from_grouping = %grouping.name,
                    bucket = %bucket.name,
                    "merging into canonical bucket"
                );
                match self.merge(&bucket, target, cancel).await {
                    Ok(replay) if replay.clean => {
                        report.replay_skipped += replay.skipped;
                        sleep(self.destructive_pacing).await;
                        match self.platform.delete_bucket(bucket.id).await {
                            Ok(()) => report.merged += 1,
                            Err(e) => {
                                tracing::warn!(bucket = %bucket.name, error = %e, "could not delete merged bucket");
                                report.errored += 1;
                            }
                        }
                    }
                    Ok(replay) => {
                        report.replay_skipped += replay.skipped;
                        if cancel.is_cancelled() {
                            report.cancelled = true;
                        } else {
                            report.errored += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(bucket = %bucket.name, "merge failed; source kept");
                        report.scope_failed(&bucket.name, &e);
                    }
                }
            }
        }
        tracing::info!(%report, "consolidation finished");
        Ok(report)
    }

    /// Replay `source` into `target`, oldest first.
    ///
    /// A posting is skipped when its URL is already in `target` (or was
    /// replayed earlier in this merge). URL-less postings are skipped only
    /// when `target` held the same text before the merge, so repeated chatter
    /// inside `source` survives.
    async fn merge(&self, source: &Bucket, target: &Bucket, cancel: &CancellationToken) -> Result<Replay> {
        let held = collect_history(self.platform.as_ref(), target.id, self.history).await?;
        let mut urls: HashSet<String> = held.iter().filter_map(Posting::url).collect();
        let chatter: HashSet<&str> = held
            .iter()
            .filter(|p| p.url().is_none())
            .map(|p| p.content.as_str())
            .collect();

        let mut replay = Replay {
            clean: true,
            skipped: 0,
        };
        for posting in collect_history(self.platform.as_ref(), source.id, self.history).await? {
            if cancel.is_cancelled() {
                replay.clean = false;
                return Ok(replay);
            }
            let duplicate = match posting.url() {
                Some(url) => !urls.insert(url),
                None => chatter.contains(posting.content.as_str()),
            };
            if duplicate {
                tracing::debug!(bucket = %source.name, posting = posting.id.0, "already in target; not replayed");
                replay.skipped += 1;
                continue;
            }
            sleep(self.destructive_pacing).await;
            if let Err(e) = self.platform.create_posting(target.id, &posting.content).await {
                tracing::warn!(bucket = %target.name, error = %e, "replay failed");
                replay.clean = false;
            }
        }
        Ok(replay)
    }
}

/// Result of one merge. Only a clean merge may delete its source.
struct Replay {
    clean: bool,
    skipped: usize,
}
