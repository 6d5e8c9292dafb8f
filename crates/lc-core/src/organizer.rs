use std::sync::Arc;

use crate::{
    config::{Config, PlacementMode},
    domain::*,
    errors::Error,
    formatting::{posting_prefix, render_index_line, render_posting},
    history::{scan_history, HistoryConfig},
    namer::BucketNamer,
    ports::ChatPlatform,
    Result,
};

#[derive(Clone, Debug)]
pub struct OrganizerConfig {
    pub grouping_name: String,
    pub placement: PlacementMode,
    pub history: HistoryConfig,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            grouping_name: "CURATED".to_string(),
            placement: PlacementMode::Flat,
            history: HistoryConfig::default(),
        }
    }
}

impl From<&Config> for OrganizerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            grouping_name: cfg.grouping_name.clone(),
            placement: cfg.placement,
            history: HistoryConfig {
                page_size: cfg.history_page_size,
                page_pacing: cfg.page_pacing,
            },
        }
    }
}

/// Files resolved links into the grouping/bucket hierarchy, idempotently.
pub struct Organizer {
    platform: Arc<dyn ChatPlatform>,
    namer: BucketNamer,
    cfg: OrganizerConfig,
}

impl Organizer {
    pub fn new(platform: Arc<dyn ChatPlatform>, namer: BucketNamer, cfg: OrganizerConfig) -> Self {
        Self {
            platform,
            namer,
            cfg,
        }
    }

    pub fn grouping_name(&self) -> &str {
        &self.cfg.grouping_name
    }

    fn bucket_names_match(&self, a: &str, b: &str) -> bool {
        if self.platform.capabilities().folds_bucket_names {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    pub async fn find_grouping(&self, name: &str) -> Result<Option<Grouping>> {
        Ok(self
            .platform
            .groupings()
            .await?
            .into_iter()
            .find(|g| g.name == name))
    }

    /// Look the grouping up right before creating it; a `Conflict` from the
    /// platform means someone else won, so re-list and take theirs.
    pub async fn get_or_create_grouping(&self, name: &str) -> Result<Grouping> {
        if let Some(g) = self.find_grouping(name).await? {
            return Ok(g);
        }
        ensure_can_manage(self.platform.as_ref(), Scope::Root).await?;
        match self.platform.create_grouping(name).await {
            Ok(g) => {
                tracing::info!(grouping = %g.name, "created grouping");
                Ok(g)
            }
            Err(Error::Conflict(_)) => self
                .find_grouping(name)
                .await?
                .ok_or_else(|| Error::External(format!("grouping '{name}' vanished after conflict"))),
            Err(e) => Err(e),
        }
    }

    pub async fn find_bucket(&self, grouping: GroupingId, name: &str) -> Result<Option<Bucket>> {
        Ok(self
            .platform
            .buckets(grouping)
            .await?
            .into_iter()
            .find(|b| self.bucket_names_match(&b.name, name)))
    }

    pub async fn bucket_names(&self, grouping: GroupingId) -> Result<Vec<String>> {
        Ok(self
            .platform
            .buckets(grouping)
            .await?
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    pub async fn get_or_create_bucket(&self, grouping: &Grouping, name: &str) -> Result<Bucket> {
        if let Some(b) = self.find_bucket(grouping.id, name).await? {
            return Ok(b);
        }
        ensure_can_manage(self.platform.as_ref(), Scope::Grouping(grouping.id))
            .await
            .map_err(|e| scoped(e, &grouping.name))?;
        match self.platform.create_bucket(grouping.id, name).await {
            Ok(b) => {
                tracing::info!(grouping = %grouping.name, bucket = %b.name, "created bucket");
                Ok(b)
            }
            Err(Error::Conflict(_)) => self.find_bucket(grouping.id, name).await?.ok_or_else(|| {
                Error::External(format!("bucket '{name}' vanished after conflict"))
            }),
            Err(e) => Err(scoped(e, &grouping.name)),
        }
    }

    /// Whether `bucket` already records `link`. Postings carrying a URL match
    /// by URL only; URL-less bot postings match by the leading
    /// `"{title} - "` text.
    pub async fn contains_link(&self, bucket: BucketId, link: &ResolvedLink) -> Result<bool> {
        let prefix = posting_prefix(&link.title);
        scan_history(self.platform.as_ref(), bucket, self.cfg.history, |p| match p.url() {
            Some(url) => url == link.url,
            None => p.author_is_bot && p.content.starts_with(&prefix),
        })
        .await
    }

    /// Organize into the configured grouping.
    pub async fn organize(
        &self,
        link: &ResolvedLink,
        summary: &str,
        label: &TopicLabel,
    ) -> OrganizeOutcome {
        let grouping = self.cfg.grouping_name.clone();
        self.organize_into(&grouping, link, summary, label).await
    }

    pub async fn organize_into(
        &self,
        grouping_name: &str,
        link: &ResolvedLink,
        summary: &str,
        label: &TopicLabel,
    ) -> OrganizeOutcome {
        if link.is_unresolved() {
            return OrganizeOutcome::Failure(format!("could not resolve {}", link.url));
        }
        match self.try_organize(grouping_name, link, summary, label).await {
            Ok(outcome) => outcome,
            Err(Error::Permission { scope }) => {
                tracing::warn!(url = %link.url, %scope, "missing permission; skipped");
                OrganizeOutcome::PermissionError { scope }
            }
            Err(e) => {
                tracing::error!(url = %link.url, error = %e, "organize failed");
                OrganizeOutcome::Failure(e.to_string())
            }
        }
    }

    async fn try_organize(
        &self,
        grouping_name: &str,
        link: &ResolvedLink,
        summary: &str,
        label: &TopicLabel,
    ) -> Result<OrganizeOutcome> {
        let grouping = self.get_or_create_grouping(grouping_name).await?;
        let bucket = self.get_or_create_bucket(&grouping, &label.bucket_id).await?;
        let title = link.title.clone();

        let thread_name = self.thread_name_for(&title);
        if self.cfg.placement == PlacementMode::ThreadPerLink {
            let threads = self.platform.threads(bucket.id).await?;
            if threads.iter().any(|t| t.name == thread_name) {
                return Ok(OrganizeOutcome::ThreadExists { title });
            }
        }

        if self.contains_link(bucket.id, link).await? {
            return Ok(OrganizeOutcome::AlreadyExists { title });
        }

        let max_len = self.platform.capabilities().max_posting_len;
        let body = render_posting(link, summary, max_len);
        match self.cfg.placement {
            PlacementMode::Flat => {
                self.platform
                    .create_posting(bucket.id, &body)
                    .await
                    .map_err(|e| scoped(e, &bucket.name))?;
            }
            PlacementMode::ThreadPerLink => {
                let thread = self
                    .platform
                    .create_thread(bucket.id, &thread_name)
                    .await
                    .map_err(|e| scoped(e, &bucket.name))?;
                self.platform.create_posting(thread.id, &body).await?;
                self.platform
                    .create_posting(bucket.id, &render_index_line(link))
                    .await?;
            }
        }
        tracing::info!(url = %link.url, bucket = %bucket.name, "link added");
        Ok(OrganizeOutcome::Added {
            bucket: bucket.name,
            title,
        })
    }

    /// Thread names share the bucket-name length limit but keep their text.
    fn thread_name_for(&self, title: &str) -> String {
        crate::formatting::truncate_chars(title, self.namer.max_len()).to_string()
    }
}

async fn ensure_can_manage(platform: &dyn ChatPlatform, scope: Scope) -> Result<()> {
    if platform.permissions(scope).await?.manage_buckets {
        Ok(())
    } else {
        Err(Error::permission(scope.to_string()))
    }
}

/// Name the scope in permission errors by its display name.
fn scoped(e: Error, name: &str) -> Error {
    match e {
        Error::Permission { .. } => Error::permission(name),
        other => other,
    }
}
