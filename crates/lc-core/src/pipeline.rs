use std::sync::Arc;

use crate::{
    classifier::Classifier,
    domain::{OrganizeOutcome, ResolvedLink},
    extractor::extract_candidates,
    namer::BucketNamer,
    organizer::Organizer,
    resolver::ContentResolver,
};

/// Extractor → Resolver → Classifier → Namer → Organizer, one link at a time.
pub struct LinkPipeline {
    resolver: ContentResolver,
    classifier: Classifier,
    namer: BucketNamer,
    organizer: Arc<Organizer>,
}

impl LinkPipeline {
    pub fn new(
        resolver: ContentResolver,
        classifier: Classifier,
        namer: BucketNamer,
        organizer: Arc<Organizer>,
    ) -> Self {
        Self {
            resolver,
            classifier,
            namer,
            organizer,
        }
    }

    pub fn organizer(&self) -> &Organizer {
        &self.organizer
    }

    /// Organize every URL in `text`, sequentially and in order.
    pub async fn process_text(&self, text: &str) -> Vec<(String, OrganizeOutcome)> {
        let mut out = Vec::new();
        for candidate in extract_candidates(text) {
            let outcome = self.process_url(&candidate.raw_url).await;
            out.push((candidate.raw_url, outcome));
        }
        out
    }

    pub async fn process_url(&self, url: &str) -> OrganizeOutcome {
        let link = self.resolver.resolve(url).await;
        if link.is_unresolved() {
            return OrganizeOutcome::Failure(format!("could not resolve {url}"));
        }
        let summary = self.summarize(&link).await;
        let existing = self.existing_bucket_names().await;
        let topic_input = if summary.is_empty() {
            link.title.as_str()
        } else {
            summary.as_str()
        };
        let display = self.classifier.classify(topic_input, &existing).await;
        let label = self.namer.label(&display);
        tracing::debug!(url, topic = %label.display_name, bucket = %label.bucket_id, "classified");
        self.organizer.organize(&link, &summary, &label).await
    }

    async fn summarize(&self, link: &ResolvedLink) -> String {
        let text = if link.body_text.trim().is_empty() {
            &link.summary
        } else {
            &link.body_text
        };
        self.classifier.summarize_or(text, &link.summary).await
    }

    /// Bucket names already in the curated grouping, offered to the classifier
    /// so it reuses them. Lookup failures just mean no suggestions.
    async fn existing_bucket_names(&self) -> Vec<String> {
        let organizer = &self.organizer;
        match organizer.find_grouping(organizer.grouping_name()).await {
            Ok(Some(g)) => match organizer.bucket_names(g.id).await {
                Ok(names) => names,
                Err(e) => {
                    tracing::debug!(error = %e, "could not list buckets");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::debug!(error = %e, "could not list groupings");
                Vec::new()
            }
        }
    }
}
