use std::fmt;

use chrono::{DateTime, Utc};

use crate::extractor::extract_urls;

/// Platform id of a grouping (Discord category).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupingId(pub u64);

/// Platform id of a bucket (Discord text channel or thread).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(pub u64);

/// Platform id of a posting (Discord message).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostingId(pub u64);

/// Top-level topical container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grouping {
    pub id: GroupingId,
    pub name: String,
}

/// Named container of postings inside a grouping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub id: BucketId,
    pub grouping: GroupingId,
    pub name: String,
}

/// A thread opened inside a bucket. Threads hold postings like buckets do,
/// so they share the `BucketId` space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thread {
    pub id: BucketId,
    pub parent: BucketId,
    pub name: String,
}

/// A message recorded in a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posting {
    pub id: PostingId,
    pub content: String,
    pub author_is_bot: bool,
    pub created_at: DateTime<Utc>,
}

impl Posting {
    /// The URL this posting records: the first URL found in its content.
    pub fn url(&self) -> Option<String> {
        extract_urls(&self.content).into_iter().next()
    }
}

/// A URL match found by the extractor, with the text it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkCandidate {
    pub raw_url: String,
    pub source_text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentFamily {
    Webpage,
    SocialCard,
    Unresolved,
}

/// Normalized metadata for one URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLink {
    pub url: String,
    pub title: String,
    /// Summary seed (description tag or card text).
    pub summary: String,
    /// Visible text handed to the summarizer.
    pub body_text: String,
    /// Structured tags in priority order.
    pub metadata: Vec<(String, String)>,
    pub content_family: ContentFamily,
}

impl ResolvedLink {
    pub fn unresolved(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            summary: String::new(),
            body_text: String::new(),
            metadata: Vec::new(),
            content_family: ContentFamily::Unresolved,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.content_family == ContentFamily::Unresolved
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Topic assignment for a link: what the classifier said, and the bucket name
/// derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicLabel {
    pub display_name: String,
    pub bucket_id: String,
}

/// The scope a permission applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The whole community (creating groupings).
    Root,
    Grouping(GroupingId),
    Bucket(BucketId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Root => write!(f, "server"),
            Scope::Grouping(id) => write!(f, "grouping {}", id.0),
            Scope::Bucket(id) => write!(f, "bucket {}", id.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub manage_buckets: bool,
    pub manage_postings: bool,
}

impl Permissions {
    pub const ALL: Permissions = Permissions {
        manage_buckets: true,
        manage_postings: true,
    };
}

/// Result of organizing one link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrganizeOutcome {
    Added { bucket: String, title: String },
    AlreadyExists { title: String },
    ThreadExists { title: String },
    PermissionError { scope: String },
    Failure(String),
}
