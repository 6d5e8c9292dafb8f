use crate::{config::Config, domain::TopicLabel};

pub const DEFAULT_MAX_LEN: usize = 100;
pub const DEFAULT_FALLBACK: &str = "needs-sorting";

/// Turns arbitrary labels into valid bucket identifiers.
#[derive(Clone, Debug)]
pub struct BucketNamer {
    max_len: usize,
    fallback: String,
}

impl Default for BucketNamer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN, DEFAULT_FALLBACK)
    }
}

impl From<&Config> for BucketNamer {
    fn from(cfg: &Config) -> Self {
        Self::new(cfg.bucket_name_max_len, &cfg.bucket_fallback)
    }
}

impl BucketNamer {
    pub fn new(max_len: usize, fallback: &str) -> Self {
        let max_len = max_len.max(1);
        // The fallback has to be a valid id itself.
        let mut fallback = sanitize(fallback, max_len);
        if fallback.is_empty() {
            fallback = sanitize(DEFAULT_FALLBACK, max_len);
        }
        Self { max_len, fallback }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Every character outside `[0-9A-Za-z]` becomes `-`, then the result is
    /// clamped to `max_len`. Empty input maps to the fallback id.
    pub fn bucket_id(&self, label: &str) -> String {
        let id = sanitize(label.trim(), self.max_len);
        if id.is_empty() {
            return self.fallback.clone();
        }
        id
    }

    pub fn label(&self, display_name: &str) -> TopicLabel {
        TopicLabel {
            display_name: display_name.trim().to_string(),
            bucket_id: self.bucket_id(display_name),
        }
    }
}

fn sanitize(label: &str, max_len: usize) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .take(max_len)
        .collect()
}
