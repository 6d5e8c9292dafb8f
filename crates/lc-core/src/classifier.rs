use std::{sync::Arc, time::Duration};

use tokio::time::sleep;

use crate::{
    config::Config,
    errors::Error,
    formatting::truncate_chars,
    ports::CompletionService,
    throttled::with_backoff,
    Result,
};

const SUMMARY_TEMPLATE_TAIL: &str = "\n\nSummarize the above content in two sentences:";
const TOPIC_TEMPLATE_HEAD: &str = "Based on the summary: ";
const TOPIC_TEMPLATE_MID: &str = "\nReturn only a short channel name for the broad topic of this link, without any additional text.\nReuse one of these existing channels if it is close, otherwise name a new broad channel: ";

/// Characters of fixed instruction text in a summary prompt.
pub fn summary_template_len() -> usize {
    SUMMARY_TEMPLATE_TAIL.chars().count()
}

/// Characters of fixed instruction text in a topic prompt with no options.
pub fn topic_template_len() -> usize {
    TOPIC_TEMPLATE_HEAD.chars().count() + TOPIC_TEMPLATE_MID.chars().count()
}

/// Character budget for one prompt.
#[derive(Clone, Copy, Debug)]
pub struct ContextBudget {
    pub budget: usize,
    /// Minimum characters kept free for the template and option text.
    pub reserved_overhead: usize,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub summary: ContextBudget,
    pub topic: ContextBudget,
    pub max_tokens: u32,
    /// Sleep before every completion call.
    pub pacing: Duration,
    pub fallback_label: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            summary: ContextBudget {
                budget: 7_000,
                reserved_overhead: 500,
            },
            topic: ContextBudget {
                budget: 3_997,
                reserved_overhead: 100,
            },
            max_tokens: 100,
            pacing: Duration::from_secs(1),
            fallback_label: crate::namer::DEFAULT_FALLBACK.to_string(),
        }
    }
}

impl From<&Config> for ClassifierConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            summary: ContextBudget {
                budget: cfg.summary_context_budget,
                reserved_overhead: cfg.summary_overhead,
            },
            topic: ContextBudget {
                budget: cfg.topic_context_budget,
                reserved_overhead: cfg.topic_overhead,
            },
            max_tokens: cfg.completion_max_tokens,
            pacing: cfg.completion_pacing,
            fallback_label: cfg.bucket_fallback.clone(),
        }
    }
}

/// Summarizes resolved text and picks topic labels via the completion service.
pub struct Classifier {
    completion: Arc<dyn CompletionService>,
    cfg: ClassifierConfig,
}

impl Classifier {
    pub fn new(completion: Arc<dyn CompletionService>, cfg: ClassifierConfig) -> Self {
        Self { completion, cfg }
    }

    pub fn fallback_label(&self) -> &str {
        &self.cfg.fallback_label
    }

    /// `text` truncated to fit, followed by the summary instruction.
    pub fn summary_prompt(&self, text: &str) -> String {
        let budget = self.cfg.summary;
        let template = summary_template_len();
        let room = budget
            .budget
            .saturating_sub(budget.reserved_overhead.max(template));
        format!("{}{SUMMARY_TEMPLATE_TAIL}", truncate_chars(text.trim(), room))
    }

    /// Topic prompt for `summary`, listing as many `existing` bucket names as
    /// fit the budget.
    pub fn topic_prompt(&self, summary: &str, existing: &[String]) -> String {
        let budget = self.cfg.topic;
        let template = topic_template_len();

        let mut options: Vec<&str> = existing.iter().map(String::as_str).collect();
        let mut option_text = options.join(", ");
        while !options.is_empty() && template + option_text.chars().count() > budget.budget {
            options.pop();
            option_text = options.join(", ");
        }

        let overhead = budget
            .reserved_overhead
            .max(template + option_text.chars().count());
        let room = budget.budget.saturating_sub(overhead);
        format!(
            "{TOPIC_TEMPLATE_HEAD}{}{TOPIC_TEMPLATE_MID}{option_text}",
            truncate_chars(summary.trim(), room)
        )
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.chars().count() > self.completion.prompt_ceiling() {
            return Err(Error::Classification(format!(
                "prompt of {} chars exceeds the model ceiling of {}",
                prompt.chars().count(),
                self.completion.prompt_ceiling()
            )));
        }
        with_backoff(1, || async move {
            sleep(self.cfg.pacing).await;
            self.completion.complete(prompt, self.cfg.max_tokens).await
        })
        .await
        .map(|s| s.trim().to_string())
    }

    /// Short human summary of `text`. Empty output is a classification failure.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(Error::Classification("nothing to summarize".to_string()));
        }
        let out = self.complete(&self.summary_prompt(text)).await?;
        if out.is_empty() {
            return Err(Error::Classification("empty summary".to_string()));
        }
        Ok(out)
    }

    /// Summary for `text`, or `seed` when the model cannot produce one.
    pub async fn summarize_or(&self, text: &str, seed: &str) -> String {
        match self.summarize(text).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "summary unavailable; using description");
                seed.trim().to_string()
            }
        }
    }

    /// Topic label for `summary`. Never empty: failures yield the fallback label.
    pub async fn classify(&self, summary: &str, existing: &[String]) -> String {
        let prompt = self.topic_prompt(summary, existing);
        match self.complete(&prompt).await.map(|raw| clean_label(&raw)) {
            Ok(label) if !label.is_empty() => label,
            Ok(_) => {
                let e = Error::Classification("empty topic label".to_string());
                tracing::warn!(error = %e, fallback = %self.cfg.fallback_label, "using fallback label");
                self.cfg.fallback_label.clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback = %self.cfg.fallback_label, "using fallback label");
                self.cfg.fallback_label.clone()
            }
        }
    }
}

/// First non-empty line, without quotes, a leading `#` or a "Channel:" preamble.
fn clean_label(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let line = match line.split_once(':') {
        Some((head, rest)) if head.trim().eq_ignore_ascii_case("channel") => rest.trim(),
        _ => line,
    };
    line.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '#' || c == '.')
        .trim()
        .to_string()
}
