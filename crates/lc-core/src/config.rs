use std::{env, path::Path, time::Duration};

use crate::{
    classifier::{summary_template_len, topic_template_len},
    errors::Error,
    Result,
};

/// Where curated links land inside a topic bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementMode {
    /// One posting per link directly in the bucket.
    Flat,
    /// One thread per link title, with an index posting in the bucket.
    ThreadPerLink,
}

impl PlacementMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Some(PlacementMode::Flat),
            "thread" | "threads" | "thread-per-link" => Some(PlacementMode::ThreadPerLink),
            _ => None,
        }
    }
}

/// Typed configuration, loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub discord_token: String,
    pub guild_id: u64,
    pub openai_api_key: String,
    pub openai_model: String,
    pub social_card_token: Option<String>,
    pub social_card_endpoint: String,

    // Curation
    pub grouping_name: String,
    pub placement: PlacementMode,
    pub admin_roles: Vec<String>,
    pub command_prefix: String,

    // Bucket names
    pub bucket_name_max_len: usize,
    pub bucket_fallback: String,

    // Resolver
    pub fetch_timeout: Duration,
    pub fetch_pacing: Duration,

    // Classifier
    pub completion_pacing: Duration,
    pub completion_max_tokens: u32,
    pub summary_context_budget: usize,
    pub summary_overhead: usize,
    pub topic_context_budget: usize,
    pub topic_overhead: usize,

    // Sweeps
    pub history_page_size: usize,
    pub page_pacing: Duration,
    pub destructive_pacing: Duration,

    // Runtime
    pub platform_min_interval: Duration,
    pub event_queue_capacity: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required credentials
        let discord_token = required("LINKCURATOR_TOKEN")?;
        let guild_id = required("LINKCURATOR_GUILD_ID")?
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .ok_or_else(|| Error::Config("LINKCURATOR_GUILD_ID must be a numeric id".to_string()))?;
        let openai_api_key = required("OPENAI_API_KEY")?;

        // Optional providers
        let openai_model = env_str("OPENAI_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let social_card_token = env_str("SOCIAL_CARD_TOKEN").and_then(non_empty);
        let social_card_endpoint = env_str("SOCIAL_CARD_ENDPOINT")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://publish.twitter.com/oembed".to_string());

        let grouping_name = env_str("CURATED_GROUPING")
            .and_then(non_empty)
            .unwrap_or_else(|| "CURATED".to_string());
        let placement = match env_str("PLACEMENT_MODE").and_then(non_empty) {
            Some(raw) => PlacementMode::parse(&raw).ok_or_else(|| {
                Error::Config(format!("PLACEMENT_MODE must be 'flat' or 'thread', got '{raw}'"))
            })?,
            None => PlacementMode::Flat,
        };
        let admin_roles = parse_csv(env_str("ADMIN_ROLES").or_else(|| Some("Admin,Manager".into())));
        let command_prefix = env_str("COMMAND_PREFIX")
            .and_then(non_empty)
            .unwrap_or_else(|| "!".to_string());

        let bucket_name_max_len = env_usize("BUCKET_NAME_MAX_LEN").unwrap_or(100).clamp(1, 100);
        let bucket_fallback = env_str("BUCKET_FALLBACK")
            .and_then(non_empty)
            .unwrap_or_else(|| "needs-sorting".to_string());

        let fetch_timeout = Duration::from_millis(env_u64("FETCH_TIMEOUT_MS").unwrap_or(10_000));
        let fetch_pacing = Duration::from_millis(env_u64("FETCH_PACING_MS").unwrap_or(1_000));

        let completion_pacing =
            Duration::from_millis(env_u64("COMPLETION_PACING_MS").unwrap_or(1_000));
        let completion_max_tokens = env_u32("COMPLETION_MAX_TOKENS").unwrap_or(100);
        let summary_context_budget = env_usize("SUMMARY_CONTEXT_BUDGET").unwrap_or(7_000);
        let summary_overhead = env_usize("SUMMARY_OVERHEAD").unwrap_or(500);
        let topic_context_budget = env_usize("TOPIC_CONTEXT_BUDGET").unwrap_or(3_997);
        let topic_overhead = env_usize("TOPIC_OVERHEAD").unwrap_or(100);
        check_budget("SUMMARY", summary_context_budget, summary_overhead, summary_template_len())?;
        check_budget("TOPIC", topic_context_budget, topic_overhead, topic_template_len())?;

        let history_page_size = env_usize("HISTORY_PAGE_SIZE").unwrap_or(100).clamp(1, 100);
        let page_pacing = Duration::from_millis(env_u64("PAGE_PACING_MS").unwrap_or(1_000));
        let destructive_pacing =
            Duration::from_millis(env_u64("DESTRUCTIVE_PACING_MS").unwrap_or(1_000));

        let platform_min_interval =
            Duration::from_millis(env_u64("PLATFORM_MIN_INTERVAL_MS").unwrap_or(250));
        let event_queue_capacity = env_usize("EVENT_QUEUE_CAPACITY").unwrap_or(256).max(1);

        Ok(Self {
            discord_token,
            guild_id,
            openai_api_key,
            openai_model,
            social_card_token,
            social_card_endpoint,
            grouping_name,
            placement,
            admin_roles,
            command_prefix,
            bucket_name_max_len,
            bucket_fallback,
            fetch_timeout,
            fetch_pacing,
            completion_pacing,
            completion_max_tokens,
            summary_context_budget,
            summary_overhead,
            topic_context_budget,
            topic_overhead,
            history_page_size,
            page_pacing,
            destructive_pacing,
            platform_min_interval,
            event_queue_capacity,
        })
    }
}

/// A prompt budget must leave room past both its overhead and the fixed
/// template text.
fn check_budget(kind: &str, budget: usize, overhead: usize, template: usize) -> Result<()> {
    if overhead >= budget {
        return Err(Error::Config(format!(
            "{kind}_OVERHEAD ({overhead}) must be smaller than {kind}_CONTEXT_BUDGET ({budget})"
        )));
    }
    if template >= budget {
        return Err(Error::Config(format!(
            "{kind}_CONTEXT_BUDGET ({budget}) must exceed the {template}-char prompt template"
        )));
    }
    Ok(())
}

fn load_dotenv_if_present(path: &Path) {
    // dotenvy never overrides variables that are already set.
    match dotenvy::from_path(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }
}

fn required(key: &str) -> Result<String> {
    env_str(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
