use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    classifier::{Classifier, ClassifierConfig},
    commands::{parse_command, Command, HELP_TEXT},
    config::Config,
    domain::BucketId,
    extractor::extract_urls,
    formatting::outcome_reply,
    history::HistoryConfig,
    namer::BucketNamer,
    organizer::{Organizer, OrganizerConfig},
    pipeline::LinkPipeline,
    ports::{ChatPlatform, CompletionService, HttpFetcher, SocialCardService},
    reorganizer::Reorganizer,
    report::SweepReport,
    resolver::{ContentResolver, ResolverConfig},
    security::is_authorized,
    Result,
};

/// A chat message as seen by the bot, already filtered to the configured server.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub bucket: BucketId,
    pub text: String,
    pub author_is_bot: bool,
    /// Role names of the author.
    pub author_roles: Vec<String>,
}

#[derive(Clone, Debug)]
pub enum Inbound {
    Ready { bot_name: String },
    Message(InboundMessage),
}

#[derive(Clone, Debug)]
pub struct CuratorConfig {
    pub admin_roles: Vec<String>,
    pub command_prefix: String,
}

impl From<&Config> for CuratorConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            admin_roles: cfg.admin_roles.clone(),
            command_prefix: cfg.command_prefix.clone(),
        }
    }
}

/// The bot: turns inbound messages into link filing, sweeps and replies.
pub struct Curator {
    platform: Arc<dyn ChatPlatform>,
    pipeline: Arc<LinkPipeline>,
    reorganizer: Reorganizer,
    cfg: CuratorConfig,
}

impl Curator {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        pipeline: Arc<LinkPipeline>,
        reorganizer: Reorganizer,
        cfg: CuratorConfig,
    ) -> Self {
        Self {
            platform,
            pipeline,
            reorganizer,
            cfg,
        }
    }

    /// Wire every component from `cfg` over the given ports.
    pub fn from_config(
        cfg: &Config,
        platform: Arc<dyn ChatPlatform>,
        fetcher: Arc<dyn HttpFetcher>,
        social: Option<Arc<dyn SocialCardService>>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let namer = BucketNamer::from(cfg);
        let organizer = Arc::new(Organizer::new(
            platform.clone(),
            namer.clone(),
            OrganizerConfig::from(cfg),
        ));
        let pipeline = Arc::new(LinkPipeline::new(
            ContentResolver::new(fetcher, social, ResolverConfig::from(cfg)),
            Classifier::new(completion, ClassifierConfig::from(cfg)),
            namer,
            organizer,
        ));
        let history = HistoryConfig {
            page_size: cfg.history_page_size,
            page_pacing: cfg.page_pacing,
        };
        let reorganizer = Reorganizer::new(
            platform.clone(),
            pipeline.clone(),
            history,
            cfg.destructive_pacing,
        );
        Self::new(platform, pipeline, reorganizer, CuratorConfig::from(cfg))
    }

    pub async fn handle(&self, inbound: Inbound, cancel: &CancellationToken) {
        match inbound {
            Inbound::Ready { bot_name } => tracing::info!(%bot_name, "logged in"),
            Inbound::Message(msg) => self.handle_message(msg, cancel).await,
        }
    }

    async fn handle_message(&self, msg: InboundMessage, cancel: &CancellationToken) {
        if msg.author_is_bot {
            return;
        }
        if let Some((cmd, _args)) = parse_command(&self.cfg.command_prefix, &msg.text) {
            self.handle_command(&msg, cmd, cancel).await;
            return;
        }
        let urls = extract_urls(&msg.text);
        if urls.is_empty() {
            return;
        }

        self.reply(msg.bucket, "Fetching link info...").await;
        for url in urls {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = self.pipeline.process_url(&url).await;
            self.reply(msg.bucket, &outcome_reply(&outcome)).await;
        }
    }

    async fn handle_command(&self, msg: &InboundMessage, cmd: Command, cancel: &CancellationToken) {
        tracing::info!(bucket = msg.bucket.0, command = ?cmd, "command received");
        if cmd.is_privileged() && !is_authorized(&msg.author_roles, &self.cfg.admin_roles) {
            tracing::warn!(bucket = msg.bucket.0, command = ?cmd, "unauthorized command");
            self.reply(msg.bucket, "You don't have permission to use this command.")
                .await;
            return;
        }

        match cmd {
            Command::Organize => {
                self.reply(msg.bucket, "Organize command received! Processing...")
                    .await;
                let result = self.reorganizer.organize_backlog(cancel).await;
                self.report(msg.bucket, "Organize", result).await;
            }
            Command::Dedup => {
                self.reply(msg.bucket, "Dedup command received! Processing...")
                    .await;
                let result = self.reorganizer.dedup_all(cancel).await;
                self.report(msg.bucket, "Dedup", result).await;
            }
            Command::Consolidate => {
                self.reply(msg.bucket, "Consolidate command received! Processing...")
                    .await;
                let result = self.reorganizer.consolidate(cancel).await;
                self.report(msg.bucket, "Consolidate", result).await;
            }
            Command::Test => {
                self.reply(msg.bucket, "Test command received! The bot is working properly.")
                    .await;
            }
            Command::Help => self.reply(msg.bucket, HELP_TEXT).await,
            Command::Unknown(name) => {
                let text = format!(
                    "Unknown command '{name}'. Try {}help.",
                    self.cfg.command_prefix
                );
                self.reply(msg.bucket, &text).await;
            }
        }
    }

    async fn report(&self, bucket: BucketId, what: &str, result: Result<SweepReport>) {
        let text = match result {
            Ok(report) if report.skipped_scopes.is_empty() => {
                format!("{what} completed! {report}")
            }
            Ok(report) => format!(
                "{what} completed! {report}\nI don't have the required permissions for: {}. Skipped them.",
                report.skipped_scopes.join(", ")
            ),
            Err(e) => {
                tracing::error!(error = %e, "{what} sweep failed");
                format!("{what} failed: {e}")
            }
        };
        self.reply(bucket, &text).await;
    }

    async fn reply(&self, bucket: BucketId, text: &str) {
        if let Err(e) = self.platform.create_posting(bucket, text).await {
            tracing::warn!(bucket = bucket.0, error = %e, "failed to send reply");
        }
    }
}

/// Consume inbound events one at a time until the queue closes or `cancel`
/// fires.
pub async fn run_event_loop(
    curator: Arc<Curator>,
    mut rx: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("shutdown requested; event loop stopping");
                break;
            }
            next = rx.recv() => match next {
                Some(inbound) => curator.handle(inbound, &cancel).await,
                None => {
                    tracing::info!("event queue closed");
                    break;
                }
            },
        }
    }
}
