use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lc_core::{
    config::Config,
    event_loop::{run_event_loop, Curator},
    ports::{ChatPlatform, SocialCardService},
    throttled::{ThrottleConfig, ThrottledPlatform},
};
use lc_discord::router::DiscordSession;
use lc_openai::OpenAiClient;
use lc_web::{OEmbedClient, ReqwestFetcher};

#[tokio::main]
async fn main() -> Result<(), lc_core::Error> {
    lc_core::logging::init("linkcurator")?;

    let cfg = Config::load()?;
    tracing::info!(
        grouping = %cfg.grouping_name,
        placement = ?cfg.placement,
        model = %cfg.openai_model,
        "starting link curator"
    );

    let fetcher = Arc::new(ReqwestFetcher::new()?);
    let social: Option<Arc<dyn SocialCardService>> = match &cfg.social_card_token {
        Some(token) => Some(Arc::new(OEmbedClient::new(
            &cfg.social_card_endpoint,
            Some(token.clone()),
            cfg.fetch_timeout,
        )?)),
        None => {
            tracing::info!("SOCIAL_CARD_TOKEN not set; social posts are fetched as web pages");
            None
        }
    };
    let completion = Arc::new(OpenAiClient::new(
        cfg.openai_api_key.clone(),
        cfg.openai_model.clone(),
    )?);

    let (tx, rx) = mpsc::channel(cfg.event_queue_capacity.max(1));
    let session = DiscordSession::connect(&cfg, tx)
        .await
        .map_err(|e| lc_core::Error::External(format!("discord connect failed: {e}")))?;

    // Wrap the raw Discord platform with a throttling decorator; 429s are
    // retried once there.
    let platform: Arc<dyn ChatPlatform> = Arc::new(ThrottledPlatform::new(
        session.platform(),
        ThrottleConfig {
            min_interval: cfg.platform_min_interval,
            ..ThrottleConfig::default()
        },
    ));

    let curator = Arc::new(Curator::from_config(
        &cfg, platform, fetcher, social, completion,
    ));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("keyboard interrupt detected; stopping the bot");
            on_signal.cancel();
        }
    });

    run_event_loop(curator, rx, cancel).await;
    session.disconnect().await;
    Ok(())
}
