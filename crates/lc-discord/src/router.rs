use std::sync::Arc;

use async_trait::async_trait;
use serenity::{
    client::{Client, Context, EventHandler},
    gateway::ShardManager,
    model::prelude::{GatewayIntents, GuildId, Message, Ready},
};
use tokio::{sync::mpsc, task::JoinHandle};

use lc_core::{
    config::Config,
    domain::BucketId,
    event_loop::{Inbound, InboundMessage},
};

use crate::DiscordPlatform;

struct Handler {
    tx: mpsc::Sender<Inbound>,
    guild: GuildId,
}

impl Handler {
    async fn forward(&self, inbound: Inbound) {
        if self.tx.send(inbound).await.is_err() {
            tracing::warn!("event queue closed; dropping gateway event");
        }
    }
}

/// Role names of the message author, resolved through the guild cache.
fn role_names(ctx: &Context, msg: &Message, guild: GuildId) -> Vec<String> {
    let Some(member) = &msg.member else {
        return Vec::new();
    };
    let Some(g) = ctx.cache.guild(guild) else {
        return Vec::new();
    };
    member
        .roles
        .iter()
        .filter_map(|id| g.roles.get(id).map(|r| r.name.clone()))
        .collect()
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.forward(Inbound::Ready {
            bot_name: ready.user.name.clone(),
        })
        .await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.guild_id != Some(self.guild) {
            return;
        }
        let author_roles = role_names(&ctx, &msg, self.guild);
        self.forward(Inbound::Message(InboundMessage {
            bucket: BucketId(msg.channel_id.get()),
            text: msg.content,
            author_is_bot: msg.author.bot,
            author_roles,
        }))
        .await;
    }
}

/// One gateway connection plus the HTTP-backed platform it exposes.
pub struct DiscordSession {
    platform: Arc<DiscordPlatform>,
    shard_manager: Arc<ShardManager>,
    gateway: JoinHandle<()>,
}

impl DiscordSession {
    /// Log in, then run the gateway in the background, forwarding events
    /// from the configured server into `tx`.
    pub async fn connect(cfg: &Config, tx: mpsc::Sender<Inbound>) -> anyhow::Result<Self> {
        let guild = GuildId::new(cfg.guild_id);
        let intents =
            GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

        let mut client = Client::builder(&cfg.discord_token, intents)
            .event_handler(Handler { tx, guild })
            .await?;

        let me = client.http.get_current_user().await?;
        tracing::info!(bot = %me.name, guild = cfg.guild_id, "discord login ok");

        let platform = Arc::new(DiscordPlatform::new(
            client.http.clone(),
            client.cache.clone(),
            guild,
            me.id,
        ));
        let shard_manager = client.shard_manager.clone();
        let gateway = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!(error = %e, "discord gateway stopped");
            }
        });

        Ok(Self {
            platform,
            shard_manager,
            gateway,
        })
    }

    pub fn platform(&self) -> Arc<DiscordPlatform> {
        self.platform.clone()
    }

    pub async fn disconnect(self) {
        self.shard_manager.shutdown_all().await;
        if let Err(e) = self.gateway.await {
            tracing::warn!(error = %e, "gateway task ended abnormally");
        }
        tracing::info!("discord session closed");
    }
}
