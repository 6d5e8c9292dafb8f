//! Discord adapter (serenity).
//!
//! Implements the `lc-core` ChatPlatform over the Discord HTTP API: categories
//! are groupings, text channels are buckets, messages are postings.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use serenity::{
    builder::{CreateChannel, CreateMessage, CreateThread, GetMessages},
    cache::Cache,
    http::{Http, HttpError},
    model::prelude::{
        ChannelId, ChannelType, GuildChannel, GuildId, Message, MessageId, UserId,
    },
};

pub mod router;

use lc_core::{
    domain::{
        Bucket, BucketId, Grouping, GroupingId, Permissions, Posting, PostingId, Scope, Thread,
    },
    errors::Error,
    ports::{ChatPlatform, HistoryPage, PlatformCapabilities},
    Result,
};

/// Discord caps messages at 2000 characters and history pages at 100.
const MAX_MESSAGE_LEN: usize = 2000;
const MAX_PAGE: usize = 100;

#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild: GuildId,
    bot_user: UserId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, guild: GuildId, bot_user: UserId) -> Self {
        Self {
            http,
            cache,
            guild,
            bot_user,
        }
    }

    fn map_err(e: serenity::Error, scope: impl Into<String>) -> Error {
        if let serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) = &e {
            match resp.status_code.as_u16() {
                403 => return Error::permission(scope),
                // serenity's ratelimiter has already slept through Retry-After
                // by now, and ErrorResponse keeps no headers or retry_after.
                429 => {
                    return Error::RateLimited {
                        retry_after: Duration::from_secs(1),
                    }
                }
                _ => {}
            }
        }
        Error::External(format!("discord error: {e}"))
    }

    async fn channels(&self) -> Result<HashMap<ChannelId, GuildChannel>> {
        self.guild
            .channels(&self.http)
            .await
            .map_err(|e| Self::map_err(e, "server"))
    }

    /// Channels of `kind`, in the order Discord displays them.
    async fn channels_of(&self, kind: ChannelType, parent: Option<ChannelId>) -> Result<Vec<GuildChannel>> {
        let mut out: Vec<GuildChannel> = self
            .channels()
            .await?
            .into_values()
            .filter(|c| c.kind == kind && (parent.is_none() || c.parent_id == parent))
            .collect();
        out.sort_by_key(|c| (c.position, c.id));
        Ok(out)
    }
}

fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

fn posting_from(msg: &Message) -> Posting {
    Posting {
        id: PostingId(msg.id.get()),
        content: msg.content.clone(),
        author_is_bot: msg.author.bot,
        created_at: DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_default(),
    }
}

fn page_request(page: HistoryPage) -> GetMessages {
    let limit = page.limit.clamp(1, MAX_PAGE) as u8;
    let req = GetMessages::new().limit(limit);
    match page.before {
        Some(before) => req.before(MessageId::new(before.0)),
        None => req,
    }
}

fn to_permissions(p: serenity::model::Permissions) -> Permissions {
    Permissions {
        manage_buckets: p.manage_channels(),
        manage_postings: p.manage_messages(),
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            max_posting_len: MAX_MESSAGE_LEN,
            folds_bucket_names: true,
            supports_threads: true,
        }
    }

    async fn groupings(&self) -> Result<Vec<Grouping>> {
        Ok(self
            .channels_of(ChannelType::Category, None)
            .await?
            .into_iter()
            .map(|c| Grouping {
                id: GroupingId(c.id.get()),
                name: c.name,
            })
            .collect())
    }

    async fn create_grouping(&self, name: &str) -> Result<Grouping> {
        let c = self
            .guild
            .create_channel(&self.http, CreateChannel::new(name).kind(ChannelType::Category))
            .await
            .map_err(|e| Self::map_err(e, "server"))?;
        Ok(Grouping {
            id: GroupingId(c.id.get()),
            name: c.name,
        })
    }

    async fn buckets(&self, grouping: GroupingId) -> Result<Vec<Bucket>> {
        Ok(self
            .channels_of(ChannelType::Text, Some(channel(grouping.0)))
            .await?
            .into_iter()
            .map(|c| Bucket {
                id: BucketId(c.id.get()),
                grouping,
                name: c.name,
            })
            .collect())
    }

    async fn create_bucket(&self, grouping: GroupingId, name: &str) -> Result<Bucket> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .category(channel(grouping.0));
        let c = self
            .guild
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| Self::map_err(e, format!("grouping {}", grouping.0)))?;
        Ok(Bucket {
            id: BucketId(c.id.get()),
            grouping,
            name: c.name,
        })
    }

    async fn delete_bucket(&self, bucket: BucketId) -> Result<()> {
        channel(bucket.0)
            .delete(&self.http)
            .await
            .map_err(|e| Self::map_err(e, format!("bucket {}", bucket.0)))?;
        Ok(())
    }

    async fn threads(&self, bucket: BucketId) -> Result<Vec<Thread>> {
        let parent = channel(bucket.0);
        let data = self
            .guild
            .get_active_threads(&self.http)
            .await
            .map_err(|e| Self::map_err(e, format!("bucket {}", bucket.0)))?;
        Ok(data
            .threads
            .into_iter()
            .filter(|t| t.parent_id == Some(parent))
            .map(|t| Thread {
                id: BucketId(t.id.get()),
                parent: bucket,
                name: t.name,
            })
            .collect())
    }

    async fn create_thread(&self, bucket: BucketId, name: &str) -> Result<Thread> {
        let t = channel(bucket.0)
            .create_thread(
                &self.http,
                CreateThread::new(name).kind(ChannelType::PublicThread),
            )
            .await
            .map_err(|e| Self::map_err(e, format!("bucket {}", bucket.0)))?;
        Ok(Thread {
            id: BucketId(t.id.get()),
            parent: bucket,
            name: t.name,
        })
    }

    async fn postings(&self, bucket: BucketId, page: HistoryPage) -> Result<Vec<Posting>> {
        let msgs = channel(bucket.0)
            .messages(&self.http, page_request(page))
            .await
            .map_err(|e| Self::map_err(e, format!("bucket {}", bucket.0)))?;
        Ok(msgs.iter().map(posting_from).collect())
    }

    async fn create_posting(&self, bucket: BucketId, content: &str) -> Result<Posting> {
        let msg = channel(bucket.0)
            .send_message(&self.http, CreateMessage::new().content(content))
            .await
            .map_err(|e| Self::map_err(e, format!("bucket {}", bucket.0)))?;
        Ok(posting_from(&msg))
    }

    async fn delete_posting(&self, bucket: BucketId, posting: PostingId) -> Result<()> {
        channel(bucket.0)
            .delete_message(&self.http, MessageId::new(posting.0))
            .await
            .map_err(|e| Self::map_err(e, format!("bucket {}", bucket.0)))
    }

    async fn permissions(&self, scope: Scope) -> Result<Permissions> {
        let member = self
            .guild
            .member(&self.http, self.bot_user)
            .await
            .map_err(|e| Self::map_err(e, "server"))?;
        let target = match scope {
            Scope::Root => None,
            Scope::Grouping(GroupingId(id)) | Scope::Bucket(BucketId(id)) => {
                let found = self.channels().await?.remove(&channel(id));
                Some(found.ok_or_else(|| Error::External(format!("unknown channel {id}")))?)
            }
        };

        let guild = self
            .cache
            .guild(self.guild)
            .ok_or_else(|| Error::External("guild not in cache yet".to_string()))?;
        let perms = match &target {
            Some(c) => guild.user_permissions_in(c, &member),
            None => guild.member_permissions(&member),
        };
        Ok(to_permissions(perms))
    }
}
