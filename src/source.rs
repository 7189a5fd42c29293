use crate::corpus::{MessageRecord, MessageSource};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::all::{ChannelId, GetMessages, Message, MessageId};
use serenity::http::Http;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Channel history over the Discord REST API.
pub struct DiscordSource {
    http: Arc<Http>,
    client: reqwest::Client,
    token: String,
    api_base: String,
}

#[derive(Deserialize)]
struct SearchSummary {
    total_results: Option<u64>,
}

impl DiscordSource {
    pub fn new(token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http: Arc::new(Http::new(token)),
            client,
            token: token.to_string(),
            api_base: DISCORD_API_BASE.to_string(),
        }
    }

    pub fn to_record(message: &Message) -> MessageRecord {
        MessageRecord {
            message_id: message.id.to_string(),
            author_id: message.author.id.to_string(),
            channel_id: message.channel_id.to_string(),
            guild_id: message
                .guild_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            text: message.content.clone(),
            timestamp_millis: message.timestamp.timestamp_millis(),
        }
    }
}

fn parse_id(kind: &str, raw: &str) -> anyhow::Result<u64> {
    raw.parse()
        .with_context(|| format!("Invalid {} id '{}'", kind, raw))
}

#[async_trait]
impl MessageSource for DiscordSource {
    async fn fetch_batch(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> anyhow::Result<Vec<MessageRecord>> {
        let channel = ChannelId::new(parse_id("channel", channel_id)?);
        let mut builder = GetMessages::new().limit(limit.min(100));
        if let Some(before) = before {
            builder = builder.before(MessageId::new(parse_id("message", before)?));
        }

        let messages = channel
            .messages(&self.http, builder)
            .await
            .with_context(|| format!("Failed to fetch messages for channel {}", channel_id))?;
        Ok(messages.iter().map(Self::to_record).collect())
    }

    async fn count_messages(&self, guild_id: &str, channel_id: &str) -> Option<u64> {
        let url = format!("{}/guilds/{}/messages/search", self.api_base, guild_id);
        let response = self
            .client
            .get(&url)
            .query(&[("channel_id", channel_id)])
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Message count lookup for channel {} returned {}", channel_id, r.status());
                return None;
            }
            Err(e) => {
                debug!("Message count lookup for channel {} failed: {}", channel_id, e);
                return None;
            }
        };

        match response.json::<SearchSummary>().await {
            Ok(summary) => summary.total_results,
            Err(e) => {
                debug!("Message count response for channel {} was malformed: {}", channel_id, e);
                None
            }
        }
    }
}
