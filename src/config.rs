use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub application_id: u64,
    pub owner_id: Option<u64>,
    pub database_url: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,

    // Collection settings
    pub collect_batch_delay_ms: u64,
    pub collect_retry_attempts: u32,
    pub collect_retry_delay_ms: u64,
    pub corpus_chunk_size: usize,

    // Generation defaults
    pub generate_min_length: usize,
    pub generate_max_length: usize,
    pub default_model_order: usize,

    /// Store messages seen live on the gateway.
    pub capture_live_messages: bool,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            application_id: env::var("APPLICATION_ID")
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID must be set"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID must be a valid u64"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/parrot.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Listening and learning".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env_or("REGISTER_COMMANDS", false),

            collect_batch_delay_ms: env_or("COLLECT_BATCH_DELAY_MS", 1000),
            collect_retry_attempts: env_or("COLLECT_RETRY_ATTEMPTS", 3),
            collect_retry_delay_ms: env_or("COLLECT_RETRY_DELAY_MS", 1000),
            corpus_chunk_size: env_or("CORPUS_CHUNK_SIZE", 1000),

            generate_min_length: env_or("GENERATE_MIN_LENGTH", 5),
            generate_max_length: env_or("GENERATE_MAX_LENGTH", 30),
            default_model_order: env_or("DEFAULT_MODEL_ORDER", 2),

            capture_live_messages: env_or("CAPTURE_LIVE_MESSAGES", true),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("application_id", &self.application_id)
            .field("owner_id", &self.owner_id)
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("collect_batch_delay_ms", &self.collect_batch_delay_ms)
            .field("collect_retry_attempts", &self.collect_retry_attempts)
            .field("collect_retry_delay_ms", &self.collect_retry_delay_ms)
            .field("corpus_chunk_size", &self.corpus_chunk_size)
            .field("generate_min_length", &self.generate_min_length)
            .field("generate_max_length", &self.generate_max_length)
            .field("default_model_order", &self.default_model_order)
            .field("capture_live_messages", &self.capture_live_messages)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
