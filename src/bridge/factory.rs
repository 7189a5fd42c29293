use super::protocol::EngineCredentials;
use crate::db::Database;
use crate::engine::{Engine, EngineSettings};
use crate::source::DiscordSource;
use std::sync::Arc;
use tracing::info;

/// Builds the engine inside the worker from the credentials sent at initialization.
pub trait EngineFactory: Send + Sync + 'static {
    fn build(&self, credentials: &EngineCredentials) -> anyhow::Result<Engine>;
}

impl<F> EngineFactory for F
where
    F: Fn(&EngineCredentials) -> anyhow::Result<Engine> + Send + Sync + 'static,
{
    fn build(&self, credentials: &EngineCredentials) -> anyhow::Result<Engine> {
        self(credentials)
    }
}

/// Production wiring: SQLite corpus plus Discord REST history.
pub struct DiscordEngineFactory {
    settings: EngineSettings,
}

impl DiscordEngineFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }
}

impl EngineFactory for DiscordEngineFactory {
    fn build(&self, credentials: &EngineCredentials) -> anyhow::Result<Engine> {
        let db = Database::open(&credentials.database_url)?;
        db.execute_init()?;
        let source = DiscordSource::new(&credentials.discord_token);
        info!(
            "Engine: opened corpus at {} with upstream Discord session",
            credentials.database_url
        );
        Ok(Engine::new(
            Arc::new(db),
            Arc::new(source),
            self.settings.clone(),
        ))
    }
}
