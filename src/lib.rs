pub mod bridge;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod db;
pub mod engine;
pub mod markov;
pub mod source;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub bridge: Arc<bridge::EngineBridge>,
    /// Bot-side handle used for live message capture
    pub db: db::Database,
    /// Set while a whole-history collection is running
    pub collecting_entire: AtomicBool,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
