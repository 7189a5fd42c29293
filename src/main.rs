use parrot::bridge::factory::DiscordEngineFactory;
use parrot::bridge::protocol::EngineCredentials;
use parrot::bridge::EngineBridge;
use parrot::commands::{collect, generate, stats};
use parrot::engine::EngineSettings;
use parrot::source::DiscordSource;
use parrot::{config::Config, Data};
use poise::serenity_prelude as serenity;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Stores a message seen on the gateway so the corpus keeps growing between collections.
async fn capture_message(data: &Data, message: &serenity::Message) {
    if message.author.bot || message.content.trim().is_empty() {
        return;
    }
    let Some(guild_id) = message.guild_id else {
        return;
    };

    let record = DiscordSource::to_record(message);
    let guild_id = guild_id.to_string();
    match data
        .db
        .run_blocking(move |db| db.insert_live_messages(&[record], &guild_id))
        .await
    {
        Ok(inserted) => debug!("Captured {} live message(s)", inserted),
        Err(e) => warn!("Failed to capture message {}: {}", message.id, e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let bridge = Arc::new(EngineBridge::new(DiscordEngineFactory::new(
        EngineSettings::from_config(&config),
    )));
    bridge
        .initialize(EngineCredentials {
            discord_token: config.discord_token.clone(),
            database_url: config.database_url.clone(),
        })
        .await?;

    let engine_bridge = bridge.clone();

    let db = parrot::db::Database::new(&config)?;
    db.execute_init()?;

    let owners = config
        .owner_id
        .map(serenity::UserId::new)
        .into_iter()
        .collect();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![collect::collect(), generate::generate(), stats::stats()],
            owners,
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        if data.config.capture_live_messages {
                            capture_message(data, new_message).await;
                        }
                    }
                    Ok(())
                })
            },
            on_error: |err| {
                Box::pin(async move {
                    if let Err(e) = poise::builtins::on_error(err).await {
                        error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                if let Some(guild_id) = config.dev_guild_id {
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        serenity::GuildId::new(guild_id),
                    )
                    .await?;
                    info!("Registered commands in guild {}", guild_id);
                } else if config.register_commands {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    info!("Registered commands globally");
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                Ok(Data {
                    config,
                    bridge,
                    db,
                    collecting_entire: AtomicBool::new(false),
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }
    engine_bridge.shutdown();

    Ok(())
}
