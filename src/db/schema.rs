pub(super) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        origin TEXT NOT NULL DEFAULT 'collected',
        UNIQUE (channel_id, message_id)
    );
    CREATE INDEX IF NOT EXISTS idx_messages_guild_channel ON messages (guild_id, channel_id);
    CREATE INDEX IF NOT EXISTS idx_messages_author ON messages (author_id);

    -- Channels whose full history has been swept at least once
    CREATE TABLE IF NOT EXISTS collection_state (
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        fully_collected BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (guild_id, channel_id)
    );
";

/// Adds `origin` to databases created before live capture was tracked.
/// Fails harmlessly when the column is already there.
pub(super) const MIGRATE_ADD_ORIGIN: &str =
    "ALTER TABLE messages ADD COLUMN origin TEXT NOT NULL DEFAULT 'collected'";
