use crate::config::Config;
use crate::corpus::{CorpusStore, Filter, MessageRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

mod schema;

/// How a row reached the corpus.
///
/// Only collected rows mark how far a channel's history has been walked;
/// live rows may sit above a gap the bot was offline for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Collected,
    Live,
}

impl Origin {
    fn as_str(self) -> &'static str {
        match self {
            Origin::Collected => "collected",
            Origin::Live => "live",
        }
    }
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(path)?;
        // The engine worker and live capture each hold a connection.
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.lock()?;
        conn.execute_batch(schema::SCHEMA)?;
        let _ = conn.execute(schema::MIGRATE_ADD_ORIGIN, []);
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection mutex poisoned"))
    }

    /// Runs a synchronous database call on the blocking pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Inserts records from a collection run in one transaction, ignoring
    /// blank text and rows that already exist for the same
    /// `(channel_id, message_id)`. A row captured live is claimed by the run.
    ///
    /// Returns the number of rows written.
    pub fn insert_messages(
        &self,
        records: &[MessageRecord],
        guild_id: &str,
        fully_collected_channel_id: Option<&str>,
    ) -> anyhow::Result<usize> {
        self.insert_with_origin(records, guild_id, fully_collected_channel_id, Origin::Collected)
    }

    /// Inserts messages seen on the gateway. They join the corpus right away
    /// but do not count as collected history for resuming.
    pub fn insert_live_messages(
        &self,
        records: &[MessageRecord],
        guild_id: &str,
    ) -> anyhow::Result<usize> {
        self.insert_with_origin(records, guild_id, None, Origin::Live)
    }

    fn insert_with_origin(
        &self,
        records: &[MessageRecord],
        guild_id: &str,
        fully_collected_channel_id: Option<&str>,
        origin: Origin,
    ) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (message_id, guild_id, channel_id, author_id, content, timestamp, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(channel_id, message_id) DO UPDATE SET origin = excluded.origin
                 WHERE messages.origin = 'live' AND excluded.origin = 'collected'",
            )?;
            for record in records.iter().filter(|r| r.has_text()) {
                let guild = if record.guild_id.is_empty() {
                    guild_id
                } else {
                    record.guild_id.as_str()
                };
                inserted += stmt.execute(params![
                    record.message_id,
                    guild,
                    record.channel_id,
                    record.author_id,
                    record.text,
                    record.timestamp_millis,
                    origin.as_str(),
                ])?;
            }
        }

        if let Some(channel_id) = fully_collected_channel_id {
            tx.execute(
                "INSERT INTO collection_state (guild_id, channel_id, fully_collected, updated_at)
                 VALUES (?1, ?2, TRUE, CURRENT_TIMESTAMP)
                 ON CONFLICT(guild_id, channel_id) DO UPDATE SET fully_collected = TRUE, updated_at = CURRENT_TIMESTAMP",
                (guild_id, channel_id),
            )?;
        }
        tx.commit()?;

        debug!(
            "Database: Stored {} of {} {} messages for guild {}",
            inserted,
            records.len(),
            origin.as_str(),
            guild_id
        );
        Ok(inserted)
    }

    pub fn query_messages(&self, filter: &Filter) -> anyhow::Result<Vec<MessageRecord>> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "SELECT message_id, author_id, channel_id, guild_id, content, timestamp
             FROM messages WHERE 1 = 1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(guild_id) = filter.effective_guild() {
            sql.push_str(" AND guild_id = ?");
            params.push(Box::new(guild_id.to_string()));
        }
        if let Some(channel_id) = &filter.channel_id {
            sql.push_str(" AND channel_id = ?");
            params.push(Box::new(channel_id.clone()));
        }
        if let Some(author_id) = &filter.author_id {
            sql.push_str(" AND author_id = ?");
            params.push(Box::new(author_id.clone()));
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let params_slice: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(&params_slice[..], |row| {
            Ok(MessageRecord {
                message_id: row.get(0)?,
                author_id: row.get(1)?,
                channel_id: row.get(2)?,
                guild_id: row.get(3)?,
                text: row.get(4)?,
                timestamp_millis: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        debug!("Database: Query returned {} messages", results.len());
        Ok(results)
    }

    pub fn channel_fully_collected(&self, guild_id: &str, channel_id: &str) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let flag: Option<bool> = conn
            .query_row(
                "SELECT fully_collected FROM collection_state WHERE guild_id = ?1 AND channel_id = ?2",
                (guild_id, channel_id),
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    }

    /// Ids of collected rows in a channel. Live captures are left out.
    pub fn message_ids(&self, guild_id: &str, channel_id: &str) -> anyhow::Result<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT message_id FROM messages
             WHERE guild_id = ?1 AND channel_id = ?2 AND origin = 'collected'",
        )?;
        let rows = stmt.query_map((guild_id, channel_id), |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    pub fn count_messages(&self) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl CorpusStore for Database {
    async fn add_messages(
        &self,
        records: Vec<MessageRecord>,
        guild_id: &str,
        fully_collected_channel_id: Option<&str>,
    ) -> anyhow::Result<()> {
        let guild_id = guild_id.to_string();
        let channel_id = fully_collected_channel_id.map(str::to_string);
        self.run_blocking(move |db| {
            db.insert_messages(&records, &guild_id, channel_id.as_deref())
                .map(|_| ())
        })
        .await
    }

    async fn get_messages(&self, filter: &Filter) -> anyhow::Result<Vec<MessageRecord>> {
        let filter = filter.clone();
        self.run_blocking(move |db| db.query_messages(&filter)).await
    }

    async fn is_channel_fully_collected(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> anyhow::Result<bool> {
        let guild_id = guild_id.to_string();
        let channel_id = channel_id.to_string();
        self.run_blocking(move |db| db.channel_fully_collected(&guild_id, &channel_id))
            .await
    }

    async fn get_existing_message_ids(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> anyhow::Result<HashSet<String>> {
        let guild_id = guild_id.to_string();
        let channel_id = channel_id.to_string();
        self.run_blocking(move |db| db.message_ids(&guild_id, &channel_id))
            .await
    }
}
