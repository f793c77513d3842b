use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use dashmap::DashMap;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

use crate::{error::Result, schema::rate_limit_state};

pub type DatabasePool = Pool<ConnectionManager<SqliteConnection>>;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS rate_limit_state (
    key TEXT PRIMARY KEY NOT NULL,
    until_ms BIGINT NOT NULL,
    updated_date TIMESTAMP NOT NULL
);";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Foreground,
    Background,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Foreground => "foreground",
            PoolKind::Background => "background",
        }
    }
}

impl Display for PoolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Store key for one credential's cooldown watermark: `x:cooldown:<pool>:<index>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey(String);

impl CooldownKey {
    pub fn new(pool: PoolKind, index: usize) -> Self {
        Self(format!("x:cooldown:{}:{}", pool.as_str(), index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CooldownKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable per-credential cooldown watermarks, shared by every process using the same credentials.
pub trait RateLimitStore: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &CooldownKey) -> Result<Option<DateTime<Utc>>>;

    /// Raise the watermark. A value earlier than the stored one is ignored.
    fn set(&self, key: &CooldownKey, until: DateTime<Utc>) -> Result<DateTime<Utc>>;

    fn clear(&self, key: &CooldownKey) -> Result<()>;

    /// Clear the watermark only if it is not later than `seen`. Returns whether it was cleared.
    fn clear_through(&self, key: &CooldownKey, seen: DateTime<Utc>) -> Result<bool>;

    fn remaining(&self, key: &CooldownKey, now: DateTime<Utc>) -> Result<Duration> {
        let remaining = self
            .get(key)?
            .and_then(|until| until.signed_duration_since(now).to_std().ok())
            .unwrap_or(Duration::ZERO);
        Ok(remaining)
    }
}

// MARK: SQLite

/// https://stackoverflow.com/questions/57123453/how-to-use-diesel-with-sqlite-connections-and-avoid-database-is-locked-type-of
#[derive(Debug)]
pub struct ConnectionOptions {
    pub enable_wal: bool,
    pub busy_timeout: Option<Duration>,
}

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        (|| {
            if let Some(d) = self.busy_timeout {
                conn.batch_execute(&format!("PRAGMA busy_timeout = {};", d.as_millis()))?;
            }
            if self.enable_wal {
                conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
            }
            Ok(())
        })()
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = rate_limit_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct RateLimitRow {
    key: String,
    until_ms: i64,
    updated_date: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct SqliteRateLimitStore {
    pool: DatabasePool,
}

impl SqliteRateLimitStore {
    /// Open (or create) the store at `database_url` and make sure the table exists.
    pub fn open(database_url: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(database_url).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(4)
            .connection_customizer(Box::new(ConnectionOptions {
                enable_wal: true,
                busy_timeout: Some(Duration::from_secs(5)),
            }))
            .build(manager)
            .map_err(|e| anyhow::anyhow!("cannot open rate limit store at {}: {}", database_url, e))?;
        tracing::info!("Opened rate limit store at {}", database_url);
        Self::from_pool(pool)
    }

    pub fn from_pool(pool: DatabasePool) -> Result<Self> {
        pool.get()?.batch_execute(CREATE_TABLE_SQL)?;
        Ok(Self { pool })
    }
}

impl RateLimitStore for SqliteRateLimitStore {
    fn get(&self, key: &CooldownKey) -> Result<Option<DateTime<Utc>>> {
        use crate::schema::rate_limit_state::dsl;

        let conn = &mut self.pool.get()?;
        let until = dsl::rate_limit_state
            .filter(dsl::key.eq(key.as_str()))
            .select(dsl::until_ms)
            .first::<i64>(conn)
            .optional()?;
        Ok(until.and_then(from_millis))
    }

    fn set(&self, key: &CooldownKey, until: DateTime<Utc>) -> Result<DateTime<Utc>> {
        use crate::schema::rate_limit_state::dsl;

        let conn = &mut self.pool.get()?;
        let stored = conn.transaction(|conn| -> Result<i64> {
            let existing = dsl::rate_limit_state
                .filter(dsl::key.eq(key.as_str()))
                .select(dsl::until_ms)
                .first::<i64>(conn)
                .optional()?;
            let until_ms = existing.unwrap_or(i64::MIN).max(until.timestamp_millis());
            if until_ms > until.timestamp_millis() {
                tracing::debug!("Keeping later cooldown for {}", key);
            }
            diesel::replace_into(rate_limit_state::table)
                .values(RateLimitRow {
                    key: key.as_str().to_string(),
                    until_ms,
                    updated_date: Utc::now().naive_utc(),
                })
                .execute(conn)?;
            Ok(until_ms)
        })?;
        Ok(from_millis(stored).unwrap_or(until))
    }

    fn clear(&self, key: &CooldownKey) -> Result<()> {
        use crate::schema::rate_limit_state::dsl;

        let conn = &mut self.pool.get()?;
        diesel::delete(dsl::rate_limit_state.filter(dsl::key.eq(key.as_str()))).execute(conn)?;
        Ok(())
    }

    fn clear_through(&self, key: &CooldownKey, seen: DateTime<Utc>) -> Result<bool> {
        use crate::schema::rate_limit_state::dsl;

        let conn = &mut self.pool.get()?;
        let deleted = diesel::delete(
            dsl::rate_limit_state
                .filter(dsl::key.eq(key.as_str()))
                .filter(dsl::until_ms.le(seen.timestamp_millis())),
        )
        .execute(conn)?;
        Ok(deleted > 0)
    }
}

// MARK: Memory

/// Process-local store. For tests and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: DashMap<CooldownKey, DateTime<Utc>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn get(&self, key: &CooldownKey) -> Result<Option<DateTime<Utc>>> {
        Ok(self.entries.get(key).map(|v| *v))
    }

    fn set(&self, key: &CooldownKey, until: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut entry = self.entries.entry(key.clone()).or_insert(until);
        if until > *entry {
            *entry = until;
        }
        Ok(*entry)
    }

    fn clear(&self, key: &CooldownKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear_through(&self, key: &CooldownKey, seen: DateTime<Utc>) -> Result<bool> {
        Ok(self.entries.remove_if(key, |_, until| *until <= seen).is_some())
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
