//! Storage layer for Bearing data.
//!
//! Everything lives in a single SQLite database. Operations are grouped by
//! entity into submodules, each adding an `impl Storage` block:
//!
//! - `users`: organizations, users and API tokens
//! - `teams`: the organizational tree
//! - `goals`: goals, goal updates, clone and bulk import
//! - `measures`: measures, measure updates and the progress cascade
//! - `links`: the goal link store, hierarchy walk and alignment map
//! - `audit`: the LLM interaction log
//!
//! Tenant isolation is enforced here: every lookup that takes an
//! organization id treats a row from another organization as missing.

mod audit;
mod goals;
mod links;
mod measures;
mod teams;
mod users;

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rusqlite::types::Type;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage manager backed by one SQLite file.
pub struct Storage {
    /// Location of the database file
    path: PathBuf,
    /// SQLite connection
    conn: Connection,
}

impl Storage {
    /// Open or create the database at `path`, applying schema and migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        Self::init_schema(&conn)?;
        Self::run_migrations(&conn)?;

        tracing::debug!(path = %path.display(), "opened database");
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Check if a database already exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS teams (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                level TEXT NOT NULL,
                parent_id TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (organization_id) REFERENCES organizations(id),
                FOREIGN KEY (parent_id) REFERENCES teams(id)
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                title TEXT,
                role TEXT NOT NULL DEFAULT 'CONTRIBUTOR',
                team_id TEXT,
                manager_id TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_login_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (organization_id) REFERENCES organizations(id),
                FOREIGN KEY (team_id) REFERENCES teams(id),
                FOREIGN KEY (manager_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS api_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS goals (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                period TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'DRAFT',
                progress REAL NOT NULL DEFAULT 0,
                is_stretch INTEGER NOT NULL DEFAULT 0,
                due_date TEXT,
                owner_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id),
                FOREIGN KEY (team_id) REFERENCES teams(id)
            );

            CREATE TABLE IF NOT EXISTS goal_links (
                id TEXT PRIMARY KEY,
                parent_goal_id TEXT NOT NULL,
                child_goal_id TEXT NOT NULL,
                contribution_weight REAL NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                UNIQUE (parent_goal_id, child_goal_id),
                FOREIGN KEY (parent_goal_id) REFERENCES goals(id) ON DELETE CASCADE,
                FOREIGN KEY (child_goal_id) REFERENCES goals(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS measures (
                id TEXT PRIMARY KEY,
                goal_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                period TEXT,
                measure_type TEXT NOT NULL DEFAULT 'INCREASE_TO',
                unit TEXT,
                start_value REAL NOT NULL DEFAULT 0,
                current_value REAL NOT NULL DEFAULT 0,
                target_value REAL NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS measure_updates (
                id TEXT PRIMARY KEY,
                measure_id TEXT NOT NULL,
                value REAL NOT NULL,
                note TEXT,
                author_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (measure_id) REFERENCES measures(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS goal_updates (
                id TEXT PRIMARY KEY,
                goal_id TEXT NOT NULL,
                content TEXT NOT NULL,
                author_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS ai_interactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                model TEXT NOT NULL,
                entity_type TEXT,
                entity_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_teams_org ON teams(organization_id);
            CREATE INDEX IF NOT EXISTS idx_teams_parent ON teams(parent_id);
            CREATE INDEX IF NOT EXISTS idx_users_org ON users(organization_id);
            CREATE INDEX IF NOT EXISTS idx_goals_team ON goals(team_id);
            CREATE INDEX IF NOT EXISTS idx_goals_period ON goals(period);
            CREATE INDEX IF NOT EXISTS idx_links_child ON goal_links(child_goal_id);
            CREATE INDEX IF NOT EXISTS idx_measures_goal ON measures(goal_id);
            CREATE INDEX IF NOT EXISTS idx_measure_updates_measure ON measure_updates(measure_id);
            CREATE INDEX IF NOT EXISTS idx_goal_updates_goal ON goal_updates(goal_id);
            "#,
        )?;

        Ok(())
    }

    /// Run database migrations for schema changes.
    /// This handles adding new columns to existing databases.
    fn run_migrations(conn: &Connection) -> Result<()> {
        // Older databases lack measures.period; backfill it from the goal.
        let has_period: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('measures') WHERE name = 'period'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_period {
            conn.execute("ALTER TABLE measures ADD COLUMN period TEXT", [])?;
            conn.execute(
                "UPDATE measures SET period = (SELECT g.period FROM goals g WHERE g.id = measures.goal_id)",
                [],
            )?;
            tracing::info!("migrated measures table: added period column");
        }

        Ok(())
    }
}

/// Generate a new entity id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse a stored RFC 3339 timestamp.
pub(crate) fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().map(parse_time)
}

pub(crate) fn parse_opt_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Read a text column holding one of our enums.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Map "no rows" to a NotFound with the given message.
pub(crate) fn not_found<T>(result: rusqlite::Result<T>, message: &str) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(message.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Unique-constraint violations become a Conflict with the given message.
pub(crate) fn unique_conflict<T>(result: rusqlite::Result<T>, message: &str) -> Result<T> {
    match result {
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(Error::Conflict(message.to_string()))
        }
        other => other.map_err(Error::from),
    }
}
