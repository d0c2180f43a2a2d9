//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Default location of the database file in the platform data directory:
    /// - Linux:   `~/.local/share/duet/duet.db`
    /// - macOS:   `~/Library/Application Support/com.duet.duet/duet.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\duet\duet\data\duet.db`
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "duet", "duet").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().join("duet.db"))
    }

    /// Open (or create) the database at [`Database::default_path`].
    pub fn new() -> Result<Self> {
        Self::open_at(&Self::default_path()?)
    }

    /// Open (or create) a database at an explicit path, creating the parent
    /// directory if needed.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
