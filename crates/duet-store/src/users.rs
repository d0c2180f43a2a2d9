//! Lookup and creation of [`User`] records for the login path.

use rusqlite::{params, OptionalExtension};

use duet_shared::types::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_ts, now_millis, parse_ts, User};

impl Database {
    /// Return the user named `username`, creating it on first login.
    ///
    /// The name is trimmed before lookup; a blank name is rejected.
    pub fn find_or_create_user(&self, username: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::InvalidInput("username must not be blank".into()));
        }

        if let Some(user) = self.find_user_by_name(username)? {
            return Ok(user);
        }

        let created_at = now_millis();
        // A concurrent login may have inserted the same name in between.
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, format_ts(&created_at)],
        )?;

        if inserted == 1 {
            let user = self.get_user(UserId(self.conn().last_insert_rowid()))?;
            tracing::info!(user_id = %user.id, username, "created user");
            return Ok(user);
        }

        self.find_user_by_name(username)?.ok_or(StoreError::NotFound)
    }

    /// Fetch a single user by id.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id.0],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    fn find_user_by_name(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: i64 = row.get(0)?;
    let username: String = row.get(1)?;
    let created_str: String = row.get(2)?;

    Ok(User {
        id: UserId(id),
        username,
        created_at: parse_ts(2, &created_str)?,
    })
}
