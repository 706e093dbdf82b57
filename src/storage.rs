use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::User;

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Account that signed in on this machine before, offered by the sign-in
/// prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownUser {
    pub user_id: String,
    pub handle: String,
    pub name: String,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    /// Persists the signed-in user. There is at most one.
    pub fn save_current_user(&self, user: &User) -> Result<()> {
        if user.id.trim().is_empty() {
            bail!("storage: user id required");
        }
        let payload = serde_json::to_string(user).context("storage: encode user")?;
        let now = Utc::now().timestamp();

        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO session_user (slot, user_id, payload, updated_at)
VALUES (1, ?1, ?2, ?3)
ON CONFLICT(slot) DO UPDATE SET
  user_id = excluded.user_id,
  payload = excluded.payload,
  updated_at = excluded.updated_at
"#,
            params![user.id, payload, now],
        )?;
        conn.execute(
            r#"
INSERT INTO known_users (user_id, handle, name, last_used_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(user_id) DO UPDATE SET
  handle = excluded.handle,
  name = excluded.name,
  last_used_at = excluded.last_used_at
"#,
            params![user.id, user.handle, user.name, now],
        )?;
        Ok(())
    }

    pub fn load_current_user(&self) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM session_user WHERE slot = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .context("storage: query session user")?;
        match payload {
            Some(payload) => serde_json::from_str(&payload)
                .map(Some)
                .context("storage: decode session user"),
            None => Ok(None),
        }
    }

    pub fn clear_current_user(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM session_user", [])
            .context("storage: clear session user")?;
        Ok(())
    }

    pub fn list_known_users(&self) -> Result<Vec<KnownUser>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT user_id, handle, name, last_used_at
FROM known_users
ORDER BY last_used_at DESC, user_id ASC
"#,
        )?;
        let rows = stmt
            .query_map([], known_user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn known_user_from_row(row: &Row<'_>) -> rusqlite::Result<KnownUser> {
    let used: i64 = row.get(3)?;
    Ok(KnownUser {
        user_id: row.get(0)?,
        handle: row.get(1)?,
        name: row.get(2)?,
        last_used_at: Utc
            .timestamp_opt(used, 0)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS session_user (
  slot INTEGER PRIMARY KEY CHECK (slot = 1),
  user_id TEXT NOT NULL,
  payload TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
        r#"
CREATE TABLE IF NOT EXISTS known_users (
  user_id TEXT PRIMARY KEY,
  handle TEXT NOT NULL,
  name TEXT NOT NULL,
  last_used_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_known_users_last_used ON known_users(last_used_at);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("irecipes").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn user(id: &str, handle: &str) -> User {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "userName": handle,
            "name": "Test Cook",
            "followers": ["f1"],
        }))
        .unwrap()
    }

    #[test]
    fn open_creates_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn current_user_round_trips_and_clears() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();
        assert!(store.load_current_user().unwrap().is_none());

        store.save_current_user(&user("u1", "ana")).unwrap();
        store.save_current_user(&user("u2", "bia")).unwrap();
        let loaded = store.load_current_user().unwrap().unwrap();
        assert_eq!(loaded.id, "u2");
        assert_eq!(loaded.followers, vec!["f1".to_string()]);

        store.clear_current_user().unwrap();
        assert!(store.load_current_user().unwrap().is_none());

        let known: Vec<String> = store
            .list_known_users()
            .unwrap()
            .into_iter()
            .map(|known| known.user_id)
            .collect();
        assert_eq!(known.len(), 2);
        assert!(known.contains(&"u1".to_string()));
    }

    #[test]
    fn reopening_keeps_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        store.save_current_user(&user("u9", "cook")).unwrap();
        store.close().unwrap();

        let store = Store::open(Options { path: Some(path) }).unwrap();
        assert_eq!(store.load_current_user().unwrap().unwrap().handle, "cook");
    }

    #[test]
    fn rejects_blank_user_id() {
        let dir = tempdir().unwrap();
        let store = Store::open(Options {
            path: Some(dir.path().join("state.db")),
        })
        .unwrap();
        let mut blank = user("u1", "x");
        blank.id = " ".into();
        let err = store.save_current_user(&blank).unwrap_err();
        assert!(format!("{err:#}").contains("user id required"));
        assert!(store.load_current_user().unwrap().is_none());
    }
}
