//! SQLite implementation of the persistence gateway.
//!
//! OAuth tokens are encrypted at rest with AES-256-GCM; users and automations
//! are stored in clear.

use super::encryption::{Sealed, TokenCipher};
use super::PersistenceGateway;
use crate::error::AreaError;
use crate::model::{Automation, AutomationId, AutomationUpdate, NewAutomation, OAuthToken, User, UserId};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// SQLite-backed gateway.
///
/// # Schema
/// ```sql
/// CREATE TABLE user (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     email TEXT NOT NULL UNIQUE,
///     firstname TEXT NOT NULL,
///     lastname TEXT NOT NULL,
///     created_at TEXT NOT NULL
/// );
/// CREATE TABLE automation (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
///     name TEXT NOT NULL,
///     trigger_service_id TEXT NOT NULL,
///     trigger_id INTEGER NOT NULL,
///     trigger_params TEXT NOT NULL,       -- JSON
///     trigger_check_data TEXT NOT NULL,   -- JSON checkpoint
///     reaction_service_id TEXT NOT NULL,
///     reaction_id INTEGER NOT NULL,
///     reaction_params TEXT NOT NULL,      -- JSON
///     active INTEGER NOT NULL,
///     favorite INTEGER NOT NULL,
///     created_at TEXT NOT NULL
/// );
/// CREATE TABLE service_oauth (
///     user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
///     service_id TEXT NOT NULL,
///     access_token TEXT NOT NULL,         -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,                 -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT,                    -- RFC 3339 (optional)
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(user_id, service_id)
/// );
/// ```
///
/// The connection sits behind a mutex and every call runs on the blocking
/// thread pool, so the gateway can be shared freely between async tasks.
#[derive(Clone)]
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
    cipher: TokenCipher,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        firstname TEXT NOT NULL,
        lastname TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS automation (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        trigger_service_id TEXT NOT NULL,
        trigger_id INTEGER NOT NULL,
        trigger_params TEXT NOT NULL DEFAULT '{}',
        trigger_check_data TEXT NOT NULL DEFAULT '{}',
        reaction_service_id TEXT NOT NULL,
        reaction_id INTEGER NOT NULL,
        reaction_params TEXT NOT NULL DEFAULT '{}',
        active INTEGER NOT NULL DEFAULT 1,
        favorite INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_automation_user ON automation(user_id);

    CREATE TABLE IF NOT EXISTS service_oauth (
        user_id INTEGER NOT NULL REFERENCES user(id) ON DELETE CASCADE,
        service_id TEXT NOT NULL,
        access_token TEXT NOT NULL,
        access_token_nonce TEXT NOT NULL,
        refresh_token TEXT,
        refresh_token_nonce TEXT,
        expires_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(user_id, service_id)
    );
"#;

const AUTOMATION_COLUMNS: &str = "id, user_id, name, trigger_service_id, trigger_id, trigger_params, \
     trigger_check_data, reaction_service_id, reaction_id, reaction_params, active, favorite";

impl SqliteGateway {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Arguments
    /// * `path` - SQLite file, or `:memory:`
    /// * `encryption_key` - Base64-encoded 32-byte master key
    ///
    /// # Returns
    /// * `Err(AreaError::Configuration)` - Invalid key
    /// * `Err(AreaError::Persistence)` - Database cannot be opened or migrated
    pub fn open<P: AsRef<Path>>(path: P, encryption_key: &str) -> Result<Self, AreaError> {
        let cipher = TokenCipher::from_base64(encryption_key)
            .map_err(|e| AreaError::Configuration(format!("Invalid encryption key: {:#}", e)))?;

        let conn = Connection::open(path)
            .context("Failed to open database")
            .map_err(AreaError::persistence)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")
            .map_err(AreaError::persistence)?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create schema")
            .map_err(AreaError::persistence)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            cipher,
        })
    }

    /// In-memory database, mostly for tests.
    pub fn in_memory(encryption_key: &str) -> Result<Self, AreaError> {
        Self::open(":memory:", encryption_key)
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn call<T, F>(&self, f: F) -> Result<T, AreaError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &TokenCipher) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let cipher = self.cipher.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow!("Database connection mutex poisoned"))?;
            f(&conn, &cipher)
        })
        .await
        .map_err(AreaError::persistence)?
        .map_err(AreaError::persistence)
    }

    pub async fn create_user(
        &self,
        email: &str,
        firstname: &str,
        lastname: &str,
    ) -> Result<User, AreaError> {
        let email = email.to_string();
        let firstname = firstname.to_string();
        let lastname = lastname.to_string();
        self.call(move |conn, _| {
            conn.execute(
                "INSERT INTO user (email, firstname, lastname, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![email, firstname, lastname, Utc::now().to_rfc3339()],
            )
            .context("Failed to insert user")?;
            Ok(User {
                id: UserId(conn.last_insert_rowid()),
                email,
                firstname,
                lastname,
            })
        })
        .await
    }

    /// Creates an active, non-favorite automation with an empty checkpoint.
    pub async fn create_automation(
        &self,
        user_id: UserId,
        new: NewAutomation,
    ) -> Result<Automation, AreaError> {
        self.call(move |conn, _| {
            conn.execute(
                r#"
                INSERT INTO automation (
                    user_id, name,
                    trigger_service_id, trigger_id, trigger_params, trigger_check_data,
                    reaction_service_id, reaction_id, reaction_params,
                    active, favorite, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, '{}', ?6, ?7, ?8, 1, 0, ?9)
                "#,
                params![
                    user_id.0,
                    new.name,
                    new.trigger_service_id,
                    new.trigger_id,
                    new.trigger_params.to_string(),
                    new.reaction_service_id,
                    new.reaction_id,
                    new.reaction_params.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert automation")?;

            let id = AutomationId(conn.last_insert_rowid());
            debug!(user_id = %user_id, automation_id = %id, "Created automation");
            Ok(Automation {
                id,
                user_id,
                name: new.name,
                trigger_service_id: new.trigger_service_id,
                trigger_id: new.trigger_id,
                trigger_params: new.trigger_params,
                trigger_check_data: Value::Object(Default::default()),
                reaction_service_id: new.reaction_service_id,
                reaction_id: new.reaction_id,
                reaction_params: new.reaction_params,
                active: true,
                favorite: false,
            })
        })
        .await
    }

    pub async fn automation(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
    ) -> Result<Option<Automation>, AreaError> {
        self.call(move |conn, _| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM automation WHERE id = ?1 AND user_id = ?2",
                    AUTOMATION_COLUMNS
                ),
                params![automation_id.0, user_id.0],
                read_automation,
            )
            .optional()
            .context("Failed to load automation")
        })
        .await
    }

    pub async fn favorite_automations(&self, user_id: UserId) -> Result<Vec<Automation>, AreaError> {
        self.call(move |conn, _| {
            select_automations(conn, "WHERE user_id = ?1 AND favorite = 1", user_id)
        })
        .await
    }

    /// Returns `false` when the automation did not exist.
    pub async fn delete_automation(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
    ) -> Result<bool, AreaError> {
        self.call(move |conn, _| {
            let rows = conn
                .execute(
                    "DELETE FROM automation WHERE id = ?1 AND user_id = ?2",
                    params![automation_id.0, user_id.0],
                )
                .context("Failed to delete automation")?;
            Ok(rows > 0)
        })
        .await
    }

    pub async fn set_active(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
        active: bool,
    ) -> Result<bool, AreaError> {
        let update = AutomationUpdate {
            active: Some(active),
            ..Default::default()
        };
        self.update_automation(user_id, automation_id, update).await
    }

    pub async fn set_favorite(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
        favorite: bool,
    ) -> Result<bool, AreaError> {
        let update = AutomationUpdate {
            favorite: Some(favorite),
            ..Default::default()
        };
        self.update_automation(user_id, automation_id, update).await
    }

    /// Disconnects a service. Returns `false` when no token was stored.
    pub async fn delete_service_token(&self, user_id: UserId, service_id: &str) -> Result<bool, AreaError> {
        let service_id = service_id.to_string();
        self.call(move |conn, _| {
            let rows = conn
                .execute(
                    "DELETE FROM service_oauth WHERE user_id = ?1 AND service_id = ?2",
                    params![user_id.0, service_id],
                )
                .context("Failed to delete service token")?;
            Ok(rows > 0)
        })
        .await
    }

    /// Ids of the services `user_id` has connected, sorted.
    pub async fn connected_services(&self, user_id: UserId) -> Result<Vec<String>, AreaError> {
        self.call(move |conn, _| {
            let mut stmt = conn
                .prepare("SELECT service_id FROM service_oauth WHERE user_id = ?1 ORDER BY service_id")
                .context("Failed to prepare query")?;
            let services = stmt
                .query_map(params![user_id.0], |row| row.get(0))
                .context("Failed to execute query")?
                .collect::<Result<Vec<String>, _>>()
                .context("Failed to read results")?;
            Ok(services)
        })
        .await
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn all_users(&self) -> Result<Vec<User>, AreaError> {
        self.call(|conn, _| {
            let mut stmt = conn
                .prepare("SELECT id, email, firstname, lastname FROM user ORDER BY id")
                .context("Failed to prepare query")?;
            let users = stmt
                .query_map([], |row| {
                    Ok(User {
                        id: UserId(row.get(0)?),
                        email: row.get(1)?,
                        firstname: row.get(2)?,
                        lastname: row.get(3)?,
                    })
                })
                .context("Failed to execute query")?
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read users")?;
            Ok(users)
        })
        .await
    }

    async fn automations(&self, user_id: UserId) -> Result<Vec<Automation>, AreaError> {
        self.call(move |conn, _| select_automations(conn, "WHERE user_id = ?1", user_id))
            .await
    }

    async fn service_token(&self, user_id: UserId, service_id: &str) -> Result<Option<OAuthToken>, AreaError> {
        let service_id = service_id.to_string();
        self.call(move |conn, cipher| {
            let row = conn
                .query_row(
                    r#"
                    SELECT access_token, access_token_nonce,
                           refresh_token, refresh_token_nonce,
                           expires_at
                    FROM service_oauth
                    WHERE user_id = ?1 AND service_id = ?2
                    "#,
                    params![user_id.0, service_id],
                    |row| {
                        Ok((
                            Sealed {
                                ciphertext: row.get(0)?,
                                nonce: row.get(1)?,
                            },
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()
                .context("Failed to load service token")?;

            let Some((access, refresh, refresh_nonce, expires_at)) = row else {
                return Ok(None);
            };

            let access_token = cipher.open(&access).context("Failed to decrypt access token")?;
            let refresh_token = match (refresh, refresh_nonce) {
                (Some(ciphertext), Some(nonce)) => Some(
                    cipher
                        .open(&Sealed { ciphertext, nonce })
                        .context("Failed to decrypt refresh token")?,
                ),
                _ => None,
            };
            let expires_at = expires_at
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                .transpose()
                .context("Failed to parse expires_at timestamp")?;

            Ok(Some(OAuthToken {
                access_token,
                refresh_token,
                expires_at,
            }))
        })
        .await
    }

    async fn update_automation(
        &self,
        user_id: UserId,
        automation_id: AutomationId,
        update: AutomationUpdate,
    ) -> Result<bool, AreaError> {
        self.call(move |conn, _| {
            let mut columns: Vec<&str> = Vec::new();
            let mut values: Vec<SqlValue> = Vec::new();

            if let Some(v) = update.trigger_check_data {
                columns.push("trigger_check_data");
                values.push(SqlValue::Text(v.to_string()));
            }
            if let Some(v) = update.trigger_params {
                columns.push("trigger_params");
                values.push(SqlValue::Text(v.to_string()));
            }
            if let Some(v) = update.reaction_params {
                columns.push("reaction_params");
                values.push(SqlValue::Text(v.to_string()));
            }
            if let Some(v) = update.name {
                columns.push("name");
                values.push(SqlValue::Text(v));
            }
            if let Some(v) = update.active {
                columns.push("active");
                values.push(SqlValue::Integer(v as i64));
            }
            if let Some(v) = update.favorite {
                columns.push("favorite");
                values.push(SqlValue::Integer(v as i64));
            }

            if columns.is_empty() {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM automation WHERE id = ?1 AND user_id = ?2",
                        params![automation_id.0, user_id.0],
                        |_| Ok(()),
                    )
                    .optional()
                    .context("Failed to look up automation")?;
                return Ok(exists.is_some());
            }

            let assignments: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{} = ?{}", column, i + 1))
                .collect();
            let sql = format!(
                "UPDATE automation SET {} WHERE id = ?{} AND user_id = ?{}",
                assignments.join(", "),
                values.len() + 1,
                values.len() + 2
            );
            values.push(SqlValue::Integer(automation_id.0));
            values.push(SqlValue::Integer(user_id.0));

            let rows = conn
                .execute(&sql, params_from_iter(values.iter()))
                .context("Failed to update automation")?;
            Ok(rows > 0)
        })
        .await
    }

    async fn store_service_token(
        &self,
        user_id: UserId,
        service_id: &str,
        token: &OAuthToken,
    ) -> Result<(), AreaError> {
        let service_id = service_id.to_string();
        let token = token.clone();
        self.call(move |conn, cipher| {
            let access = cipher
                .seal(&token.access_token)
                .context("Failed to encrypt access token")?;
            let refresh = token
                .refresh_token
                .as_deref()
                .map(|t| cipher.seal(t))
                .transpose()
                .context("Failed to encrypt refresh token")?;
            let (refresh_token, refresh_token_nonce) = match refresh {
                Some(sealed) => (Some(sealed.ciphertext), Some(sealed.nonce)),
                None => (None, None),
            };
            let now = Utc::now().to_rfc3339();

            conn.execute(
                r#"
                INSERT INTO service_oauth (
                    user_id, service_id,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(user_id, service_id) DO UPDATE SET
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id.0,
                    service_id,
                    access.ciphertext,
                    access.nonce,
                    refresh_token,
                    refresh_token_nonce,
                    token.expires_at.map(|dt| dt.to_rfc3339()),
                    now,
                    now,
                ],
            )
            .context("Failed to store service token")?;
            Ok(())
        })
        .await
    }
}

fn select_automations(conn: &Connection, filter: &str, user_id: UserId) -> anyhow::Result<Vec<Automation>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM automation {} ORDER BY id",
            AUTOMATION_COLUMNS, filter
        ))
        .context("Failed to prepare query")?;
    let rows = stmt
        .query_map(params![user_id.0], |row| Ok((row.get::<_, i64>(0)?, read_automation(row))))
        .context("Failed to execute query")?;

    // A row that does not decode is skipped so the user's other automations
    // still run.
    let mut automations = Vec::new();
    for row in rows {
        let (id, decoded) = row.context("Failed to read automations")?;
        match decoded {
            Ok(automation) => automations.push(automation),
            Err(e) => warn!(
                user_id = %user_id,
                automation_id = id,
                error = %e,
                "Skipping undecodable automation row"
            ),
        }
    }
    Ok(automations)
}

fn read_automation(row: &Row<'_>) -> rusqlite::Result<Automation> {
    Ok(Automation {
        id: AutomationId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        name: row.get(2)?,
        trigger_service_id: row.get(3)?,
        trigger_id: row.get(4)?,
        trigger_params: json_column(row, 5)?,
        trigger_check_data: json_column(row, 6)?,
        reaction_service_id: row.get(7)?,
        reaction_id: row.get(8)?,
        reaction_params: json_column(row, 9)?,
        active: row.get(10)?,
        favorite: row.get(11)?,
    })
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::Duration;
    use serde_json::json;

    fn gateway() -> SqliteGateway {
        SqliteGateway::in_memory(&BASE64.encode([0u8; 32])).expect("Failed to open test gateway")
    }

    fn commit_to_issue() -> NewAutomation {
        NewAutomation {
            name: "Commits to issues".to_string(),
            trigger_service_id: "github".to_string(),
            trigger_id: 1,
            trigger_params: json!({"repository_name": "octo/hello"}),
            reaction_service_id: "github".to_string(),
            reaction_id: 2,
            reaction_params: json!({"repository_name": "octo/hello", "title": ""}),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_automations() {
        let gw = gateway();
        let alice = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();
        let bob = gw.create_user("bob@example.com", "Bob", "Builder").await.unwrap();

        let created = gw.create_automation(alice.id, commit_to_issue()).await.unwrap();
        assert!(created.active);
        assert!(!created.favorite);
        assert_eq!(created.trigger_check_data, json!({}));

        let listed = gw.automations(alice.id).await.unwrap();
        assert_eq!(listed, vec![created.clone()]);
        assert!(gw.automations(bob.id).await.unwrap().is_empty());

        let users = gw.all_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_checkpoint_update_is_scoped_to_one_row() {
        let gw = gateway();
        let user = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();
        let first = gw.create_automation(user.id, commit_to_issue()).await.unwrap();
        let second = gw.create_automation(user.id, commit_to_issue()).await.unwrap();

        let updated = gw
            .update_automation(
                user.id,
                first.id,
                AutomationUpdate::checkpoint(json!({"lastCommitSha": "abc"})),
            )
            .await
            .unwrap();
        assert!(updated);

        let first = gw.automation(user.id, first.id).await.unwrap().unwrap();
        let second = gw.automation(user.id, second.id).await.unwrap().unwrap();
        assert_eq!(first.trigger_check_data, json!({"lastCommitSha": "abc"}));
        assert_eq!(first.trigger_params, json!({"repository_name": "octo/hello"}));
        assert_eq!(second.trigger_check_data, json!({}));
    }

    #[tokio::test]
    async fn test_undecodable_row_does_not_hide_the_others() {
        let gw = gateway();
        let user = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();
        let healthy = gw.create_automation(user.id, commit_to_issue()).await.unwrap();
        let broken = gw.create_automation(user.id, commit_to_issue()).await.unwrap();
        let out_of_range = gw.create_automation(user.id, commit_to_issue()).await.unwrap();

        let (broken_id, out_of_range_id) = (broken.id.0, out_of_range.id.0);
        gw.call(move |conn, _| {
            conn.execute(
                "UPDATE automation SET trigger_check_data = 'not json' WHERE id = ?1",
                params![broken_id],
            )?;
            conn.execute(
                "UPDATE automation SET trigger_id = -1 WHERE id = ?1",
                params![out_of_range_id],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let listed = gw.automations(user.id).await.unwrap();
        assert_eq!(listed, vec![healthy]);
        assert!(gw.favorite_automations(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_automation_is_noop() {
        let gw = gateway();
        let user = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();
        let other = gw.create_user("eve@example.com", "Eve", "Dropper").await.unwrap();
        let automation = gw.create_automation(user.id, commit_to_issue()).await.unwrap();

        let missing = gw
            .update_automation(user.id, AutomationId(999), AutomationUpdate::checkpoint(json!({})))
            .await
            .unwrap();
        assert!(!missing);

        // Another user's id does not match the row either.
        let foreign = gw
            .update_automation(other.id, automation.id, AutomationUpdate::checkpoint(json!({"x": 1})))
            .await
            .unwrap();
        assert!(!foreign);

        assert!(gw
            .update_automation(user.id, automation.id, AutomationUpdate::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_settings_active_and_favorite() {
        let gw = gateway();
        let user = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();
        let automation = gw.create_automation(user.id, commit_to_issue()).await.unwrap();

        gw.update_automation(
            user.id,
            automation.id,
            AutomationUpdate::settings(json!({"repository_name": "octo/other"}), json!({}), "Renamed"),
        )
        .await
        .unwrap();
        assert!(gw.set_active(user.id, automation.id, false).await.unwrap());
        assert!(gw.set_favorite(user.id, automation.id, true).await.unwrap());

        let stored = gw.automation(user.id, automation.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.trigger_params, json!({"repository_name": "octo/other"}));
        assert!(!stored.active);
        assert!(stored.favorite);

        let favorites = gw.favorite_automations(user.id).await.unwrap();
        assert_eq!(favorites.len(), 1);

        assert!(gw.delete_automation(user.id, automation.id).await.unwrap());
        assert!(!gw.delete_automation(user.id, automation.id).await.unwrap());
        assert!(gw.automation(user.id, automation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_upsert_and_delete() {
        let gw = gateway();
        let user = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();

        assert!(gw.service_token(user.id, "github").await.unwrap().is_none());

        let token = OAuthToken {
            access_token: "gho_first".to_string(),
            refresh_token: Some("ghr_first".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        gw.store_service_token(user.id, "github", &token).await.unwrap();
        let stored = gw.service_token(user.id, "github").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "gho_first");
        assert_eq!(stored.refresh_token.as_deref(), Some("ghr_first"));
        assert!(stored.expires_at.is_some());

        gw.store_service_token(user.id, "github", &OAuthToken::bearer("gho_second"))
            .await
            .unwrap();
        let stored = gw.service_token(user.id, "github").await.unwrap().unwrap();
        assert_eq!(stored, OAuthToken::bearer("gho_second"));

        gw.store_service_token(user.id, "gitlab", &OAuthToken::bearer("glpat"))
            .await
            .unwrap();
        assert_eq!(gw.connected_services(user.id).await.unwrap(), vec!["github", "gitlab"]);

        assert!(gw.delete_service_token(user.id, "github").await.unwrap());
        assert!(!gw.delete_service_token(user.id, "github").await.unwrap());
        assert_eq!(gw.connected_services(user.id).await.unwrap(), vec!["gitlab"]);
    }

    #[tokio::test]
    async fn test_tokens_are_encrypted_at_rest() {
        let gw = gateway();
        let user = gw.create_user("alice@example.com", "Alice", "Liddell").await.unwrap();
        gw.store_service_token(user.id, "github", &OAuthToken::bearer("gho_plaintext"))
            .await
            .unwrap();

        let raw: String = gw
            .call(move |conn, _| {
                Ok(conn.query_row(
                    "SELECT access_token FROM service_oauth WHERE user_id = ?1",
                    params![user.id.0],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert!(!raw.contains("gho_plaintext"));
    }

    #[test]
    fn test_invalid_key_is_configuration_error() {
        match SqliteGateway::in_memory("short") {
            Err(AreaError::Configuration(_)) => {}
            Err(other) => panic!("expected configuration error, got {}", other),
            Ok(_) => panic!("a short key must be rejected"),
        }
    }
}
