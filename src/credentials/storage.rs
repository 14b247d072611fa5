//! Encrypted credential storage using SQLite.
//!
//! One row per `(owner, app_id)` pair. The app secret and both tokens are
//! encrypted at rest; timestamps are stored as RFC 3339 text in UTC so
//! range queries can compare lexicographically.
//!
//! All mutation is a targeted single-row write: the full upsert on
//! submission, the token-set update after a confirmed provider success,
//! or the refresh-error note. There are no bulk updates.

use super::{encryption, Credential};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Encrypted credential store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id TEXT PRIMARY KEY,              -- UUIDv4
///     owner TEXT NOT NULL,
///     app_id TEXT NOT NULL,
///     app_secret TEXT NOT NULL,         -- Encrypted
///     authorization_code TEXT,
///     access_token TEXT,                -- Encrypted
///     refresh_token TEXT,               -- Encrypted
///     expires_at TEXT,                  -- RFC 3339 (UTC)
///     last_refresh_error TEXT,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(owner, app_id)
/// );
/// ```
///
/// # Thread Safety
/// The connection is wrapped in a Mutex; SQLite itself runs in serialized
/// mode, and ACID guarantees prevent partial token writes.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

/// Fixed-width UTC RFC 3339, safe for lexicographic range comparison.
fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ts_from_sql(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .context("Failed to parse stored timestamp")
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file (`:memory:` in tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                app_id TEXT NOT NULL,
                app_secret TEXT NOT NULL,
                authorization_code TEXT,
                access_token TEXT,
                refresh_token TEXT,
                expires_at TEXT,
                last_refresh_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(owner, app_id)
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_owner_app ON credentials(owner, app_id)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Inserts a fresh credential for `(owner, app_id)`, or overwrites the
    /// existing row (upsert).
    ///
    /// Overwriting replaces the app secret and clears all token material:
    /// the row returns to the unauthorized state. The original id and
    /// created_at survive an overwrite.
    pub fn upsert_submission(
        &self,
        owner: &str,
        app_id: &str,
        app_secret: &str,
    ) -> Result<Credential> {
        let sealed_secret = encryption::seal(app_secret, &self.encryption_key)
            .context("Failed to encrypt app secret")?;

        let now = ts_to_sql(Utc::now());
        let id = Uuid::new_v4().to_string();

        self.conn
            .lock()
            .unwrap()
            .execute(
                r#"
                INSERT INTO credentials (
                    id, owner, app_id, app_secret,
                    authorization_code, access_token, refresh_token,
                    expires_at, last_refresh_error, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, NULL, NULL, ?5, ?5)
                ON CONFLICT(owner, app_id) DO UPDATE SET
                    app_secret = excluded.app_secret,
                    authorization_code = NULL,
                    access_token = NULL,
                    refresh_token = NULL,
                    expires_at = NULL,
                    last_refresh_error = NULL,
                    updated_at = excluded.updated_at
                "#,
                params![id, owner, app_id, sealed_secret, now],
            )
            .context("Failed to upsert credential")?;

        self.get_by_pair(owner, app_id)?
            .context("Credential missing immediately after upsert")
    }

    /// Retrieves a credential by id.
    pub fn get(&self, id: &str) -> Result<Option<Credential>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credentials WHERE id = ?1",
                Self::COLUMNS
            ))
            .context("Failed to prepare query")?;

        let mut rows = stmt.query(params![id]).context("Failed to execute query")?;
        match rows.next().context("Failed to read row")? {
            Some(row) => Ok(Some(self.decode_row(row)?)),
            None => Ok(None),
        }
    }

    /// Retrieves a credential by its `(owner, app_id)` pair.
    pub fn get_by_pair(&self, owner: &str, app_id: &str) -> Result<Option<Credential>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credentials WHERE owner = ?1 AND app_id = ?2",
                Self::COLUMNS
            ))
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![owner, app_id])
            .context("Failed to execute query")?;
        match rows.next().context("Failed to read row")? {
            Some(row) => Ok(Some(self.decode_row(row)?)),
            None => Ok(None),
        }
    }

    /// Lists all credentials owned by a user, most recent first.
    pub fn list_by_owner(&self, owner: &str) -> Result<Vec<Credential>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credentials WHERE owner = ?1 ORDER BY created_at DESC",
                Self::COLUMNS
            ))
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![owner])
            .context("Failed to execute query")?;
        let mut credentials = Vec::new();
        while let Some(row) = rows.next().context("Failed to read row")? {
            credentials.push(self.decode_row(row)?);
        }
        Ok(credentials)
    }

    /// Lists every credential whose token expires before `deadline`.
    ///
    /// Rows that never completed an exchange (`expires_at` NULL) are not
    /// refresh candidates and are excluded.
    pub fn list_expiring_before(&self, deadline: DateTime<Utc>) -> Result<Vec<Credential>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credentials
                 WHERE expires_at IS NOT NULL AND expires_at < ?1
                 ORDER BY expires_at ASC",
                Self::COLUMNS
            ))
            .context("Failed to prepare query")?;

        let mut rows = stmt
            .query(params![ts_to_sql(deadline)])
            .context("Failed to execute query")?;
        let mut credentials = Vec::new();
        while let Some(row) = rows.next().context("Failed to read row")? {
            credentials.push(self.decode_row(row)?);
        }
        Ok(credentials)
    }

    /// Persists the token set produced by a successful code exchange.
    ///
    /// Sets the redeemed code and all three token fields in one statement
    /// and clears any recorded refresh failure.
    pub fn store_exchange_result(
        &self,
        id: &str,
        authorization_code: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let sealed_access = encryption::seal(access_token, &self.encryption_key)
            .context("Failed to encrypt access token")?;
        let sealed_refresh = encryption::seal(refresh_token, &self.encryption_key)
            .context("Failed to encrypt refresh token")?;

        let updated = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE credentials SET
                    authorization_code = ?2,
                    access_token = ?3,
                    refresh_token = ?4,
                    expires_at = ?5,
                    last_refresh_error = NULL,
                    updated_at = ?6
                WHERE id = ?1
                "#,
                params![
                    id,
                    authorization_code,
                    sealed_access,
                    sealed_refresh,
                    ts_to_sql(expires_at),
                    ts_to_sql(Utc::now()),
                ],
            )
            .context("Failed to store exchange result")?;

        anyhow::ensure!(updated == 1, "No credential row with id {}", id);
        Ok(())
    }

    /// Persists the token set produced by a successful refresh.
    ///
    /// The redeemed authorization code is left as-is; the refresh failure
    /// note is cleared.
    pub fn store_refresh_result(
        &self,
        id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let sealed_access = encryption::seal(access_token, &self.encryption_key)
            .context("Failed to encrypt access token")?;
        let sealed_refresh = encryption::seal(refresh_token, &self.encryption_key)
            .context("Failed to encrypt refresh token")?;

        let updated = self
            .conn
            .lock()
            .unwrap()
            .execute(
                r#"
                UPDATE credentials SET
                    access_token = ?2,
                    refresh_token = ?3,
                    expires_at = ?4,
                    last_refresh_error = NULL,
                    updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    id,
                    sealed_access,
                    sealed_refresh,
                    ts_to_sql(expires_at),
                    ts_to_sql(Utc::now()),
                ],
            )
            .context("Failed to store refresh result")?;

        anyhow::ensure!(updated == 1, "No credential row with id {}", id);
        Ok(())
    }

    /// Records why a refresh failed. Token material is untouched.
    pub fn record_refresh_error(&self, id: &str, error: &str) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE credentials SET last_refresh_error = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, error, ts_to_sql(Utc::now())],
            )
            .context("Failed to record refresh error")?;
        Ok(())
    }

    /// Deletes a credential by id. Returns false when no row existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let rows_affected = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM credentials WHERE id = ?1", params![id])
            .context("Failed to delete credential")?;

        Ok(rows_affected > 0)
    }

    const COLUMNS: &'static str = "id, owner, app_id, app_secret, authorization_code, \
         access_token, refresh_token, expires_at, last_refresh_error, created_at, updated_at";

    /// Decodes one row, opening the sealed secret columns.
    fn decode_row(&self, row: &Row<'_>) -> Result<Credential> {
        let sealed_secret: String = row.get(3)?;
        let app_secret = encryption::open(&sealed_secret, &self.encryption_key)
            .context("Failed to decrypt app secret")?;

        let access_token = row
            .get::<_, Option<String>>(5)?
            .map(|sealed| encryption::open(&sealed, &self.encryption_key))
            .transpose()
            .context("Failed to decrypt access token")?;

        let refresh_token = row
            .get::<_, Option<String>>(6)?
            .map(|sealed| encryption::open(&sealed, &self.encryption_key))
            .transpose()
            .context("Failed to decrypt refresh token")?;

        let expires_at = row
            .get::<_, Option<String>>(7)?
            .map(|s| ts_from_sql(&s))
            .transpose()?;

        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;

        Ok(Credential {
            id: row.get(0)?,
            owner: row.get(1)?,
            app_id: row.get(2)?,
            app_secret,
            authorization_code: row.get(4)?,
            access_token,
            refresh_token,
            expires_at,
            last_refresh_error: row.get(8)?,
            created_at: ts_from_sql(&created_at)?,
            updated_at: ts_from_sql(&updated_at)?,
        })
    }
}
