//! Credential entity, lifecycle state machine, and encrypted storage.
//!
//! One credential row per `(owner, app_id)` pair: the app identity and
//! secret the user supplied, plus the token set obtained from the
//! provider. Secrets are encrypted at rest with AES-256-GCM.
//!
//! # Lifecycle
//!
//! ```text
//! Unauthorized ──exchange ok──▶ Authorized
//!      ▲                            │ expires_at approaches
//!      │ resubmit                   ▼
//!      │                        Expired ──refresh ok──▶ Authorized
//!      │                            │ refresh fails
//!      └──────────────────── ReauthRequired
//! ```
//!
//! A failed exchange or refresh never touches token material: the row is
//! left as it was, except that a failed refresh records its reason in
//! `last_refresh_error` (the basis for `ReauthRequired`).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use storage::CredentialStore;

/// Minimum remaining validity below which a refresh is attempted.
///
/// A credential whose token expires further out than this is left alone
/// by `refresh_one` ("still valid").
pub const REFRESH_BUFFER_SECS: i64 = 10 * 60;

/// Default sweep horizon: rows expiring within this window are candidates.
pub const DEFAULT_LOOKAHEAD_SECS: i64 = 24 * 60 * 60;

/// A stored credential for one Qianchuan app owned by one user.
///
/// `access_token`, `refresh_token`, and `expires_at` are set together by a
/// successful exchange or refresh, never partially.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    /// Store-assigned identifier (UUIDv4).
    pub id: String,

    /// Opaque identifier of the owning user.
    pub owner: String,

    /// Qianchuan app id, supplied by the user.
    pub app_id: String,

    /// Secret paired with `app_id`, supplied by the user.
    pub app_secret: String,

    /// Last authorization code redeemed (absent before first exchange).
    pub authorization_code: Option<String>,

    /// Current access token.
    pub access_token: Option<String>,

    /// Current refresh token (required input to refresh).
    pub refresh_token: Option<String>,

    /// Instant until which the access token is valid. Absent means the
    /// credential has never completed an exchange.
    pub expires_at: Option<DateTime<Utc>>,

    /// Detail of the most recent failed refresh, cleared on success.
    pub last_refresh_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state, derived from the stored row and a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// No tokens ever issued.
    Unauthorized,
    /// Token present and comfortably ahead of the refresh buffer.
    Authorized,
    /// Token past expiry or inside the refresh buffer: refresh-eligible.
    Expired,
    /// Refresh-eligible and the last refresh attempt failed; the user has
    /// to re-initiate authorization.
    ReauthRequired,
}

impl Credential {
    /// Derives the lifecycle state at `now`.
    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        let Some(expires_at) = self.expires_at else {
            return CredentialState::Unauthorized;
        };
        if expires_at - now > Duration::seconds(REFRESH_BUFFER_SECS) {
            return CredentialState::Authorized;
        }
        if self.last_refresh_error.is_some() {
            CredentialState::ReauthRequired
        } else {
            CredentialState::Expired
        }
    }

    /// True when a refresh should be attempted: the token expires within
    /// the buffer (or already has). Never true before the first exchange.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now <= Duration::seconds(REFRESH_BUFFER_SECS),
            None => false,
        }
    }

    /// True while the stored access token is still valid at `now`.
    ///
    /// This is the overwrite-guard condition: resubmitting credentials for
    /// an app whose token is still valid discards live token material, so
    /// it requires explicit confirmation first.
    pub fn has_valid_token(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at > now)
    }
}
