//! Credential lifecycle operations.
//!
//! `TokenService` is the seam between the HTTP layer and the core: it owns
//! the store, the OAuth client, and the single-flight gate, and implements
//! the lifecycle rules — the overwrite guard on submission, the
//! exchange/refresh transitions, and the best-effort sweep.
//!
//! Every operation is a `Result`-returning chain (load, call provider,
//! validate sentinel, persist) with a distinct error kind per stage; a
//! failure at any stage leaves the stored row's token material unchanged.

mod flight;
mod sweep;

pub use sweep::run_refresh_sweep;

use crate::credentials::{Credential, CredentialStore, DEFAULT_LOOKAHEAD_SECS};
use crate::error::{Error, Result};
use crate::oauth::OAuthClient;
use chrono::{DateTime, Duration, Utc};
use flight::RefreshGate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a credential submission.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Row created or overwritten; back to the unauthorized state.
    Created(Credential),
    /// The pair already holds a token that is still valid: overwriting
    /// would discard live token material, so the caller must confirm.
    OverwriteConfirmationRequired { expires_at: DateTime<Utc> },
}

/// Result of a single-credential refresh.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Token validity exceeds the buffer; no external call was made.
    StillValid(Credential),
    /// A new token set was obtained and persisted.
    Refreshed(Credential),
}

impl RefreshOutcome {
    pub fn credential(&self) -> &Credential {
        match self {
            RefreshOutcome::StillValid(c) | RefreshOutcome::Refreshed(c) => c,
        }
    }
}

/// Per-item result of a sweep pass.
#[derive(Debug, Serialize)]
pub struct SweepItem {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lifecycle operations over stored credentials.
pub struct TokenService {
    store: Arc<CredentialStore>,
    oauth: Arc<OAuthClient>,
    gate: RefreshGate,
}

impl TokenService {
    pub fn new(store: Arc<CredentialStore>, oauth: Arc<OAuthClient>) -> Self {
        Self {
            store,
            oauth,
            gate: RefreshGate::new(),
        }
    }

    /// Stores user-supplied app credentials, creating the row in the
    /// unauthorized state.
    ///
    /// When the pair already holds a currently-valid token the submission
    /// is NOT applied; the caller gets `OverwriteConfirmationRequired` and
    /// must follow up with [`confirm_overwrite`](Self::confirm_overwrite).
    /// Expired or never-authorized rows are overwritten directly.
    pub fn submit_credential(
        &self,
        owner: &str,
        app_id: &str,
        app_secret: &str,
    ) -> Result<SubmitOutcome> {
        validate_submission(app_id, app_secret)?;

        let existing = self
            .store
            .get_by_pair(owner, app_id)
            .map_err(persistence)?;

        if let Some(existing) = existing {
            if existing.has_valid_token(Utc::now()) {
                info!(
                    owner = %owner,
                    app_id = %app_id,
                    "Submission blocked: existing token still valid, confirmation required"
                );
                return Ok(SubmitOutcome::OverwriteConfirmationRequired {
                    // has_valid_token guarantees presence
                    expires_at: existing.expires_at.unwrap(),
                });
            }
        }

        let credential = self
            .store
            .upsert_submission(owner, app_id, app_secret)
            .map_err(persistence)?;

        info!(owner = %owner, app_id = %app_id, id = %credential.id, "Credential stored");
        Ok(SubmitOutcome::Created(credential))
    }

    /// Overwrites the stored credential unconditionally, discarding any
    /// existing token material. The confirmation step for the guard in
    /// [`submit_credential`](Self::submit_credential).
    pub fn confirm_overwrite(
        &self,
        owner: &str,
        app_id: &str,
        app_secret: &str,
    ) -> Result<Credential> {
        validate_submission(app_id, app_secret)?;

        let credential = self
            .store
            .upsert_submission(owner, app_id, app_secret)
            .map_err(persistence)?;

        info!(owner = %owner, app_id = %app_id, id = %credential.id, "Credential overwritten");
        Ok(credential)
    }

    /// Redeems an authorization code for a token set and persists it.
    ///
    /// Requires a previously submitted credential for `(owner, app_id)` —
    /// the exchange needs its stored secret. On any failure the row is
    /// left unchanged and the failure is surfaced to the caller.
    pub async fn exchange_authorization_code(
        &self,
        owner: &str,
        app_id: &str,
        auth_code: &str,
    ) -> Result<Credential> {
        if auth_code.trim().is_empty() {
            return Err(Error::Validation("auth_code must not be empty".to_string()));
        }

        let credential = self
            .store
            .get_by_pair(owner, app_id)
            .map_err(persistence)?
            .ok_or_else(|| {
                Error::Validation(format!(
                    "no stored credential for app '{}' — submit app_id and app_secret first",
                    app_id
                ))
            })?;

        let tokens = self
            .oauth
            .exchange_code(app_id, &credential.app_secret, auth_code)
            .await?;

        // An exchange must produce a complete token set
        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            Error::ProviderRejected("success response missing refresh_token".to_string())
        })?;

        self.store
            .store_exchange_result(
                &credential.id,
                auth_code,
                &tokens.access_token,
                &refresh_token,
                tokens.expires_at,
            )
            .map_err(persistence)?;

        let updated = self.reload(&credential.id)?;
        info!(
            owner = %owner,
            app_id = %app_id,
            expires_at = %tokens.expires_at,
            "Authorization code exchanged, credential authorized"
        );
        Ok(updated)
    }

    /// Refreshes one credential's token set if it is close enough to
    /// expiry.
    ///
    /// No-ops with `StillValid` while more than the buffer remains. At
    /// most one refresh per credential is in flight at a time; a
    /// concurrent call gets `RefreshInFlight` instead of racing the
    /// provider with the same refresh token.
    pub async fn refresh_one(&self, id: &str) -> Result<RefreshOutcome> {
        let credential = self
            .store
            .get(id)
            .map_err(persistence)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if credential.expires_at.is_none() {
            return Err(Error::Validation(
                "credential has never been authorized".to_string(),
            ));
        }

        if !credential.needs_refresh(Utc::now()) {
            return Ok(RefreshOutcome::StillValid(credential));
        }

        let refresh_token = credential.refresh_token.clone().ok_or_else(|| {
            Error::Validation("credential has no refresh token".to_string())
        })?;

        let _permit = self
            .gate
            .try_acquire(id)
            .ok_or_else(|| Error::RefreshInFlight(id.to_string()))?;

        match self
            .oauth
            .refresh(&credential.app_id, &credential.app_secret, &refresh_token)
            .await
        {
            Ok(tokens) => {
                // Keep the stored refresh token if the provider did not
                // rotate it
                let new_refresh = tokens.refresh_token.unwrap_or(refresh_token);

                self.store
                    .store_refresh_result(
                        &credential.id,
                        &tokens.access_token,
                        &new_refresh,
                        tokens.expires_at,
                    )
                    .map_err(persistence)?;

                let updated = self.reload(&credential.id)?;
                info!(
                    id = %credential.id,
                    app_id = %credential.app_id,
                    expires_at = %tokens.expires_at,
                    "Token refreshed"
                );
                Ok(RefreshOutcome::Refreshed(updated))
            }
            Err(e) => {
                // Token material stays untouched; only the failure note
                // is written
                if let Err(store_err) = self.store.record_refresh_error(id, &e.to_string()) {
                    warn!(id = %id, error = %store_err, "Failed to record refresh error");
                }
                warn!(id = %id, app_id = %credential.app_id, error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }

    /// One best-effort batch pass: refreshes every credential expiring
    /// within `lookahead`, independently.
    ///
    /// Item failures are captured per item and never abort the batch; the
    /// only handler-level failure is being unable to list the candidates.
    pub async fn refresh_due(&self, lookahead: Duration) -> Result<Vec<SweepItem>> {
        let deadline = Utc::now() + lookahead;
        let candidates = self
            .store
            .list_expiring_before(deadline)
            .map_err(persistence)?;

        info!(
            candidates = candidates.len(),
            lookahead_secs = lookahead.num_seconds(),
            "Refresh sweep started"
        );

        let mut report = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let item = match self.refresh_one(&candidate.id).await {
                Ok(_) => SweepItem {
                    id: candidate.id,
                    success: true,
                    error: None,
                },
                Err(e) => SweepItem {
                    id: candidate.id,
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            report.push(item);
        }

        Ok(report)
    }

    /// Default sweep horizon (24 hours).
    pub fn default_lookahead() -> Duration {
        Duration::seconds(DEFAULT_LOOKAHEAD_SECS)
    }

    /// Lists a user's credentials, most recent first.
    pub fn list_credentials(&self, owner: &str) -> Result<Vec<Credential>> {
        self.store.list_by_owner(owner).map_err(persistence)
    }

    /// Fetches one credential by id.
    pub fn get_credential(&self, id: &str) -> Result<Credential> {
        self.reload(id)
    }

    /// Deletes a credential. The only path that removes a row — failed
    /// refreshes never auto-delete.
    pub fn delete_credential(&self, id: &str) -> Result<()> {
        let deleted = self.store.delete(id).map_err(persistence)?;
        if !deleted {
            return Err(Error::NotFound(id.to_string()));
        }
        info!(id = %id, "Credential deleted");
        Ok(())
    }

    /// Builds the provider authorization page URL for a stored credential.
    ///
    /// The credential id rides along as the `state` parameter so the
    /// callback can be correlated with the row it authorizes.
    pub fn authorize_url(&self, owner: &str, app_id: &str) -> Result<String> {
        let credential = self
            .store
            .get_by_pair(owner, app_id)
            .map_err(persistence)?
            .ok_or_else(|| {
                Error::Validation(format!(
                    "no stored credential for app '{}' — submit app_id and app_secret first",
                    app_id
                ))
            })?;

        Ok(self.oauth.provider().authorize_url(app_id, &credential.id))
    }

    fn reload(&self, id: &str) -> Result<Credential> {
        self.store
            .get(id)
            .map_err(persistence)?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

fn validate_submission(app_id: &str, app_secret: &str) -> Result<()> {
    if app_id.trim().is_empty() {
        return Err(Error::Validation("app_id must not be empty".to_string()));
    }
    if app_secret.trim().is_empty() {
        return Err(Error::Validation("app_secret must not be empty".to_string()));
    }
    Ok(())
}

fn persistence(e: anyhow::Error) -> Error {
    Error::Persistence(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialState;
    use crate::oauth::ProviderConfig;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::time::Duration as StdDuration;

    fn make_store() -> Arc<CredentialStore> {
        let key = BASE64.encode([0u8; 32]);
        Arc::new(CredentialStore::new(":memory:", &key).expect("Failed to create test store"))
    }

    fn make_service(server_url: &str) -> TokenService {
        let config = ProviderConfig {
            api_base_url: server_url.to_string(),
            authorize_base_url: server_url.to_string(),
        };
        let oauth = Arc::new(OAuthClient::new(config, StdDuration::from_secs(5)).unwrap());
        TokenService::new(make_store(), oauth)
    }

    /// Seeds an authorized credential expiring `expires_in_secs` from now.
    fn seed_authorized(service: &TokenService, app_id: &str, expires_in_secs: i64) -> Credential {
        let created = match service
            .submit_credential("user-1", app_id, "secret")
            .unwrap()
        {
            SubmitOutcome::Created(c) => c,
            other => panic!("expected Created, got {:?}", other),
        };
        service
            .store
            .store_exchange_result(
                &created.id,
                "seed-code",
                "seed-access",
                "seed-refresh",
                Utc::now() + Duration::seconds(expires_in_secs),
            )
            .unwrap();
        service.store.get(&created.id).unwrap().unwrap()
    }

    const SUCCESS_BODY: &str =
        r#"{"message":"success","data":{"access_token":"A2","refresh_token":"R2","expires_in":86400}}"#;

    // --- submit / overwrite guard ---

    #[test]
    fn test_submit_creates_unauthorized_row() {
        let service = make_service("http://127.0.0.1:1");

        let outcome = service
            .submit_credential("user-1", "app-1", "secret")
            .unwrap();
        let credential = match outcome {
            SubmitOutcome::Created(c) => c,
            other => panic!("expected Created, got {:?}", other),
        };

        assert_eq!(credential.state(Utc::now()), CredentialState::Unauthorized);
        assert!(credential.access_token.is_none());
    }

    #[test]
    fn test_submit_rejects_empty_fields() {
        let service = make_service("http://127.0.0.1:1");

        assert!(matches!(
            service.submit_credential("user-1", "", "secret"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.submit_credential("user-1", "app-1", "  "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_submit_over_valid_token_requires_confirmation() {
        let service = make_service("http://127.0.0.1:1");
        let seeded = seed_authorized(&service, "app-1", 2 * 60 * 60);

        let outcome = service
            .submit_credential("user-1", "app-1", "new-secret")
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::OverwriteConfirmationRequired { .. }
        ));

        // The row is untouched until confirmation
        let row = service.store.get(&seeded.id).unwrap().unwrap();
        assert_eq!(row.app_secret, "secret");
        assert_eq!(row.access_token.as_deref(), Some("seed-access"));
    }

    #[test]
    fn test_submit_over_expired_token_proceeds() {
        let service = make_service("http://127.0.0.1:1");
        seed_authorized(&service, "app-1", -60);

        let outcome = service
            .submit_credential("user-1", "app-1", "new-secret")
            .unwrap();
        let credential = match outcome {
            SubmitOutcome::Created(c) => c,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(credential.app_secret, "new-secret");
        assert!(credential.expires_at.is_none());
    }

    #[test]
    fn test_confirm_overwrite_replaces_row_not_duplicates() {
        let service = make_service("http://127.0.0.1:1");
        let seeded = seed_authorized(&service, "app-1", 2 * 60 * 60);

        let overwritten = service
            .confirm_overwrite("user-1", "app-1", "new-secret")
            .unwrap();

        assert_eq!(overwritten.id, seeded.id);
        assert_eq!(overwritten.app_secret, "new-secret");
        assert!(overwritten.access_token.is_none());
        assert_eq!(service.list_credentials("user-1").unwrap().len(), 1);
    }

    // --- exchange ---

    #[tokio::test]
    async fn test_exchange_requires_stored_credential() {
        let service = make_service("http://127.0.0.1:1");

        let err = service
            .exchange_authorization_code("user-1", "app-1", "code")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_exchange_success_authorizes_credential() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/access_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"message":"success","data":{"access_token":"A","refresh_token":"R","expires_in":7200}}"#,
            )
            .create_async()
            .await;

        let service = make_service(&server.url());
        service
            .submit_credential("user-1", "app-1", "secret")
            .unwrap();

        let before = Utc::now();
        let credential = service
            .exchange_authorization_code("user-1", "app-1", "the-code")
            .await
            .unwrap();

        assert_eq!(credential.access_token.as_deref(), Some("A"));
        assert_eq!(credential.refresh_token.as_deref(), Some("R"));
        assert_eq!(credential.authorization_code.as_deref(), Some("the-code"));
        let lifetime = credential.expires_at.unwrap() - before;
        assert!(lifetime.num_seconds() >= 7198 && lifetime.num_seconds() <= 7201);
        assert_eq!(credential.state(Utc::now()), CredentialState::Authorized);
    }

    #[tokio::test]
    async fn test_exchange_denial_leaves_row_unchanged() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/access_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"invalid_grant"}"#)
            .create_async()
            .await;

        let service = make_service(&server.url());
        service
            .submit_credential("user-1", "app-1", "secret")
            .unwrap();

        let err = service
            .exchange_authorization_code("user-1", "app-1", "bad-code")
            .await
            .unwrap_err();
        match err {
            Error::ProviderDenied(detail) => assert_eq!(detail, "invalid_grant"),
            other => panic!("expected ProviderDenied, got {:?}", other),
        }

        let row = service
            .store
            .get_by_pair("user-1", "app-1")
            .unwrap()
            .unwrap();
        assert!(row.access_token.is_none());
        assert!(row.refresh_token.is_none());
        assert!(row.expires_at.is_none());
        assert!(row.authorization_code.is_none());
    }

    // --- refresh_one ---

    #[tokio::test]
    async fn test_refresh_still_valid_makes_no_external_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/refresh_token/")
            .expect(0)
            .create_async()
            .await;

        let service = make_service(&server.url());
        let seeded = seed_authorized(&service, "app-1", 2 * 60 * 60);

        let outcome = service.refresh_one(&seeded.id).await.unwrap();
        let credential = match outcome {
            RefreshOutcome::StillValid(c) => c,
            other => panic!("expected StillValid, got {:?}", other),
        };
        assert_eq!(credential.access_token.as_deref(), Some("seed-access"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_inside_buffer_updates_tokens() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/refresh_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SUCCESS_BODY)
            .create_async()
            .await;

        let service = make_service(&server.url());
        let seeded = seed_authorized(&service, "app-1", 5 * 60);

        let outcome = service.refresh_one(&seeded.id).await.unwrap();
        let credential = match outcome {
            RefreshOutcome::Refreshed(c) => c,
            other => panic!("expected Refreshed, got {:?}", other),
        };

        assert_eq!(credential.access_token.as_deref(), Some("A2"));
        assert_eq!(credential.refresh_token.as_deref(), Some("R2"));
        assert_eq!(credential.state(Utc::now()), CredentialState::Authorized);
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_not_rotated() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/refresh_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"success","data":{"access_token":"A2","expires_in":86400}}"#)
            .create_async()
            .await;

        let service = make_service(&server.url());
        let seeded = seed_authorized(&service, "app-1", -60);

        let outcome = service.refresh_one(&seeded.id).await.unwrap();
        assert_eq!(
            outcome.credential().refresh_token.as_deref(),
            Some("seed-refresh")
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_preserves_tokens_and_records_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/refresh_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"refresh_token expired"}"#)
            .create_async()
            .await;

        let service = make_service(&server.url());
        let seeded = seed_authorized(&service, "app-1", -60);

        let err = service.refresh_one(&seeded.id).await.unwrap_err();
        assert!(matches!(err, Error::ProviderDenied(_)));

        let row = service.store.get(&seeded.id).unwrap().unwrap();
        assert_eq!(row.access_token.as_deref(), Some("seed-access"));
        assert_eq!(row.refresh_token.as_deref(), Some("seed-refresh"));
        assert!(row.last_refresh_error.is_some());
        assert_eq!(row.state(Utc::now()), CredentialState::ReauthRequired);
    }

    #[tokio::test]
    async fn test_refresh_unknown_id_is_not_found() {
        let service = make_service("http://127.0.0.1:1");
        let err = service.refresh_one("no-such-id").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_refresh_never_authorized_is_validation_error() {
        let service = make_service("http://127.0.0.1:1");
        let created = match service
            .submit_credential("user-1", "app-1", "secret")
            .unwrap()
        {
            SubmitOutcome::Created(c) => c,
            other => panic!("expected Created, got {:?}", other),
        };

        let err = service.refresh_one(&created.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_refresh_blocked_while_another_is_in_flight() {
        let service = make_service("http://127.0.0.1:1");
        let seeded = seed_authorized(&service, "app-1", -60);

        let _permit = service.gate.try_acquire(&seeded.id).unwrap();

        let err = service.refresh_one(&seeded.id).await.unwrap_err();
        assert!(matches!(err, Error::RefreshInFlight(_)));
    }

    // --- refresh_due ---

    #[tokio::test]
    async fn test_sweep_partial_failure_processes_all_items() {
        let mut server = mockito::Server::new_async().await;
        // First and third candidates succeed, second is denied. Candidates
        // are processed in expires_at order.
        server
            .mock("POST", "/oauth2/refresh_token/")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"refresh_token":"seed-refresh"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SUCCESS_BODY)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("POST", "/oauth2/refresh_token/")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"refresh_token":"bad-refresh"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"refresh_token expired"}"#)
            .create_async()
            .await;

        let service = make_service(&server.url());
        let a = seed_authorized(&service, "app-a", 60);
        let bad = seed_authorized(&service, "app-bad", 120);
        let c = seed_authorized(&service, "app-c", 180);
        service
            .store
            .store_exchange_result(&bad.id, "c", "seed-access", "bad-refresh", Utc::now() + Duration::seconds(120))
            .unwrap();

        let report = service.refresh_due(Duration::hours(24)).await.unwrap();
        assert_eq!(report.len(), 3);

        let by_id = |id: &str| report.iter().find(|i| i.id == id).unwrap();
        assert!(by_id(&a.id).success);
        assert!(by_id(&c.id).success);
        let failed = by_id(&bad.id);
        assert!(!failed.success);
        assert!(failed.error.as_deref().unwrap().contains("refresh_token expired"));

        // The two successes were persisted despite the failure in between
        assert_eq!(
            service.store.get(&a.id).unwrap().unwrap().access_token.as_deref(),
            Some("A2")
        );
        assert_eq!(
            service.store.get(&c.id).unwrap().unwrap().access_token.as_deref(),
            Some("A2")
        );
        // The failed row kept its token material
        assert_eq!(
            service.store.get(&bad.id).unwrap().unwrap().access_token.as_deref(),
            Some("seed-access")
        );
    }

    #[tokio::test]
    async fn test_sweep_with_no_candidates_is_empty() {
        let service = make_service("http://127.0.0.1:1");
        service
            .submit_credential("user-1", "app-1", "secret")
            .unwrap();

        let report = service.refresh_due(Duration::hours(24)).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_reports_still_valid_items_as_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/refresh_token/")
            .expect(0)
            .create_async()
            .await;

        let service = make_service(&server.url());
        // Expires in 12h: inside the 24h lookahead, outside the 10min buffer
        let seeded = seed_authorized(&service, "app-1", 12 * 60 * 60);

        let report = service.refresh_due(Duration::hours(24)).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].id, seeded.id);
        assert!(report[0].success);

        mock.assert_async().await;
    }

    // --- list / delete / authorize_url ---

    #[test]
    fn test_delete_unknown_is_not_found() {
        let service = make_service("http://127.0.0.1:1");
        assert!(matches!(
            service.delete_credential("no-such-id"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_row() {
        let service = make_service("http://127.0.0.1:1");
        let seeded = seed_authorized(&service, "app-1", -60);

        service.delete_credential(&seeded.id).unwrap();
        assert!(service.list_credentials("user-1").unwrap().is_empty());
    }

    #[test]
    fn test_authorize_url_requires_stored_credential() {
        let service = make_service("http://127.0.0.1:1");
        assert!(matches!(
            service.authorize_url("user-1", "app-1"),
            Err(Error::Validation(_))
        ));

        let created = match service
            .submit_credential("user-1", "app-1", "secret")
            .unwrap()
        {
            SubmitOutcome::Created(c) => c,
            other => panic!("expected Created, got {:?}", other),
        };

        let url = service.authorize_url("user-1", "app-1").unwrap();
        assert!(url.contains("app_id=app-1"));
        assert!(url.contains(&format!("state={}", created.id)));
    }
}
