//! HTTP API for credential lifecycle operations.
//!
//! Thin axum surface over [`TokenService`]: handlers extract the owner
//! from the bearer token, call one service operation, and map the error
//! taxonomy onto HTTP statuses. List and detail responses never expose
//! the app secret or token material.

use crate::auth::extract_bearer_owner;
use crate::credentials::{Credential, CredentialState};
use crate::error::Error;
use crate::service::{RefreshOutcome, SubmitOutcome, SweepItem, TokenService};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

/// Owner used when authentication is disabled (single-user deployments).
const DEFAULT_OWNER: &str = "default";

/// Shared application state for the credential API.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<TokenService>,
    pub auth_enabled: bool,
}

/// Error response body: kind tag + human-readable detail.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    detail: String,
}

/// API error: the core taxonomy plus the HTTP-only unauthorized case.
enum ApiError {
    Core(Error),
    Unauthorized(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, "unauthorized", detail),
            ApiError::Core(e) => {
                let status = match &e {
                    Error::Validation(_) => StatusCode::BAD_REQUEST,
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    Error::RefreshInFlight(_) => StatusCode::CONFLICT,
                    Error::ProviderUnreachable(_)
                    | Error::ProviderRejected(_)
                    | Error::ProviderDenied(_) => StatusCode::BAD_GATEWAY,
                    Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind(), e.to_string())
            }
        };

        (status, Json(ErrorResponse { error, detail })).into_response()
    }
}

/// Credential view returned to clients. No secret, no token material.
#[derive(Serialize)]
pub struct CredentialInfo {
    pub id: String,
    pub app_id: String,
    pub state: CredentialState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CredentialInfo {
    fn from_credential(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            app_id: credential.app_id.clone(),
            state: credential.state(Utc::now()),
            expires_at: credential.expires_at,
            last_refresh_error: credential.last_refresh_error.clone(),
            created_at: credential.created_at,
        }
    }
}

/// Request body for POST /api/credentials and /api/credentials/confirm.
#[derive(Deserialize)]
pub struct SubmitRequest {
    pub app_id: String,
    pub app_secret: String,
}

/// Request body for POST /api/credentials/exchange.
#[derive(Deserialize)]
pub struct ExchangeRequest {
    pub app_id: String,
    pub auth_code: String,
}

/// Optional body for POST /api/credentials/refresh-due.
#[derive(Deserialize, Default)]
pub struct RefreshDueRequest {
    /// Sweep horizon override; defaults to 24 hours.
    pub lookahead_secs: Option<i64>,
}

/// Query for GET /api/credentials/authorize-url.
#[derive(Deserialize)]
pub struct AuthorizeUrlQuery {
    pub app_id: String,
}

/// Response for a submission.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResponse {
    Created { credential: CredentialInfo },
    OverwriteConfirmationRequired { expires_at: DateTime<Utc> },
}

/// Response for a single-credential refresh.
#[derive(Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub credential: CredentialInfo,
}

#[derive(Serialize)]
pub struct AuthorizeUrlResponse {
    pub url: String,
}

/// Create the credential API router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/credentials", post(submit_credential))
        .route("/api/credentials", get(list_credentials))
        .route("/api/credentials/confirm", post(confirm_overwrite))
        .route("/api/credentials/exchange", post(exchange_code))
        .route("/api/credentials/authorize-url", get(authorize_url))
        .route("/api/credentials/refresh-due", post(refresh_due))
        .route("/api/credentials/:id/refresh", post(refresh_one))
        .route("/api/credentials/:id", delete(delete_credential))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Resolves the requesting owner from the bearer token.
fn owner_from(state: &ApiState, headers: &HeaderMap) -> Result<String, ApiError> {
    if !state.auth_enabled {
        return Ok(DEFAULT_OWNER.to_string());
    }
    extract_bearer_owner(headers).map_err(|e| ApiError::Unauthorized(e.to_string()))
}

/// Fetches a credential and hides other owners' rows behind NotFound.
fn owned_credential(
    state: &ApiState,
    owner: &str,
    id: &str,
) -> Result<Credential, ApiError> {
    let credential = state.service.get_credential(id)?;
    if credential.owner != owner {
        return Err(ApiError::Core(Error::NotFound(id.to_string())));
    }
    Ok(credential)
}

/// POST /api/credentials
///
/// Stores app credentials. Returns 201 on creation, or 200 with
/// `overwrite_confirmation_required` when the pair still holds a valid
/// token and the caller must confirm the destructive overwrite.
async fn submit_credential(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let owner = owner_from(&state, &headers)?;
    debug!(owner = %owner, app_id = %req.app_id, "Credential submission");

    match state
        .service
        .submit_credential(&owner, &req.app_id, &req.app_secret)?
    {
        SubmitOutcome::Created(credential) => Ok((
            StatusCode::CREATED,
            Json(SubmitResponse::Created {
                credential: CredentialInfo::from_credential(&credential),
            }),
        )),
        SubmitOutcome::OverwriteConfirmationRequired { expires_at } => Ok((
            StatusCode::OK,
            Json(SubmitResponse::OverwriteConfirmationRequired { expires_at }),
        )),
    }
}

/// POST /api/credentials/confirm
///
/// Confirmed overwrite: applies the submission unconditionally.
async fn confirm_overwrite(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<CredentialInfo>), ApiError> {
    let owner = owner_from(&state, &headers)?;

    let credential = state
        .service
        .confirm_overwrite(&owner, &req.app_id, &req.app_secret)?;
    Ok((
        StatusCode::CREATED,
        Json(CredentialInfo::from_credential(&credential)),
    ))
}

/// GET /api/credentials
async fn list_credentials(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<CredentialInfo>>, ApiError> {
    let owner = owner_from(&state, &headers)?;

    let credentials = state.service.list_credentials(&owner)?;
    Ok(Json(
        credentials.iter().map(CredentialInfo::from_credential).collect(),
    ))
}

/// DELETE /api/credentials/:id
async fn delete_credential(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from(&state, &headers)?;
    owned_credential(&state, &owner, &id)?;

    state.service.delete_credential(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/credentials/exchange
///
/// Redeems the authorization code delivered by the provider redirect.
async fn exchange_code(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<CredentialInfo>, ApiError> {
    let owner = owner_from(&state, &headers)?;

    let credential = state
        .service
        .exchange_authorization_code(&owner, &req.app_id, &req.auth_code)
        .await?;
    Ok(Json(CredentialInfo::from_credential(&credential)))
}

/// POST /api/credentials/:id/refresh
async fn refresh_one(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let owner = owner_from(&state, &headers)?;
    owned_credential(&state, &owner, &id)?;

    let outcome = state.service.refresh_one(&id).await?;
    let (message, credential) = match &outcome {
        RefreshOutcome::StillValid(c) => ("still_valid", c),
        RefreshOutcome::Refreshed(c) => ("refreshed", c),
    };
    Ok(Json(RefreshResponse {
        message,
        credential: CredentialInfo::from_credential(credential),
    }))
}

/// POST /api/credentials/refresh-due
///
/// One sweep pass over every credential expiring within the lookahead,
/// across all owners. Item failures are reported per item; the call
/// itself fails only when the candidates cannot be listed.
async fn refresh_due(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshDueRequest>>,
) -> Result<Json<Vec<SweepItem>>, ApiError> {
    owner_from(&state, &headers)?;

    let lookahead = body
        .and_then(|Json(req)| req.lookahead_secs)
        .map(Duration::seconds)
        .unwrap_or_else(TokenService::default_lookahead);

    let report = state.service.refresh_due(lookahead).await?;
    Ok(Json(report))
}

/// GET /api/credentials/authorize-url?app_id=...
async fn authorize_url(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeUrlQuery>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let owner = owner_from(&state, &headers)?;

    let url = state.service.authorize_url(&owner, &query.app_id)?;
    Ok(Json(AuthorizeUrlResponse { url }))
}
