//! Spec §7 error taxonomy as a typed `thiserror` enum consumed by the core.
//!
//! `main.rs` and store plumbing keep using `anyhow` at their boundaries; the
//! core business logic returns this typed `Error` so the HTTP surface can map
//! each variant to a status code.

use thiserror::Error;

/// Convenience alias for core operations returning the typed taxonomy.
pub type Result<T> = std::result::Result<T, Error>;

/// The core error taxonomy (spec §7).
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied input failed validation.
    #[error("validation: {0}")]
    Validation(String),

    /// The referenced credential does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider could not be reached (request error / timeout).
    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),

    /// The provider returned an unusable response (non-2xx, non-JSON, or a
    /// success envelope missing token data).
    #[error("provider rejected: {0}")]
    ProviderRejected(String),

    /// The provider responded but denied the grant (no success sentinel).
    #[error("provider denied: {0}")]
    ProviderDenied(String),

    /// A persistence-layer operation failed.
    #[error("persistence: {0}")]
    Persistence(String),

    /// A refresh is already in flight for this credential (single-flight).
    #[error("refresh in flight: {0}")]
    RefreshInFlight(String),
}

impl Error {
    /// Stable machine-readable discriminant used in API error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::ProviderUnreachable(_) => "provider_unreachable",
            Error::ProviderRejected(_) => "provider_rejected",
            Error::ProviderDenied(_) => "provider_denied",
            Error::Persistence(_) => "persistence",
            Error::RefreshInFlight(_) => "refresh_in_flight",
        }
    }
}
