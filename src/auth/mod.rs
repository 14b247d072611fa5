//! Owner identification for the HTTP layer.
//!
//! Identity is delegated to an external auth provider; by the time a
//! request reaches this service the provider has already authenticated
//! the user and the bearer token carries the opaque owner id. This module
//! only extracts it — issuing and verifying identities happens elsewhere.

use axum::http::HeaderMap;

/// Extract the owner id from the HTTP Authorization header.
///
/// Expected format: "Authorization: Bearer <owner>"
pub fn extract_bearer_owner(headers: &HeaderMap) -> Result<String, OwnerError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(OwnerError::Missing)?
        .to_str()
        .map_err(|_| OwnerError::InvalidFormat)?;

    parse_bearer_owner(auth_header)
}

/// Parse the owner id out of an Authorization header value.
fn parse_bearer_owner(header_value: &str) -> Result<String, OwnerError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(OwnerError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(OwnerError::InvalidFormat);
    }

    let owner = parts[1].trim();
    if owner.is_empty() {
        return Err(OwnerError::Empty);
    }

    Ok(owner.to_string())
}

/// Owner extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum OwnerError {
    /// Authorization header not present
    Missing,
    /// Invalid format (not "Bearer <owner>")
    InvalidFormat,
    /// Owner id is empty string
    Empty,
}

impl std::fmt::Display for OwnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerError::Missing => write!(f, "Authorization token not provided"),
            OwnerError::InvalidFormat => write!(f, "Invalid authorization token format"),
            OwnerError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for OwnerError {}
