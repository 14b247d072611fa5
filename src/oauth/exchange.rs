//! Token grant calls against the Qianchuan open API.
//!
//! Both grants share one JSON envelope and one response contract:
//!
//! ```text
//! POST <base>/oauth2/access_token/   {app_id, secret, grant_type:"authorization_code", auth_code}
//! POST <base>/oauth2/refresh_token/  {app_id, secret, grant_type:"refresh_token", refresh_token}
//!   -> {message, data: {access_token, refresh_token, expires_in}}
//! ```
//!
//! `message == "success"` is the only success sentinel. Failures are
//! mapped to distinct kinds: could-not-reach (network/timeout), rejected
//! (non-2xx or a body that is not JSON), and denied (well-formed JSON
//! without the sentinel, carrying the provider's message text).

use crate::error::{Error, Result};
use crate::oauth::ProviderConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Grant request envelope. The two grants differ only in which
/// grant-specific field is present.
#[derive(Serialize)]
struct GrantRequest<'a> {
    app_id: &'a str,
    secret: &'a str,
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Grant response. Every field is optional so that parsing never fails on
/// a denial payload; validation happens after the sentinel check.
#[derive(Deserialize, Debug)]
struct GrantResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<GrantData>,
}

#[derive(Deserialize, Debug)]
struct GrantData {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token set produced by a successful grant.
#[derive(Clone, Debug)]
pub struct TokenSet {
    pub access_token: String,
    /// Absent when the provider did not rotate the refresh token; the
    /// caller keeps the stored one.
    pub refresh_token: Option<String>,
    /// `now + expires_in` computed when the response was received.
    pub expires_at: DateTime<Utc>,
}

/// HTTP client for the Qianchuan token endpoints.
pub struct OAuthClient {
    http_client: reqwest::Client,
    config: ProviderConfig,
}

impl OAuthClient {
    /// Creates a client with a bounded request timeout.
    ///
    /// A timed-out call is reported as `ProviderUnreachable` and never
    /// mutates stored state; the caller may retry later.
    pub fn new(config: ProviderConfig, timeout: std::time::Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent("qctoken/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// The endpoint configuration this client was built with.
    pub fn provider(&self) -> &ProviderConfig {
        &self.config
    }

    /// Exchanges an authorization code for a token set
    /// (grant_type `authorization_code`).
    pub async fn exchange_code(
        &self,
        app_id: &str,
        app_secret: &str,
        auth_code: &str,
    ) -> Result<TokenSet> {
        tracing::debug!(app_id = %app_id, "Exchanging authorization code for token");

        let request = GrantRequest {
            app_id,
            secret: app_secret,
            grant_type: "authorization_code",
            auth_code: Some(auth_code),
            refresh_token: None,
        };

        self.grant(&self.config.access_token_url(), &request).await
    }

    /// Trades a refresh token for a new token set
    /// (grant_type `refresh_token`).
    pub async fn refresh(
        &self,
        app_id: &str,
        app_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenSet> {
        tracing::debug!(
            app_id = %app_id,
            refresh_token_prefix = %truncate(refresh_token, 10),
            "Refreshing token"
        );

        let request = GrantRequest {
            app_id,
            secret: app_secret,
            grant_type: "refresh_token",
            auth_code: None,
            refresh_token: Some(refresh_token),
        };

        self.grant(&self.config.refresh_token_url(), &request).await
    }

    /// Performs one grant call: send, status check, parse, sentinel check.
    async fn grant(&self, url: &str, request: &GrantRequest<'_>) -> Result<TokenSet> {
        let response = self
            .http_client
            .post(url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::ProviderUnreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::ProviderUnreachable(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(Error::ProviderRejected(format!(
                "status {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let parsed: GrantResponse = serde_json::from_str(&body).map_err(|e| {
            Error::ProviderRejected(format!("invalid response format: {}", e))
        })?;

        match parsed.message.as_deref() {
            Some("success") => {}
            Some(other) => return Err(Error::ProviderDenied(other.to_string())),
            None => {
                return Err(Error::ProviderDenied(
                    "response missing message field".to_string(),
                ))
            }
        }

        let data = parsed.data.ok_or_else(|| {
            Error::ProviderRejected("success response missing token data".to_string())
        })?;

        let access_token = data.access_token.ok_or_else(|| {
            Error::ProviderRejected("success response missing access_token".to_string())
        })?;
        let expires_in = data.expires_in.ok_or_else(|| {
            Error::ProviderRejected("success response missing expires_in".to_string())
        })?;

        Ok(TokenSet {
            access_token,
            refresh_token: data.refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

/// Truncates to at most `max` bytes without splitting a UTF-8 character
/// (provider messages are often Chinese text).
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn client_for(server_url: &str) -> OAuthClient {
        let config = ProviderConfig {
            api_base_url: server_url.to_string(),
            authorize_base_url: server_url.to_string(),
        };
        OAuthClient::new(config, StdDuration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_exchange_envelope_serialization() {
        let request = GrantRequest {
            app_id: "100",
            secret: "s",
            grant_type: "authorization_code",
            auth_code: Some("abc"),
            refresh_token: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["grant_type"], "authorization_code");
        assert_eq!(json["auth_code"], "abc");
        assert!(json.get("refresh_token").is_none());
    }

    #[test]
    fn test_refresh_envelope_serialization() {
        let request = GrantRequest {
            app_id: "100",
            secret: "s",
            grant_type: "refresh_token",
            auth_code: None,
            refresh_token: Some("rt"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["grant_type"], "refresh_token");
        assert_eq!(json["refresh_token"], "rt");
        assert!(json.get("auth_code").is_none());
    }

    #[test]
    fn test_denial_payload_still_parses() {
        // A denial has no data block; parsing must not be the failure
        let parsed: GrantResponse = serde_json::from_str(r#"{"message":"invalid_grant"}"#).unwrap();
        assert_eq!(parsed.message.as_deref(), Some("invalid_grant"));
        assert!(parsed.data.is_none());
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/access_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"message":"success","data":{"access_token":"A","refresh_token":"R","expires_in":7200}}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server.url());
        let before = Utc::now();
        let tokens = client.exchange_code("100", "s", "code").await.unwrap();

        assert_eq!(tokens.access_token, "A");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R"));
        let lifetime = tokens.expires_at - before;
        assert!(lifetime.num_seconds() >= 7199 && lifetime.num_seconds() <= 7201);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_denial_maps_to_provider_denied() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/access_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.exchange_code("100", "s", "code").await.unwrap_err();

        match err {
            Error::ProviderDenied(detail) => assert_eq!(detail, "invalid_grant"),
            other => panic!("expected ProviderDenied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_2xx_maps_to_provider_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/refresh_token/")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.refresh("100", "s", "rt").await.unwrap_err();

        match err {
            Error::ProviderRejected(detail) => assert!(detail.contains("500")),
            other => panic!("expected ProviderRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_provider_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/refresh_token/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>gateway error</html>")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.refresh("100", "s", "rt").await.unwrap_err();

        match err {
            Error::ProviderRejected(detail) => {
                assert!(detail.contains("invalid response format"))
            }
            other => panic!("expected ProviderRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_without_data_maps_to_provider_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/access_token/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"success"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.exchange_code("100", "s", "code").await.unwrap_err();

        match err {
            Error::ProviderRejected(detail) => assert!(detail.contains("missing token data")),
            other => panic!("expected ProviderRejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        // Nothing listens on this port
        let client = client_for("http://127.0.0.1:1");
        let err = client.exchange_code("100", "s", "code").await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnreachable(_)));
    }
}
