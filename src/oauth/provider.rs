//! Provider endpoint configuration.
//!
//! Qianchuan splits its surface across two hosts: the Oceanengine open
//! API serves the token grants, and jinritemai.com hosts the interactive
//! authorization page. Both bases are configurable so tests can point at
//! a mock server.

use serde::{Deserialize, Serialize};

/// Oceanengine open API base (token grants).
const DEFAULT_API_BASE: &str = "https://ad.oceanengine.com/open_api";

/// Qianchuan host for the interactive authorization page.
const DEFAULT_AUTHORIZE_BASE: &str = "https://qianchuan.jinritemai.com";

/// OAuth provider endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for token grant endpoints.
    pub api_base_url: String,

    /// Base URL for the provider-hosted authorization page.
    pub authorize_base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            authorize_base_url: DEFAULT_AUTHORIZE_BASE.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Token endpoint for the authorization-code grant.
    pub fn access_token_url(&self) -> String {
        format!("{}/oauth2/access_token/", self.api_base_url)
    }

    /// Token endpoint for the refresh-token grant.
    pub fn refresh_token_url(&self) -> String {
        format!("{}/oauth2/refresh_token/", self.api_base_url)
    }

    /// Builds the provider-hosted authorization page URL.
    ///
    /// `material_auth=1` is the fixed scope parameter the platform expects.
    /// The redirect target is configured per app in the provider console,
    /// not passed in the URL.
    pub fn authorize_url(&self, app_id: &str, state: &str) -> String {
        format!(
            "{}/openapi/qc/audit/oauth.html?app_id={}&state={}&material_auth=1",
            self.authorize_base_url,
            urlencoding::encode(app_id),
            urlencoding::encode(state)
        )
    }
}
