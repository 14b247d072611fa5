//! Qianchuan/Oceanengine OAuth 2.0 flow.
//!
//! Authorization-code flow against the ad platform:
//! 1. User submits app_id + app_secret (stored, unauthorized)
//! 2. User opens the provider-hosted authorization page
//! 3. Provider redirects back with an auth_code
//! 4. Exchange the code for an access/refresh token pair
//! 5. Refresh the pair before expiry with the refresh-token grant
//!
//! The provider signals success with a literal `"success"` message field
//! rather than HTTP status alone; anything else is a denial.

mod exchange;
mod provider;

pub use exchange::{OAuthClient, TokenSet};
pub use provider::ProviderConfig;
