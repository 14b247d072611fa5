//! Periodic refresh sweep.
//!
//! One best-effort batch pass per tick: list the credentials expiring
//! within the lookahead window and run the single-item refresh on each.
//! No retries, no backoff, no persistent schedule — a failed item simply
//! shows up again on the next tick.

use super::TokenService;
use std::sync::Arc;
use tracing::{info, warn};

/// Background task running [`TokenService::refresh_due`] on an interval.
///
/// The first tick fires immediately so a restart picks up overdue
/// credentials without waiting a full interval.
pub async fn run_refresh_sweep(service: Arc<TokenService>, interval_secs: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match service.refresh_due(TokenService::default_lookahead()).await {
            Ok(report) => {
                let failed = report.iter().filter(|item| !item.success).count();
                info!(
                    total = report.len(),
                    failed = failed,
                    "Refresh sweep complete"
                );
                for item in report.iter().filter(|item| !item.success) {
                    warn!(
                        id = %item.id,
                        error = %item.error.as_deref().unwrap_or("unknown"),
                        "Sweep item failed"
                    );
                }
            }
            Err(e) => {
                // Listing candidates failed; nothing was attempted
                warn!(error = %e, "Refresh sweep failed to list candidates");
            }
        }
    }
}
