use crate::error::AppError;
use crate::storage::CredentialStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Periodically deletes credentials whose expiry has passed. Expired
/// credentials are already rejected at validation time; this keeps the
/// store from growing without bound.
#[derive(Debug)]
pub struct CredentialCleanupWorker {
    credentials: Arc<dyn CredentialStore>,
    sweep_interval_secs: u64,
}

impl CredentialCleanupWorker {
    #[must_use]
    pub const fn new(credentials: Arc<dyn CredentialStore>, sweep_interval_secs: u64) -> Self {
        Self { credentials, sweep_interval_secs }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if self.sweep_interval_secs == 0 {
            tracing::info!("Credential cleanup is disabled (interval = 0)");
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.sweep_interval_secs));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("run_credential_cleanup"))
                        .await
                    {
                        tracing::error!(error = ?e, "Credential cleanup iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Credential cleanup loop shutting down...");
    }

    /// Sweeps expired credentials once.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    #[tracing::instrument(skip(self), err, fields(expired_deleted = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<(), AppError> {
        tracing::debug!("Running credential cleanup...");

        let count = self.credentials.delete_expired().await?;
        if count > 0 {
            tracing::info!(count = %count, "Deleted expired credentials");
            tracing::Span::current().record("expired_deleted", count);
        }

        Ok(())
    }
}
