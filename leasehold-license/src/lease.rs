//! Floating and subscription lease renewal.
//!
//! The transport to the lease servers is supplied by the host application
//! through [`FloatingLeaseProvider`] and [`SubscriptionLeaseProvider`].
//! Whatever a provider returns is treated as untrusted text and verified like
//! any other license before it is used.

use crate::document::{LicenseDocument, extract_fields};
use crate::error::{LicenseError, LicenseResult};
use crate::host::HostIdentity;
use crate::signature::{PublicKey, is_well_formed, verify_document};
use async_trait::async_trait;
use roxmltree::Document;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Errors reported by lease providers.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The request could not reach the lease server.
    #[error("lease transport error: {0}")]
    Transport(String),

    /// The lease server refused the request.
    #[error("lease rejected: {0}")]
    Rejected(String),

    /// The lease request did not complete in time.
    #[error("lease request timed out")]
    Timeout,
}

/// Obtains floating licenses from a license server.
#[async_trait]
pub trait FloatingLeaseProvider: Send + Sync {
    /// Leases a license for this machine/user; returns the signed license text.
    async fn lease_floating_license(
        &self,
        machine_name: &str,
        user_name: &str,
        client_id: Uuid,
    ) -> Result<String, LeaseError>;
}

/// Re-leases subscription licenses.
#[async_trait]
pub trait SubscriptionLeaseProvider: Send + Sync {
    /// Exchanges the current signed license for a renewed one.
    async fn lease_subscription(&self, original_license: &str) -> Result<String, LeaseError>;
}

/// Result of asking for a subscription renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Renewal {
    /// No subscription provider is configured.
    NoProvider,
    /// The provider returned well-formed content.
    Renewed(String),
    /// The provider failed or returned unusable content (logged).
    NotRenewed,
}

/// Drives the two lease flows through the configured providers.
pub(crate) struct LeaseCoordinator {
    floating: Option<Arc<dyn FloatingLeaseProvider>>,
    subscription: Option<Arc<dyn SubscriptionLeaseProvider>>,
    request_timeout: Duration,
}

impl LeaseCoordinator {
    /// Creates a coordinator with the given providers.
    pub(crate) fn new(
        floating: Option<Arc<dyn FloatingLeaseProvider>>,
        subscription: Option<Arc<dyn SubscriptionLeaseProvider>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            floating,
            subscription,
            request_timeout,
        }
    }

    /// Leases a floating license and verifies it against the license
    /// server's key.
    ///
    /// Returns `Ok(None)` if no provider is configured or the leased license
    /// lacks required fields.
    ///
    /// # Errors
    ///
    /// [`LicenseError::FloatingLicenseUnavailable`] if the provider fails,
    /// times out, or returns content that does not verify.
    pub(crate) async fn lease_floating(
        &self,
        server_key: &PublicKey,
        host: &HostIdentity,
        client_id: Uuid,
    ) -> LicenseResult<Option<LicenseDocument>> {
        let Some(provider) = &self.floating else {
            warn!("floating license provider has not been configured");
            return Ok(None);
        };

        let request =
            provider.lease_floating_license(&host.machine_name, &host.user_name, client_id);
        let leased = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(leased)) => leased,
            Ok(Err(e)) => {
                warn!(error = %e, "floating license provider failed");
                return Err(LicenseError::FloatingLicenseUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(timeout = ?self.request_timeout, "floating license request timed out");
                return Err(LicenseError::FloatingLicenseUnavailable(
                    LeaseError::Timeout.to_string(),
                ));
            }
        };

        let doc = Document::parse(&leased).map_err(|e| {
            warn!(error = %e, "leased floating license is not well-formed XML");
            LicenseError::FloatingLicenseUnavailable(format!("leased license is not XML: {e}"))
        })?;

        if !verify_document(&doc, server_key) {
            warn!("could not get a valid license from the floating license server");
            return Err(LicenseError::FloatingLicenseUnavailable(
                "leased license signature invalid".to_string(),
            ));
        }

        Ok(extract_fields(&doc, &leased))
    }

    /// Asks the subscription provider to re-lease `current`.
    pub(crate) async fn renew_subscription(&self, current: &str) -> Renewal {
        let Some(provider) = &self.subscription else {
            warn!("subscription lease provider has not been configured");
            return Renewal::NoProvider;
        };

        let renewed = match tokio::time::timeout(
            self.request_timeout,
            provider.lease_subscription(current),
        )
        .await
        {
            Ok(Ok(renewed)) => renewed,
            Ok(Err(e)) => {
                error!(error = %e, "could not re-lease subscription license");
                return Renewal::NotRenewed;
            }
            Err(_) => {
                error!(timeout = ?self.request_timeout, "subscription re-lease timed out");
                return Renewal::NotRenewed;
            }
        };

        if is_well_formed(&renewed) {
            debug!("subscription license re-leased");
            Renewal::Renewed(renewed)
        } else {
            error!("re-leased subscription license is not valid XML");
            debug!(content = %renewed, "rejected subscription content");
            Renewal::NotRenewed
        }
    }
}
