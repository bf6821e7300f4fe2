use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use tentia_core::{synthesize, Identity, RequestContext, TenantKey};
use tracing::debug;

use super::config::GateConfig;
use super::error::GateError;
use super::scope::TenantScope;
use super::stage::{GateStage, StageTracker};
use crate::auth::CredentialVerifier;
use crate::provision::{ContextTracker, Provisioner, TenantConnector};
use crate::tenant::TenantRejection;

/// The ordered admission pipeline shared by every gated request.
///
/// Authentication is a hard gate: the tenant header is not even read until
/// the verifier has accepted the credentials.
pub struct TenantGate {
    config: Arc<GateConfig>,
    verifier: Arc<dyn CredentialVerifier>,
    provisioner: Provisioner,
}

impl TenantGate {
    #[must_use]
    pub fn new(
        config: Arc<GateConfig>,
        verifier: Arc<dyn CredentialVerifier>,
        connector: Arc<dyn TenantConnector>,
        tracker: ContextTracker,
    ) -> Self {
        let provisioner = Provisioner::new(connector, tracker, config.connect_timeout);
        Self {
            config,
            verifier,
            provisioner,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<GateConfig> {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &Arc<dyn CredentialVerifier> {
        &self.verifier
    }

    #[must_use]
    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Runs authentication, tenant resolution and provisioning for one request.
    ///
    /// On success the tracker is at [`GateStage::ContextProvisioned`] and the
    /// returned scope owns the request's data context. On failure it is at
    /// [`GateStage::Rejected`] and no data context exists.
    ///
    /// # Errors
    ///
    /// Returns the [`GateError`] to answer the request with.
    pub async fn admit(
        &self,
        headers: &HeaderMap,
        request_id: String,
        stages: &mut StageTracker,
    ) -> Result<TenantScope, GateError> {
        stages.advance(GateStage::Authenticating)?;
        let identity = match self.authenticate(headers).await {
            Ok(identity) => identity,
            Err(err) => return Err(stages.reject(err)),
        };
        tracing::Span::current().record("principal", identity.principal.as_str());

        stages.advance(GateStage::TenantResolving)?;
        let tenant = match self.resolve_tenant(headers) {
            Ok(tenant) => tenant,
            Err(err) => return Err(stages.reject(err)),
        };
        tracing::Span::current().record("tenant", tenant.as_str());

        let data = match synthesize(&self.config.template, &self.config.prefix, Some(&tenant)) {
            Ok(target) => self.provisioner.provision(tenant.clone(), target).await,
            Err(_) => return Err(stages.reject(GateError::MissingTenant(TenantRejection::Absent))),
        };
        let data = match data {
            Ok(data) => data,
            Err(err) => return Err(stages.reject(err.into())),
        };

        stages.advance(GateStage::ContextProvisioned)?;
        let context = RequestContext {
            request_id,
            identity,
            tenant,
        };
        Ok(TenantScope::new(context, data))
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, GateError> {
        let lookup = self.verifier.verify(headers.get(AUTHORIZATION));
        match tokio::time::timeout(self.config.identity_lookup_timeout, lookup).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(err)) => {
                debug!(scheme = self.verifier.scheme(), error = %err, "authentication failed");
                Err(err.into())
            }
            Err(_) => {
                debug!(
                    timeout = ?self.config.identity_lookup_timeout,
                    "identity lookup timed out"
                );
                Err(GateError::InternalFailure("identity lookup timed out".to_string()))
            }
        }
    }

    fn resolve_tenant(&self, headers: &HeaderMap) -> Result<TenantKey, GateError> {
        let extractor = &self.config.tenant;
        match extractor.extract(headers) {
            Ok(Some(tenant)) => Ok(tenant),
            Ok(None) => {
                debug!(header = extractor.header().as_str(), "tenant header absent");
                Err(TenantRejection::Absent.into())
            }
            Err(rejection) => {
                debug!(header = extractor.header().as_str(), reason = %rejection, "tenant header rejected");
                Err(rejection.into())
            }
        }
    }
}

impl std::fmt::Debug for TenantGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGate")
            .field("config", &self.config)
            .field("scheme", &self.verifier.scheme())
            .field("provisioner", &self.provisioner)
            .finish()
    }
}
