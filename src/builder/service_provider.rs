//! The hosted service provider.

use std::sync::Arc;

use tracing::{debug, info};

use super::{logout_request, logout_response, required_credential, resolve_identity_provider};
use super::RemoteIdentityProvider;
use crate::clock::Clock;
use crate::error::{SamlError, SamlResult};
use crate::ids::IdGenerator;
use crate::metadata::{select_endpoint, ServiceProviderMetadata};
use crate::types::{
    AuthenticationRequest, Binding, LogoutRequest, LogoutResponse, NameId, NameIdFormat,
    NameIdPolicy, Status,
};
use crate::validator::TrustContext;

/// Service provider hosted by this process.
#[derive(Debug, Clone)]
pub struct HostedServiceProvider {
    metadata: ServiceProviderMetadata,
    providers: Vec<RemoteIdentityProvider>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl HostedServiceProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(
        metadata: ServiceProviderMetadata,
        providers: Vec<RemoteIdentityProvider>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            metadata,
            providers,
            clock,
            ids,
        }
    }

    /// Entity ID, the issuer of every message sent.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.metadata.entity_id
    }

    /// Hosted metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ServiceProviderMetadata {
        &self.metadata
    }

    /// Trusted identity providers, in configuration order.
    #[must_use]
    pub fn identity_providers(&self) -> &[RemoteIdentityProvider] {
        &self.providers
    }

    /// See [`resolve_identity_provider`].
    pub fn identity_provider(&self, idp: Option<&str>) -> SamlResult<&RemoteIdentityProvider> {
        resolve_identity_provider(idp, &self.providers)
    }

    /// Identity provider by its alias, falling back to the entity ID.
    pub fn identity_provider_by_alias(&self, alias: &str) -> SamlResult<&RemoteIdentityProvider> {
        self.providers
            .iter()
            .find(|provider| {
                provider.configuration.provider.alias.as_deref() == Some(alias)
                    || provider.entity_id() == alias
            })
            .ok_or_else(|| SamlError::ProviderNotFound(alias.to_string()))
    }

    /// Builds an authentication request for `idp`.
    ///
    /// The NameID format is the first of `requested_name_id`, the format
    /// configured for the provider and the provider's first supported
    /// format; without any the policy is omitted.
    pub fn authentication_request(
        &self,
        idp: &RemoteIdentityProvider,
        preferred_acs_index: Option<u32>,
        requested_name_id: Option<NameIdFormat>,
    ) -> SamlResult<AuthenticationRequest> {
        let destination = select_endpoint(
            &idp.metadata.descriptor.single_sign_on_services,
            &[Binding::Redirect],
            None,
        )
        .ok_or_else(|| {
            SamlError::Metadata(format!(
                "identity provider '{}' publishes no single sign-on service",
                idp.entity_id()
            ))
        })?;

        let acs = select_endpoint(
            &self.metadata.descriptor.assertion_consumer_services,
            &[],
            preferred_acs_index,
        )
        .ok_or_else(|| {
            SamlError::Configuration(format!(
                "service provider '{}' has no assertion consumer service",
                self.entity_id()
            ))
        })?;

        let format = requested_name_id
            .or(idp.configuration.name_id)
            .or_else(|| idp.metadata.descriptor.name_ids.first().copied());

        let signing = if self.metadata.descriptor.authn_requests_signed {
            Some(required_credential(&self.metadata)?)
        } else {
            None
        };

        let request = AuthenticationRequest {
            id: self.ids.message_id(),
            issue_instant: self.clock.now(),
            issuer: self.metadata.entity_id.clone(),
            destination: Some(destination.clone()),
            assertion_consumer_service: Some(acs.clone()),
            binding: acs.binding,
            force_authn: false,
            is_passive: false,
            name_id_policy: format.map(|format| NameIdPolicy::new(format, self.entity_id())),
            signing,
            signature: None,
        };
        info!(
            id = %request.id,
            idp = %idp.entity_id(),
            destination = %destination.location,
            signed = request.signing.is_some(),
            "built authentication request"
        );
        Ok(request)
    }

    /// Builds a logout request for `name_id` addressed to `idp`.
    pub fn logout_request(
        &self,
        idp: &RemoteIdentityProvider,
        name_id: NameId,
        session_indexes: Vec<String>,
    ) -> SamlResult<LogoutRequest> {
        logout_request(
            &self.metadata,
            &idp.metadata,
            self.clock.as_ref(),
            self.ids.as_ref(),
            name_id,
            session_indexes,
        )
    }

    /// Answers a logout request received from `idp`.
    pub fn logout_response(
        &self,
        idp: &RemoteIdentityProvider,
        request: &LogoutRequest,
        status: Status,
    ) -> SamlResult<LogoutResponse> {
        logout_response(
            &self.metadata,
            &idp.metadata,
            self.clock.as_ref(),
            self.ids.as_ref(),
            request,
            status,
        )
    }

    /// What messages from `idp` are checked against.
    #[must_use]
    pub fn trust_context(&self, idp: &RemoteIdentityProvider) -> TrustContext {
        debug!(idp = %idp.entity_id(), "trusting identity provider keys");
        TrustContext {
            entity_id: idp.entity_id().to_string(),
            verification_keys: idp.verification_keys(),
            local_entity_id: self.entity_id().to_string(),
            want_signed: self.metadata.descriptor.want_assertions_signed,
        }
    }
}
