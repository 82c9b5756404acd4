//! The hosted identity provider.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use super::{logout_request, logout_response, required_credential, RemoteServiceProvider};
use crate::clock::Clock;
use crate::config::TimeWindows;
use crate::error::{SamlError, SamlResult};
use crate::ids::IdGenerator;
use crate::metadata::{select_endpoint, IdentityProviderMetadata};
use crate::types::{
    Assertion, AudienceRestriction, AuthnContextClass, AuthnStatement, AuthenticationRequest,
    Binding, Conditions, LogoutRequest, LogoutResponse, NameId, NameIdFormat, Response, Status,
    Subject, SubjectConfirmation, SubjectConfirmationData,
};
use crate::validator::TrustContext;

/// Identity provider hosted by this process.
#[derive(Debug, Clone)]
pub struct HostedIdentityProvider {
    metadata: IdentityProviderMetadata,
    providers: Vec<RemoteServiceProvider>,
    windows: TimeWindows,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl HostedIdentityProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(
        metadata: IdentityProviderMetadata,
        providers: Vec<RemoteServiceProvider>,
        windows: TimeWindows,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            metadata,
            providers,
            windows,
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
    pub const fn metadata(&self) -> &IdentityProviderMetadata {
        &self.metadata
    }

    /// Known service providers, in configuration order.
    #[must_use]
    pub fn service_providers(&self) -> &[RemoteServiceProvider] {
        &self.providers
    }

    /// Service provider with the given entity ID.
    pub fn service_provider(&self, entity_id: &str) -> SamlResult<&RemoteServiceProvider> {
        self.providers
            .iter()
            .find(|provider| provider.entity_id() == entity_id)
            .ok_or_else(|| SamlError::ProviderNotFound(entity_id.to_string()))
    }

    /// NameID format for an assertion answering `request`.
    ///
    /// The format asked for, else the first one `sp` supports, else unspecified.
    #[must_use]
    pub fn name_id_format(
        &self,
        sp: &RemoteServiceProvider,
        request: Option<&AuthenticationRequest>,
    ) -> NameIdFormat {
        request
            .and_then(|r| r.name_id_policy.as_ref())
            .and_then(|policy| policy.format)
            .or_else(|| sp.metadata.descriptor.name_ids.first().copied())
            .unwrap_or_default()
    }

    /// Builds a signed assertion about `principal` for `sp`.
    ///
    /// `request` is `None` for unsolicited (IdP-initiated) SSO. The
    /// recipient is the assertion consumer service named by the request,
    /// else the one the provider prefers for POST.
    pub fn assertion(
        &self,
        sp: &RemoteServiceProvider,
        request: Option<&AuthenticationRequest>,
        principal: &str,
        format: NameIdFormat,
    ) -> SamlResult<Assertion> {
        let signing = required_credential(&self.metadata)?;
        let recipient = self.recipient(sp, request).ok_or_else(|| {
            SamlError::Configuration(format!(
                "service provider '{}' has no assertion consumer service",
                sp.entity_id()
            ))
        })?;

        let now = self.clock.now();
        let expires = shift(now, self.windows.assertion_validity, "assertion_validity_secs")?;
        let not_before = shift(now, -self.windows.clock_skew, "clock_skew_secs")?;
        let session_ends = shift(now, self.windows.session_validity, "session_validity_secs")?;
        let name_id = NameId::new(principal, format)
            .with_name_qualifier(sp.configuration.provider.alias.clone())
            .with_sp_name_qualifier(sp.entity_id());

        let mut assertion = Assertion::new(self.ids.message_id(), self.entity_id(), now);
        assertion.subject = Some(Subject {
            principal: name_id,
            confirmations: vec![SubjectConfirmation::bearer(SubjectConfirmationData {
                in_response_to: request.map(|r| r.id.clone()),
                not_before: None,
                not_on_or_after: Some(expires),
                recipient: Some(recipient),
            })],
        });
        assertion.conditions = Some(Conditions {
            not_before: Some(not_before),
            not_on_or_after: Some(expires),
            audience_restrictions: vec![AudienceRestriction::single(sp.entity_id())],
            one_time_use: false,
        });
        assertion.authn_statement = Some(AuthnStatement {
            authn_instant: now,
            session_index: Some(self.ids.session_index()),
            session_not_on_or_after: Some(session_ends),
            authn_context: AuthnContextClass::Unspecified,
        });
        assertion.signing = Some(signing);

        info!(id = %assertion.id, sp = %sp.entity_id(), solicited = request.is_some(), "built assertion");
        Ok(assertion)
    }

    /// Wraps `assertion` in a successful response for `recipient`.
    pub fn response(
        &self,
        request: Option<&AuthenticationRequest>,
        assertion: Assertion,
        recipient: &RemoteServiceProvider,
    ) -> SamlResult<Response> {
        self.build_response(request, recipient, Status::success(), vec![assertion])
    }

    /// A response reporting `status` without any assertion.
    pub fn failure_response(
        &self,
        request: Option<&AuthenticationRequest>,
        recipient: &RemoteServiceProvider,
        status: Status,
    ) -> SamlResult<Response> {
        self.build_response(request, recipient, status, Vec::new())
    }

    fn build_response(
        &self,
        request: Option<&AuthenticationRequest>,
        recipient: &RemoteServiceProvider,
        status: Status,
        assertions: Vec<Assertion>,
    ) -> SamlResult<Response> {
        let signing = if recipient.configuration.sign_responses {
            Some(required_credential(&self.metadata)?)
        } else {
            None
        };
        let response = Response {
            id: self.ids.message_id(),
            in_response_to: request.map(|r| r.id.clone()),
            issue_instant: self.clock.now(),
            destination: self.recipient(recipient, request),
            issuer: self.metadata.entity_id.clone(),
            status,
            assertions,
            signing,
            signature: None,
        };
        debug!(
            id = %response.id,
            success = response.is_success(),
            destination = ?response.destination,
            "built response"
        );
        Ok(response)
    }

    fn recipient(
        &self,
        sp: &RemoteServiceProvider,
        request: Option<&AuthenticationRequest>,
    ) -> Option<String> {
        request
            .and_then(AuthenticationRequest::assertion_consumer_service_url)
            .map(String::from)
            .or_else(|| {
                select_endpoint(
                    &sp.metadata.descriptor.assertion_consumer_services,
                    &[Binding::Post],
                    None,
                )
                .map(|acs| acs.location.clone())
            })
    }

    /// Builds a logout request for `name_id` addressed to `sp`.
    pub fn logout_request(
        &self,
        sp: &RemoteServiceProvider,
        name_id: NameId,
        session_indexes: Vec<String>,
    ) -> SamlResult<LogoutRequest> {
        logout_request(
            &self.metadata,
            &sp.metadata,
            self.clock.as_ref(),
            self.ids.as_ref(),
            name_id,
            session_indexes,
        )
    }

    /// Answers a logout request received from `sp`.
    pub fn logout_response(
        &self,
        sp: &RemoteServiceProvider,
        request: &LogoutRequest,
        status: Status,
    ) -> SamlResult<LogoutResponse> {
        logout_response(
            &self.metadata,
            &sp.metadata,
            self.clock.as_ref(),
            self.ids.as_ref(),
            request,
            status,
        )
    }

    /// What requests from `sp` are checked against.
    #[must_use]
    pub fn trust_context(&self, sp: &RemoteServiceProvider) -> TrustContext {
        TrustContext {
            entity_id: sp.entity_id().to_string(),
            verification_keys: sp.verification_keys(),
            local_entity_id: self.entity_id().to_string(),
            want_signed: self.metadata.descriptor.want_authn_requests_signed,
        }
    }
}

/// `instant + by`, or a configuration error when the result is not representable.
fn shift(instant: DateTime<Utc>, by: TimeDelta, setting: &str) -> SamlResult<DateTime<Utc>> {
    instant
        .checked_add_signed(by)
        .ok_or_else(|| SamlError::Configuration(format!("{setting} is out of range")))
}
