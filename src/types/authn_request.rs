//! SAML AuthnRequest types.

use chrono::{DateTime, Utc};

use super::{Binding, NameIdPolicy, SignatureInfo};
use crate::key::SigningCredential;
use crate::metadata::Endpoint;

/// SAML authentication request sent by the service provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationRequest {
    /// Request ID. Starts with an underscore, never a digit.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the service provider.
    pub issuer: String,

    /// Single sign-on endpoint of the identity provider.
    pub destination: Option<Endpoint>,

    /// Endpoint the response must be returned to.
    pub assertion_consumer_service: Option<Endpoint>,

    /// Binding the response is requested on (`ProtocolBinding`).
    pub binding: Binding,

    /// Whether the IdP must re-authenticate the user.
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    pub is_passive: bool,

    /// Requested name ID policy.
    pub name_id_policy: Option<NameIdPolicy>,

    /// Key the transformer signs this request with.
    pub signing: Option<SigningCredential>,

    /// Enveloped signature found when parsing.
    pub signature: Option<SignatureInfo>,
}

impl AuthenticationRequest {
    /// Location of the requested assertion consumer service.
    #[must_use]
    pub fn assertion_consumer_service_url(&self) -> Option<&str> {
        self.assertion_consumer_service
            .as_ref()
            .map(|acs| acs.location.as_str())
    }

    /// Returns true if the signature on this request was verified.
    #[must_use]
    pub fn is_signature_verified(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| s.validated)
    }
}
