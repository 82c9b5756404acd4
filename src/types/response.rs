//! SAML Response types.

use chrono::{DateTime, Utc};

use super::{Assertion, SignatureInfo, Status};
use crate::key::SigningCredential;

/// SAML Response carrying assertions back to the service provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// ID of the request this answers. `None` for IdP-initiated SSO.
    pub in_response_to: Option<String>,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// Assertion consumer service URL this response is delivered to.
    pub destination: Option<String>,

    /// Entity ID of the identity provider.
    pub issuer: String,

    /// Outcome of the request.
    pub status: Status,

    /// Assertions. Empty on failure.
    pub assertions: Vec<Assertion>,

    /// Key the transformer signs this response with.
    pub signing: Option<SigningCredential>,

    /// Enveloped signature found when parsing.
    pub signature: Option<SignatureInfo>,
}

impl Response {
    /// Returns true if the response status is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the signature on the response itself was verified.
    #[must_use]
    pub fn is_signature_verified(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| s.validated)
    }
}
