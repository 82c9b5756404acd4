//! SAML protocol types.

mod assertion;
mod authn_request;
mod constants;
mod logout;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use crate::metadata::EntityMetadata;
use crate::signature::{DigestAlgorithm, SignatureAlgorithm};

/// Outcome of checking an enveloped signature while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    /// Signature algorithm declared by the signature.
    pub algorithm: SignatureAlgorithm,
    /// Reference digest declared by the signature.
    pub digest: DigestAlgorithm,
    /// True once verified against one of the supplied verification keys.
    pub validated: bool,
    /// Name of the key that verified the signature.
    pub key_name: Option<String>,
}

/// Any protocol object the transformer can read or write.
#[derive(Debug, Clone, PartialEq)]
pub enum SamlMessage {
    /// `samlp:AuthnRequest`.
    AuthnRequest(AuthenticationRequest),
    /// `samlp:Response`.
    Response(Response),
    /// Standalone `saml:Assertion`.
    Assertion(Assertion),
    /// `samlp:LogoutRequest`.
    LogoutRequest(LogoutRequest),
    /// `samlp:LogoutResponse`.
    LogoutResponse(LogoutResponse),
    /// `md:EntityDescriptor`.
    Metadata(EntityMetadata),
}

impl SamlMessage {
    /// Protocol message ID (metadata document ID for metadata).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::AuthnRequest(m) => &m.id,
            Self::Response(m) => &m.id,
            Self::Assertion(m) => &m.id,
            Self::LogoutRequest(m) => &m.id,
            Self::LogoutResponse(m) => &m.id,
            Self::Metadata(m) => &m.id,
        }
    }

    /// Issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &str {
        match self {
            Self::AuthnRequest(m) => &m.issuer,
            Self::Response(m) => &m.issuer,
            Self::Assertion(m) => &m.issuer,
            Self::LogoutRequest(m) => &m.issuer,
            Self::LogoutResponse(m) => &m.issuer,
            Self::Metadata(m) => &m.entity_id,
        }
    }

    /// Short element name, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthnRequest(_) => "AuthnRequest",
            Self::Response(_) => "Response",
            Self::Assertion(_) => "Assertion",
            Self::LogoutRequest(_) => "LogoutRequest",
            Self::LogoutResponse(_) => "LogoutResponse",
            Self::Metadata(_) => "EntityDescriptor",
        }
    }
}

impl From<AuthenticationRequest> for SamlMessage {
    fn from(value: AuthenticationRequest) -> Self {
        Self::AuthnRequest(value)
    }
}

impl From<Response> for SamlMessage {
    fn from(value: Response) -> Self {
        Self::Response(value)
    }
}

impl From<Assertion> for SamlMessage {
    fn from(value: Assertion) -> Self {
        Self::Assertion(value)
    }
}

impl From<LogoutRequest> for SamlMessage {
    fn from(value: LogoutRequest) -> Self {
        Self::LogoutRequest(value)
    }
}

impl From<LogoutResponse> for SamlMessage {
    fn from(value: LogoutResponse) -> Self {
        Self::LogoutResponse(value)
    }
}

impl From<EntityMetadata> for SamlMessage {
    fn from(value: EntityMetadata) -> Self {
        Self::Metadata(value)
    }
}
