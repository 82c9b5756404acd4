//! Errors raised while building, sending or checking messages.
//!
//! Every fallible operation in the crate returns [`SamlResult`]. Failures are
//! terminal for the request being processed; nothing here retries.

use thiserror::Error;

use crate::types::status_codes;

/// Shorthand used by every fallible function in the crate.
pub type SamlResult<T> = Result<T, SamlError>;

/// Everything that can go wrong in a Web SSO exchange.
#[derive(Debug, Error)]
pub enum SamlError {
    /// No configured remote provider matches the request.
    #[error("no provider known as {0}")]
    ProviderNotFound(String),

    /// The destination endpoint uses a binding other than POST or Redirect.
    #[error("binding {0} cannot be used here")]
    UnsupportedBinding(String),

    /// XML signature missing, untrusted, or not matching the content.
    #[error("bad signature: {0}")]
    SignatureInvalid(String),

    /// The message is outside its validity window.
    #[error("outside validity window: {0}")]
    ExpiredMessage(String),

    /// The message was issued by someone other than the trusted peer.
    #[error("issuer {actual} is not {expected}")]
    UntrustedIssuer {
        /// The entity ID of the trusted peer.
        expected: String,
        /// The issuer found in the message.
        actual: String,
    },

    /// The assertion is not addressed to this provider.
    #[error("audience [{actual}] does not name {expected}")]
    AudienceMismatch {
        /// The local entity ID.
        expected: String,
        /// The audiences listed in the assertion.
        actual: String,
    },

    /// The hosted provider is misconfigured, e.g. signing required without a key.
    #[error("misconfigured: {0}")]
    Configuration(String),

    /// The inbound HTTP request or message cannot be processed.
    #[error("bad request: {0}")]
    InvalidRequest(String),

    /// Malformed XML.
    #[error("malformed XML: {0}")]
    XmlParse(String),

    /// A mandatory element or attribute is absent.
    #[error("{0} is required")]
    MissingElement(String),

    /// Producing a signature failed.
    #[error("cannot sign: {0}")]
    SignatureCreation(String),

    /// Remote metadata could not be obtained or understood.
    #[error("metadata unavailable: {0}")]
    Metadata(String),

    /// The transport encoding is not valid base64.
    #[error("invalid base64: {0}")]
    Base64Decode(String),

    /// Raw DEFLATE failed in either direction.
    #[error("deflate: {0}")]
    Deflate(String),

    /// Key material could not be loaded.
    #[error("key material: {0}")]
    Crypto(String),
}

impl SamlError {
    /// Top-level or second-level `StatusCode` to report to the peer.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::SignatureInvalid(_)
            | Self::ExpiredMessage(_)
            | Self::UntrustedIssuer { .. }
            | Self::AudienceMismatch { .. } => status_codes::REQUESTER,
            Self::UnsupportedBinding(_) => status_codes::UNSUPPORTED_BINDING,
            Self::ProviderNotFound(_) => status_codes::NO_SUPPORTED_IDP,
            _ => status_codes::RESPONDER,
        }
    }

    /// Status of the HTTP answer that carries this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::MissingElement(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::XmlParse(_)
            | Self::UnsupportedBinding(_) => 400,
            Self::SignatureInvalid(_)
            | Self::ExpiredMessage(_)
            | Self::UntrustedIssuer { .. }
            | Self::AudienceMismatch { .. } => 401,
            Self::ProviderNotFound(_) => 404,
            Self::Metadata(_) => 502,
            _ => 500,
        }
    }
}

macro_rules! convert {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for SamlError {
                fn from(source: $source) -> Self {
                    Self::$variant(source.to_string())
                }
            }
        )*
    };
}

convert! {
    quick_xml::Error => XmlParse,
    quick_xml::events::attributes::AttrError => XmlParse,
    base64::DecodeError => Base64Decode,
    std::io::Error => Deflate,
    openssl::error::ErrorStack => Crypto,
    toml::de::Error => Configuration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requester_and_responder_faults() {
        let bad_input = SamlError::InvalidRequest("no SAMLResponse".to_string());
        assert_eq!(bad_input.status_code(), status_codes::REQUESTER);
        assert_eq!(bad_input.http_status(), 400);

        let err = SamlError::AudienceMismatch {
            expected: "https://sp.example.com".to_string(),
            actual: "https://other.example.com".to_string(),
        };
        assert_eq!(err.status_code(), status_codes::REQUESTER);
        assert_eq!(err.http_status(), 401);

        let misconfigured = SamlError::Configuration("no signing key".to_string());
        assert_eq!(misconfigured.status_code(), status_codes::RESPONDER);
        assert_eq!(misconfigured.http_status(), 500);
    }

    #[test]
    fn protocol_errors_map_to_sub_statuses() {
        let err = SamlError::UnsupportedBinding("HTTP-Artifact".to_string());
        assert_eq!(
            err.status_code(),
            "urn:oasis:names:tc:SAML:2.0:status:UnsupportedBinding"
        );

        let err = SamlError::ProviderNotFound("https://idp.example.com".to_string());
        assert_eq!(err.http_status(), 404);
        assert!(err.to_string().contains("https://idp.example.com"));
    }
}
