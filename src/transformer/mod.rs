//! Protocol objects to XML and back.
//!
//! The transformer is the only place XML is produced or consumed. Writing
//! signs every object that carries a [`SigningCredential`]; inner assertions
//! are signed before the response that embeds them. Reading verifies every
//! enveloped signature against the supplied keys and records the outcome in
//! the object's `signature` field.

mod reader;
mod writer;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::bindings;
use crate::error::{SamlError, SamlResult};
use crate::key::{KeyData, KeyStoreProvider, PemKeyStore, SigningCredential};
use crate::signature::{XmlSignatureValidator, XmlSigner};
use crate::types::SamlMessage;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Serializes protocol objects and handles transport encoding.
pub trait SamlTransformer: Send + Sync {
    /// Serializes and signs `message`.
    fn to_xml(&self, message: &SamlMessage) -> SamlResult<String>;

    /// Parses a document, verifying signatures against `verification_keys`.
    ///
    /// A signature that fails to verify is an error. With no keys,
    /// signatures are recorded but left unverified.
    fn from_xml(&self, xml: &[u8], verification_keys: &[KeyData]) -> SamlResult<SamlMessage>;

    /// Base64-encodes `xml`, deflating it first for the redirect binding.
    fn saml_encode(&self, xml: &str, deflate: bool) -> SamlResult<String> {
        bindings::encode_message(xml, deflate)
    }

    /// Reverses [`saml_encode`](Self::saml_encode).
    fn saml_decode(&self, encoded: &str, deflate: bool) -> SamlResult<String> {
        bindings::decode_message(encoded, deflate)
    }
}

/// Default transformer, signing with keys loaded through a [`KeyStoreProvider`].
#[derive(Clone)]
pub struct DefaultSamlTransformer {
    key_store: Arc<dyn KeyStoreProvider>,
    allow_sha1: bool,
}

impl DefaultSamlTransformer {
    /// Creates a transformer loading keys through `key_store`.
    #[must_use]
    pub fn new(key_store: Arc<dyn KeyStoreProvider>) -> Self {
        Self {
            key_store,
            allow_sha1: false,
        }
    }

    /// Accepts SHA-1 signatures when reading.
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    fn sign(&self, xml: String, id: &str, signing: Option<&SigningCredential>) -> SamlResult<String> {
        match signing {
            Some(credential) => XmlSigner::new(credential, self.key_store.as_ref())?.sign(&xml, id),
            None => Ok(xml),
        }
    }

    fn write(&self, message: &SamlMessage) -> SamlResult<String> {
        match message {
            SamlMessage::AuthnRequest(request) => self.sign(
                writer::authn_request(request),
                &request.id,
                request.signing.as_ref(),
            ),
            SamlMessage::Response(response) => {
                let mut assertions = String::new();
                for assertion in &response.assertions {
                    assertions.push_str(&self.sign(
                        writer::assertion(assertion),
                        &assertion.id,
                        assertion.signing.as_ref(),
                    )?);
                }
                self.sign(
                    writer::response(response, &assertions),
                    &response.id,
                    response.signing.as_ref(),
                )
            }
            SamlMessage::Assertion(assertion) => self.sign(
                writer::assertion(assertion),
                &assertion.id,
                assertion.signing.as_ref(),
            ),
            SamlMessage::LogoutRequest(request) => self.sign(
                writer::logout_request(request),
                &request.id,
                request.signing.as_ref(),
            ),
            SamlMessage::LogoutResponse(response) => self.sign(
                writer::logout_response(response),
                &response.id,
                response.signing.as_ref(),
            ),
            SamlMessage::Metadata(metadata) => {
                let signing = metadata
                    .signing_key
                    .clone()
                    .map(|key| {
                        SigningCredential::new(
                            key,
                            metadata.signing_algorithm,
                            metadata.digest_algorithm,
                        )
                    })
                    .transpose()?;
                self.sign(writer::metadata(metadata)?, &metadata.id, signing.as_ref())
            }
        }
    }
}

impl Default for DefaultSamlTransformer {
    fn default() -> Self {
        Self::new(Arc::new(PemKeyStore))
    }
}

impl fmt::Debug for DefaultSamlTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSamlTransformer")
            .field("allow_sha1", &self.allow_sha1)
            .finish_non_exhaustive()
    }
}

impl SamlTransformer for DefaultSamlTransformer {
    fn to_xml(&self, message: &SamlMessage) -> SamlResult<String> {
        let body = self.write(message)?;
        debug!(kind = message.kind(), id = %message.id(), "serialized message");
        Ok(format!("{XML_DECLARATION}\n{body}"))
    }

    fn from_xml(&self, xml: &[u8], verification_keys: &[KeyData]) -> SamlResult<SamlMessage> {
        let xml = std::str::from_utf8(xml)
            .map_err(|e| SamlError::XmlParse(format!("document is not UTF-8: {e}")))?;
        let validator = if verification_keys.is_empty() {
            None
        } else {
            Some(XmlSignatureValidator::new(verification_keys)?.allow_sha1(self.allow_sha1))
        };
        let message = reader::read(xml, validator.as_ref())?;
        debug!(kind = message.kind(), id = %message.id(), issuer = %message.issuer(), "parsed message");
        Ok(message)
    }
}
