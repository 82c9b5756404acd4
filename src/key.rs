//! Key material.
//!
//! [`KeyData`] is plain data: a certificate, optionally the matching private
//! key and its passphrase. Turning it into usable openssl keys is the job of
//! a [`KeyStoreProvider`].

use std::fmt;

use base64::Engine;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::{DigestAlgorithm, SignatureAlgorithm};

/// Intended use of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Signs outgoing messages and verifies incoming ones.
    Signing,
    /// Encryption key. Carried in metadata, unused for messages.
    Encryption,
    /// No declared use; usable for both.
    #[default]
    Unspecified,
}

impl KeyType {
    /// Value of the metadata `use` attribute, if any.
    #[must_use]
    pub const fn metadata_use(&self) -> Option<&'static str> {
        match self {
            Self::Signing => Some("signing"),
            Self::Encryption => Some("encryption"),
            Self::Unspecified => None,
        }
    }

    /// Parses the metadata `use` attribute.
    #[must_use]
    pub fn from_metadata_use(value: Option<&str>) -> Self {
        match value {
            Some("signing") => Self::Signing,
            Some("encryption") => Self::Encryption,
            _ => Self::Unspecified,
        }
    }
}

/// A named certificate with an optional private key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyData {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key: Option<String>,
    certificate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    passphrase: Option<String>,
    #[serde(default, rename = "type")]
    key_type: KeyType,
}

impl KeyData {
    /// Creates verification-only key material from a certificate.
    ///
    /// The certificate may be PEM or bare base64 DER.
    #[must_use]
    pub fn new(name: impl Into<String>, certificate: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            private_key: None,
            certificate: certificate.into(),
            passphrase: None,
            key_type,
        }
    }

    /// Attaches the PEM private key and its optional passphrase.
    #[must_use]
    pub fn with_private_key(
        mut self,
        private_key: impl Into<String>,
        passphrase: Option<String>,
    ) -> Self {
        self.private_key = Some(private_key.into());
        self.passphrase = passphrase;
        self
    }

    /// Key name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Certificate as configured.
    #[must_use]
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// PEM private key, if this key can sign.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    /// Passphrase protecting the private key.
    #[must_use]
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    /// Declared use.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Returns true if the private half is present.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.private_key.as_deref().is_some_and(|pem| !pem.trim().is_empty())
    }

    /// The certificate as DER bytes.
    pub fn certificate_der(&self) -> SamlResult<Vec<u8>> {
        if self.certificate.contains("-----BEGIN") {
            return Ok(X509::from_pem(self.certificate.as_bytes())?.to_der()?);
        }
        let compact: String = self
            .certificate
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = base64::engine::general_purpose::STANDARD.decode(compact)?;
        X509::from_der(&der)
            .map_err(|e| SamlError::Crypto(format!("invalid certificate for key '{}': {e}", self.name)))?;
        Ok(der)
    }

    /// The certificate as single-line base64 DER, as carried in `<ds:X509Certificate>`.
    pub fn certificate_base64(&self) -> SamlResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.certificate_der()?))
    }
}

impl fmt::Debug for KeyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyData")
            .field("name", &self.name)
            .field("key_type", &self.key_type)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// The key and algorithms a message is signed with.
///
/// Attached to a message when it is built; the transformer signs exactly
/// what is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCredential {
    /// Key material holding the private key.
    pub key: KeyData,
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Reference digest algorithm.
    pub digest: DigestAlgorithm,
}

impl SigningCredential {
    /// Creates a credential, rejecting keys without a private half.
    pub fn new(
        key: KeyData,
        algorithm: SignatureAlgorithm,
        digest: DigestAlgorithm,
    ) -> SamlResult<Self> {
        if !key.can_sign() {
            return Err(SamlError::Configuration(format!(
                "key '{}' has no private key and cannot sign",
                key.name()
            )));
        }
        Ok(Self {
            key,
            algorithm,
            digest,
        })
    }
}

/// Loads openssl keys from [`KeyData`].
pub trait KeyStoreProvider: Send + Sync {
    /// Loads the private key, decrypting it with the passphrase if set.
    fn private_key(&self, key: &KeyData) -> SamlResult<PKey<Private>>;

    /// Loads the certificate.
    fn certificate(&self, key: &KeyData) -> SamlResult<X509>;

    /// Public key of the certificate.
    fn public_key(&self, key: &KeyData) -> SamlResult<PKey<Public>> {
        Ok(self.certificate(key)?.public_key()?)
    }
}

/// [`KeyStoreProvider`] backed by PEM strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PemKeyStore;

impl KeyStoreProvider for PemKeyStore {
    fn private_key(&self, key: &KeyData) -> SamlResult<PKey<Private>> {
        let pem = key.private_key().ok_or_else(|| {
            SamlError::Configuration(format!("key '{}' has no private key", key.name()))
        })?;
        let loaded = match key.passphrase().filter(|p| !p.is_empty()) {
            Some(passphrase) => {
                PKey::private_key_from_pem_passphrase(pem.as_bytes(), passphrase.as_bytes())
            }
            None => PKey::private_key_from_pem(pem.as_bytes()),
        };
        loaded.map_err(|e| {
            SamlError::Crypto(format!("unable to load private key '{}': {e}", key.name()))
        })
    }

    fn certificate(&self, key: &KeyData) -> SamlResult<X509> {
        let der = key.certificate_der()?;
        Ok(X509::from_der(&der)?)
    }
}
