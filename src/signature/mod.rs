//! Enveloped XML-DSig for protocol messages.
//!
//! Messages are signed with enveloped XML-DSig signatures placed directly
//! after the signed element's `Issuer`. Digests and `SignedInfo` go through
//! Exclusive XML Canonicalization, so a signed assertion still verifies
//! after it has been embedded in a Response.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default), RSA-SHA384, RSA-SHA512
//! - ECDSA-SHA256, ECDSA-SHA384, ECDSA-SHA512
//! - RSA-SHA1 (legacy, rejected by the validator unless allowed)

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

pub(crate) use validator::extract_signature;

use openssl::hash::MessageDigest;
use serde::{Deserialize, Serialize};
use xml_canonicalization::Canonicalizer;

use crate::error::{SamlError, SamlResult};
use crate::types::{canonicalization_algorithms, digest_algorithms, signature_algorithms};

/// Algorithm named in `SignatureMethod`.
///
/// Configuration files use the kebab-case names, e.g. `rsa-sha256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    /// PKCS#1 v1.5 over SHA-256.
    #[default]
    RsaSha256,
    /// PKCS#1 v1.5 over SHA-384.
    RsaSha384,
    /// PKCS#1 v1.5 over SHA-512.
    RsaSha512,
    /// ECDSA over SHA-256.
    EcdsaSha256,
    /// ECDSA over SHA-384.
    EcdsaSha384,
    /// ECDSA over SHA-512.
    EcdsaSha512,
    /// PKCS#1 v1.5 over SHA-1.
    RsaSha1,
}

impl SignatureAlgorithm {
    const ALL: [Self; 7] = [
        Self::RsaSha256,
        Self::RsaSha384,
        Self::RsaSha512,
        Self::EcdsaSha256,
        Self::EcdsaSha384,
        Self::EcdsaSha512,
        Self::RsaSha1,
    ];

    /// Identifier written to `SignatureMethod/@Algorithm`.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        use signature_algorithms as alg;
        match self {
            Self::RsaSha256 => alg::RSA_SHA256,
            Self::RsaSha384 => alg::RSA_SHA384,
            Self::RsaSha512 => alg::RSA_SHA512,
            Self::EcdsaSha256 => alg::ECDSA_SHA256,
            Self::EcdsaSha384 => alg::ECDSA_SHA384,
            Self::EcdsaSha512 => alg::ECDSA_SHA512,
            Self::RsaSha1 => alg::RSA_SHA1,
        }
    }

    /// Algorithm named by a `SignatureMethod/@Algorithm` value.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.uri() == uri)
    }

    /// Whether the key must be an EC key.
    #[must_use]
    pub const fn is_ecdsa(&self) -> bool {
        matches!(
            self,
            Self::EcdsaSha256 | Self::EcdsaSha384 | Self::EcdsaSha512
        )
    }

    /// Whether the hash is SHA-1, which validators reject unless allowed.
    #[must_use]
    pub const fn uses_sha1(&self) -> bool {
        matches!(self, Self::RsaSha1)
    }

    /// The hash the private key signs over.
    pub(crate) fn message_digest(&self) -> MessageDigest {
        let digest = match self {
            Self::RsaSha256 | Self::EcdsaSha256 => DigestAlgorithm::Sha256,
            Self::RsaSha384 | Self::EcdsaSha384 => DigestAlgorithm::Sha384,
            Self::RsaSha512 | Self::EcdsaSha512 => DigestAlgorithm::Sha512,
            Self::RsaSha1 => DigestAlgorithm::Sha1,
        };
        digest.message_digest()
    }
}

/// Digest algorithm used for the signature `Reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-1, legacy.
    Sha1,
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Identifier written to `DigestMethod/@Algorithm`.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => digest_algorithms::SHA1,
            Self::Sha256 => digest_algorithms::SHA256,
            Self::Sha384 => digest_algorithms::SHA384,
            Self::Sha512 => digest_algorithms::SHA512,
        }
    }

    /// Algorithm named by a `DigestMethod/@Algorithm` value.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|digest| digest.uri() == uri)
    }

    pub(crate) fn message_digest(&self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }
}

/// A parsed `<ds:Signature>` element.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// From `SignatureMethod`.
    pub algorithm: SignatureAlgorithm,
    /// From `Reference/DigestMethod`.
    pub digest: DigestAlgorithm,
    /// `Reference/@URI`, `#` plus the ID of the signed element.
    pub reference_uri: String,
    /// `DigestValue`, base64.
    pub digest_value: String,
    /// `SignatureValue`, base64 without line breaks.
    pub signature_value: String,
    /// `KeyInfo/X509Data/X509Certificate`, base64 DER.
    pub x509_certificate: Option<String>,
}

/// Exclusive C14N without comments, the form fed to digests and signatures.
///
/// `fragment` must carry every namespace declaration it uses, see
/// [`crate::xml::detach`].
pub(crate) fn canonicalize(fragment: &str) -> SamlResult<String> {
    let mut output = Vec::with_capacity(fragment.len());
    Canonicalizer::read_from_str(fragment)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| SamlError::XmlParse(format!("cannot canonicalize: {e}")))?;
    String::from_utf8(output)
        .map_err(|e| SamlError::XmlParse(format!("canonical form is not UTF-8: {e}")))
}

/// Whether `uri` names a `Transform` the validator applies.
pub(crate) fn is_supported_transform(uri: &str) -> bool {
    uri == canonicalization_algorithms::ENVELOPED_SIGNATURE
        || uri == canonicalization_algorithms::EXCLUSIVE_C14N
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_algorithm_is_found_by_its_identifier() {
        for algorithm in SignatureAlgorithm::ALL {
            assert_eq!(SignatureAlgorithm::from_uri(algorithm.uri()), Some(algorithm));
        }
        assert!(SignatureAlgorithm::RsaSha1.uses_sha1());
        assert!(!SignatureAlgorithm::EcdsaSha256.uses_sha1());
        assert!(SignatureAlgorithm::EcdsaSha384.is_ecdsa());
    }

    #[test]
    fn digest_algorithm_from_config_name() {
        #[derive(Deserialize)]
        struct Holder {
            digest: DigestAlgorithm,
            algorithm: SignatureAlgorithm,
        }

        let holder: Holder =
            toml::from_str("digest = \"sha512\"\nalgorithm = \"rsa-sha384\"").unwrap();
        assert_eq!(holder.digest, DigestAlgorithm::Sha512);
        assert_eq!(holder.algorithm, SignatureAlgorithm::RsaSha384);
        assert_eq!(
            DigestAlgorithm::from_uri(DigestAlgorithm::Sha512.uri()),
            Some(DigestAlgorithm::Sha512)
        );
    }

    #[test]
    fn canonical_form_normalises_markup_but_keeps_text() {
        let canonical =
            canonicalize(r#"<a:e xmlns:a="urn:a" z='1' b="2"><a:empty/>  text </a:e>"#).unwrap();
        assert_eq!(
            canonical,
            r#"<a:e xmlns:a="urn:a" b="2" z="1"><a:empty></a:empty>  text </a:e>"#
        );
    }

    #[test]
    fn only_enveloped_and_exclusive_transforms_are_supported() {
        assert!(is_supported_transform(canonicalization_algorithms::ENVELOPED_SIGNATURE));
        assert!(is_supported_transform(canonicalization_algorithms::EXCLUSIVE_C14N));
        assert!(!is_supported_transform("http://www.w3.org/TR/1999/REC-xslt-19991116"));
    }
}
