//! XML Signature validation.
//!
//! Verifies the enveloped signature that is a direct child of a referenced
//! element. Only signatures made by one of the trusted keys are accepted;
//! an embedded certificate is used to pick the key, never to trust it.

use base64::Engine;
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::hash;
use openssl::pkey::{PKey, Public};
use openssl::sign::Verifier;
use openssl::x509::X509;
use tracing::{debug, warn};

use crate::error::{SamlError, SamlResult};
use crate::key::KeyData;
use crate::types::canonicalization_algorithms;
use crate::xml::{self, XmlElement};

use super::{
    canonicalize, is_supported_transform, DigestAlgorithm, SignatureAlgorithm, XmlSignature,
};

/// A signature that verified, and the key that verified it.
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    /// The parsed signature.
    pub signature: XmlSignature,
    /// Name of the trusted key.
    pub key_name: String,
}

struct TrustedKey {
    name: String,
    certificate_der: Vec<u8>,
    public_key: PKey<Public>,
}

/// XML signature validator.
///
/// Validates signatures on SAML documents using configured trusted certificates.
pub struct XmlSignatureValidator {
    trusted: Vec<TrustedKey>,
    allow_sha1: bool,
}

impl XmlSignatureValidator {
    /// Creates a validator trusting the certificates of `keys`.
    pub fn new(keys: &[KeyData]) -> SamlResult<Self> {
        let trusted = keys
            .iter()
            .map(|key| {
                let certificate_der = key.certificate_der()?;
                let public_key = X509::from_der(&certificate_der)?.public_key()?;
                Ok(TrustedKey {
                    name: key.name().to_string(),
                    certificate_der,
                    public_key,
                })
            })
            .collect::<SamlResult<Vec<_>>>()?;
        Ok(Self {
            trusted,
            allow_sha1: false,
        })
    }

    /// Allows SHA-1 based signatures (not recommended).
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Returns true if the element with `ID="element_id"` carries its own signature.
    pub fn is_signed(xml: &str, element_id: &str) -> SamlResult<bool> {
        let root = xml::parse(xml)?;
        Ok(root
            .find_by_id(element_id)
            .is_some_and(|element| element.child("Signature").is_some()))
    }

    /// Validates the enveloped signature of the element with `ID="element_id"`.
    pub fn validate_element(&self, xml: &str, element_id: &str) -> SamlResult<VerifiedSignature> {
        let root = xml::parse(xml)?;
        let element = root.find_by_id(element_id).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("referenced element '{element_id}' not found"))
        })?;
        let signature_element = element.child("Signature").ok_or_else(|| {
            SamlError::SignatureInvalid(format!("element '{element_id}' is not signed"))
        })?;
        let signed_info = signature_element.required_child("SignedInfo")?;
        let signature = extract_signature(signature_element)?;
        check_transforms(signed_info)?;

        if signature.reference_uri != format!("#{element_id}") {
            return Err(SamlError::SignatureInvalid(format!(
                "signature references '{}' instead of '#{element_id}'",
                signature.reference_uri
            )));
        }
        if !self.allow_sha1
            && (signature.algorithm.uses_sha1() || signature.digest == DigestAlgorithm::Sha1)
        {
            return Err(SamlError::SignatureInvalid(
                "SHA-1 signatures are not allowed".to_string(),
            ));
        }

        // enveloped-signature transform
        let unsigned = xml::detach(xml, &root, element, Some(signature_element))?;
        verify_digest(&unsigned, &signature)?;

        let signed_info_text = canonicalize(&xml::detach(xml, &root, signed_info, None)?)?;
        let key_name = self.verify_signature(signed_info_text.as_bytes(), &signature)?;
        debug!(id = %element_id, key = %key_name, "signature verified");
        Ok(VerifiedSignature {
            signature,
            key_name,
        })
    }

    fn verify_signature(&self, data: &[u8], signature: &XmlSignature) -> SamlResult<String> {
        let value = base64::engine::general_purpose::STANDARD
            .decode(&signature.signature_value)
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid signature encoding: {e}")))?;

        let embedded = signature
            .x509_certificate
            .as_deref()
            .and_then(|cert| base64::engine::general_purpose::STANDARD.decode(cert).ok());
        // the key matching the embedded certificate is tried first
        let mut candidates: Vec<&TrustedKey> = self.trusted.iter().collect();
        if let Some(der) = embedded {
            candidates.sort_by_key(|key| key.certificate_der != der);
        }

        for key in candidates {
            match verify_with_key(data, &value, &key.public_key, signature.algorithm) {
                Ok(true) => return Ok(key.name.clone()),
                Ok(false) => {}
                Err(e) => warn!(key = %key.name, error = %e, "signature check failed"),
            }
        }
        Err(SamlError::SignatureInvalid(
            "signature verification failed with all trusted certificates".to_string(),
        ))
    }
}

fn verify_with_key(
    data: &[u8],
    signature: &[u8],
    public_key: &PKey<Public>,
    algorithm: SignatureAlgorithm,
) -> SamlResult<bool> {
    let der;
    let signature = if algorithm.is_ecdsa() {
        der = raw_ecdsa_to_der(signature)?;
        der.as_slice()
    } else {
        signature
    };
    let mut verifier = Verifier::new(algorithm.message_digest(), public_key)?;
    verifier.update(data)?;
    Ok(verifier.verify(signature).unwrap_or(false))
}

fn raw_ecdsa_to_der(raw: &[u8]) -> SamlResult<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(SamlError::SignatureInvalid(
            "malformed ECDSA signature value".to_string(),
        ));
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let sig = EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
    Ok(sig.to_der()?)
}

/// Rejects canonicalization methods and transforms that are not implemented.
fn check_transforms(signed_info: &XmlElement) -> SamlResult<()> {
    let method = signed_info
        .required_child("CanonicalizationMethod")?
        .required_attr("Algorithm")?;
    if method != canonicalization_algorithms::EXCLUSIVE_C14N {
        return Err(SamlError::SignatureInvalid(format!(
            "unsupported canonicalization method: {method}"
        )));
    }

    let reference = signed_info.required_child("Reference")?;
    let transforms = reference
        .child("Transforms")
        .map(|t| t.children_named("Transform").collect::<Vec<_>>())
        .unwrap_or_default();
    let mut enveloped = false;
    for transform in transforms {
        let algorithm = transform.required_attr("Algorithm")?;
        if !is_supported_transform(algorithm) {
            return Err(SamlError::SignatureInvalid(format!(
                "unsupported transform: {algorithm}"
            )));
        }
        enveloped |= algorithm == canonicalization_algorithms::ENVELOPED_SIGNATURE;
    }
    if !enveloped {
        return Err(SamlError::SignatureInvalid(
            "signature is not enveloped".to_string(),
        ));
    }
    Ok(())
}

fn verify_digest(unsigned: &str, signature: &XmlSignature) -> SamlResult<()> {
    let computed = hash(signature.digest.message_digest(), canonicalize(unsigned)?.as_bytes())?;
    let expected = base64::engine::general_purpose::STANDARD
        .decode(&signature.digest_value)
        .map_err(|e| SamlError::SignatureInvalid(format!("invalid digest encoding: {e}")))?;
    if expected.len() != computed.len() || !openssl::memcmp::eq(&expected, &computed) {
        return Err(SamlError::SignatureInvalid("digest value mismatch".to_string()));
    }
    Ok(())
}

/// Reads the algorithms and values of a `<ds:Signature>` without checking them.
pub(crate) fn extract_signature(signature: &XmlElement) -> SamlResult<XmlSignature> {
    let signed_info = signature.required_child("SignedInfo")?;
    let method = signed_info.required_child("SignatureMethod")?.required_attr("Algorithm")?;
    let algorithm = SignatureAlgorithm::from_uri(method).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("unknown signature algorithm: {method}"))
    })?;

    let reference = signed_info.required_child("Reference")?;
    let digest_method = reference.required_child("DigestMethod")?.required_attr("Algorithm")?;
    let digest = DigestAlgorithm::from_uri(digest_method).ok_or_else(|| {
        SamlError::SignatureInvalid(format!("unknown digest algorithm: {digest_method}"))
    })?;

    let x509_certificate = signature
        .child("KeyInfo")
        .and_then(|info| info.child("X509Data"))
        .and_then(|data| data.child("X509Certificate"))
        .map(|cert| compact(&cert.text));

    Ok(XmlSignature {
        algorithm,
        digest,
        reference_uri: reference.attr("URI").unwrap_or_default().to_string(),
        digest_value: compact(&reference.required_child("DigestValue")?.text),
        signature_value: compact(&signature.required_child("SignatureValue")?.text),
        x509_certificate,
    })
}

fn compact(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
