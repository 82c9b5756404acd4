//! XML Signature creation.

use base64::Engine;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::hash;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::key::{KeyStoreProvider, SigningCredential};
use crate::types::canonicalization_algorithms;
use crate::xml;

use super::{canonicalize, DigestAlgorithm, SignatureAlgorithm};

/// Signs SAML documents with an enveloped signature.
pub struct XmlSigner {
    private_key: PKey<Private>,
    certificate_der: Vec<u8>,
    algorithm: SignatureAlgorithm,
    digest: DigestAlgorithm,
}

impl XmlSigner {
    /// Loads the credential's key material through `key_store`.
    pub fn new(credential: &SigningCredential, key_store: &dyn KeyStoreProvider) -> SamlResult<Self> {
        let private_key = key_store.private_key(&credential.key)?;
        let expected = if credential.algorithm.is_ecdsa() {
            Id::EC
        } else {
            Id::RSA
        };
        if private_key.id() != expected {
            return Err(SamlError::Configuration(format!(
                "key '{}' does not match signature algorithm {:?}",
                credential.key.name(),
                credential.algorithm
            )));
        }
        Ok(Self {
            private_key,
            certificate_der: credential.key.certificate_der()?,
            algorithm: credential.algorithm,
            digest: credential.digest,
        })
    }

    /// Signs the element with `ID="reference_id"` inside `xml`.
    ///
    /// The `<ds:Signature>` is inserted right after the element's `Issuer`,
    /// or as its first child when it has none.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let root = xml::parse(xml)?;
        let element = root.find_by_id(reference_id).ok_or_else(|| {
            SamlError::SignatureCreation(format!("element with ID '{reference_id}' not found"))
        })?;
        if element.content_start == element.end {
            return Err(SamlError::SignatureCreation(format!(
                "element '{}' is empty and cannot hold a signature",
                element.name
            )));
        }
        if element.child("Signature").is_some() {
            return Err(SamlError::SignatureCreation(format!(
                "element '{reference_id}' is already signed"
            )));
        }

        let canonical = canonicalize(&xml::detach(xml, &root, element, None)?)?;
        let digest = hash(self.digest.message_digest(), canonical.as_bytes())?;
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let signed_info = build_signed_info(reference_id, &digest_b64, self.algorithm, self.digest);
        let signature_value = self.sign_data(canonicalize(&signed_info)?.as_bytes())?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature_value);

        let certificate_b64 =
            base64::engine::general_purpose::STANDARD.encode(&self.certificate_der);
        let signature = build_signature_element(&signed_info, &signature_b64, &certificate_b64);

        let insert_at = element
            .child("Issuer")
            .map_or(element.content_start, |issuer| issuer.end);
        debug!(
            element = %element.name,
            id = %reference_id,
            algorithm = ?self.algorithm,
            "signed element"
        );
        Ok(format!("{}{}{}", &xml[..insert_at], signature, &xml[insert_at..]))
    }

    fn sign_data(&self, data: &[u8]) -> SamlResult<Vec<u8>> {
        let mut signer = Signer::new(self.algorithm.message_digest(), &self.private_key)?;
        signer.update(data)?;
        let signature = signer.sign_to_vec()?;
        if !self.algorithm.is_ecdsa() {
            return Ok(signature);
        }

        // XML-DSig carries ECDSA signatures as raw r || s
        let der = EcdsaSig::from_der(&signature)?;
        let width = i32::try_from(self.private_key.bits().div_ceil(8))
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))?;
        let mut raw = der.r().to_vec_padded(width)?;
        raw.extend(der.s().to_vec_padded(width)?);
        Ok(raw)
    }
}

fn build_signed_info(
    reference_id: &str,
    digest_b64: &str,
    algorithm: SignatureAlgorithm,
    digest: DigestAlgorithm,
) -> String {
    format!(
        r##"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
<ds:CanonicalizationMethod Algorithm="{c14n}"/>
<ds:SignatureMethod Algorithm="{alg}"/>
<ds:Reference URI="#{reference_id}">
<ds:Transforms>
<ds:Transform Algorithm="{enveloped}"/>
<ds:Transform Algorithm="{c14n}"/>
</ds:Transforms>
<ds:DigestMethod Algorithm="{digest}"/>
<ds:DigestValue>{digest_b64}</ds:DigestValue>
</ds:Reference>
</ds:SignedInfo>"##,
        c14n = canonicalization_algorithms::EXCLUSIVE_C14N,
        enveloped = canonicalization_algorithms::ENVELOPED_SIGNATURE,
        alg = algorithm.uri(),
        digest = digest.uri(),
    )
}

fn build_signature_element(signed_info: &str, signature_b64: &str, certificate_b64: &str) -> String {
    format!(
        r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
{signed_info}
<ds:SignatureValue>{signature_b64}</ds:SignatureValue>
<ds:KeyInfo>
<ds:X509Data>
<ds:X509Certificate>{certificate_b64}</ds:X509Certificate>
</ds:X509Data>
</ds:KeyInfo>
</ds:Signature>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PemKeyStore;
    use crate::testing;

    const DOC: &str = r#"<samlp:LogoutResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_lr1" Version="2.0"><saml:Issuer>https://sp.example.com</saml:Issuer><samlp:Status/></samlp:LogoutResponse>"#;

    #[test]
    fn signature_follows_issuer() {
        let signer = XmlSigner::new(&testing::credential("sp"), &PemKeyStore).unwrap();
        let signed = signer.sign(DOC, "_lr1").unwrap();

        let issuer_end = signed.find("</saml:Issuer>").unwrap() + "</saml:Issuer>".len();
        assert_eq!(signed[issuer_end..].find("<ds:Signature"), Some(0));
        assert!(signed.contains(r##"URI="#_lr1""##));
        assert!(signed.contains("<ds:X509Certificate>"));
    }

    #[test]
    fn refuses_to_sign_twice() {
        let signer = XmlSigner::new(&testing::credential("sp"), &PemKeyStore).unwrap();
        let signed = signer.sign(DOC, "_lr1").unwrap();
        assert!(matches!(
            signer.sign(&signed, "_lr1"),
            Err(SamlError::SignatureCreation(_))
        ));
        assert!(matches!(
            signer.sign(DOC, "_missing"),
            Err(SamlError::SignatureCreation(_))
        ));
    }

    #[test]
    fn rsa_key_cannot_sign_ecdsa() {
        let mut credential = testing::credential("sp");
        credential.algorithm = SignatureAlgorithm::EcdsaSha256;
        assert!(matches!(
            XmlSigner::new(&credential, &PemKeyStore),
            Err(SamlError::Configuration(_))
        ));
    }
}
