//! Fixed identifiers of the protocol.
//!
//! Namespaces, bindings, subject formats, status codes and the XML-DSig
//! algorithm identifiers this crate understands.

use serde::{Deserialize, Serialize};

/// Namespace of `saml:` elements.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// Namespace of `samlp:` elements.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// Namespace of `md:` elements.
pub const MD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// Namespace of `ds:` elements.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Subject confirmation method for browser SSO.
pub const BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// SAML protocol version carried on every message.
pub const SAML_VERSION: &str = "2.0";

/// Transport a message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    /// Auto-submitted HTML form.
    Post,
    /// Deflated message in the query string.
    Redirect,
    /// HTTP Artifact binding. Recognised in metadata, never sent.
    Artifact,
    /// SOAP binding. Recognised in metadata, never sent.
    Soap,
}

impl Binding {
    /// Identifier used in metadata.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Post => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::Redirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            Self::Artifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
            Self::Soap => "urn:oasis:names:tc:SAML:2.0:bindings:SOAP",
        }
    }

    /// Binding named by a metadata identifier.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::Post, Self::Redirect, Self::Artifact, Self::Soap]
            .into_iter()
            .find(|binding| binding.uri() == uri)
    }
}

/// Format of a subject identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameIdFormat {
    /// Left to the identity provider.
    #[default]
    Unspecified,
    /// Mail address.
    Email,
    /// Distinguished name of a certificate subject.
    X509Subject,
    /// Windows account qualified by its domain.
    WinDomainQualified,
    /// `user@REALM` principal.
    Kerberos,
    /// Another SAML entity.
    Entity,
    /// Opaque, stable per service provider.
    Persistent,
    /// Opaque, valid for one session.
    Transient,
    /// Carried as an EncryptedID.
    Encrypted,
}

impl NameIdFormat {
    const ALL: [Self; 9] = [
        Self::Unspecified,
        Self::Email,
        Self::X509Subject,
        Self::WinDomainQualified,
        Self::Kerberos,
        Self::Entity,
        Self::Persistent,
        Self::Transient,
        Self::Encrypted,
    ];

    /// Identifier written to `Format` attributes.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
            Self::Email => "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
            Self::X509Subject => "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName",
            Self::WinDomainQualified => {
                "urn:oasis:names:tc:SAML:1.1:nameid-format:WindowsDomainQualifiedName"
            }
            Self::Kerberos => "urn:oasis:names:tc:SAML:2.0:nameid-format:kerberos",
            Self::Entity => "urn:oasis:names:tc:SAML:2.0:nameid-format:entity",
            Self::Persistent => "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
            Self::Transient => "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
            Self::Encrypted => "urn:oasis:names:tc:SAML:2.0:nameid-format:encrypted",
        }
    }

    /// Format named by a `Format` attribute.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.uri() == uri)
    }
}

/// How the identity provider authenticated the subject.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthnContextClass {
    /// Not stated.
    #[default]
    Unspecified,
    /// Password over an unprotected channel.
    Password,
    /// Password over TLS.
    PasswordProtectedTransport,
    /// Client certificate.
    X509,
    /// Existing session at the identity provider.
    PreviousSession,
}

impl AuthnContextClass {
    const ALL: [Self; 5] = [
        Self::Unspecified,
        Self::Password,
        Self::PasswordProtectedTransport,
        Self::X509,
        Self::PreviousSession,
    ];

    /// Identifier written to `AuthnContextClassRef`.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:2.0:ac:classes:unspecified",
            Self::Password => "urn:oasis:names:tc:SAML:2.0:ac:classes:Password",
            Self::PasswordProtectedTransport => {
                "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport"
            }
            Self::X509 => "urn:oasis:names:tc:SAML:2.0:ac:classes:X509",
            Self::PreviousSession => "urn:oasis:names:tc:SAML:2.0:ac:classes:PreviousSession",
        }
    }

    /// Class named by an `AuthnContextClassRef`.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.uri() == uri)
    }
}

/// Values of `StatusCode`.
pub mod status_codes {
    /// The request was carried out.
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// The sender is at fault.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// The receiver is at fault.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
    /// Unsupported protocol version.
    pub const VERSION_MISMATCH: &str = "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch";
    /// Subject could not be authenticated.
    pub const AUTHN_FAILED: &str = "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed";
    /// No identity provider the proxy supports.
    pub const NO_SUPPORTED_IDP: &str = "urn:oasis:names:tc:SAML:2.0:status:NoSupportedIDP";
    /// Some session participants were not logged out.
    pub const PARTIAL_LOGOUT: &str = "urn:oasis:names:tc:SAML:2.0:status:PartialLogout";
    /// Refused by policy.
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";
    /// The requested binding is not offered.
    pub const UNSUPPORTED_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:status:UnsupportedBinding";
}

/// `SignatureMethod` identifiers.
pub mod signature_algorithms {
    /// RSA PKCS#1 v1.5 over SHA-256.
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    /// RSA PKCS#1 v1.5 over SHA-384.
    pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
    /// RSA PKCS#1 v1.5 over SHA-512.
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
    /// ECDSA over SHA-256.
    pub const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
    /// ECDSA over SHA-384.
    pub const ECDSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384";
    /// ECDSA over SHA-512.
    pub const ECDSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha512";
    /// RSA over SHA-1, accepted only on request.
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
}

/// `DigestMethod` identifiers.
pub mod digest_algorithms {
    /// SHA-1 digest.
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    /// SHA-256 digest.
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    /// SHA-384 digest.
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    /// SHA-512 digest.
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";
}

/// `CanonicalizationMethod` and `Transform` identifiers.
pub mod canonicalization_algorithms {
    /// Exclusive XML canonicalization without comments.
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    /// Enveloped signature transform.
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}
