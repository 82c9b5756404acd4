//! Statements an identity provider makes about a subject.
//!
//! Assertions are built fresh for each authentication event by the identity
//! provider and travel inside exactly one [`Response`](super::Response).

use chrono::{DateTime, Utc};

use super::{AuthnContextClass, NameId, SignatureInfo, BEARER};
use crate::key::SigningCredential;

/// One `saml:Assertion` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    /// `ID`, referenced by the signature.
    pub id: String,

    /// `IssueInstant`.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// Who the statements are about.
    pub subject: Option<Subject>,

    /// Conditions that must hold for the assertion to be accepted.
    pub conditions: Option<Conditions>,

    /// How and when the subject authenticated.
    pub authn_statement: Option<AuthnStatement>,

    /// Attributes about the subject.
    pub attribute_statement: Option<AttributeStatement>,

    /// Key the transformer signs this assertion with.
    pub signing: Option<SigningCredential>,

    /// Enveloped signature found when parsing.
    pub signature: Option<SignatureInfo>,
}

impl Assertion {
    /// Creates an empty assertion.
    #[must_use]
    pub fn new(id: impl Into<String>, issuer: impl Into<String>, issue_instant: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            issue_instant,
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            authn_statement: None,
            attribute_statement: None,
            signing: None,
            signature: None,
        }
    }

    /// Adds attributes about the subject.
    #[must_use]
    pub fn with_attribute_statement(self, statement: AttributeStatement) -> Self {
        Self {
            attribute_statement: Some(statement),
            ..self
        }
    }

    /// The principal named by the subject, if any.
    #[must_use]
    pub fn principal(&self) -> Option<&NameId> {
        self.subject.as_ref().map(|s| &s.principal)
    }

    /// Returns true if the signature on this assertion was verified.
    #[must_use]
    pub fn is_signature_verified(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| s.validated)
    }
}

/// `saml:Subject`.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    /// The principal's name ID.
    pub principal: NameId,

    /// Subject confirmations.
    pub confirmations: Vec<SubjectConfirmation>,
}

/// `saml:SubjectConfirmation`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectConfirmation {
    /// Confirmation method URI.
    pub method: String,

    /// Confirmation data.
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Whoever presents the assertion is the subject.
    #[must_use]
    pub fn bearer(data: SubjectConfirmationData) -> Self {
        Self {
            method: BEARER.to_string(),
            data: Some(data),
        }
    }
}

/// `saml:SubjectConfirmationData`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectConfirmationData {
    /// ID of the request this assertion answers. `None` for IdP-initiated SSO.
    pub in_response_to: Option<String>,

    /// Confirmation is not possible before this instant.
    pub not_before: Option<DateTime<Utc>>,

    /// Confirmation is not possible from this instant on.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// URL of the assertion consumer service the assertion is delivered to.
    pub recipient: Option<String>,
}

/// `saml:Conditions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    /// Earliest valid time.
    pub not_before: Option<DateTime<Utc>>,

    /// Expiration time.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Each restriction must be satisfied on its own.
    pub audience_restrictions: Vec<AudienceRestriction>,

    /// Whether the assertion should be used only once.
    pub one_time_use: bool,
}

impl Conditions {
    /// All audiences named by any restriction.
    pub fn audiences(&self) -> impl Iterator<Item = &str> {
        self.audience_restrictions
            .iter()
            .flat_map(|r| r.audiences.iter().map(String::as_str))
    }
}

/// `saml:AudienceRestriction`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudienceRestriction {
    /// Allowed audiences (entity IDs).
    pub audiences: Vec<String>,
}

impl AudienceRestriction {
    /// Restriction naming one audience.
    #[must_use]
    pub fn single(audience: impl Into<String>) -> Self {
        let audiences = vec![audience.into()];
        Self { audiences }
    }
}

/// `saml:AuthnStatement`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthnStatement {
    /// When the authentication took place.
    pub authn_instant: DateTime<Utc>,

    /// Session index at the identity provider.
    pub session_index: Option<String>,

    /// When the IdP session ends.
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// Class reference inside `AuthnContext`.
    pub authn_context: AuthnContextClass,
}

/// `saml:AttributeStatement`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStatement {
    /// Attributes in this statement.
    pub attributes: Vec<Attribute>,
}

/// `saml:Attribute` with string values.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// `Name`, often a URN.
    pub name: String,

    /// `FriendlyName`.
    pub friendly_name: Option<String>,

    /// Text of each `AttributeValue`.
    pub values: Vec<String>,
}

impl Attribute {
    /// Attribute with one value and no friendly name.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            values: Vec::from([value.into()]),
        }
    }
}
