//! SAML Name ID types.

use serde::{Deserialize, Serialize};

use super::NameIdFormat;

/// SAML Name ID.
///
/// Identifies the subject of an assertion or a logout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier value.
    pub value: String,

    /// The format of the identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<NameIdFormat>,

    /// Qualifier naming the domain of the identifier. Set to the SP alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// Entity ID of the SP the identifier was issued for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Creates a name ID with the given value and format.
    #[must_use]
    pub fn new(value: impl Into<String>, format: NameIdFormat) -> Self {
        Self {
            value: value.into(),
            format: Some(format),
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// With `NameQualifier`.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.name_qualifier = qualifier;
        self
    }

    /// With `SPNameQualifier`.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }
}

/// `samlp:NameIDPolicy` of an AuthnRequest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIdPolicy {
    /// Format the requester asks for.
    pub format: Option<NameIdFormat>,
    /// The SP name qualifier.
    pub sp_name_qualifier: Option<String>,
    /// Whether the IdP may create a new identifier for the subject.
    pub allow_create: bool,
}

impl NameIdPolicy {
    /// Creates a policy requesting `format` for the SP `sp_entity_id`.
    #[must_use]
    pub fn new(format: NameIdFormat, sp_entity_id: impl Into<String>) -> Self {
        Self {
            format: Some(format),
            sp_name_qualifier: Some(sp_entity_id.into()),
            allow_create: true,
        }
    }
}
