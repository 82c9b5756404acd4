//! Protocol endpoints advertised in metadata.

use serde::{Deserialize, Serialize};

use crate::types::Binding;

/// An indexed protocol endpoint.
///
/// At most one endpoint in a list should be marked default; when several
/// are, the first one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// URL of the endpoint.
    pub location: String,
    /// Binding the endpoint accepts.
    pub binding: Binding,
    /// Index, unique within its list.
    pub index: u32,
    /// Whether this is the default endpoint of its list.
    #[serde(default)]
    pub is_default: bool,
}

impl Endpoint {
    /// Creates a non-default endpoint.
    #[must_use]
    pub fn new(location: impl Into<String>, binding: Binding, index: u32) -> Self {
        Self {
            location: location.into(),
            binding,
            index,
            is_default: false,
        }
    }

    /// Marks the endpoint as default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}
