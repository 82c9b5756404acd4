//! SAML Status types.

use serde::{Deserialize, Serialize};

use super::status_codes;

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub code: StatusCode,

    /// `StatusMessage` text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// Plain `Success`.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: StatusCode::new(status_codes::SUCCESS),
            message: None,
        }
    }

    /// Top-level `Requester` with a message.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::new(status_codes::REQUESTER),
            message: Some(message.into()),
        }
    }

    /// Top-level `Responder` with a message.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::new(status_codes::RESPONDER),
            message: Some(message.into()),
        }
    }

    /// Creates an authentication failed status (Responder / AuthnFailed).
    #[must_use]
    pub fn authn_failed(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::new(status_codes::RESPONDER)
                .with_sub_code(status_codes::AUTHN_FAILED),
            message: Some(message.into()),
        }
    }

    /// Whether the top-level code is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code.value == status_codes::SUCCESS
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code with an optional nested sub-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI.
    pub value: String,

    /// Nested second-level code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a top-level status code.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sub_code: None,
        }
    }

    /// Nests a second-level code.
    #[must_use]
    pub fn with_sub_code(mut self, value: impl Into<String>) -> Self {
        self.sub_code = Some(Box::new(Self::new(value)));
        self
    }
}
