//! Validation of received messages.
//!
//! Signatures are verified while parsing (see
//! [`SamlTransformer::from_xml`](crate::transformer::SamlTransformer::from_xml));
//! the validator checks what the parse recorded, together with issuer,
//! validity windows and audience.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{SamlError, SamlResult};
use crate::key::KeyData;
use crate::types::{Assertion, Response, SamlMessage, SignatureInfo};

/// What a received message is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustContext {
    /// Entity ID of the peer expected to have issued the message.
    pub entity_id: String,
    /// Keys the peer signs with. Passed to the transformer when parsing.
    pub verification_keys: Vec<KeyData>,
    /// Entity ID of the local provider, the required audience.
    pub local_entity_id: String,
    /// Whether an unsigned message is refused.
    pub want_signed: bool,
}

/// Validator tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Allowed clock difference between the peers, in seconds.
    #[serde(default = "default_clock_skew")]
    pub max_clock_skew_secs: i64,
}

fn default_clock_skew() -> i64 {
    60
}

impl ValidationSettings {
    /// The skew as a duration; negative or oversized values are refused.
    pub fn clock_skew(&self) -> SamlResult<Duration> {
        crate::config::seconds("max_clock_skew_secs", self.max_clock_skew_secs)
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_clock_skew_secs: default_clock_skew(),
        }
    }
}

/// Checks a parsed message.
pub trait SamlValidator: Send + Sync {
    /// Fails with `SignatureInvalid`, `ExpiredMessage`, `UntrustedIssuer`
    /// or `AudienceMismatch`.
    fn validate(&self, message: &SamlMessage, trust: &TrustContext) -> SamlResult<()>;
}

/// Validator using an injected clock.
#[derive(Debug, Clone)]
pub struct DefaultSamlValidator {
    clock: Arc<dyn Clock>,
    settings: ValidationSettings,
}

impl DefaultSamlValidator {
    /// Creates a validator with default settings.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            settings: ValidationSettings::default(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: ValidationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Now moved by the clock skew, `forward` or back.
    fn skewed_now(&self, forward: bool) -> SamlResult<DateTime<Utc>> {
        let skew = self.settings.clock_skew()?;
        let now = self.clock.now();
        let shifted = if forward {
            now.checked_add_signed(skew)
        } else {
            now.checked_sub_signed(skew)
        };
        shifted.ok_or_else(|| {
            SamlError::Configuration("max_clock_skew_secs is out of range".to_string())
        })
    }

    fn check_issuer(issuer: &str, trust: &TrustContext) -> SamlResult<()> {
        if issuer != trust.entity_id {
            warn!(expected = %trust.entity_id, actual = %issuer, "untrusted issuer");
            return Err(SamlError::UntrustedIssuer {
                expected: trust.entity_id.clone(),
                actual: issuer.to_string(),
            });
        }
        Ok(())
    }

    fn check_issued(&self, what: &str, issue_instant: DateTime<Utc>) -> SamlResult<()> {
        if issue_instant > self.skewed_now(true)? {
            return Err(SamlError::ExpiredMessage(format!(
                "{what} issued in the future at {issue_instant}"
            )));
        }
        Ok(())
    }

    fn check_not_before(&self, what: &str, not_before: Option<DateTime<Utc>>) -> SamlResult<()> {
        match not_before {
            Some(at) if at > self.skewed_now(true)? => Err(SamlError::ExpiredMessage(format!(
                "{what} not valid before {at}"
            ))),
            _ => Ok(()),
        }
    }

    fn check_not_on_or_after(
        &self,
        what: &str,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> SamlResult<()> {
        match not_on_or_after {
            Some(at) if self.skewed_now(false)? >= at => Err(SamlError::ExpiredMessage(format!(
                "{what} expired at {at}"
            ))),
            _ => Ok(()),
        }
    }

    fn check_assertion(&self, assertion: &Assertion, trust: &TrustContext) -> SamlResult<()> {
        Self::check_issuer(&assertion.issuer, trust)?;
        self.check_issued("assertion", assertion.issue_instant)?;

        let conditions = assertion.conditions.as_ref();
        self.check_not_before("assertion", conditions.and_then(|c| c.not_before))?;
        self.check_not_on_or_after("assertion", conditions.and_then(|c| c.not_on_or_after))?;

        for confirmation in assertion.subject.iter().flat_map(|s| &s.confirmations) {
            if let Some(data) = &confirmation.data {
                self.check_not_before("subject confirmation", data.not_before)?;
                self.check_not_on_or_after("subject confirmation", data.not_on_or_after)?;
            }
        }
        if let Some(statement) = &assertion.authn_statement {
            self.check_not_on_or_after("session", statement.session_not_on_or_after)?;
        }

        let audiences: Vec<&str> = conditions.map(|c| c.audiences().collect()).unwrap_or_default();
        if !audiences.contains(&trust.local_entity_id.as_str()) {
            return Err(SamlError::AudienceMismatch {
                expected: trust.local_entity_id.clone(),
                actual: audiences.join(", "),
            });
        }
        Ok(())
    }

    fn check_response(&self, response: &Response, trust: &TrustContext) -> SamlResult<()> {
        Self::check_issuer(&response.issuer, trust)?;
        self.check_issued("response", response.issue_instant)?;

        // either the response or every assertion it carries
        let signed = verified(response.signature.as_ref())
            || (!response.assertions.is_empty()
                && response.assertions.iter().all(Assertion::is_signature_verified));
        if trust.want_signed && !signed {
            return Err(SamlError::SignatureInvalid(format!(
                "response '{}' carries no verified signature",
                response.id
            )));
        }

        for assertion in &response.assertions {
            self.check_assertion(assertion, trust)?;
        }
        Ok(())
    }
}

fn verified(signature: Option<&SignatureInfo>) -> bool {
    signature.is_some_and(|s| s.validated)
}

fn require_signature(
    kind: &str,
    id: &str,
    signature: Option<&SignatureInfo>,
    trust: &TrustContext,
) -> SamlResult<()> {
    if trust.want_signed && !verified(signature) {
        return Err(SamlError::SignatureInvalid(format!(
            "{kind} '{id}' carries no verified signature"
        )));
    }
    Ok(())
}

impl SamlValidator for DefaultSamlValidator {
    fn validate(&self, message: &SamlMessage, trust: &TrustContext) -> SamlResult<()> {
        match message {
            SamlMessage::AuthnRequest(request) => {
                Self::check_issuer(&request.issuer, trust)?;
                require_signature("AuthnRequest", &request.id, request.signature.as_ref(), trust)?;
                self.check_issued("AuthnRequest", request.issue_instant)?;
            }
            SamlMessage::Response(response) => self.check_response(response, trust)?,
            SamlMessage::Assertion(assertion) => {
                require_signature("Assertion", &assertion.id, assertion.signature.as_ref(), trust)?;
                self.check_assertion(assertion, trust)?;
            }
            SamlMessage::LogoutRequest(request) => {
                Self::check_issuer(&request.issuer, trust)?;
                require_signature("LogoutRequest", &request.id, request.signature.as_ref(), trust)?;
                self.check_issued("LogoutRequest", request.issue_instant)?;
                self.check_not_on_or_after("LogoutRequest", request.not_on_or_after)?;
            }
            SamlMessage::LogoutResponse(response) => {
                Self::check_issuer(&response.issuer, trust)?;
                require_signature(
                    "LogoutResponse",
                    &response.id,
                    response.signature.as_ref(),
                    trust,
                )?;
                self.check_issued("LogoutResponse", response.issue_instant)?;
            }
            SamlMessage::Metadata(metadata) => {
                Self::check_issuer(&metadata.entity_id, trust)?;
                require_signature("metadata", &metadata.id, metadata.signature.as_ref(), trust)?;
            }
        }
        debug!(kind = message.kind(), id = %message.id(), issuer = %message.issuer(), "message validated");
        Ok(())
    }
}
