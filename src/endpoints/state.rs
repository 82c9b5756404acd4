//! SAML endpoint state management.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};

use crate::clock::SystemClock;
use crate::config::SamlConfiguration;
use crate::error::SamlResult;
use crate::provisioning::{HostBasedProvisioning, HostedProviderResolver, InboundRequest, MetadataCache};
use crate::storage::SessionStores;
use crate::transformer::{DefaultSamlTransformer, SamlTransformer};
use crate::validator::{DefaultSamlValidator, SamlValidator};

/// Name of the cookie separating browser sessions.
pub const SESSION_COOKIE: &str = "SAML_SESSION";

/// SAML endpoint state.
///
/// Contains the configuration and services needed by SAML endpoints.
#[derive(Clone)]
pub struct SamlState {
    /// Configuration, for settings the hosted providers do not carry.
    pub configuration: Arc<SamlConfiguration>,
    /// Derives the hosted providers for a request.
    pub resolver: Arc<dyn HostedProviderResolver>,
    /// Reads and writes protocol messages.
    pub transformer: Arc<dyn SamlTransformer>,
    /// Checks received messages.
    pub validator: Arc<dyn SamlValidator>,
    /// Sent messages, per browser session.
    pub sessions: Arc<SessionStores>,
}

impl SamlState {
    /// Creates a new SAML state with default session limits.
    #[must_use]
    pub fn new(
        configuration: Arc<SamlConfiguration>,
        resolver: Arc<dyn HostedProviderResolver>,
        transformer: Arc<dyn SamlTransformer>,
        validator: Arc<dyn SamlValidator>,
    ) -> Self {
        Self {
            configuration,
            resolver,
            transformer,
            validator,
            sessions: Arc::new(SessionStores::new()),
        }
    }

    /// Replaces the session registry.
    #[must_use]
    pub fn with_sessions(mut self, sessions: SessionStores) -> Self {
        self.sessions = Arc::new(sessions);
        self
    }

    /// State using host based provisioning and the system clock.
    pub fn from_configuration(
        configuration: SamlConfiguration,
        cache: Arc<dyn MetadataCache>,
    ) -> SamlResult<Self> {
        let sessions = SessionStores::with_limits(Arc::new(SystemClock), configuration.sessions)?;
        let configuration = Arc::new(configuration);
        let transformer: Arc<dyn SamlTransformer> = Arc::new(DefaultSamlTransformer::default());
        let resolver = HostBasedProvisioning::new(
            Arc::clone(&configuration),
            Arc::clone(&transformer),
            cache,
        );
        let validator = DefaultSamlValidator::new(Arc::new(SystemClock))
            .with_settings(configuration.validation);
        Ok(Self::new(
            configuration,
            Arc::new(resolver),
            transformer,
            Arc::new(validator),
        )
        .with_sessions(sessions))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for InboundRequest {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scheme = parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.scheme_str())
            .unwrap_or("http");
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");

        let mut request = Self::from_host_header(scheme, host);
        if let Some(query) = parts.uri.query() {
            request.params = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        }
        Ok(request)
    }
}

/// Value of the session cookie, if the browser sent one.
pub(crate) fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
