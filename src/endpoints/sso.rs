//! Assertion consumer service of the hosted service provider.
//!
//! Receives the identity provider's Response over either binding, checks it
//! and answers with the authenticated principal.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bindings::{DecodedMessage, HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use crate::error::SamlError;
use crate::provisioning::InboundRequest;
use crate::storage::MessageStore;
use crate::types::{NameId, Response as SamlResponse, SamlMessage};

use super::state::{session_id, SamlState};
use super::{NoCache, NO_CACHE};

/// Parameters of a Response delivered by either binding.
#[derive(Debug, Default, Deserialize)]
pub struct SsoResponseParams {
    /// The SAML response, deflated for the redirect binding.
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,

    /// Relay state.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// The user the identity provider vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    /// Subject of the assertion.
    pub name_id: NameId,
    /// Identity provider that issued the assertion.
    pub issuer: String,
    /// Session at the identity provider, needed for logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,
    /// Attribute values by attribute name.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Relay state sent along with the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_state: Option<String>,
}

/// GET handler for the assertion consumer service (HTTP-Redirect binding).
pub async fn sso_redirect(
    State(state): State<SamlState>,
    Path(alias): Path<String>,
    request: InboundRequest,
    headers: HeaderMap,
    Query(params): Query<SsoResponseParams>,
) -> Response {
    let decoded = HttpRedirectBinding::decode(
        None,
        params.saml_response.as_deref(),
        params.relay_state.as_deref(),
    );
    consume(&state, &alias, &request, &headers, decoded).await
}

/// POST handler for the assertion consumer service (HTTP-POST binding).
pub async fn sso_post(
    State(state): State<SamlState>,
    Path(alias): Path<String>,
    request: InboundRequest,
    headers: HeaderMap,
    Form(params): Form<SsoResponseParams>,
) -> Response {
    let decoded = HttpPostBinding::decode(
        None,
        params.saml_response.as_deref(),
        params.relay_state.as_deref(),
    );
    consume(&state, &alias, &request, &headers, decoded).await
}

async fn consume(
    state: &SamlState,
    alias: &str,
    request: &InboundRequest,
    headers: &HeaderMap,
    decoded: Result<DecodedMessage, SamlError>,
) -> Response {
    let result = async {
        let decoded = decoded?;
        let principal = process_response(state, alias, request, headers, &decoded).await?;
        Ok::<_, SamlError>(AuthenticatedPrincipal {
            relay_state: decoded.relay_state,
            ..principal
        })
    };
    match result.await {
        Ok(principal) => (StatusCode::OK, NO_CACHE, Json(principal)).into_response(),
        Err(e) => {
            warn!(error = %e, alias, "rejected SAML response");
            error_response(&e).into_response()
        }
    }
}

async fn process_response(
    state: &SamlState,
    alias: &str,
    request: &InboundRequest,
    headers: &HeaderMap,
    decoded: &DecodedMessage,
) -> Result<AuthenticatedPrincipal, SamlError> {
    if decoded.message_type != SamlMessageType::Response {
        return Err(SamlError::InvalidRequest(
            "expected a SAMLResponse parameter".to_string(),
        ));
    }

    let sp = state.resolver.service_provider(request).await?;
    if sp.metadata().alias_or_entity_id() != alias {
        return Err(SamlError::ProviderNotFound(alias.to_string()));
    }

    // the issuer decides which keys the signatures are checked against
    let unverified = state.transformer.from_xml(decoded.xml.as_bytes(), &[])?;
    let idp = sp.identity_provider(Some(unverified.issuer()))?;
    let trust = sp.trust_context(idp);

    let message = state
        .transformer
        .from_xml(decoded.xml.as_bytes(), &trust.verification_keys)?;
    state.validator.validate(&message, &trust)?;

    let kind = message.kind();
    let SamlMessage::Response(response) = message else {
        return Err(SamlError::InvalidRequest(format!(
            "expected a Response, got {kind}"
        )));
    };

    if let Some(destination) = &response.destination {
        let ours = sp
            .metadata()
            .descriptor
            .assertion_consumer_services
            .iter()
            .any(|acs| &acs.location == destination);
        if !ours {
            return Err(SamlError::InvalidRequest(format!(
                "response is addressed to {destination}"
            )));
        }
    }

    if let Some(in_response_to) = &response.in_response_to {
        let stored = match session_id(headers) {
            Some(session) => match state.sessions.existing(&session).await {
                Some(store) => store.retrieve(in_response_to).await,
                None => None,
            },
            None => None,
        };
        if !matches!(stored, Some(SamlMessage::AuthnRequest(_))) {
            return Err(SamlError::InvalidRequest(format!(
                "response to unknown or already answered request {in_response_to}"
            )));
        }
    }

    if !response.is_success() {
        let code = &response.status.code;
        let detail = code.sub_code.as_deref().unwrap_or(code);
        return Err(SamlError::InvalidRequest(format!(
            "identity provider answered with status {}",
            detail.value
        )));
    }

    let principal = principal(&response)?;
    info!(
        idp = %principal.issuer,
        subject = %principal.name_id.value,
        "authenticated principal"
    );
    Ok(principal)
}

fn principal(response: &SamlResponse) -> Result<AuthenticatedPrincipal, SamlError> {
    let assertion = response
        .assertions
        .iter()
        .find(|a| a.principal().is_some())
        .ok_or_else(|| SamlError::MissingElement("Assertion/Subject/NameID".to_string()))?;
    let name_id = assertion
        .principal()
        .cloned()
        .ok_or_else(|| SamlError::MissingElement("NameID".to_string()))?;

    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for attribute in response
        .assertions
        .iter()
        .filter_map(|a| a.attribute_statement.as_ref())
        .flat_map(|s| &s.attributes)
    {
        attributes
            .entry(attribute.name.clone())
            .or_default()
            .extend(attribute.values.iter().cloned());
    }

    Ok(AuthenticatedPrincipal {
        name_id,
        issuer: assertion.issuer.clone(),
        session_index: assertion
            .authn_statement
            .as_ref()
            .and_then(|s| s.session_index.clone()),
        attributes,
        relay_state: None,
    })
}

/// Creates an error response page.
pub(crate) fn error_response(err: &SamlError) -> (StatusCode, NoCache, Html<String>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>SAML Error</title></head>
<body>
<h1>SAML Error</h1>
<p>{}</p>
</body>
</html>"#,
        crate::bindings::html_escape(&err.to_string())
    );
    (status, NO_CACHE, Html(html))
}
