//! Identity provider selection and SP-initiated single sign-on.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use tracing::{debug, info, warn};

use crate::bindings::{html_escape, send_message, OutboundMessage, SamlMessageType};
use crate::error::SamlError;
use crate::provisioning::{identity_provider_links, InboundRequest, ProviderLink};
use crate::storage::MessageStore;
use crate::types::SamlMessage;

use super::sso::error_response;
use super::state::{session_id, SamlState, SESSION_COOKIE};
use super::NO_CACHE;

/// GET handler for the identity provider selection page.
///
/// With exactly one provider the page is skipped when
/// `redirect_on_single_provider` is configured or `redirect=true` is passed.
pub async fn select_provider(State(state): State<SamlState>, request: InboundRequest) -> Response {
    let sp = match state.resolver.service_provider(&request).await {
        Ok(sp) => sp,
        Err(e) => {
            warn!(error = %e, "unable to provision service provider");
            return error_response(&e).into_response();
        }
    };
    let configuration = &state.configuration.service_provider;
    let links = identity_provider_links(&sp, &request.base_url(), configuration.prefix());

    let forced = request
        .param("redirect")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if let [single] = links.as_slice() {
        if configuration.redirect_on_single_provider || forced {
            debug!(url = %single.url, "single identity provider, skipping selection");
            return found(&single.url).into_response();
        }
    }

    (StatusCode::OK, NO_CACHE, Html(selection_page(&links))).into_response()
}

/// GET handler starting authentication with the provider named by `idp`.
///
/// Once the request could be encoded for its binding it is remembered in
/// the browser's session store so the response can be matched to it. A
/// cookie naming no live session gets a new one.
pub async fn discovery(
    State(state): State<SamlState>,
    request: InboundRequest,
    headers: HeaderMap,
) -> Response {
    match start_authentication(&state, &request).await {
        Ok((outbound, authn)) => {
            let live = match session_id(&headers) {
                Some(session) => state
                    .sessions
                    .existing(&session)
                    .await
                    .map(|store| (session, store)),
                None => None,
            };
            let (session, store, new_session) = match live {
                Some((session, store)) => (session, store, false),
                None => {
                    let (session, store) = state.sessions.open().await;
                    (session, store, true)
                }
            };
            store.store(authn).await;

            let mut response = match outbound {
                OutboundMessage::Redirect { location } => found(&location).into_response(),
                OutboundMessage::Post { html, .. } => {
                    (StatusCode::OK, NO_CACHE, Html(html)).into_response()
                }
            };
            if new_session {
                let secure = if request.scheme == "https" {
                    "; Secure; SameSite=None"
                } else {
                    ""
                };
                let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly{secure}");
                if let Ok(value) = cookie.parse() {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
            }
            response
        }
        Err(e) => {
            warn!(error = %e, "unable to start authentication");
            error_response(&e).into_response()
        }
    }
}

async fn start_authentication(
    state: &SamlState,
    request: &InboundRequest,
) -> Result<(OutboundMessage, SamlMessage), SamlError> {
    let sp = state.resolver.service_provider(request).await?;
    let idp = sp.identity_provider(request.param("idp"))?;
    let authn = sp.authentication_request(
        idp,
        idp.configuration.assertion_consumer_service_index,
        None,
    )?;
    let destination = authn.destination.clone().ok_or_else(|| {
        SamlError::Metadata(format!("no destination for {}", idp.entity_id()))
    })?;

    let authn: SamlMessage = authn.into();
    let xml = state.transformer.to_xml(&authn)?;
    let outbound = send_message(
        &xml,
        &destination,
        SamlMessageType::Request,
        request.param("RelayState"),
    )?;
    info!(idp = %idp.entity_id(), binding = ?destination.binding, "redirecting to identity provider");
    Ok((outbound, authn))
}

fn found(location: &str) -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location.to_string()),
            (header::CACHE_CONTROL, "no-cache, no-store".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
        ],
    )
}

fn selection_page(links: &[ProviderLink]) -> String {
    let items: String = links
        .iter()
        .map(|link| {
            format!(
                "        <li><a href=\"{}\">{}</a></li>\n",
                html_escape(&link.url),
                html_escape(&link.linktext)
            )
        })
        .collect();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Select Identity Provider</title>
</head>
<body>
    <h1>Select Identity Provider</h1>
    <ul>
{items}    </ul>
</body>
</html>"#
    )
}
