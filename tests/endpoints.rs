//! SAML endpoint integration tests.
//!
//! The identity provider side of each exchange is driven through the
//! library, the service provider side through its HTTP endpoints.

mod common;

use std::sync::Arc;

use axum::http::{header, StatusCode};

use saml_websso::bindings::{encode_message, HttpRedirectBinding, SamlMessageType};
use saml_websso::clock::SystemClock;
use saml_websso::config::{ExternalIdentityProviderConfiguration, ExternalProviderConfiguration};
use saml_websso::provisioning::{HostedProviderResolver, InboundRequest};
use saml_websso::transformer::{DefaultSamlTransformer, SamlTransformer};
use saml_websso::types::{AuthenticationRequest, NameIdFormat, SamlMessage, Status};
use saml_websso::validator::{DefaultSamlValidator, SamlValidator};

use common::{
    body_string, expect_status, header_value, session_cookie, TestEnv, IDP_ENTITY_ID, IDP_HOST,
    SP_ENTITY_ID, SP_HOST,
};

/// Starts authentication at the SP and returns the request the IdP receives.
async fn start_login(env: &TestEnv) -> anyhow::Result<(AuthenticationRequest, String, String)> {
    let response = env
        .get(
            SP_HOST,
            "/saml/sp/discovery?idp=http%3A%2F%2Fidp.example.com&RelayState=%2Fhome",
            None,
        )
        .await?;
    let response = expect_status(response, StatusCode::FOUND);
    let cookie = session_cookie(&response).expect("session cookie");
    let location = header_value(&response, header::LOCATION)
        .expect("location")
        .to_string();
    assert!(location.starts_with("http://idp.example.com/saml/idp/SSO/alias/idp?SAMLRequest="));

    let decoded = HttpRedirectBinding::decode_url(&location)?;
    assert_eq!(decoded.message_type, SamlMessageType::Request);
    let relay_state = decoded.relay_state.clone().expect("relay state");

    let transformer = DefaultSamlTransformer::default();
    let message = transformer.from_xml(decoded.xml.as_bytes(), &[common::public_key(&env.sp_key)])?;
    let kind = message.kind();
    let SamlMessage::AuthnRequest(request) = message else {
        panic!("expected an AuthnRequest, got {kind}");
    };
    Ok((request, cookie, relay_state))
}

/// Answers `request` as the hosted IdP and returns the encoded response.
async fn answer(env: &TestEnv, request: &AuthenticationRequest, principal: &str) -> anyhow::Result<String> {
    let idp = env
        .state
        .resolver
        .identity_provider(&InboundRequest::new("http", IDP_HOST))
        .await?;
    let sp = idp.service_provider(&request.issuer)?;

    let validator = DefaultSamlValidator::new(Arc::new(SystemClock));
    validator.validate(&SamlMessage::AuthnRequest(request.clone()), &idp.trust_context(sp))?;

    let format = idp.name_id_format(sp, Some(request));
    let assertion = idp.assertion(sp, Some(request), principal, format)?;
    let response = idp.response(Some(request), assertion, sp)?;
    let xml = env.state.transformer.to_xml(&response.into())?;
    Ok(encode_message(&xml, false)?)
}

/// Tests that the SP metadata endpoint publishes the hosted SP.
#[tokio::test]
async fn test_sp_metadata_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = expect_status(env.get(SP_HOST, "/saml/sp/metadata", None).await?, StatusCode::OK);
    assert_eq!(
        header_value(&response, header::CONTENT_TYPE),
        Some("application/samlmetadata+xml")
    );
    let body = body_string(response).await?;
    assert!(body.contains(r#"entityID="http://sp.example.com""#));
    assert!(body.contains("SPSSODescriptor"));
    assert!(body.contains("AssertionConsumerService"));
    assert!(body.contains("http://sp.example.com/saml/sp/SSO/alias/sp"));
    assert!(body.contains("X509Certificate"));
    Ok(())
}

/// Tests that the IdP metadata endpoint follows the request host.
#[tokio::test]
async fn test_idp_metadata_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = expect_status(
        env.get("login.example.org:8443", "/saml/idp/metadata", None).await?,
        StatusCode::OK,
    );
    let body = body_string(response).await?;
    assert!(body.contains(r#"entityID="http://login.example.org:8443""#));
    assert!(body.contains("IDPSSODescriptor"));
    assert!(body.contains("SingleSignOnService"));
    assert!(body.contains("SingleLogoutService"));
    Ok(())
}

/// Tests that a single identity provider skips the selection page.
#[tokio::test]
async fn test_select_redirects_to_single_provider() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = expect_status(env.get(SP_HOST, "/saml/sp/select", None).await?, StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        Some("http://sp.example.com/saml/sp/discovery?idp=http%3A%2F%2Fidp.example.com")
    );
    Ok(())
}

/// Tests that the selection page lists providers when redirecting is off.
#[tokio::test]
async fn test_select_page_lists_providers() -> anyhow::Result<()> {
    let env = TestEnv::with_configuration(|c| {
        c.service_provider.redirect_on_single_provider = false;
    })
    .await?;

    let response = expect_status(env.get(SP_HOST, "/saml/sp/select", None).await?, StatusCode::OK);
    assert_eq!(
        header_value(&response, header::CACHE_CONTROL),
        Some("no-cache, no-store")
    );
    assert_eq!(header_value(&response, header::PRAGMA), Some("no-cache"));
    let body = body_string(response).await?;
    assert!(body.contains("Example IdP"));
    assert!(body.contains("/saml/sp/discovery?idp=http%3A%2F%2Fidp.example.com"));

    // an explicit request still redirects
    let response = env.get(SP_HOST, "/saml/sp/select?redirect=true", None).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    Ok(())
}

/// Tests the complete SP-initiated login over the POST binding.
#[tokio::test]
async fn test_sp_initiated_login() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let (request, cookie, relay_state) = start_login(&env).await?;
    assert_eq!(request.issuer, SP_ENTITY_ID);
    assert!(request.is_signature_verified());
    assert_eq!(relay_state, "/home");
    let acs = request.assertion_consumer_service_url().expect("acs").to_string();
    assert_eq!(acs, "http://sp.example.com/saml/sp/SSO/alias/sp");

    let encoded = answer(&env, &request, "alice@example.com").await?;
    let response = env
        .post_form(
            SP_HOST,
            "/saml/sp/SSO/alias/sp",
            &[("SAMLResponse", encoded.as_str()), ("RelayState", relay_state.as_str())],
            Some(&cookie),
        )
        .await?;
    let response = expect_status(response, StatusCode::OK);
    let body = body_string(response).await?;
    assert!(body.contains(r#""value":"alice@example.com""#), "{body}");
    assert!(body.contains(&format!(r#""issuer":"{IDP_ENTITY_ID}""#)));
    assert!(body.contains(r#""relay_state":"/home""#));
    assert!(body.contains("session_index"));
    Ok(())
}

/// Tests that a response is accepted only once.
#[tokio::test]
async fn test_replayed_response_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let (request, cookie, _) = start_login(&env).await?;
    let encoded = answer(&env, &request, "alice").await?;
    let fields = [("SAMLResponse", encoded.as_str())];

    let first = env.post_form(SP_HOST, "/saml/sp/SSO/alias/sp", &fields, Some(&cookie)).await?;
    assert_eq!(first.status(), StatusCode::OK);

    let replay = env.post_form(SP_HOST, "/saml/sp/SSO/alias/sp", &fields, Some(&cookie)).await?;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(replay).await?.contains("SAML Error"));
    Ok(())
}

/// Tests that a response is bound to the browser session that sent the request.
#[tokio::test]
async fn test_response_from_other_session_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let (request, _, _) = start_login(&env).await?;
    let encoded = answer(&env, &request, "alice").await?;

    let response = env
        .post_form(
            SP_HOST,
            "/saml/sp/SSO/alias/sp",
            &[("SAMLResponse", encoded.as_str())],
            Some("SAML_SESSION=someone-else"),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

/// Tests that a response signed by an unknown key is rejected.
#[tokio::test]
async fn test_forged_response_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let (request, cookie, _) = start_login(&env).await?;

    let forger = TestEnv::new().await?;
    let encoded = answer(&forger, &request, "mallory").await?;

    let response = env
        .post_form(SP_HOST, "/saml/sp/SSO/alias/sp", &[("SAMLResponse", encoded.as_str())], Some(&cookie))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

/// Tests that a failed authentication is reported, not accepted.
#[tokio::test]
async fn test_failure_status_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let (request, cookie, _) = start_login(&env).await?;

    let idp = env
        .state
        .resolver
        .identity_provider(&InboundRequest::new("http", IDP_HOST))
        .await?;
    let sp = idp.service_provider(&request.issuer)?;
    let failure = idp.failure_response(Some(&request), sp, Status::authn_failed("locked"))?;
    let xml = env.state.transformer.to_xml(&failure.into())?;
    let encoded = encode_message(&xml, false)?;

    let response = env
        .post_form(
            SP_HOST,
            "/saml/sp/SSO/alias/sp",
            &[("SAMLResponse", encoded.as_str())],
            Some(&cookie),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await?.contains("AuthnFailed"));
    Ok(())
}

/// Tests the redirect binding of the assertion consumer service.
#[tokio::test]
async fn test_response_over_redirect_binding() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let (request, cookie, _) = start_login(&env).await?;

    let idp = env
        .state
        .resolver
        .identity_provider(&InboundRequest::new("http", IDP_HOST))
        .await?;
    let sp = idp.service_provider(&request.issuer)?;
    let assertion = idp.assertion(sp, Some(&request), "bob", NameIdFormat::Persistent)?;
    let response = idp.response(Some(&request), assertion, sp)?;
    let xml = env.state.transformer.to_xml(&response.into())?;

    let location = HttpRedirectBinding::encode(
        &xml,
        "/saml/sp/SSO/alias/sp",
        Some("state-1"),
        SamlMessageType::Response,
    )?;
    let response = expect_status(env.get(SP_HOST, &location, Some(&cookie)).await?, StatusCode::OK);
    let body = body_string(response).await?;
    assert!(body.contains(r#""value":"bob""#));
    assert!(body.contains(r#""relay_state":"state-1""#));
    Ok(())
}

/// Tests that discovery with an unknown provider answers 404.
#[tokio::test]
async fn test_discovery_unknown_provider() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .get(SP_HOST, "/saml/sp/discovery?idp=https%3A%2F%2Funknown.example.com", None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_value(&response, header::PRAGMA), Some("no-cache"));
    Ok(())
}

/// Tests that the SSO path must name the hosted SP.
#[tokio::test]
async fn test_unknown_sp_alias() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let (request, cookie, _) = start_login(&env).await?;
    let encoded = answer(&env, &request, "alice").await?;

    let response = env
        .post_form(SP_HOST, "/saml/sp/SSO/alias/other", &[("SAMLResponse", encoded.as_str())], Some(&cookie))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

/// Tests that a provider reachable only over HTTP-Artifact gets no request.
///
/// Nothing is sent to the browser and no pending request or session is
/// left behind.
#[tokio::test]
async fn test_artifact_only_provider_leaves_no_pending_request() -> anyhow::Result<()> {
    let metadata = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="http://artifact.example.com">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact" Location="http://artifact.example.com/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;
    let env = TestEnv::with_configuration(|c| {
        c.service_provider.providers.push(ExternalIdentityProviderConfiguration {
            provider: ExternalProviderConfiguration {
                alias: Some("artifact".to_string()),
                metadata: metadata.to_string(),
                ..Default::default()
            },
            ..Default::default()
        });
    })
    .await?;

    let response = env
        .get(SP_HOST, "/saml/sp/discovery?idp=http%3A%2F%2Fartifact.example.com", None)
        .await?;
    let response = expect_status(response, StatusCode::BAD_REQUEST);
    assert_eq!(header_value(&response, header::LOCATION), None);
    assert_eq!(header_value(&response, header::SET_COOKIE), None);
    let body = body_string(response).await?;
    assert!(!body.contains("<form"));
    assert!(env.state.sessions.is_empty().await);

    // the working provider still gets its request stored
    let (_, cookie, _) = start_login(&env).await?;
    assert!(cookie.starts_with("SAML_SESSION="));
    assert_eq!(env.state.sessions.len().await, 1);
    Ok(())
}
