//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};
use tower::ServiceExt;

use saml_websso::config::{
    ExternalIdentityProviderConfiguration, ExternalProviderConfiguration,
    ExternalServiceProviderConfiguration, SamlConfiguration,
};
use saml_websso::endpoints::{saml_router, SamlState};
use saml_websso::key::{KeyData, KeyType};
use saml_websso::provisioning::StaticMetadataCache;

/// Host the service provider is reached under.
pub const SP_HOST: &str = "sp.example.com";
/// Host the identity provider is reached under.
pub const IDP_HOST: &str = "idp.example.com";
/// Entity ID of the hosted service provider.
pub const SP_ENTITY_ID: &str = "http://sp.example.com";
/// Entity ID of the hosted identity provider.
pub const IDP_ENTITY_ID: &str = "http://idp.example.com";
/// Where the service provider publishes its metadata.
pub const SP_METADATA_URL: &str = "http://sp.example.com/saml/sp/metadata";
/// Where the identity provider publishes its metadata.
pub const IDP_METADATA_URL: &str = "http://idp.example.com/saml/idp/metadata";

/// Generates an RSA key with a self-signed certificate.
pub fn generate_key(name: &str) -> anyhow::Result<KeyData> {
    let key = PKey::from_rsa(Rsa::generate(2048)?)?;

    let mut subject = X509NameBuilder::new()?;
    subject.append_entry_by_text("CN", name)?;
    let subject = subject.build();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = BigNum::from_u32(1)?.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(&subject)?;
    builder.set_pubkey(&key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(30)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.sign(&key, MessageDigest::sha256())?;

    let certificate = String::from_utf8(builder.build().to_pem()?)?;
    let private_key = String::from_utf8(key.private_key_to_pem_pkcs8()?)?;
    Ok(KeyData::new(name, certificate, KeyType::Signing).with_private_key(private_key, None))
}

/// Certificate half of `key`.
pub fn public_key(key: &KeyData) -> KeyData {
    KeyData::new(key.name(), key.certificate(), KeyType::Signing)
}

/// A service provider and an identity provider trusting each other.
///
/// Remote metadata is referenced by URL and served from the cache.
pub fn configuration(sp_key: &KeyData, idp_key: &KeyData) -> SamlConfiguration {
    let mut configuration = SamlConfiguration::default();

    let sp = &mut configuration.service_provider;
    sp.provider.alias = Some("sp".to_string());
    sp.provider.keys.active = Some(sp_key.clone());
    sp.provider.single_logout_enabled = true;
    sp.sign_requests = true;
    sp.providers = vec![ExternalIdentityProviderConfiguration {
        provider: ExternalProviderConfiguration {
            alias: Some("idp".to_string()),
            metadata: IDP_METADATA_URL.to_string(),
            linktext: Some("Example IdP".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }];

    let idp = &mut configuration.identity_provider;
    idp.provider.alias = Some("idp".to_string());
    idp.provider.keys.active = Some(idp_key.clone());
    idp.provider.single_logout_enabled = true;
    idp.want_requests_signed = true;
    idp.providers = vec![ExternalServiceProviderConfiguration {
        provider: ExternalProviderConfiguration {
            alias: Some("sp".to_string()),
            metadata: SP_METADATA_URL.to_string(),
            ..Default::default()
        },
        sign_responses: true,
    }];

    configuration
}

/// Test environment hosting both providers in one router.
pub struct TestEnv {
    /// The application under test.
    pub app: Router,
    /// Shared state of the application.
    pub state: SamlState,
    /// Metadata served for the configured URLs.
    pub cache: Arc<StaticMetadataCache>,
    /// Key of the service provider.
    pub sp_key: KeyData,
    /// Key of the identity provider.
    pub idp_key: KeyData,
}

impl TestEnv {
    /// Creates the environment and publishes both metadata documents.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_configuration(|_| {}).await
    }

    /// Like [`TestEnv::new`], adjusting the configuration first.
    pub async fn with_configuration(
        adjust: impl FnOnce(&mut SamlConfiguration),
    ) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("saml_websso=debug")
            .with_test_writer()
            .try_init();

        let sp_key = generate_key("sp")?;
        let idp_key = generate_key("idp")?;
        let mut configuration = configuration(&sp_key, &idp_key);
        adjust(&mut configuration);

        let cache = Arc::new(StaticMetadataCache::new());
        let state = SamlState::from_configuration(configuration, cache.clone())?;
        let app = saml_router(&state.configuration).with_state(state.clone());

        let env = Self {
            app,
            state,
            cache,
            sp_key,
            idp_key,
        };
        let sp_metadata = env.get(SP_HOST, "/saml/sp/metadata", None).await?;
        env.cache.insert(SP_METADATA_URL, body_string(sp_metadata).await?);
        let idp_metadata = env.get(IDP_HOST, "/saml/idp/metadata", None).await?;
        env.cache.insert(IDP_METADATA_URL, body_string(idp_metadata).await?);
        Ok(env)
    }

    /// Sends a GET request to `host`.
    pub async fn get(
        &self,
        host: &str,
        uri: &str,
        cookie: Option<&str>,
    ) -> anyhow::Result<Response<Body>> {
        let mut request = Request::get(uri).header(header::HOST, host);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        Ok(self.app.clone().oneshot(request.body(Body::empty())?).await?)
    }

    /// Posts a form to `host`.
    pub async fn post_form(
        &self,
        host: &str,
        uri: &str,
        fields: &[(&str, &str)],
        cookie: Option<&str>,
    ) -> anyhow::Result<Response<Body>> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut request = Request::post(uri)
            .header(header::HOST, host)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        Ok(self.app.clone().oneshot(request.body(Body::from(body))?).await?)
    }
}

/// Reads the whole body as text.
pub async fn body_string(response: Response<Body>) -> anyhow::Result<String> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Value of a response header.
pub fn header_value<'a>(response: &'a Response<Body>, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// `name=value` part of a `Set-Cookie` header.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    header_value(response, header::SET_COOKIE)
        .and_then(|cookie| cookie.split(';').next())
        .map(str::to_string)
}

/// Asserts the status and returns the response for further checks.
pub fn expect_status(response: Response<Body>, status: StatusCode) -> Response<Body> {
    assert_eq!(response.status(), status, "unexpected status");
    response
}
