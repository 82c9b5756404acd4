//! Hosted provider provisioning.
//!
//! The hosted providers are derived per inbound request: the entity ID
//! defaults to the URL the request arrived on, so one configuration serves
//! every host name it is reachable under. Remote providers are loaded from
//! their configured metadata on the same pass.

mod cache;
mod discovery;

pub use cache::*;
pub use discovery::*;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::builder::{
    HostedIdentityProvider, HostedServiceProvider, RemoteIdentityProvider, RemoteProvider,
    RemoteServiceProvider,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{
    ExternalProviderConfiguration, LocalProviderConfiguration, MetadataSource, SamlConfiguration,
};
use crate::error::{SamlError, SamlResult};
use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::key::KeyData;
use crate::metadata::{
    Endpoint, EntityMetadata, IdentityProviderDescriptor, IdentityProviderMetadata,
    ServiceProviderDescriptor, ServiceProviderMetadata,
};
use crate::transformer::SamlTransformer;
use crate::types::{Binding, NameIdFormat, SamlMessage};

/// The parts of an HTTP request provisioning depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    /// `http` or `https`.
    pub scheme: String,
    /// Host name, without port.
    pub host: String,
    /// Port, when not implied by the scheme.
    pub port: Option<u16>,
    /// Path the application is mounted under, e.g. `/app`.
    pub context_path: String,
    /// Query or form parameters.
    pub params: HashMap<String, String>,
}

impl InboundRequest {
    /// Creates a request for `scheme://host`.
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    /// Parses a `Host` header value such as `sp.example.com:8443`.
    #[must_use]
    pub fn from_host_header(scheme: impl Into<String>, header: &str) -> Self {
        let (host, port) = match header.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') || host.ends_with(']') => {
                match port.parse() {
                    Ok(port) => (host, Some(port)),
                    Err(_) => (header, None),
                }
            }
            _ => (header, None),
        };
        let mut request = Self::new(scheme, host);
        request.port = port;
        request
    }

    /// Parameter value, if present.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// `scheme://host[:port][context_path]`, without a trailing slash.
    ///
    /// The port is left out when it is the default for the scheme.
    #[must_use]
    pub fn base_url(&self) -> String {
        let default_port = match self.scheme.as_str() {
            "https" => Some(443),
            "http" => Some(80),
            _ => None,
        };
        let port = match self.port {
            Some(port) if Some(port) != default_port => format!(":{port}"),
            _ => String::new(),
        };
        let context = self.context_path.trim_end_matches('/');
        format!("{}://{}{port}{context}", self.scheme, self.host)
    }
}

/// Maps an inbound request to the providers hosted for it.
#[async_trait]
pub trait HostedProviderResolver: Send + Sync {
    /// The hosted service provider, with its trusted identity providers.
    async fn service_provider(&self, request: &InboundRequest) -> SamlResult<HostedServiceProvider>;

    /// The hosted identity provider, with its known service providers.
    async fn identity_provider(&self, request: &InboundRequest)
        -> SamlResult<HostedIdentityProvider>;
}

/// Derives hosted metadata from configuration and the request host.
#[derive(Clone)]
pub struct HostBasedProvisioning {
    configuration: Arc<SamlConfiguration>,
    transformer: Arc<dyn SamlTransformer>,
    cache: Arc<dyn MetadataCache>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for HostBasedProvisioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBasedProvisioning")
            .field("clock", &self.clock)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl HostBasedProvisioning {
    /// Creates provisioning using the system clock and random identifiers.
    #[must_use]
    pub fn new(
        configuration: Arc<SamlConfiguration>,
        transformer: Arc<dyn SamlTransformer>,
        cache: Arc<dyn MetadataCache>,
    ) -> Self {
        Self {
            configuration,
            transformer,
            cache,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIdGenerator),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the identifier source.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// The configuration providers are derived from.
    #[must_use]
    pub fn configuration(&self) -> &SamlConfiguration {
        &self.configuration
    }

    /// Loads and, if configured, verifies the metadata of a remote provider.
    pub async fn remote_metadata(
        &self,
        configuration: &ExternalProviderConfiguration,
    ) -> SamlResult<EntityMetadata> {
        let xml = match configuration.metadata_source() {
            MetadataSource::Xml(xml) => xml.to_string(),
            MetadataSource::Url(url) => {
                self.cache
                    .fetch(url, configuration.skip_ssl_validation)
                    .await?
            }
        };

        let keys: &[KeyData] = if configuration.metadata_trust_check {
            if configuration.verification_keys.is_empty() {
                return Err(SamlError::Configuration(
                    "metadata trust check requires verification keys".to_string(),
                ));
            }
            &configuration.verification_keys
        } else {
            &[]
        };

        let SamlMessage::Metadata(mut metadata) = self.transformer.from_xml(xml.as_bytes(), keys)?
        else {
            return Err(SamlError::Metadata(
                "document is not an EntityDescriptor".to_string(),
            ));
        };

        if configuration.metadata_trust_check
            && !metadata.signature.as_ref().is_some_and(|s| s.validated)
        {
            return Err(SamlError::SignatureInvalid(format!(
                "metadata of '{}' is not signed by a trusted key",
                metadata.entity_id
            )));
        }
        metadata.entity_alias = configuration.alias.clone();
        debug!(entity_id = %metadata.entity_id, "loaded remote metadata");
        Ok(metadata)
    }

    async fn remote_providers<C, D>(
        &self,
        configurations: &[C],
        common: impl Fn(&C) -> &ExternalProviderConfiguration,
        role: impl Fn(&EntityMetadata) -> Option<crate::metadata::ProviderMetadata<D>>,
    ) -> Vec<RemoteProvider<C, D>>
    where
        C: Clone,
    {
        let mut providers = Vec::with_capacity(configurations.len());
        for configuration in configurations {
            // unusable providers are left out, not fatal
            match self.remote_metadata(common(configuration)).await {
                Ok(metadata) => match role(&metadata) {
                    Some(metadata) => providers.push(RemoteProvider {
                        configuration: configuration.clone(),
                        metadata,
                    }),
                    None => warn!(
                        entity_id = %metadata.entity_id,
                        "remote metadata lacks the expected role"
                    ),
                },
                Err(e) => warn!(
                    alias = ?common(configuration).alias,
                    error = %e,
                    "unable to load remote provider"
                ),
            }
        }
        providers
    }

    fn hosted_basics(
        &self,
        request: &InboundRequest,
        configuration: &LocalProviderConfiguration,
    ) -> Hosted {
        let base_url = request.base_url();
        let entity_id = configuration
            .entity_id
            .clone()
            .unwrap_or_else(|| base_url.clone());
        let alias_path = urlencoding::encode(configuration.alias.as_deref().unwrap_or(&entity_id))
            .into_owned();
        let signing_key = if configuration.sign_metadata {
            configuration.keys.active.clone()
        } else {
            None
        };
        let name_ids = if configuration.name_ids.is_empty() {
            vec![NameIdFormat::Persistent, NameIdFormat::Email]
        } else {
            configuration.name_ids.clone()
        };
        Hosted {
            base_url,
            entity_id,
            alias_path,
            signing_key,
            keys: configuration.keys.all(),
            name_ids,
        }
    }
}

struct Hosted {
    base_url: String,
    entity_id: String,
    alias_path: String,
    signing_key: Option<KeyData>,
    keys: Vec<KeyData>,
    name_ids: Vec<NameIdFormat>,
}

impl Hosted {
    fn endpoint(&self, prefix: &str, path: &str, binding: Binding, index: u32) -> Endpoint {
        Endpoint::new(
            format!("{}/{prefix}{path}/alias/{}", self.base_url, self.alias_path),
            binding,
            index,
        )
    }

    fn single_logout(&self, prefix: &str, enabled: bool) -> Vec<Endpoint> {
        if enabled {
            vec![self.endpoint(prefix, "logout", Binding::Redirect, 0).as_default()]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl HostedProviderResolver for HostBasedProvisioning {
    async fn service_provider(&self, request: &InboundRequest) -> SamlResult<HostedServiceProvider> {
        let configuration = &self.configuration.service_provider;
        let local = &configuration.provider;
        let hosted = self.hosted_basics(request, local);
        let prefix = configuration.prefix();

        let metadata = ServiceProviderMetadata {
            id: self.ids.message_id(),
            entity_id: hosted.entity_id.clone(),
            entity_alias: local.alias.clone(),
            signing_key: hosted.signing_key.clone(),
            signing_algorithm: local.default_signing_algorithm,
            digest_algorithm: local.default_digest,
            descriptor: ServiceProviderDescriptor {
                keys: hosted.keys.clone(),
                name_ids: hosted.name_ids.clone(),
                assertion_consumer_services: vec![
                    hosted.endpoint(prefix, "SSO", Binding::Post, 0).as_default(),
                    hosted.endpoint(prefix, "SSO", Binding::Redirect, 1),
                ],
                single_logout_services: hosted.single_logout(prefix, local.single_logout_enabled),
                authn_requests_signed: configuration.sign_requests && hosted.signing_key.is_some(),
                want_assertions_signed: configuration.want_assertions_signed,
            },
        };

        let providers: Vec<RemoteIdentityProvider> = self
            .remote_providers(
                configuration.providers.as_slice(),
                |c| &c.provider,
                EntityMetadata::identity_provider,
            )
            .await;
        debug!(entity_id = %metadata.entity_id, providers = providers.len(), "provisioned service provider");

        Ok(HostedServiceProvider::new(
            metadata,
            providers,
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
        ))
    }

    async fn identity_provider(
        &self,
        request: &InboundRequest,
    ) -> SamlResult<HostedIdentityProvider> {
        let configuration = &self.configuration.identity_provider;
        let local = &configuration.provider;
        let hosted = self.hosted_basics(request, local);
        let prefix = configuration.prefix();

        let metadata = IdentityProviderMetadata {
            id: self.ids.message_id(),
            entity_id: hosted.entity_id.clone(),
            entity_alias: local.alias.clone(),
            signing_key: hosted.signing_key.clone(),
            signing_algorithm: local.default_signing_algorithm,
            digest_algorithm: local.default_digest,
            descriptor: IdentityProviderDescriptor {
                keys: hosted.keys.clone(),
                name_ids: hosted.name_ids.clone(),
                single_sign_on_services: vec![
                    hosted.endpoint(prefix, "SSO", Binding::Redirect, 0).as_default(),
                    hosted.endpoint(prefix, "SSO", Binding::Post, 1),
                ],
                single_logout_services: hosted.single_logout(prefix, local.single_logout_enabled),
                want_authn_requests_signed: configuration.want_requests_signed,
            },
        };

        let providers: Vec<RemoteServiceProvider> = self
            .remote_providers(
                configuration.providers.as_slice(),
                |c| &c.provider,
                EntityMetadata::service_provider,
            )
            .await;
        debug!(entity_id = %metadata.entity_id, providers = providers.len(), "provisioned identity provider");

        Ok(HostedIdentityProvider::new(
            metadata,
            providers,
            configuration.time_windows()?,
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExternalIdentityProviderConfiguration, RotatingKeys};
    use crate::transformer::DefaultSamlTransformer;
    use crate::testing;

    fn provisioning(configuration: SamlConfiguration, cache: StaticMetadataCache) -> HostBasedProvisioning {
        HostBasedProvisioning::new(
            Arc::new(configuration),
            Arc::new(DefaultSamlTransformer::default()),
            Arc::new(cache),
        )
    }

    fn idp_metadata_xml() -> String {
        DefaultSamlTransformer::default()
            .to_xml(&EntityMetadata::from(testing::idp_metadata()).into())
            .unwrap()
    }

    #[test]
    fn base_url_hides_default_ports() {
        let mut request = InboundRequest::from_host_header("https", "sp.example.com:443");
        assert_eq!(request.base_url(), "https://sp.example.com");
        request.port = Some(8443);
        request.context_path = "/app/".to_string();
        assert_eq!(request.base_url(), "https://sp.example.com:8443/app");
        assert_eq!(
            InboundRequest::from_host_header("http", "localhost").base_url(),
            "http://localhost"
        );
    }

    #[tokio::test]
    async fn service_provider_from_request_host() {
        let mut configuration = SamlConfiguration::default();
        configuration.service_provider.provider.alias = Some("sp".to_string());
        configuration.service_provider.provider.keys = RotatingKeys {
            active: Some(testing::signing_key("sp")),
            standby: vec![testing::public_key(&testing::other_signing_key("old"))],
        };
        configuration.service_provider.sign_requests = true;
        configuration.service_provider.provider.single_logout_enabled = true;

        let sp = provisioning(configuration, StaticMetadataCache::new())
            .service_provider(&InboundRequest::new("https", "sp.example.com"))
            .await
            .unwrap();
        let metadata = sp.metadata();
        assert_eq!(metadata.entity_id, "https://sp.example.com");
        assert_eq!(metadata.descriptor.keys.len(), 2);
        assert!(metadata.descriptor.authn_requests_signed);

        let acs = &metadata.descriptor.assertion_consumer_services;
        assert_eq!(acs[0].location, "https://sp.example.com/saml/sp/SSO/alias/sp");
        assert!(acs[0].is_default);
        assert_eq!((acs[1].binding, acs[1].index), (Binding::Redirect, 1));
        assert_eq!(
            metadata.descriptor.single_logout_services[0].location,
            "https://sp.example.com/saml/sp/logout/alias/sp"
        );
        assert_eq!(
            metadata.descriptor.name_ids,
            vec![NameIdFormat::Persistent, NameIdFormat::Email]
        );
    }

    #[tokio::test]
    async fn unsigned_metadata_disables_request_signing() {
        let mut configuration = SamlConfiguration::default();
        configuration.service_provider.provider.entity_id = Some("urn:sp".to_string());
        configuration.service_provider.provider.sign_metadata = false;
        configuration.service_provider.provider.keys.active = Some(testing::signing_key("sp"));
        configuration.service_provider.sign_requests = true;

        let sp = provisioning(configuration, StaticMetadataCache::new())
            .service_provider(&InboundRequest::new("https", "sp.example.com"))
            .await
            .unwrap();
        assert_eq!(sp.entity_id(), "urn:sp");
        assert!(!sp.metadata().descriptor.authn_requests_signed);
        assert!(sp.metadata().descriptor.single_logout_services.is_empty());
        assert_eq!(
            sp.metadata().descriptor.assertion_consumer_services[0].location,
            "https://sp.example.com/saml/sp/SSO/alias/urn%3Asp"
        );
    }

    #[tokio::test]
    async fn remote_identity_providers_from_url_and_inline_xml() {
        let xml = idp_metadata_xml();
        let mut configuration = SamlConfiguration::default();
        configuration.service_provider.providers = vec![
            ExternalIdentityProviderConfiguration {
                provider: ExternalProviderConfiguration {
                    alias: Some("by-url".to_string()),
                    metadata: "https://idp.example.com/metadata".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ExternalIdentityProviderConfiguration {
                provider: ExternalProviderConfiguration {
                    alias: Some("inline".to_string()),
                    metadata: xml.clone(),
                    ..Default::default()
                },
                ..Default::default()
            },
            ExternalIdentityProviderConfiguration {
                provider: ExternalProviderConfiguration {
                    metadata: "https://unknown.example.com/metadata".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        let cache = StaticMetadataCache::new().with_document("https://idp.example.com/metadata", xml);

        let sp = provisioning(configuration, cache)
            .service_provider(&InboundRequest::new("https", "sp.example.com"))
            .await
            .unwrap();
        let providers = sp.identity_providers();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].metadata.entity_alias.as_deref(), Some("by-url"));
        assert_eq!(providers[1].entity_id(), "https://idp.example.com");
        let published: Vec<_> = providers[1]
            .metadata
            .descriptor
            .single_sign_on_services
            .iter()
            .map(|e| (e.binding, e.location.clone()))
            .collect();
        let expected: Vec<_> = testing::idp_metadata()
            .descriptor
            .single_sign_on_services
            .iter()
            .map(|e| (e.binding, e.location.clone()))
            .collect();
        assert_eq!(published, expected);
    }

    #[tokio::test]
    async fn metadata_trust_check() {
        let signed = idp_metadata_xml();
        let p = provisioning(SamlConfiguration::default(), StaticMetadataCache::new());
        let mut trusted = ExternalProviderConfiguration {
            metadata: signed.clone(),
            metadata_trust_check: true,
            verification_keys: vec![testing::public_key(&testing::signing_key("idp"))],
            ..Default::default()
        };
        let metadata = p.remote_metadata(&trusted).await.unwrap();
        assert!(metadata.signature.unwrap().validated);

        trusted.verification_keys = vec![testing::public_key(&testing::other_signing_key("x"))];
        assert!(matches!(
            p.remote_metadata(&trusted).await,
            Err(SamlError::SignatureInvalid(_))
        ));

        let mut unsigned_idp = testing::idp_metadata();
        unsigned_idp.signing_key = None;
        trusted.metadata = DefaultSamlTransformer::default()
            .to_xml(&EntityMetadata::from(unsigned_idp).into())
            .unwrap();
        trusted.verification_keys = vec![testing::public_key(&testing::signing_key("idp"))];
        assert!(matches!(
            p.remote_metadata(&trusted).await,
            Err(SamlError::SignatureInvalid(_))
        ));
    }

    #[tokio::test]
    async fn identity_provider_endpoints() {
        let mut configuration = SamlConfiguration::default();
        configuration.identity_provider.provider.alias = Some("idp".to_string());
        configuration.identity_provider.provider.keys.active = Some(testing::signing_key("idp"));

        let idp = provisioning(configuration, StaticMetadataCache::new())
            .identity_provider(&InboundRequest::new("https", "idp.example.com"))
            .await
            .unwrap();
        let sso = &idp.metadata().descriptor.single_sign_on_services;
        assert_eq!(sso[0].location, "https://idp.example.com/saml/idp/SSO/alias/idp");
        assert_eq!((sso[0].binding, sso[0].is_default), (Binding::Redirect, true));
        assert_eq!((sso[1].binding, sso[1].index), (Binding::Post, 1));
        assert!(idp.metadata().signing_key.is_some());
    }
}
