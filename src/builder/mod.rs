//! Message construction for the hosted providers.
//!
//! [`HostedServiceProvider`] and [`HostedIdentityProvider`] build protocol
//! objects addressed to a [`RemoteProvider`]. Every object leaves the
//! builder complete: identifiers, instants, endpoints and the signing
//! credential are all filled in, so the transformer only has to serialize.

mod identity_provider;
mod service_provider;

pub use identity_provider::*;
pub use service_provider::*;

use tracing::debug;

use crate::clock::Clock;
use crate::config::{ExternalIdentityProviderConfiguration, ExternalServiceProviderConfiguration};
use crate::error::{SamlError, SamlResult};
use crate::ids::IdGenerator;
use crate::key::{KeyData, KeyType, SigningCredential};
use crate::metadata::{
    select_endpoint, Endpoint, IdentityProviderDescriptor, ProviderMetadata,
    ServiceProviderDescriptor, SsoDescriptor,
};
use crate::types::{Binding, LogoutRequest, LogoutResponse, NameId, Status};

/// A remote provider: its configuration and the metadata it published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProvider<C, D> {
    /// Local configuration of the provider.
    pub configuration: C,
    /// Published metadata.
    pub metadata: ProviderMetadata<D>,
}

/// An identity provider trusted by the hosted service provider.
pub type RemoteIdentityProvider =
    RemoteProvider<ExternalIdentityProviderConfiguration, IdentityProviderDescriptor>;

/// A service provider known to the hosted identity provider.
pub type RemoteServiceProvider =
    RemoteProvider<ExternalServiceProviderConfiguration, ServiceProviderDescriptor>;

impl<C, D: SsoDescriptor> RemoteProvider<C, D> {
    /// Entity ID of the provider.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.metadata.entity_id
    }

    /// Keys the provider signs messages with.
    #[must_use]
    pub fn verification_keys(&self) -> Vec<KeyData> {
        self.metadata
            .descriptor
            .keys()
            .iter()
            .filter(|key| key.key_type() != KeyType::Encryption)
            .cloned()
            .collect()
    }
}

/// Picks the identity provider an authentication request goes to.
///
/// With `idp` the provider with that entity ID is returned. Without it,
/// the single configured provider is; zero or several providers fail.
pub fn resolve_identity_provider<'a>(
    idp: Option<&str>,
    providers: &'a [RemoteIdentityProvider],
) -> SamlResult<&'a RemoteIdentityProvider> {
    match idp {
        Some(entity_id) => providers
            .iter()
            .find(|provider| provider.entity_id() == entity_id)
            .ok_or_else(|| SamlError::ProviderNotFound(entity_id.to_string())),
        None => match providers {
            [single] => Ok(single),
            [] => Err(SamlError::ProviderNotFound(
                "no identity provider is configured".to_string(),
            )),
            _ => Err(SamlError::ProviderNotFound(format!(
                "{} identity providers are configured and none was chosen",
                providers.len()
            ))),
        },
    }
}

/// Signing credential of a hosted provider that must sign.
pub(crate) fn required_credential<D>(metadata: &ProviderMetadata<D>) -> SamlResult<SigningCredential> {
    metadata.signing_credential()?.ok_or_else(|| {
        SamlError::Configuration(format!(
            "provider '{}' must sign but has no signing key",
            metadata.entity_id
        ))
    })
}

fn single_logout_service<D: SsoDescriptor>(peer: &ProviderMetadata<D>) -> SamlResult<&Endpoint> {
    select_endpoint(peer.descriptor.single_logout_services(), &[Binding::Redirect], None)
        .ok_or_else(|| {
            SamlError::Metadata(format!(
                "provider '{}' publishes no single logout service",
                peer.entity_id
            ))
        })
}

/// Builds a logout request from `local` to `peer`.
pub(crate) fn logout_request<L, D: SsoDescriptor>(
    local: &ProviderMetadata<L>,
    peer: &ProviderMetadata<D>,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    name_id: NameId,
    session_indexes: Vec<String>,
) -> SamlResult<LogoutRequest> {
    let destination = single_logout_service(peer)?.clone();
    let request = LogoutRequest {
        id: ids.message_id(),
        issue_instant: clock.now(),
        destination: Some(destination),
        issuer: local.entity_id.clone(),
        name_id,
        session_indexes,
        not_on_or_after: None,
        signing: local.signing_credential()?,
        signature: None,
    };
    debug!(id = %request.id, peer = %peer.entity_id, "built logout request");
    Ok(request)
}

/// Builds the answer to `request` from `local` to `peer`.
pub(crate) fn logout_response<L, D: SsoDescriptor>(
    local: &ProviderMetadata<L>,
    peer: &ProviderMetadata<D>,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    request: &LogoutRequest,
    status: Status,
) -> SamlResult<LogoutResponse> {
    let destination = single_logout_service(peer)?.location.clone();
    Ok(LogoutResponse {
        id: ids.message_id(),
        in_response_to: Some(request.id.clone()),
        issue_instant: clock.now(),
        destination: Some(destination),
        issuer: local.entity_id.clone(),
        status,
        signing: local.signing_credential()?,
        signature: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn explicit_idp_must_match_exactly() {
        let providers = vec![
            testing::remote_identity_provider("https://idp-a.example.com"),
            testing::remote_identity_provider("https://idp-b.example.com"),
        ];
        let found = resolve_identity_provider(Some("https://idp-b.example.com"), &providers).unwrap();
        assert_eq!(found.entity_id(), "https://idp-b.example.com");

        assert!(matches!(
            resolve_identity_provider(Some("https://idp-b.example.com/"), &providers),
            Err(SamlError::ProviderNotFound(_))
        ));
        assert!(matches!(
            resolve_identity_provider(None, &providers),
            Err(SamlError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn single_provider_is_implicit() {
        let providers = vec![testing::remote_identity_provider("https://idp.example.com")];
        assert_eq!(
            resolve_identity_provider(None, &providers).unwrap().entity_id(),
            "https://idp.example.com"
        );
        assert!(resolve_identity_provider(None, &[]).is_err());
    }

    #[test]
    fn encryption_keys_do_not_verify() {
        let mut provider = testing::remote_identity_provider("https://idp.example.com");
        let signing = provider.metadata.descriptor.keys[0].clone();
        provider.metadata.descriptor.keys.push(KeyData::new(
            "enc",
            signing.certificate(),
            KeyType::Encryption,
        ));
        let names: Vec<_> = provider
            .verification_keys()
            .iter()
            .map(|k| k.name().to_string())
            .collect();
        assert_eq!(names, vec![signing.name().to_string()]);
    }
}
