//! Identity provider discovery.

use serde::Serialize;

use crate::builder::HostedServiceProvider;

/// One entry of the identity provider selection page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderLink {
    /// Label shown to the user.
    pub linktext: String,
    /// Discovery URL starting authentication with the provider.
    pub url: String,
}

/// Links to `{base_url}/{prefix}discovery?idp={entity id}`, one per provider.
#[must_use]
pub fn identity_provider_links(
    sp: &HostedServiceProvider,
    base_url: &str,
    prefix: &str,
) -> Vec<ProviderLink> {
    let base = base_url.trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    sp.identity_providers()
        .iter()
        .map(|idp| {
            let configuration = &idp.configuration.provider;
            ProviderLink {
                linktext: configuration
                    .linktext
                    .clone()
                    .or_else(|| configuration.alias.clone())
                    .unwrap_or_else(|| idp.entity_id().to_string()),
                url: format!(
                    "{base}/{prefix}/discovery?idp={}",
                    urlencoding::encode(idp.entity_id())
                ),
            }
        })
        .collect()
}
