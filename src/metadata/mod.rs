//! Metadata model.
//!
//! Hosted providers describe themselves with a [`ProviderMetadata`] typed by
//! their role. Metadata read from a remote document is an [`EntityMetadata`]
//! that may carry several roles; the typed views are extracted from it.

mod descriptor;
mod endpoint;
mod selector;

pub use descriptor::*;
pub use endpoint::*;
pub use selector::*;

use crate::key::{KeyData, SigningCredential};
use crate::signature::{DigestAlgorithm, SignatureAlgorithm};
use crate::types::SignatureInfo;

/// Metadata of a provider in one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata<D> {
    /// Document ID.
    pub id: String,
    /// Entity ID, also the issuer of every message the provider sends.
    pub entity_id: String,
    /// Local alias of the entity.
    pub entity_alias: Option<String>,
    /// Key used to sign outgoing messages.
    pub signing_key: Option<KeyData>,
    /// Algorithm outgoing messages are signed with.
    pub signing_algorithm: SignatureAlgorithm,
    /// Reference digest outgoing messages are signed with.
    pub digest_algorithm: DigestAlgorithm,
    /// The role descriptor.
    pub descriptor: D,
}

/// Metadata of a service provider.
pub type ServiceProviderMetadata = ProviderMetadata<ServiceProviderDescriptor>;

/// Metadata of an identity provider.
pub type IdentityProviderMetadata = ProviderMetadata<IdentityProviderDescriptor>;

impl<D> ProviderMetadata<D> {
    /// Signing credential for outgoing messages, if a key is configured.
    pub fn signing_credential(&self) -> crate::SamlResult<Option<SigningCredential>> {
        self.signing_key
            .clone()
            .map(|key| SigningCredential::new(key, self.signing_algorithm, self.digest_algorithm))
            .transpose()
    }

    /// Alias, falling back to the entity ID.
    #[must_use]
    pub fn alias_or_entity_id(&self) -> &str {
        self.entity_alias.as_deref().unwrap_or(&self.entity_id)
    }
}

/// An `EntityDescriptor` with all of its roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Document ID.
    pub id: String,
    /// Entity ID.
    pub entity_id: String,
    /// Local alias of the entity.
    pub entity_alias: Option<String>,
    /// Key used to sign the document itself.
    pub signing_key: Option<KeyData>,
    /// Algorithm the document is signed with.
    pub signing_algorithm: SignatureAlgorithm,
    /// Reference digest the document is signed with.
    pub digest_algorithm: DigestAlgorithm,
    /// Roles, in document order.
    pub roles: Vec<RoleDescriptor>,
    /// Enveloped signature found when parsing.
    pub signature: Option<SignatureInfo>,
}

impl EntityMetadata {
    /// The first identity provider role, as typed metadata.
    #[must_use]
    pub fn identity_provider(&self) -> Option<IdentityProviderMetadata> {
        self.roles.iter().find_map(|role| match role {
            RoleDescriptor::IdentityProvider(d) => Some(self.view(d.clone())),
            RoleDescriptor::ServiceProvider(_) => None,
        })
    }

    /// The first service provider role, as typed metadata.
    #[must_use]
    pub fn service_provider(&self) -> Option<ServiceProviderMetadata> {
        self.roles.iter().find_map(|role| match role {
            RoleDescriptor::ServiceProvider(d) => Some(self.view(d.clone())),
            RoleDescriptor::IdentityProvider(_) => None,
        })
    }

    fn view<D>(&self, descriptor: D) -> ProviderMetadata<D> {
        ProviderMetadata {
            id: self.id.clone(),
            entity_id: self.entity_id.clone(),
            entity_alias: self.entity_alias.clone(),
            signing_key: self.signing_key.clone(),
            signing_algorithm: self.signing_algorithm,
            digest_algorithm: self.digest_algorithm,
            descriptor,
        }
    }
}

impl From<ServiceProviderMetadata> for EntityMetadata {
    fn from(value: ServiceProviderMetadata) -> Self {
        Self {
            id: value.id,
            entity_id: value.entity_id,
            entity_alias: value.entity_alias,
            signing_key: value.signing_key,
            signing_algorithm: value.signing_algorithm,
            digest_algorithm: value.digest_algorithm,
            roles: vec![RoleDescriptor::ServiceProvider(value.descriptor)],
            signature: None,
        }
    }
}

impl From<IdentityProviderMetadata> for EntityMetadata {
    fn from(value: IdentityProviderMetadata) -> Self {
        Self {
            id: value.id,
            entity_id: value.entity_id,
            entity_alias: value.entity_alias,
            signing_key: value.signing_key,
            signing_algorithm: value.signing_algorithm,
            digest_algorithm: value.digest_algorithm,
            roles: vec![RoleDescriptor::IdentityProvider(value.descriptor)],
            signature: None,
        }
    }
}
