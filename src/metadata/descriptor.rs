//! Role descriptors.

use crate::key::KeyData;
use crate::types::NameIdFormat;

use super::Endpoint;

/// Behaviour shared by both SSO role descriptors.
pub trait SsoDescriptor {
    /// Keys, active key first.
    fn keys(&self) -> &[KeyData];

    /// Supported name ID formats, default first.
    fn name_ids(&self) -> &[NameIdFormat];

    /// Single logout endpoints.
    fn single_logout_services(&self) -> &[Endpoint];
}

/// `SPSSODescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceProviderDescriptor {
    /// Keys, active key first.
    pub keys: Vec<KeyData>,
    /// Supported name ID formats, default first.
    pub name_ids: Vec<NameIdFormat>,
    /// Assertion consumer services.
    pub assertion_consumer_services: Vec<Endpoint>,
    /// Single logout services.
    pub single_logout_services: Vec<Endpoint>,
    /// Whether this SP signs its authentication requests.
    pub authn_requests_signed: bool,
    /// Whether this SP requires signed assertions.
    pub want_assertions_signed: bool,
}

impl SsoDescriptor for ServiceProviderDescriptor {
    fn keys(&self) -> &[KeyData] {
        &self.keys
    }

    fn name_ids(&self) -> &[NameIdFormat] {
        &self.name_ids
    }

    fn single_logout_services(&self) -> &[Endpoint] {
        &self.single_logout_services
    }
}

/// `IDPSSODescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityProviderDescriptor {
    /// Keys, active key first.
    pub keys: Vec<KeyData>,
    /// Supported name ID formats, default first.
    pub name_ids: Vec<NameIdFormat>,
    /// Single sign-on services.
    pub single_sign_on_services: Vec<Endpoint>,
    /// Single logout services.
    pub single_logout_services: Vec<Endpoint>,
    /// Whether this IdP requires signed authentication requests.
    pub want_authn_requests_signed: bool,
}

impl SsoDescriptor for IdentityProviderDescriptor {
    fn keys(&self) -> &[KeyData] {
        &self.keys
    }

    fn name_ids(&self) -> &[NameIdFormat] {
        &self.name_ids
    }

    fn single_logout_services(&self) -> &[Endpoint] {
        &self.single_logout_services
    }
}

/// A role an entity plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleDescriptor {
    /// Service provider role.
    ServiceProvider(ServiceProviderDescriptor),
    /// Identity provider role.
    IdentityProvider(IdentityProviderDescriptor),
}
