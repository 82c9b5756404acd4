//! SAML 2.0 Web Browser SSO for hosted service and identity providers.
//!
//! This crate implements both sides of the Web Browser SSO profile:
//!
//! - **Metadata** - Hosted metadata derived from configuration, remote metadata
//!   loaded and optionally verified
//! - **Message building** - AuthnRequest, Response, Assertion and logout messages
//! - **XML signature** - Enveloped XML-DSig signing and validation
//! - **POST and Redirect bindings** - Transport encoding of protocol messages
//! - **Validation** - Issuer, signature, time window and audience checks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`types`] - Protocol messages and shared vocabularies
//! - [`metadata`] - Provider metadata and endpoint selection
//! - [`builder`] - Hosted providers building outgoing messages
//! - [`transformer`] - XML serialization and parsing of messages
//! - [`validator`] - Checks applied to received messages
//! - [`signature`] - XML signature signing and validation
//! - [`bindings`] - POST and Redirect binding implementations
//! - [`provisioning`] - Per-request derivation of the hosted providers
//! - [`storage`] - Sent messages awaiting their answer
//! - [`endpoints`] - Axum HTTP handlers
//! - [`config`] - TOML and environment configuration
//! - [`error`] - Error types for SAML operations
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use saml_websso::config::SamlConfiguration;
//! use saml_websso::endpoints::{saml_router, SamlState};
//! use saml_websso::provisioning::StaticMetadataCache;
//!
//! let configuration = SamlConfiguration::load("saml.toml")?;
//! let state = SamlState::from_configuration(configuration, Arc::new(StaticMetadataCache::new()))?;
//! let app = saml_router(&state.configuration).with_state(state);
//! ```
//!
//! # Standards
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod builder;
pub mod clock;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod ids;
pub mod key;
pub mod metadata;
pub mod provisioning;
pub mod signature;
pub mod storage;
pub mod transformer;
pub mod types;
pub mod validator;

mod xml;

pub use error::{SamlError, SamlResult};
