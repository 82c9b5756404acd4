//! SAML endpoint handlers.
//!
//! This module provides Axum HTTP handlers for the hosted providers:
//!
//! - **Metadata Endpoints** - Serve SP and IdP metadata
//! - **Selection Endpoint** - Lists the trusted identity providers
//! - **Discovery Endpoint** - Starts SP-initiated single sign-on
//! - **SSO Endpoint** - Assertion consumer service of the SP
//!
//! # Example
//!
//! ```rust,ignore
//! use saml_websso::endpoints::{saml_router, SamlState};
//!
//! let state = SamlState::from_configuration(configuration, cache)?;
//! let app = saml_router(&state.configuration).with_state(state);
//! ```

mod discovery;
mod metadata;
mod router;
mod sso;
mod state;

use axum::http::{header, HeaderName};

pub use discovery::{discovery, select_provider};
pub use metadata::{idp_metadata, sp_metadata};
pub use router::saml_router;
pub use sso::{sso_post, sso_redirect, AuthenticatedPrincipal, SsoResponseParams};
pub use state::{SamlState, SESSION_COOKIE};

type NoCache = [(HeaderName, &'static str); 2];

/// Headers keeping browsers and proxies from caching SAML pages.
const NO_CACHE: NoCache = [
    (header::CACHE_CONTROL, "no-cache, no-store"),
    (header::PRAGMA, "no-cache"),
];
