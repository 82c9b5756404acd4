//! SAML router configuration.
//!
//! Provides the Axum router for all SAML endpoints.

use axum::{routing::get, Router};

use crate::config::SamlConfiguration;

use super::discovery::{discovery, select_provider};
use super::metadata::{idp_metadata, sp_metadata};
use super::sso::{sso_post, sso_redirect};
use super::state::SamlState;

/// Creates the SAML protocol router.
///
/// # Endpoints
///
/// Paths are relative to the configured prefixes, `saml/sp/` and
/// `saml/idp/` by default:
///
/// | Method   | Path                          | Handler           | Description                    |
/// |----------|-------------------------------|-------------------|--------------------------------|
/// | GET      | `/saml/sp/metadata`           | `sp_metadata`     | SP metadata                    |
/// | GET      | `/saml/sp/select`             | `select_provider` | IdP selection page             |
/// | GET      | `/saml/sp/discovery`          | `discovery`       | Starts authentication          |
/// | GET/POST | `/saml/sp/SSO/alias/{alias}`  | `sso`             | Assertion consumer service     |
/// | GET      | `/saml/idp/metadata`          | `idp_metadata`    | IdP metadata                   |
pub fn saml_router(configuration: &SamlConfiguration) -> Router<SamlState> {
    let sp = format!("/{}", configuration.service_provider.prefix().trim_matches('/'));
    let idp = format!("/{}", configuration.identity_provider.prefix().trim_matches('/'));

    Router::new()
        // Service provider
        .route(&format!("{sp}/metadata"), get(sp_metadata))
        .route(&format!("{sp}/select"), get(select_provider))
        .route(&format!("{sp}/discovery"), get(discovery))
        .route(
            &format!("{sp}/SSO/alias/{{alias}}"),
            get(sso_redirect).post(sso_post),
        )
        // Identity provider
        .route(&format!("{idp}/metadata"), get(idp_metadata))
}
