//! Metadata endpoints.
//!
//! Publishes the metadata of the hosted providers, derived for the host the
//! request arrived on.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::SamlError;
use crate::metadata::EntityMetadata;
use crate::provisioning::InboundRequest;

use super::sso::error_response;
use super::state::SamlState;

const METADATA_CONTENT_TYPE: &str = "application/samlmetadata+xml";

/// GET handler for the service provider metadata.
pub async fn sp_metadata(State(state): State<SamlState>, request: InboundRequest) -> Response {
    let result = async {
        let sp = state.resolver.service_provider(&request).await?;
        state
            .transformer
            .to_xml(&EntityMetadata::from(sp.metadata().clone()).into())
    };
    metadata_response(result.await)
}

/// GET handler for the identity provider metadata.
pub async fn idp_metadata(State(state): State<SamlState>, request: InboundRequest) -> Response {
    let result = async {
        let idp = state.resolver.identity_provider(&request).await?;
        state
            .transformer
            .to_xml(&EntityMetadata::from(idp.metadata().clone()).into())
    };
    metadata_response(result.await)
}

fn metadata_response(result: Result<String, SamlError>) -> Response {
    match result {
        Ok(metadata) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METADATA_CONTENT_TYPE)],
            metadata,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "unable to publish metadata");
            error_response(&e).into_response()
        }
    }
}
