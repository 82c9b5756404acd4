//! HTTP-Redirect binding.
//!
//! Messages travel in the query string, raw DEFLATE compressed.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use url::Url;

use crate::error::{SamlError, SamlResult};

use super::{decode_message, encode_message, select_message, DecodedMessage, SamlMessageType};

/// Upper bound for an inflated message.
const MAX_INFLATED_SIZE: u64 = 1024 * 1024;

/// Builds and reads redirect locations.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Appends the deflated message to `destination`.
    ///
    /// Query parameters already on `destination` are kept. An empty relay
    /// state is left out.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let mut query = vec![(message_type.form_param(), encode_message(xml, true)?)];
        if let Some(rs) = relay_state.filter(|rs| !rs.is_empty()) {
            query.push(("RelayState", rs.to_owned()));
        }

        let mut location = destination.to_owned();
        let mut joiner = if destination.contains('?') { '&' } else { '?' };
        for (name, value) in query {
            location.push(joiner);
            location.push_str(name);
            location.push('=');
            location.push_str(&urlencoding::encode(&value));
            joiner = '&';
        }
        Ok(location)
    }

    /// Reads a message out of query parameters that were already unescaped.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = select_message(saml_request, saml_response)?;
        let xml = decode_message(encoded, true)?;
        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state
                .filter(|rs| !rs.is_empty())
                .map(ToOwned::to_owned),
        })
    }

    /// Reads a message out of a complete redirect location.
    pub fn decode_url(location: &str) -> SamlResult<DecodedMessage> {
        let url = Url::parse(location)
            .map_err(|e| SamlError::InvalidRequest(format!("malformed redirect location: {e}")))?;
        let param = |wanted: &str| {
            url.query_pairs()
                .find(|(name, _)| name == wanted)
                .map(|(_, value)| value.into_owned())
        };

        Self::decode(
            param("SAMLRequest").as_deref(),
            param("SAMLResponse").as_deref(),
            param("RelayState").as_deref(),
        )
    }
}

/// Raw DEFLATE, no zlib framing.
pub(crate) fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut deflater = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    deflater
        .write_all(data)
        .and_then(|()| deflater.finish())
        .map_err(|e| SamlError::Deflate(format!("cannot deflate message: {e}")))
}

/// Inverse of [`deflate_compress`], capped at [`MAX_INFLATED_SIZE`].
pub(crate) fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut inflated = Vec::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_SIZE + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| SamlError::Deflate(format!("cannot inflate message: {e}")))?;
    if inflated.len() as u64 > MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate(format!(
            "inflated message exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(inflated)
}
