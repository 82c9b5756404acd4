//! SAML bindings.
//!
//! - **HTTP-POST Binding**: messages are base64-encoded and sent in an
//!   auto-submitting HTML form
//! - **HTTP-Redirect Binding**: messages are deflated, base64-encoded and
//!   URL-encoded into the query string
//!
//! [`send_message`] picks the binding from the destination endpoint. Any
//! other binding is refused before anything is encoded.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

pub(crate) use post::html_escape;
use redirect::{deflate_compress, deflate_decompress};

use base64::Engine;
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::metadata::Endpoint;
use crate::types::Binding;

/// Which of the two transport parameters a message uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// AuthnRequest or LogoutRequest.
    Request,
    /// Response or LogoutResponse.
    Response,
}

impl SamlMessageType {
    /// Query or form field carrying the message.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// A message taken off the wire.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// Message text after base64 and inflation.
    pub xml: String,
    /// Whether it came in as `SAMLRequest` or `SAMLResponse`.
    pub message_type: SamlMessageType,
    /// Non-empty `RelayState`.
    pub relay_state: Option<String>,
}

/// An encoded message ready to be handed to the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Answer with a 302 to `location`.
    Redirect {
        /// Full URL including the SAML query parameters.
        location: String,
    },
    /// Answer with an auto-submitting form posting to `action`.
    Post {
        /// Form action.
        action: String,
        /// Complete HTML page.
        html: String,
    },
}

/// Encodes `xml` for the binding of `destination`.
///
/// Fails with [`SamlError::UnsupportedBinding`] for anything but POST and
/// Redirect.
pub fn send_message(
    xml: &str,
    destination: &Endpoint,
    message_type: SamlMessageType,
    relay_state: Option<&str>,
) -> SamlResult<OutboundMessage> {
    let relay_state = relay_state.filter(|rs| !rs.is_empty());
    debug!(
        location = %destination.location,
        binding = ?destination.binding,
        param = message_type.form_param(),
        "sending SAML message"
    );
    match destination.binding {
        Binding::Redirect => Ok(OutboundMessage::Redirect {
            location: HttpRedirectBinding::encode(
                xml,
                &destination.location,
                relay_state,
                message_type,
            )?,
        }),
        Binding::Post => Ok(OutboundMessage::Post {
            action: destination.location.clone(),
            html: HttpPostBinding::encode(xml, &destination.location, relay_state, message_type),
        }),
        other => Err(SamlError::UnsupportedBinding(other.uri().to_string())),
    }
}

/// Base64-encodes `xml`, deflating it first when `deflate` is set.
pub fn encode_message(xml: &str, deflate: bool) -> SamlResult<String> {
    let bytes = if deflate {
        deflate_compress(xml.as_bytes())?
    } else {
        xml.as_bytes().to_vec()
    };
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Reverses [`encode_message`].
///
/// Whitespace inside the base64 text is ignored; some peers wrap long values.
pub fn decode_message(encoded: &str, deflate: bool) -> SamlResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
    let bytes = if deflate {
        deflate_decompress(&decoded)?
    } else {
        decoded
    };
    String::from_utf8(bytes)
        .map_err(|e| SamlError::InvalidRequest(format!("invalid UTF-8 in message: {e}")))
}

/// Picks the encoded message out of the `SAMLRequest`/`SAMLResponse` pair.
fn select_message<'a>(
    saml_request: Option<&'a str>,
    saml_response: Option<&'a str>,
) -> SamlResult<(&'a str, SamlMessageType)> {
    match (saml_request, saml_response) {
        (Some(request), _) => Ok((request, SamlMessageType::Request)),
        (None, Some(response)) => Ok((response, SamlMessageType::Response)),
        (None, None) => Err(SamlError::InvalidRequest(
            "no SAMLRequest or SAMLResponse parameter".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_destination_yields_location() {
        let endpoint = Endpoint::new("https://idp.example.com/sso", Binding::Redirect, 0);
        let sent = send_message("<a/>", &endpoint, SamlMessageType::Request, Some("rs")).unwrap();
        match sent {
            OutboundMessage::Redirect { location } => {
                assert!(location.starts_with("https://idp.example.com/sso?SAMLRequest="));
                assert!(location.ends_with("&RelayState=rs"));
            }
            OutboundMessage::Post { .. } => panic!("expected redirect"),
        }
    }

    #[test]
    fn empty_relay_state_is_omitted() {
        let endpoint = Endpoint::new("https://sp.example.com/acs", Binding::Post, 0);
        let sent = send_message("<a/>", &endpoint, SamlMessageType::Response, Some("")).unwrap();
        let OutboundMessage::Post { action, html } = sent else {
            panic!("expected post");
        };
        assert_eq!(action, "https://sp.example.com/acs");
        assert!(html.contains("SAMLResponse"));
        assert!(!html.contains("RelayState"));
    }

    #[test]
    fn artifact_and_soap_are_refused() {
        for binding in [Binding::Artifact, Binding::Soap] {
            let endpoint = Endpoint::new("https://idp.example.com/x", binding, 0);
            let err = send_message("<a/>", &endpoint, SamlMessageType::Request, None).unwrap_err();
            assert!(matches!(err, SamlError::UnsupportedBinding(_)));
        }
    }

    const LOGOUT_REQUEST: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" "#,
        r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_1" Version="2.0" "#,
        r#"IssueInstant="2024-03-01T12:00:00Z" Destination="https://idp.example.com/slo?a=1&amp;b=2">"#,
        "<saml:Issuer>https://sp.example.com</saml:Issuer>",
        "<saml:NameID>Zoë &amp; Søren &lt;日本&gt;</saml:NameID>",
        "</samlp:LogoutRequest>",
    );

    #[test]
    fn encoded_message_decodes_with_same_mode() {
        for deflate in [true, false] {
            let encoded = encode_message(LOGOUT_REQUEST, deflate).unwrap();
            assert_eq!(decode_message(&encoded, deflate).unwrap(), LOGOUT_REQUEST);
        }
    }

    #[test]
    fn both_bindings_carry_non_ascii_messages_unchanged() {
        let redirect = Endpoint::new("https://idp.example.com/slo", Binding::Redirect, 0);
        let OutboundMessage::Redirect { location } =
            send_message(LOGOUT_REQUEST, &redirect, SamlMessageType::Request, Some("ü&x")).unwrap()
        else {
            panic!("expected redirect");
        };
        let decoded = HttpRedirectBinding::decode_url(&location).unwrap();
        assert_eq!(decoded.xml, LOGOUT_REQUEST);
        assert_eq!(decoded.relay_state.as_deref(), Some("ü&x"));

        let post = Endpoint::new("https://idp.example.com/slo", Binding::Post, 1);
        let OutboundMessage::Post { html, .. } =
            send_message(LOGOUT_REQUEST, &post, SamlMessageType::Request, None).unwrap()
        else {
            panic!("expected post");
        };
        let marker = r#"name="SAMLRequest" value=""#;
        let start = html.find(marker).unwrap() + marker.len();
        let value = &html[start..start + html[start..].find('"').unwrap()];
        let decoded = HttpPostBinding::decode(Some(value), None, None).unwrap();
        assert_eq!(decoded.xml, LOGOUT_REQUEST);
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = encode_message("<samlp:Response/>", false).unwrap();
        let wrapped = format!("{}\r\n{}", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_message(&wrapped, false).unwrap(), "<samlp:Response/>");
    }
}
