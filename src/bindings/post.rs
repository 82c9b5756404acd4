//! HTTP-POST binding.
//!
//! The message is base64 text in a hidden form field; the browser posts it
//! on load.

use std::fmt::Write as _;

use base64::Engine;

use crate::error::SamlResult;

use super::{decode_message, select_message, DecodedMessage, SamlMessageType};

/// Builds and reads auto-submitting forms.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Renders the page that carries `xml` to `destination`.
    ///
    /// An empty relay state is left out of the form.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let mut fields = String::new();
        hidden_field(
            &mut fields,
            message_type.form_param(),
            &base64::engine::general_purpose::STANDARD.encode(xml),
        );
        if let Some(rs) = relay_state.filter(|rs| !rs.is_empty()) {
            hidden_field(&mut fields, "RelayState", rs);
        }

        format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html>\n",
                "<head><meta charset=\"UTF-8\"><title>Continue</title></head>\n",
                "<body onload=\"document.forms[0].submit()\">\n",
                "<form method=\"post\" action=\"{action}\">\n",
                "{fields}",
                "<noscript><button type=\"submit\">Continue</button></noscript>\n",
                "</form>\n",
                "</body>\n",
                "</html>\n",
            ),
            action = html_escape(destination),
            fields = fields,
        )
    }

    /// Reads a message out of posted form fields.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = select_message(saml_request, saml_response)?;
        let xml = decode_message(encoded, false)?;
        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state
                .filter(|rs| !rs.is_empty())
                .map(ToOwned::to_owned),
        })
    }
}

fn hidden_field(out: &mut String, name: &str, value: &str) {
    // writing to a String cannot fail
    let _ = writeln!(
        out,
        "<input type=\"hidden\" name=\"{name}\" value=\"{}\"/>",
        html_escape(value)
    );
}

/// Makes text safe for HTML content and attribute values.
pub(crate) fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(html: &'a str, name: &str) -> &'a str {
        let marker = format!("name=\"{name}\" value=\"");
        let start = html.find(&marker).unwrap() + marker.len();
        let len = html[start..].find('"').unwrap();
        &html[start..start + len]
    }

    #[test]
    fn form_posts_request_with_relay_state() {
        let xml = r#"<samlp:AuthnRequest ID="_a">body</samlp:AuthnRequest>"#;
        let html = HttpPostBinding::encode(
            xml,
            "https://idp.example.com/sso",
            Some("state123"),
            SamlMessageType::Request,
        );
        assert!(html.contains(r#"action="https://idp.example.com/sso""#));
        assert_eq!(field(&html, "RelayState"), "state123");

        let decoded =
            HttpPostBinding::decode(Some(field(&html, "SAMLRequest")), None, Some("state123"))
                .unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state.as_deref(), Some("state123"));
    }

    #[test]
    fn empty_relay_state_is_omitted() {
        let html = HttpPostBinding::encode(
            "<x/>",
            "https://sp.example.com/acs",
            Some(""),
            SamlMessageType::Response,
        );
        assert!(!html.contains("RelayState"));
        assert!(html.contains("name=\"SAMLResponse\""));
    }

    #[test]
    fn relay_state_cannot_break_out_of_attribute() {
        let html = HttpPostBinding::encode(
            "<x/>",
            "https://sp.example.com/acs",
            Some(r#""><script>"#),
            SamlMessageType::Response,
        );
        assert!(!html.contains("<script>"));
        assert!(html.contains("&quot;&gt;&lt;script&gt;"));
    }

    #[test]
    fn nothing_to_decode() {
        assert!(HttpPostBinding::decode(None, None, None).is_err());
    }
}
