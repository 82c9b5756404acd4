//! XML parsing of protocol objects.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::key::{KeyData, KeyType};
use crate::metadata::{
    Endpoint, EntityMetadata, IdentityProviderDescriptor, RoleDescriptor,
    ServiceProviderDescriptor,
};
use crate::signature::{extract_signature, XmlSignatureValidator};
use crate::types::{
    Assertion, Attribute, AttributeStatement, AudienceRestriction, AuthenticationRequest,
    AuthnContextClass, AuthnStatement, Binding, Conditions, LogoutRequest, LogoutResponse, NameId,
    NameIdFormat, NameIdPolicy, Response, SamlMessage, SignatureInfo, Status, StatusCode, Subject,
    SubjectConfirmation, SubjectConfirmationData,
};
use crate::xml::{self, XmlElement};

/// Parses `xml` into a protocol object.
pub(super) fn read(xml: &str, validator: Option<&XmlSignatureValidator>) -> SamlResult<SamlMessage> {
    let root = xml::parse(xml)?;
    ensure_unique_ids(&root, &mut HashSet::new())?;
    let reader = Reader { xml, validator };
    match root.name.as_str() {
        "AuthnRequest" => reader.authn_request(&root).map(SamlMessage::from),
        "Response" => reader.response(&root).map(SamlMessage::from),
        "Assertion" => reader.assertion(&root).map(SamlMessage::from),
        "LogoutRequest" => reader.logout_request(&root).map(SamlMessage::from),
        "LogoutResponse" => reader.logout_response(&root).map(SamlMessage::from),
        "EntityDescriptor" => reader.metadata(&root).map(SamlMessage::from),
        other => Err(SamlError::XmlParse(format!(
            "unsupported root element '{other}'"
        ))),
    }
}

/// Signature references resolve by ID, so an ID may appear only once.
fn ensure_unique_ids<'a>(element: &'a XmlElement, seen: &mut HashSet<&'a str>) -> SamlResult<()> {
    if let Some(id) = element.attr("ID") {
        if !seen.insert(id) {
            return Err(SamlError::XmlParse(format!("duplicate ID '{id}'")));
        }
    }
    element
        .children
        .iter()
        .try_for_each(|child| ensure_unique_ids(child, seen))
}

struct Reader<'a> {
    xml: &'a str,
    validator: Option<&'a XmlSignatureValidator>,
}

impl Reader<'_> {
    fn signature(&self, element: &XmlElement) -> SamlResult<Option<SignatureInfo>> {
        let Some(signature) = element.child("Signature") else {
            return Ok(None);
        };
        let id = element.required_attr("ID")?;
        let info = match self.validator {
            Some(validator) => {
                let verified = validator.validate_element(self.xml, id)?;
                SignatureInfo {
                    algorithm: verified.signature.algorithm,
                    digest: verified.signature.digest,
                    validated: true,
                    key_name: Some(verified.key_name),
                }
            }
            None => {
                let declared = extract_signature(signature)?;
                SignatureInfo {
                    algorithm: declared.algorithm,
                    digest: declared.digest,
                    validated: false,
                    key_name: None,
                }
            }
        };
        Ok(Some(info))
    }

    fn authn_request(&self, element: &XmlElement) -> SamlResult<AuthenticationRequest> {
        let protocol_binding = element.attr("ProtocolBinding").and_then(Binding::from_uri);
        let assertion_consumer_service = element.attr("AssertionConsumerServiceURL").map(|url| {
            let index = element
                .attr("AssertionConsumerServiceIndex")
                .and_then(|i| i.parse().ok())
                .unwrap_or(0);
            Endpoint::new(url, protocol_binding.unwrap_or(Binding::Post), index)
        });
        let name_id_policy = element.child("NameIDPolicy").map(|policy| NameIdPolicy {
            format: policy.attr("Format").and_then(name_id_format),
            sp_name_qualifier: policy.attr("SPNameQualifier").map(String::from),
            allow_create: flag(policy.attr("AllowCreate")),
        });

        Ok(AuthenticationRequest {
            id: element.required_attr("ID")?.to_string(),
            issue_instant: required_instant(element, "IssueInstant")?,
            issuer: issuer(element)?,
            // the transport binding is not part of the document
            destination: element
                .attr("Destination")
                .map(|d| Endpoint::new(d, Binding::Redirect, 0)),
            assertion_consumer_service,
            binding: protocol_binding.unwrap_or(Binding::Post),
            force_authn: flag(element.attr("ForceAuthn")),
            is_passive: flag(element.attr("IsPassive")),
            name_id_policy,
            signing: None,
            signature: self.signature(element)?,
        })
    }

    fn response(&self, element: &XmlElement) -> SamlResult<Response> {
        let assertions = element
            .children_named("Assertion")
            .map(|a| self.assertion(a))
            .collect::<SamlResult<Vec<_>>>()?;
        if element.child("EncryptedAssertion").is_some() {
            return Err(SamlError::InvalidRequest(
                "encrypted assertions are not supported".to_string(),
            ));
        }
        Ok(Response {
            id: element.required_attr("ID")?.to_string(),
            in_response_to: element.attr("InResponseTo").map(String::from),
            issue_instant: required_instant(element, "IssueInstant")?,
            destination: element.attr("Destination").map(String::from),
            issuer: issuer(element)?,
            status: status(element.required_child("Status")?)?,
            assertions,
            signing: None,
            signature: self.signature(element)?,
        })
    }

    fn assertion(&self, element: &XmlElement) -> SamlResult<Assertion> {
        let mut assertion = Assertion::new(
            element.required_attr("ID")?,
            issuer(element)?,
            required_instant(element, "IssueInstant")?,
        );
        assertion.subject = element.child("Subject").map(subject).transpose()?;
        assertion.conditions = element.child("Conditions").map(conditions).transpose()?;
        assertion.authn_statement = element
            .child("AuthnStatement")
            .map(authn_statement)
            .transpose()?;
        assertion.attribute_statement = element.child("AttributeStatement").map(|statement| {
            AttributeStatement {
                attributes: statement
                    .children_named("Attribute")
                    .filter_map(|a| {
                        Some(Attribute {
                            name: a.attr("Name")?.to_string(),
                            friendly_name: a.attr("FriendlyName").map(String::from),
                            values: a
                                .children_named("AttributeValue")
                                .map(|v| v.trimmed_text().to_string())
                                .collect(),
                        })
                    })
                    .collect(),
            }
        });
        assertion.signature = self.signature(element)?;
        Ok(assertion)
    }

    fn logout_request(&self, element: &XmlElement) -> SamlResult<LogoutRequest> {
        Ok(LogoutRequest {
            id: element.required_attr("ID")?.to_string(),
            issue_instant: required_instant(element, "IssueInstant")?,
            destination: element
                .attr("Destination")
                .map(|d| Endpoint::new(d, Binding::Redirect, 0)),
            issuer: issuer(element)?,
            name_id: name_id(element.required_child("NameID")?),
            session_indexes: element
                .children_named("SessionIndex")
                .map(|s| s.trimmed_text().to_string())
                .collect(),
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            signing: None,
            signature: self.signature(element)?,
        })
    }

    fn logout_response(&self, element: &XmlElement) -> SamlResult<LogoutResponse> {
        Ok(LogoutResponse {
            id: element.required_attr("ID")?.to_string(),
            in_response_to: element.attr("InResponseTo").map(String::from),
            issue_instant: required_instant(element, "IssueInstant")?,
            destination: element.attr("Destination").map(String::from),
            issuer: issuer(element)?,
            status: status(element.required_child("Status")?)?,
            signing: None,
            signature: self.signature(element)?,
        })
    }

    fn metadata(&self, element: &XmlElement) -> SamlResult<EntityMetadata> {
        let entity_id = element.required_attr("entityID")?.to_string();
        let mut roles = Vec::new();
        for child in &element.children {
            match child.name.as_str() {
                "SPSSODescriptor" => roles.push(RoleDescriptor::ServiceProvider(
                    ServiceProviderDescriptor {
                        keys: keys(child, &entity_id)?,
                        name_ids: name_ids(child),
                        assertion_consumer_services: endpoints(child, "AssertionConsumerService"),
                        single_logout_services: endpoints(child, "SingleLogoutService"),
                        authn_requests_signed: flag(child.attr("AuthnRequestsSigned")),
                        want_assertions_signed: flag(child.attr("WantAssertionsSigned")),
                    },
                )),
                "IDPSSODescriptor" => roles.push(RoleDescriptor::IdentityProvider(
                    IdentityProviderDescriptor {
                        keys: keys(child, &entity_id)?,
                        name_ids: name_ids(child),
                        single_sign_on_services: endpoints(child, "SingleSignOnService"),
                        single_logout_services: endpoints(child, "SingleLogoutService"),
                        want_authn_requests_signed: flag(child.attr("WantAuthnRequestsSigned")),
                    },
                )),
                _ => {}
            }
        }

        let signature = self.signature(element)?;
        Ok(EntityMetadata {
            id: element.attr("ID").unwrap_or_default().to_string(),
            entity_id,
            entity_alias: None,
            signing_key: None,
            signing_algorithm: signature.as_ref().map(|s| s.algorithm).unwrap_or_default(),
            digest_algorithm: signature.as_ref().map(|s| s.digest).unwrap_or_default(),
            roles,
            signature,
        })
    }
}

fn issuer(element: &XmlElement) -> SamlResult<String> {
    Ok(element.required_child("Issuer")?.trimmed_text().to_string())
}

fn flag(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "1"))
}

fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::XmlParse(format!("invalid timestamp '{value}': {e}")))
}

fn required_instant(element: &XmlElement, name: &str) -> SamlResult<DateTime<Utc>> {
    parse_instant(element.required_attr(name)?)
}

fn optional_instant(element: &XmlElement, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element.attr(name).map(parse_instant).transpose()
}

fn name_id_format(uri: &str) -> Option<NameIdFormat> {
    let format = NameIdFormat::from_uri(uri);
    if format.is_none() {
        debug!(format = %uri, "ignoring unknown name ID format");
    }
    format
}

fn name_id(element: &XmlElement) -> NameId {
    NameId {
        value: element.trimmed_text().to_string(),
        format: element.attr("Format").and_then(name_id_format),
        name_qualifier: element.attr("NameQualifier").map(String::from),
        sp_name_qualifier: element.attr("SPNameQualifier").map(String::from),
    }
}

fn status(element: &XmlElement) -> SamlResult<Status> {
    let code = element.required_child("StatusCode")?;
    let mut status_code = StatusCode::new(code.required_attr("Value")?);
    if let Some(sub) = code.child("StatusCode").and_then(|s| s.attr("Value")) {
        status_code = status_code.with_sub_code(sub);
    }
    Ok(Status {
        code: status_code,
        message: element
            .child("StatusMessage")
            .map(|m| m.trimmed_text().to_string()),
    })
}

fn subject(element: &XmlElement) -> SamlResult<Subject> {
    let confirmations = element
        .children_named("SubjectConfirmation")
        .map(|confirmation| {
            let data = confirmation
                .child("SubjectConfirmationData")
                .map(|data| -> SamlResult<_> {
                    Ok(SubjectConfirmationData {
                        in_response_to: data.attr("InResponseTo").map(String::from),
                        not_before: optional_instant(data, "NotBefore")?,
                        not_on_or_after: optional_instant(data, "NotOnOrAfter")?,
                        recipient: data.attr("Recipient").map(String::from),
                    })
                })
                .transpose()?;
            Ok(SubjectConfirmation {
                method: confirmation.required_attr("Method")?.to_string(),
                data,
            })
        })
        .collect::<SamlResult<Vec<_>>>()?;
    Ok(Subject {
        principal: name_id(element.required_child("NameID")?),
        confirmations,
    })
}

fn conditions(element: &XmlElement) -> SamlResult<Conditions> {
    Ok(Conditions {
        not_before: optional_instant(element, "NotBefore")?,
        not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
        audience_restrictions: element
            .children_named("AudienceRestriction")
            .map(|restriction| AudienceRestriction {
                audiences: restriction
                    .children_named("Audience")
                    .map(|a| a.trimmed_text().to_string())
                    .collect(),
            })
            .collect(),
        one_time_use: element.child("OneTimeUse").is_some(),
    })
}

fn authn_statement(element: &XmlElement) -> SamlResult<AuthnStatement> {
    let authn_context = element
        .child("AuthnContext")
        .and_then(|c| c.child("AuthnContextClassRef"))
        .and_then(|r| AuthnContextClass::from_uri(r.trimmed_text()))
        .unwrap_or_default();
    Ok(AuthnStatement {
        authn_instant: required_instant(element, "AuthnInstant")?,
        session_index: element.attr("SessionIndex").map(String::from),
        session_not_on_or_after: optional_instant(element, "SessionNotOnOrAfter")?,
        authn_context,
    })
}

fn keys(descriptor: &XmlElement, entity_id: &str) -> SamlResult<Vec<KeyData>> {
    let mut keys = Vec::new();
    for (position, key) in descriptor.children_named("KeyDescriptor").enumerate() {
        let Some(info) = key.child("KeyInfo") else {
            continue;
        };
        let Some(certificate) = info
            .child("X509Data")
            .and_then(|data| data.child("X509Certificate"))
        else {
            continue;
        };
        let name = info
            .child("KeyName")
            .map(|n| n.trimmed_text().to_string())
            .unwrap_or_else(|| format!("{entity_id}#key-{position}"));
        let compact: String = certificate
            .text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let data = KeyData::new(name, compact, KeyType::from_metadata_use(key.attr("use")));
        // fails on malformed certificates
        data.certificate_der()?;
        keys.push(data);
    }
    Ok(keys)
}

fn name_ids(descriptor: &XmlElement) -> Vec<NameIdFormat> {
    descriptor
        .children_named("NameIDFormat")
        .filter_map(|f| name_id_format(f.trimmed_text()))
        .collect()
}

fn endpoints(descriptor: &XmlElement, name: &str) -> Vec<Endpoint> {
    descriptor
        .children_named(name)
        .enumerate()
        .filter_map(|(position, element)| {
            let binding_uri = element.attr("Binding")?;
            let Some(binding) = Binding::from_uri(binding_uri) else {
                debug!(binding = %binding_uri, endpoint = %name, "skipping endpoint with unknown binding");
                return None;
            };
            let index = element
                .attr("index")
                .and_then(|i| i.parse().ok())
                .or_else(|| u32::try_from(position).ok())?;
            Some(Endpoint {
                location: element.attr("Location")?.to_string(),
                binding,
                index,
                is_default: flag(element.attr("isDefault")),
            })
        })
        .collect()
}
