//! XML serialization of protocol objects.
//!
//! Every element that can be signed declares the namespaces it uses, so it
//! stays well-formed when cut out of its parent.

use chrono::{DateTime, Utc};

use crate::error::SamlResult;
use crate::key::KeyData;
use crate::metadata::{
    Endpoint, EntityMetadata, IdentityProviderDescriptor, RoleDescriptor,
    ServiceProviderDescriptor,
};
use crate::types::{
    Assertion, AuthenticationRequest, LogoutRequest, LogoutResponse, NameId, NameIdFormat,
    Response, Status, MD_NS, SAMLP_NS, SAML_NS, SAML_VERSION, XMLDSIG_NS,
};
use crate::xml::escape;

pub(super) fn instant(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// ` name="value"`, or nothing when the value is absent.
fn attr(name: &str, value: Option<&str>) -> String {
    value
        .map(|v| format!(r#" {name}="{}""#, escape(v)))
        .unwrap_or_default()
}

fn time_attr(name: &str, value: Option<&DateTime<Utc>>) -> String {
    attr(name, value.map(instant).as_deref())
}

fn issuer(value: &str) -> String {
    format!("<saml:Issuer>{}</saml:Issuer>", escape(value))
}

fn name_id(value: &NameId) -> String {
    format!(
        "<saml:NameID{}{}{}>{}</saml:NameID>",
        attr("Format", value.format.as_ref().map(|f| f.uri())),
        attr("NameQualifier", value.name_qualifier.as_deref()),
        attr("SPNameQualifier", value.sp_name_qualifier.as_deref()),
        escape(&value.value)
    )
}

fn status(value: &Status) -> String {
    let sub_code = value
        .code
        .sub_code
        .as_ref()
        .map(|sub| format!(r#"<samlp:StatusCode Value="{}"/>"#, escape(&sub.value)))
        .unwrap_or_default();
    let message = value
        .message
        .as_ref()
        .map(|m| format!("<samlp:StatusMessage>{}</samlp:StatusMessage>", escape(m)))
        .unwrap_or_default();
    format!(
        r#"<samlp:Status>
<samlp:StatusCode Value="{}">{sub_code}</samlp:StatusCode>{message}
</samlp:Status>"#,
        escape(&value.code.value)
    )
}

pub(super) fn authn_request(request: &AuthenticationRequest) -> String {
    let acs = request.assertion_consumer_service.as_ref();
    let policy = request
        .name_id_policy
        .as_ref()
        .map(|policy| {
            format!(
                r#"
<samlp:NameIDPolicy{}{} AllowCreate="{}"/>"#,
                attr("Format", policy.format.as_ref().map(|f| f.uri())),
                attr("SPNameQualifier", policy.sp_name_qualifier.as_deref()),
                policy.allow_create
            )
        })
        .unwrap_or_default();

    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="{SAML_VERSION}" IssueInstant="{}"{} ForceAuthn="{}" IsPassive="{}"{}{}>
{}{policy}
</samlp:AuthnRequest>"#,
        escape(&request.id),
        instant(&request.issue_instant),
        attr(
            "Destination",
            request.destination.as_ref().map(|d| d.location.as_str())
        ),
        request.force_authn,
        request.is_passive,
        attr("ProtocolBinding", acs.map(|e| e.binding.uri())),
        attr(
            "AssertionConsumerServiceURL",
            acs.map(|e| e.location.as_str())
        ),
        issuer(&request.issuer),
    )
}

pub(super) fn assertion(assertion: &Assertion) -> String {
    let mut body = issuer(&assertion.issuer);

    if let Some(subject) = &assertion.subject {
        body.push_str("\n<saml:Subject>\n");
        body.push_str(&name_id(&subject.principal));
        for confirmation in &subject.confirmations {
            let data = confirmation
                .data
                .as_ref()
                .map(|data| {
                    format!(
                        "\n<saml:SubjectConfirmationData{}{}{}{}/>",
                        attr("InResponseTo", data.in_response_to.as_deref()),
                        time_attr("NotBefore", data.not_before.as_ref()),
                        time_attr("NotOnOrAfter", data.not_on_or_after.as_ref()),
                        attr("Recipient", data.recipient.as_deref()),
                    )
                })
                .unwrap_or_default();
            body.push_str(&format!(
                "\n<saml:SubjectConfirmation Method=\"{}\">{data}\n</saml:SubjectConfirmation>",
                escape(&confirmation.method)
            ));
        }
        body.push_str("\n</saml:Subject>");
    }

    if let Some(conditions) = &assertion.conditions {
        body.push_str(&format!(
            "\n<saml:Conditions{}{}>",
            time_attr("NotBefore", conditions.not_before.as_ref()),
            time_attr("NotOnOrAfter", conditions.not_on_or_after.as_ref()),
        ));
        for restriction in &conditions.audience_restrictions {
            body.push_str("\n<saml:AudienceRestriction>");
            for audience in &restriction.audiences {
                body.push_str(&format!("<saml:Audience>{}</saml:Audience>", escape(audience)));
            }
            body.push_str("</saml:AudienceRestriction>");
        }
        if conditions.one_time_use {
            body.push_str("\n<saml:OneTimeUse/>");
        }
        body.push_str("\n</saml:Conditions>");
    }

    if let Some(statement) = &assertion.authn_statement {
        body.push_str(&format!(
            r#"
<saml:AuthnStatement AuthnInstant="{}"{}{}>
<saml:AuthnContext><saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef></saml:AuthnContext>
</saml:AuthnStatement>"#,
            instant(&statement.authn_instant),
            attr("SessionIndex", statement.session_index.as_deref()),
            time_attr(
                "SessionNotOnOrAfter",
                statement.session_not_on_or_after.as_ref()
            ),
            statement.authn_context.uri(),
        ));
    }

    if let Some(statement) = &assertion.attribute_statement {
        body.push_str("\n<saml:AttributeStatement>");
        for attribute in &statement.attributes {
            body.push_str(&format!(
                "\n<saml:Attribute Name=\"{}\"{}>",
                escape(&attribute.name),
                attr("FriendlyName", attribute.friendly_name.as_deref())
            ));
            for value in &attribute.values {
                body.push_str(&format!(
                    "<saml:AttributeValue>{}</saml:AttributeValue>",
                    escape(value)
                ));
            }
            body.push_str("</saml:Attribute>");
        }
        body.push_str("\n</saml:AttributeStatement>");
    }

    format!(
        r#"<saml:Assertion xmlns:saml="{SAML_NS}" ID="{}" IssueInstant="{}" Version="{SAML_VERSION}">
{body}
</saml:Assertion>"#,
        escape(&assertion.id),
        instant(&assertion.issue_instant),
    )
}

/// Writes a response around already serialized (and signed) assertions.
pub(super) fn response(response: &Response, assertions: &str) -> String {
    format!(
        r#"<samlp:Response xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}"{} IssueInstant="{}" Version="{SAML_VERSION}"{}>
{}
{}
{assertions}
</samlp:Response>"#,
        escape(&response.id),
        attr("InResponseTo", response.in_response_to.as_deref()),
        instant(&response.issue_instant),
        attr("Destination", response.destination.as_deref()),
        issuer(&response.issuer),
        status(&response.status),
    )
}

pub(super) fn logout_request(request: &LogoutRequest) -> String {
    let session_indexes: String = request
        .session_indexes
        .iter()
        .map(|index| format!("\n<samlp:SessionIndex>{}</samlp:SessionIndex>", escape(index)))
        .collect();
    format!(
        r#"<samlp:LogoutRequest xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}" Version="{SAML_VERSION}" IssueInstant="{}"{}{}>
{}
{}{session_indexes}
</samlp:LogoutRequest>"#,
        escape(&request.id),
        instant(&request.issue_instant),
        attr(
            "Destination",
            request.destination.as_ref().map(|d| d.location.as_str())
        ),
        time_attr("NotOnOrAfter", request.not_on_or_after.as_ref()),
        issuer(&request.issuer),
        name_id(&request.name_id),
    )
}

pub(super) fn logout_response(response: &LogoutResponse) -> String {
    format!(
        r#"<samlp:LogoutResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{}"{} IssueInstant="{}" Version="{SAML_VERSION}"{}>
{}
{}
</samlp:LogoutResponse>"#,
        escape(&response.id),
        attr("InResponseTo", response.in_response_to.as_deref()),
        instant(&response.issue_instant),
        attr("Destination", response.destination.as_deref()),
        issuer(&response.issuer),
        status(&response.status),
    )
}

fn key_descriptor(key: &KeyData) -> SamlResult<String> {
    Ok(format!(
        r#"
<md:KeyDescriptor{}>
<ds:KeyInfo xmlns:ds="{XMLDSIG_NS}">
<ds:KeyName>{}</ds:KeyName>
<ds:X509Data>
<ds:X509Certificate>{}</ds:X509Certificate>
</ds:X509Data>
</ds:KeyInfo>
</md:KeyDescriptor>"#,
        attr("use", key.key_type().metadata_use()),
        escape(key.name()),
        key.certificate_base64()?,
    ))
}

fn endpoint(element: &str, endpoint: &Endpoint, indexed: bool) -> String {
    let index = if indexed {
        format!(
            r#" index="{}" isDefault="{}""#,
            endpoint.index, endpoint.is_default
        )
    } else {
        String::new()
    };
    format!(
        r#"
<md:{element} Binding="{}" Location="{}"{index}/>"#,
        endpoint.binding.uri(),
        escape(&endpoint.location),
    )
}

fn common_parts(
    keys: &[KeyData],
    logout: &[Endpoint],
    name_ids: &[NameIdFormat],
) -> SamlResult<String> {
    let mut body = String::new();
    for key in keys {
        body.push_str(&key_descriptor(key)?);
    }
    for slo in logout {
        body.push_str(&endpoint("SingleLogoutService", slo, false));
    }
    for format in name_ids {
        body.push_str(&format!("\n<md:NameIDFormat>{}</md:NameIDFormat>", format.uri()));
    }
    Ok(body)
}

fn service_provider(descriptor: &ServiceProviderDescriptor) -> SamlResult<String> {
    let mut body = common_parts(
        &descriptor.keys,
        &descriptor.single_logout_services,
        &descriptor.name_ids,
    )?;
    for acs in &descriptor.assertion_consumer_services {
        body.push_str(&endpoint("AssertionConsumerService", acs, true));
    }
    Ok(format!(
        r#"
<md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="{}" protocolSupportEnumeration="{SAMLP_NS}">{body}
</md:SPSSODescriptor>"#,
        descriptor.authn_requests_signed, descriptor.want_assertions_signed,
    ))
}

fn identity_provider(descriptor: &IdentityProviderDescriptor) -> SamlResult<String> {
    let mut body = common_parts(
        &descriptor.keys,
        &descriptor.single_logout_services,
        &descriptor.name_ids,
    )?;
    for sso in &descriptor.single_sign_on_services {
        body.push_str(&endpoint("SingleSignOnService", sso, false));
    }
    Ok(format!(
        r#"
<md:IDPSSODescriptor WantAuthnRequestsSigned="{}" protocolSupportEnumeration="{SAMLP_NS}">{body}
</md:IDPSSODescriptor>"#,
        descriptor.want_authn_requests_signed,
    ))
}

pub(super) fn metadata(metadata: &EntityMetadata) -> SamlResult<String> {
    let mut roles = String::new();
    for role in &metadata.roles {
        roles.push_str(&match role {
            RoleDescriptor::ServiceProvider(sp) => service_provider(sp)?,
            RoleDescriptor::IdentityProvider(idp) => identity_provider(idp)?,
        });
    }
    Ok(format!(
        r#"<md:EntityDescriptor xmlns:md="{MD_NS}" ID="{}" entityID="{}">{roles}
</md:EntityDescriptor>"#,
        escape(&metadata.id),
        escape(&metadata.entity_id),
    ))
}
