//! SAML Single Logout types.

use chrono::{DateTime, Utc};

use super::{NameId, SignatureInfo, Status};
use crate::key::SigningCredential;
use crate::metadata::Endpoint;

/// SAML Logout Request.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoutRequest {
    /// `ID` of the request.
    pub id: String,

    /// `IssueInstant`.
    pub issue_instant: DateTime<Utc>,

    /// Single logout endpoint of the peer.
    pub destination: Option<Endpoint>,

    /// Entity ID of the sender.
    pub issuer: String,

    /// The subject being logged out.
    pub name_id: NameId,

    /// Session indexes to terminate. Empty means all sessions.
    pub session_indexes: Vec<String>,

    /// Time after which the request should be discarded.
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Key the transformer signs this request with.
    pub signing: Option<SigningCredential>,

    /// Enveloped signature found when parsing.
    pub signature: Option<SignatureInfo>,
}

/// SAML Logout Response.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoutResponse {
    /// `ID` of the response.
    pub id: String,

    /// ID of the logout request this answers.
    pub in_response_to: Option<String>,

    /// `IssueInstant`.
    pub issue_instant: DateTime<Utc>,

    /// Single logout URL of the peer.
    pub destination: Option<String>,

    /// Entity ID of the sender.
    pub issuer: String,

    /// Outcome of the logout.
    pub status: Status,

    /// Key the transformer signs this response with.
    pub signing: Option<SigningCredential>,

    /// Enveloped signature found when parsing.
    pub signature: Option<SignatureInfo>,
}
