//! Configuration.
//!
//! Provider configuration is plain serde data loaded from TOML once at
//! startup and read-only afterwards. Server settings come from the
//! environment.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::key::KeyData;
use crate::signature::{DigestAlgorithm, SignatureAlgorithm};
use crate::storage::SessionLimits;
use crate::types::NameIdFormat;
use crate::validator::ValidationSettings;

/// Path prefix of the hosted service provider.
pub const DEFAULT_SP_PREFIX: &str = "saml/sp/";

/// Path prefix of the hosted identity provider.
pub const DEFAULT_IDP_PREFIX: &str = "saml/idp/";

/// Longest accepted time window or clock skew, ten years.
pub const MAX_WINDOW_SECS: i64 = 10 * 366 * 24 * 60 * 60;

/// Complete provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamlConfiguration {
    /// The hosted service provider.
    #[serde(default)]
    pub service_provider: LocalServiceProviderConfiguration,

    /// The hosted identity provider.
    #[serde(default)]
    pub identity_provider: LocalIdentityProviderConfiguration,

    /// Checks applied to received messages.
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Bounds on pending requests and browser sessions.
    #[serde(default)]
    pub sessions: SessionLimits,
}

impl SamlConfiguration {
    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> SamlResult<Self> {
        let configuration: Self = toml::from_str(source)?;
        configuration.validation.clock_skew()?;
        configuration.sessions.message_ttl()?;
        Ok(configuration)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SamlResult<Self> {
        let source = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SamlError::Configuration(format!(
                "unable to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&source)
    }
}

/// The active key and the keys published next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotatingKeys {
    /// Key outgoing messages are signed with.
    pub active: Option<KeyData>,

    /// Keys published for verification only, e.g. during rotation.
    #[serde(default)]
    pub standby: Vec<KeyData>,
}

impl RotatingKeys {
    /// Active key first, then the standby keys.
    #[must_use]
    pub fn all(&self) -> Vec<KeyData> {
        self.active.iter().chain(&self.standby).cloned().collect()
    }
}

/// Settings shared by both hosted roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProviderConfiguration {
    /// Entity ID. Defaults to the base URL of the inbound request.
    #[serde(default)]
    pub entity_id: Option<String>,

    /// Alias used in URLs and as the NameID qualifier.
    #[serde(default)]
    pub alias: Option<String>,

    /// Path prefix of the hosted endpoints, with a trailing slash.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Whether the published metadata is signed with the active key.
    #[serde(default = "enabled")]
    pub sign_metadata: bool,

    /// Key material.
    #[serde(default)]
    pub keys: RotatingKeys,

    /// Signature algorithm for outgoing messages.
    #[serde(default)]
    pub default_signing_algorithm: SignatureAlgorithm,

    /// Reference digest for outgoing messages.
    #[serde(default)]
    pub default_digest: DigestAlgorithm,

    /// Supported NameID formats, preferred first.
    #[serde(default)]
    pub name_ids: Vec<NameIdFormat>,

    /// Whether single logout endpoints are published.
    #[serde(default)]
    pub single_logout_enabled: bool,
}

impl Default for LocalProviderConfiguration {
    fn default() -> Self {
        Self {
            entity_id: None,
            alias: None,
            prefix: None,
            sign_metadata: true,
            keys: RotatingKeys::default(),
            default_signing_algorithm: SignatureAlgorithm::default(),
            default_digest: DigestAlgorithm::default(),
            name_ids: Vec::new(),
            single_logout_enabled: false,
        }
    }
}

const fn enabled() -> bool {
    true
}

/// The hosted service provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalServiceProviderConfiguration {
    /// Settings shared with the identity provider.
    #[serde(flatten)]
    pub provider: LocalProviderConfiguration,

    /// Whether authentication requests are signed.
    #[serde(default)]
    pub sign_requests: bool,

    /// Whether assertions must arrive signed.
    #[serde(default = "enabled")]
    pub want_assertions_signed: bool,

    /// Whether the selection page is skipped when one provider is configured.
    #[serde(default = "enabled")]
    pub redirect_on_single_provider: bool,

    /// Trusted identity providers.
    #[serde(default)]
    pub providers: Vec<ExternalIdentityProviderConfiguration>,
}

impl Default for LocalServiceProviderConfiguration {
    fn default() -> Self {
        Self {
            provider: LocalProviderConfiguration::default(),
            sign_requests: false,
            want_assertions_signed: true,
            redirect_on_single_provider: true,
            providers: Vec::new(),
        }
    }
}

impl LocalServiceProviderConfiguration {
    /// Configured prefix, or `saml/sp/`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.provider.prefix.as_deref().unwrap_or(DEFAULT_SP_PREFIX)
    }
}

/// The hosted identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalIdentityProviderConfiguration {
    /// Settings shared with the service provider.
    #[serde(flatten)]
    pub provider: LocalProviderConfiguration,

    /// Whether authentication requests must arrive signed.
    #[serde(default)]
    pub want_requests_signed: bool,

    /// Allowance subtracted from `NotBefore`, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,

    /// Lifetime of an assertion, in seconds.
    #[serde(default = "default_assertion_validity")]
    pub assertion_validity_secs: i64,

    /// Lifetime of the session an assertion establishes, in seconds.
    #[serde(default = "default_session_validity")]
    pub session_validity_secs: i64,

    /// Known service providers.
    #[serde(default)]
    pub providers: Vec<ExternalServiceProviderConfiguration>,
}

const fn default_clock_skew() -> i64 {
    60
}

const fn default_assertion_validity() -> i64 {
    120
}

const fn default_session_validity() -> i64 {
    1800
}

impl Default for LocalIdentityProviderConfiguration {
    fn default() -> Self {
        Self {
            provider: LocalProviderConfiguration::default(),
            want_requests_signed: false,
            clock_skew_secs: default_clock_skew(),
            assertion_validity_secs: default_assertion_validity(),
            session_validity_secs: default_session_validity(),
            providers: Vec::new(),
        }
    }
}

impl LocalIdentityProviderConfiguration {
    /// Configured prefix, or `saml/idp/`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.provider.prefix.as_deref().unwrap_or(DEFAULT_IDP_PREFIX)
    }

    /// Validates and converts the time windows.
    pub fn time_windows(&self) -> SamlResult<TimeWindows> {
        Ok(TimeWindows {
            clock_skew: seconds("clock_skew_secs", self.clock_skew_secs)?,
            assertion_validity: seconds("assertion_validity_secs", self.assertion_validity_secs)?,
            session_validity: seconds("session_validity_secs", self.session_validity_secs)?,
        })
    }
}

/// Time windows applied to assertions built by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindows {
    /// Subtracted from `NotBefore`.
    pub clock_skew: TimeDelta,
    /// Added to the issue instant for `NotOnOrAfter`.
    pub assertion_validity: TimeDelta,
    /// Added to the issue instant for `SessionNotOnOrAfter`.
    pub session_validity: TimeDelta,
}

impl Default for TimeWindows {
    fn default() -> Self {
        Self {
            clock_skew: TimeDelta::seconds(default_clock_skew()),
            assertion_validity: TimeDelta::seconds(default_assertion_validity()),
            session_validity: TimeDelta::seconds(default_session_validity()),
        }
    }
}

pub(crate) fn seconds(name: &str, value: i64) -> SamlResult<TimeDelta> {
    if value < 0 {
        return Err(SamlError::Configuration(format!("{name} must not be negative")));
    }
    if value > MAX_WINDOW_SECS {
        return Err(SamlError::Configuration(format!(
            "{name} must not exceed {MAX_WINDOW_SECS}"
        )));
    }
    TimeDelta::try_seconds(value)
        .ok_or_else(|| SamlError::Configuration(format!("{name} is out of range")))
}

/// A remote provider the hosted one trusts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProviderConfiguration {
    /// Local alias, used in URLs and as the NameID qualifier.
    #[serde(default)]
    pub alias: Option<String>,

    /// Metadata URL or literal metadata XML.
    pub metadata: String,

    /// Label on the selection page.
    #[serde(default)]
    pub linktext: Option<String>,

    /// Skip TLS certificate checks when fetching metadata.
    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// Require the metadata to be signed by one of `verification_keys`.
    #[serde(default)]
    pub metadata_trust_check: bool,

    /// Keys the provider signs metadata with.
    #[serde(default)]
    pub verification_keys: Vec<KeyData>,
}

/// Where remote metadata comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource<'a> {
    /// Fetched from a URL.
    Url(&'a str),
    /// Given inline.
    Xml(&'a str),
}

impl ExternalProviderConfiguration {
    /// Tells a URL from inline XML.
    #[must_use]
    pub fn metadata_source(&self) -> MetadataSource<'_> {
        let trimmed = self.metadata.trim();
        if trimmed.starts_with('<') {
            MetadataSource::Xml(trimmed)
        } else {
            MetadataSource::Url(trimmed)
        }
    }
}

/// An identity provider trusted by the hosted service provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentityProviderConfiguration {
    /// Common remote settings.
    #[serde(flatten)]
    pub provider: ExternalProviderConfiguration,

    /// NameID format requested from this provider.
    #[serde(default)]
    pub name_id: Option<NameIdFormat>,

    /// Index of the assertion consumer service responses should go to.
    #[serde(default)]
    pub assertion_consumer_service_index: Option<u32>,
}

/// A service provider known to the hosted identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalServiceProviderConfiguration {
    /// Common remote settings.
    #[serde(flatten)]
    pub provider: ExternalProviderConfiguration,

    /// Whether the outer response is signed as well as the assertion.
    #[serde(default)]
    pub sign_responses: bool,
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Provider configuration file.
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Loads settings from the environment, reading `.env` first if present.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let host = std::env::var("SAML_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("SAML_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let config_path = std::env::var("SAML_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("saml.toml"));

        Self {
            host,
            port,
            config_path,
        }
    }

    /// `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[validation]
max_clock_skew_secs = 30

[service_provider]
entity_id = "https://sp.example.com"
alias = "sp"
sign_requests = true
name_ids = ["email"]
default_signing_algorithm = "rsa-sha512"
default_digest = "sha512"

[[service_provider.providers]]
alias = "corp"
metadata = "https://idp.example.com/metadata"
linktext = "Corporate login"
name_id = "persistent"
assertion_consumer_service_index = 1

[identity_provider]
assertion_validity_secs = 300
sign_metadata = false

[[identity_provider.providers]]
metadata = "<md:EntityDescriptor/>"
"#;

    #[test]
    fn parses_both_roles() {
        let config = SamlConfiguration::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.validation.max_clock_skew_secs, 30);

        let sp = &config.service_provider;
        assert_eq!(sp.provider.entity_id.as_deref(), Some("https://sp.example.com"));
        assert_eq!(sp.prefix(), DEFAULT_SP_PREFIX);
        assert!(sp.sign_requests);
        assert!(sp.want_assertions_signed);
        assert!(sp.provider.sign_metadata);
        assert_eq!(sp.provider.default_signing_algorithm, SignatureAlgorithm::RsaSha512);
        assert_eq!(sp.provider.default_digest, DigestAlgorithm::Sha512);

        let idp = &sp.providers[0];
        assert_eq!(idp.name_id, Some(NameIdFormat::Persistent));
        assert_eq!(idp.assertion_consumer_service_index, Some(1));
        assert_eq!(
            idp.provider.metadata_source(),
            MetadataSource::Url("https://idp.example.com/metadata")
        );

        let hosted_idp = &config.identity_provider;
        assert!(!hosted_idp.provider.sign_metadata);
        assert_eq!(hosted_idp.prefix(), DEFAULT_IDP_PREFIX);
        assert!(matches!(
            hosted_idp.providers[0].provider.metadata_source(),
            MetadataSource::Xml(_)
        ));
        let windows = hosted_idp.time_windows().unwrap();
        assert_eq!(windows.assertion_validity, TimeDelta::seconds(300));
        assert_eq!(windows.clock_skew, TimeDelta::seconds(60));
        assert_eq!(windows.session_validity, TimeDelta::seconds(1800));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = SamlConfiguration::from_toml_str("").unwrap();
        assert!(config.service_provider.providers.is_empty());
        assert_eq!(
            config.identity_provider.time_windows().unwrap(),
            TimeWindows::default()
        );
    }

    #[test]
    fn negative_window_is_a_configuration_error() {
        let config = SamlConfiguration::from_toml_str(
            "[identity_provider]\nsession_validity_secs = -1\n",
        )
        .unwrap();
        assert!(matches!(
            config.identity_provider.time_windows(),
            Err(SamlError::Configuration(_))
        ));
    }

    #[test]
    fn oversized_window_is_a_configuration_error() {
        let config = SamlConfiguration::from_toml_str(
            "[identity_provider]\nassertion_validity_secs = 9000000000000\n",
        )
        .unwrap();
        assert!(matches!(
            config.identity_provider.time_windows(),
            Err(SamlError::Configuration(_))
        ));
    }

    #[test]
    fn clock_skew_is_checked_on_load() {
        for skew in ["-1", "9000000000000"] {
            let source = format!("[validation]\nmax_clock_skew_secs = {skew}\n");
            assert!(matches!(
                SamlConfiguration::from_toml_str(&source),
                Err(SamlError::Configuration(_))
            ));
        }
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            SamlConfiguration::load("/nonexistent/saml.toml"),
            Err(SamlError::Configuration(_))
        ));
    }
}
