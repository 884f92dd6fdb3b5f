// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-destination configuration.
//!
//! [`TransportSettings`] is what gets deserialized; [`TransportConfig`] is the
//! validated, immutable value the rest of the crate works with. Every bound is
//! checked in [`TransportConfig::new`], and an encrypted credential is
//! decrypted there too, so a bad destination is rejected before any event is
//! processed.

use crate::credentials::{CredentialFactory, SecretDecryptor};
use crate::errors::ConfigError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PORT: u32 = 443;
pub const DEFAULT_BATCH_SIZE: u64 = 500;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_MS: u64 = 40_000;

const PORT_RANGE: (u64, u64) = (1, 65_535);
const RETRY_COUNT_RANGE: (u64, u64) = (0, 10);
const RETRY_DELAY_MS_RANGE: (u64, u64) = (1, 60_000);
const TIMEOUT_MS_RANGE: (u64, u64) = (1_000, 300_000);

/// Destination family. Selects the routing and payload strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Any HTTP collector accepting delimited JSON.
    Http,
    /// Splunk HTTP Event Collector.
    Splunk,
    /// SumoLogic hosted HTTP source.
    SumoLogic,
}

impl DestinationKind {
    /// Inclusive bounds on `batch_size`.
    pub fn batch_size_bounds(self) -> (u64, u64) {
        match self {
            DestinationKind::Http | DestinationKind::SumoLogic => (1, 100_000),
            DestinationKind::Splunk => (500, 100_000),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Http => "http",
            DestinationKind::Splunk => "splunk",
            DestinationKind::SumoLogic => "sumo_logic",
        }
    }

    fn requires_token(self) -> bool {
        matches!(self, DestinationKind::Splunk | DestinationKind::SumoLogic)
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_port() -> u32 {
    DEFAULT_PORT
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Raw destination configuration, before validation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSettings {
    pub kind: DestinationKind,
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u32,
    /// Auth token. Prefix with `KMS=` when the value is encrypted.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Splunk data index.
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
    /// Off by default: TLS connections then accept any certificate. This is
    /// insecure and kept only for compatibility with existing deployments.
    #[serde(default)]
    pub validate_certificates: bool,
    #[serde(default)]
    pub use_gzip: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default)]
    pub retry_count: u64,
    /// Initial delay between retries. Doubles per attempt when more than one
    /// retry is allowed.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Request path, `http` destinations only.
    #[serde(default)]
    pub path: Option<String>,
    /// Event separator, `http` destinations only.
    #[serde(default)]
    pub separator: Option<String>,
    /// Extra request headers, `http` destinations only.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl TransportSettings {
    /// Settings with every optional field at its default.
    pub fn new(kind: DestinationKind, hostname: impl Into<String>) -> Self {
        Self {
            kind,
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            auth_token: None,
            index: None,
            use_ssl: false,
            validate_certificates: false,
            use_gzip: false,
            batch_size: DEFAULT_BATCH_SIZE,
            retry_count: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            path: None,
            separator: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Validated configuration for one destination. Immutable once built.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    kind: DestinationKind,
    hostname: String,
    port: u16,
    credential: Option<CredentialFactory>,
    index: Option<String>,
    use_ssl: bool,
    validate_certificates: bool,
    use_gzip: bool,
    batch_size: usize,
    retry_count: u32,
    retry_delay: Duration,
    timeout: Duration,
    path: String,
    separator: String,
    headers: HeaderMap,
}

fn check_range(field: &'static str, value: u64, (min, max): (u64, u64)) -> Result<u64, ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(value)
}

fn only_for_http(kind: DestinationKind, field: &'static str, present: bool) -> Result<(), ConfigError> {
    if present && kind != DestinationKind::Http {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("not supported for {kind} destinations"),
        });
    }
    Ok(())
}

impl TransportConfig {
    pub async fn new(
        settings: TransportSettings,
        decryptor: Arc<dyn SecretDecryptor>,
    ) -> Result<Self, ConfigError> {
        let kind = settings.kind;

        let hostname = settings.hostname.trim().to_string();
        if hostname.is_empty() {
            return Err(ConfigError::Missing("hostname"));
        }
        let port = check_range("port", u64::from(settings.port), PORT_RANGE)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::OutOfRange {
            field: "port",
            min: PORT_RANGE.0,
            max: PORT_RANGE.1,
            value: port,
        })?;
        let scheme = if settings.use_ssl { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{hostname}:{port}/")).map_err(|e| {
            ConfigError::Invalid {
                field: "hostname",
                reason: e.to_string(),
            }
        })?;

        let batch_size = check_range("batch_size", settings.batch_size, kind.batch_size_bounds())?;
        let retry_count = check_range("retry_count", settings.retry_count, RETRY_COUNT_RANGE)?;
        let retry_delay_ms =
            check_range("retry_delay_ms", settings.retry_delay_ms, RETRY_DELAY_MS_RANGE)?;
        let timeout_ms = check_range("timeout_ms", settings.timeout_ms, TIMEOUT_MS_RANGE)?;

        if settings.index.is_some() && kind != DestinationKind::Splunk {
            return Err(ConfigError::Invalid {
                field: "index",
                reason: format!("not supported for {kind} destinations"),
            });
        }
        only_for_http(kind, "path", settings.path.is_some())?;
        only_for_http(kind, "separator", settings.separator.is_some())?;
        only_for_http(kind, "headers", !settings.headers.is_empty())?;

        let path = settings.path.unwrap_or_else(|| "/".to_string());
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "path",
                reason: "must start with '/'".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Invalid {
                    field: "headers",
                    reason: format!("{name}: {e}"),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
                field: "headers",
                reason: format!("{name}: {e}"),
            })?;
            headers.insert(header_name, header_value);
        }

        let credential = match settings.auth_token.as_deref().map(str::trim) {
            Some("") | None if kind.requires_token() => {
                return Err(ConfigError::Missing("auth_token"));
            }
            Some("") | None => None,
            Some(token) => Some(CredentialFactory::new(token, decryptor)),
        };
        // Surface decryption problems now rather than on the first send.
        if let Some(credential) = &credential {
            credential.resolve().await?;
        }

        // Both were range checked above.
        #[allow(clippy::cast_possible_truncation)]
        let (batch_size, retry_count) = (batch_size as usize, retry_count as u32);

        Ok(Self {
            kind,
            hostname,
            port,
            credential,
            index: settings.index,
            use_ssl: settings.use_ssl,
            validate_certificates: settings.validate_certificates,
            use_gzip: settings.use_gzip,
            batch_size,
            retry_count,
            retry_delay: Duration::from_millis(retry_delay_ms),
            timeout: Duration::from_millis(timeout_ms),
            path,
            separator: settings.separator.unwrap_or_else(|| "\n".to_string()),
            headers,
        })
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    pub fn validate_certificates(&self) -> bool {
        self.validate_certificates
    }

    pub fn use_gzip(&self) -> bool {
        self.use_gzip
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Plaintext credential, decrypting it if this is the first use.
    pub async fn resolve_credential(&self) -> Result<Option<&str>, ConfigError> {
        match &self.credential {
            Some(credential) => credential.resolve().await.map(Some),
            None => Ok(None),
        }
    }

    /// Plaintext credential as resolved during construction.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_ref().and_then(CredentialFactory::cached)
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.hostname, self.port)
    }

    /// Identity used in logs and delivery records. Never contains the token.
    pub fn destination_id(&self) -> String {
        format!("{}://{}:{}", self.kind, self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::ReversingDecryptor;
    use crate::credentials::NoDecryptor;
    use serde_json::json;

    async fn build(settings: TransportSettings) -> Result<TransportConfig, ConfigError> {
        TransportConfig::new(settings, Arc::new(NoDecryptor)).await
    }

    fn splunk() -> TransportSettings {
        let mut settings = TransportSettings::new(DestinationKind::Splunk, "hec.example.com");
        settings.auth_token = Some("token".to_string());
        settings
    }

    #[tokio::test]
    async fn test_defaults() {
        let config = build(splunk()).await.expect("valid");
        assert_eq!(config.port(), 443);
        assert_eq!(config.batch_size(), 500);
        assert_eq!(config.retry_count(), 0);
        assert_eq!(config.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.timeout(), Duration::from_millis(40_000));
        assert!(!config.use_ssl());
        assert!(!config.validate_certificates());
        assert!(!config.use_gzip());
        assert_eq!(config.credential(), Some("token"));
        assert_eq!(config.base_url(), "http://hec.example.com:443");
        assert_eq!(config.destination_id(), "splunk://hec.example.com:443");
    }

    #[tokio::test]
    async fn test_deserialize_settings() {
        let settings: TransportSettings = serde_json::from_value(json!({
            "kind": "sumo_logic",
            "hostname": "collectors.sumologic.com",
            "auth_token": "abc",
            "use_ssl": true,
            "use_gzip": true,
            "batch_size": 100,
            "retry_count": 3,
            "retry_delay_ms": 250,
            "timeout_ms": 5000
        }))
        .expect("valid settings");

        let config = build(settings).await.expect("valid");

        assert_eq!(config.kind(), DestinationKind::SumoLogic);
        assert_eq!(config.batch_size(), 100);
        assert_eq!(config.retry_count(), 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.base_url(), "https://collectors.sumologic.com:443");
    }

    #[test]
    fn test_unknown_settings_field_is_rejected() {
        let result = serde_json::from_value::<TransportSettings>(json!({
            "kind": "http",
            "hostname": "h",
            "retries": 3
        }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_values() {
        let cases: [(&str, fn(&mut TransportSettings)); 9] = [
            ("port", |s| s.port = 0),
            ("port", |s| s.port = 70_000),
            ("batch_size", |s| s.batch_size = 499),
            ("batch_size", |s| s.batch_size = 100_001),
            ("retry_count", |s| s.retry_count = 11),
            ("retry_delay_ms", |s| s.retry_delay_ms = 0),
            ("retry_delay_ms", |s| s.retry_delay_ms = 60_001),
            ("timeout_ms", |s| s.timeout_ms = 999),
            ("timeout_ms", |s| s.timeout_ms = 300_001),
        ];

        for (expected, mutate) in cases {
            let mut settings = splunk();
            mutate(&mut settings);
            match build(settings).await {
                Err(ConfigError::OutOfRange { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} to be out of range, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_bounds_are_inclusive() {
        let mut settings = splunk();
        settings.batch_size = 100_000;
        settings.retry_count = 10;
        settings.retry_delay_ms = 60_000;
        settings.timeout_ms = 1_000;
        settings.port = 65_535;
        assert!(build(settings).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_batch_size_lower_bound() {
        let mut settings = TransportSettings::new(DestinationKind::Http, "localhost");
        settings.batch_size = 1;
        assert!(build(settings.clone()).await.is_ok());
        settings.batch_size = 0;
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::OutOfRange {
                field: "batch_size",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_token_required_for_splunk_and_sumo() {
        for kind in [DestinationKind::Splunk, DestinationKind::SumoLogic] {
            let mut settings = TransportSettings::new(kind, "h");
            assert!(matches!(
                build(settings.clone()).await,
                Err(ConfigError::Missing("auth_token"))
            ));
            settings.auth_token = Some("  ".to_string());
            assert!(matches!(
                build(settings).await,
                Err(ConfigError::Missing("auth_token"))
            ));
        }
        let http = TransportSettings::new(DestinationKind::Http, "h");
        assert!(build(http).await.expect("valid").credential().is_none());
    }

    #[tokio::test]
    async fn test_http_only_fields() {
        let mut settings = splunk();
        settings.path = Some("/ingest".to_string());
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Invalid { field: "path", .. })
        ));

        let mut settings = TransportSettings::new(DestinationKind::Http, "h");
        settings.index = Some("main".to_string());
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Invalid { field: "index", .. })
        ));

        let mut settings = TransportSettings::new(DestinationKind::Http, "h");
        settings.path = Some("ingest".to_string());
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Invalid { field: "path", .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_header() {
        let mut settings = TransportSettings::new(DestinationKind::Http, "h");
        settings
            .headers
            .insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Invalid {
                field: "headers",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_hostname() {
        let settings = TransportSettings::new(DestinationKind::Http, "not a host");
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Invalid {
                field: "hostname",
                ..
            })
        ));
        let settings = TransportSettings::new(DestinationKind::Http, "   ");
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Missing("hostname"))
        ));
    }

    #[tokio::test]
    async fn test_encrypted_token_is_decrypted_at_construction() {
        let decryptor = Arc::new(ReversingDecryptor::default());
        let mut settings = splunk();
        settings.auth_token = Some("KMS=terces".to_string());

        let config = TransportConfig::new(settings, decryptor.clone())
            .await
            .expect("valid");

        assert_eq!(config.credential(), Some("secret"));
        assert_eq!(
            config.resolve_credential().await.expect("resolved"),
            Some("secret")
        );
        assert_eq!(
            decryptor.calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_undecryptable_token_fails_construction() {
        let mut settings = splunk();
        settings.auth_token = Some("KMS=AQICAHh...".to_string());
        assert!(matches!(
            build(settings).await,
            Err(ConfigError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_debug_never_shows_token() {
        let config = build(splunk()).await.expect("valid");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("\"token\""));
        assert!(!rendered.contains("Static(token"));
    }
}
