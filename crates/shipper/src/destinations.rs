// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destination families.
//!
//! A family is a [`RequestRouting`] (where a batch is posted and how it is
//! authenticated) plus a serializer shape. Everything else a transport does
//! is shared.

use crate::config::{DestinationKind, TransportConfig, TransportSettings};
use crate::credentials::SecretDecryptor;
use crate::errors::ConfigError;
use crate::http::build_client;
use crate::serializer::{Compression, EventFormat, Serializer};
use crate::transport::Transport;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

pub const SPLUNK_HEC_PATH: &str = "/services/collector/event";
pub const SUMO_LOGIC_PATH_PREFIX: &str = "/receiver/v1/http/";

pub trait RequestRouting: Send + Sync + Debug {
    /// Absolute request path, starting with `/`.
    fn path(&self) -> &str;
    /// Destination-specific headers, credentials included.
    fn headers(&self) -> &HeaderMap;
}

fn auth_header(value: &str) -> Result<HeaderValue, ConfigError> {
    let mut header = HeaderValue::from_str(value).map_err(|e| ConfigError::Invalid {
        field: "auth_token",
        reason: e.to_string(),
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Generic collector: configured path and headers, optional raw
/// `Authorization` token.
#[derive(Debug, Clone)]
pub struct HttpRouting {
    path: String,
    headers: HeaderMap,
}

impl HttpRouting {
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let mut headers = config.headers().clone();
        if let Some(token) = config.credential() {
            headers.insert(AUTHORIZATION, auth_header(token)?);
        }
        Ok(Self {
            path: config.path().to_string(),
            headers,
        })
    }
}

impl RequestRouting for HttpRouting {
    fn path(&self) -> &str {
        &self.path
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Debug, Clone)]
pub struct SplunkRouting {
    headers: HeaderMap,
}

impl SplunkRouting {
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let token = config.credential().ok_or(ConfigError::Missing("auth_token"))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_header(&format!("Splunk {token}"))?);
        Ok(Self { headers })
    }
}

impl RequestRouting for SplunkRouting {
    fn path(&self) -> &str {
        SPLUNK_HEC_PATH
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// The collector token is part of the path; no auth header is sent.
#[derive(Clone)]
pub struct SumoLogicRouting {
    path: String,
    headers: HeaderMap,
}

impl SumoLogicRouting {
    pub fn new(config: &TransportConfig) -> Result<Self, ConfigError> {
        let token = config.credential().ok_or(ConfigError::Missing("auth_token"))?;
        if token.contains(['/', '?', '#']) {
            return Err(ConfigError::Invalid {
                field: "auth_token",
                reason: "must not contain '/', '?' or '#'".to_string(),
            });
        }
        Ok(Self {
            path: format!("{SUMO_LOGIC_PATH_PREFIX}{token}"),
            headers: HeaderMap::new(),
        })
    }
}

impl Debug for SumoLogicRouting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SumoLogicRouting({SUMO_LOGIC_PATH_PREFIX}<redacted>)")
    }
}

impl RequestRouting for SumoLogicRouting {
    fn path(&self) -> &str {
        &self.path
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

pub struct TransportFactory;

impl TransportFactory {
    pub fn routing(config: &TransportConfig) -> Result<Arc<dyn RequestRouting>, ConfigError> {
        Ok(match config.kind() {
            DestinationKind::Http => Arc::new(HttpRouting::new(config)?),
            DestinationKind::Splunk => Arc::new(SplunkRouting::new(config)?),
            DestinationKind::SumoLogic => Arc::new(SumoLogicRouting::new(config)?),
        })
    }

    pub fn serializer(config: &TransportConfig) -> Serializer {
        let compression = if config.use_gzip() {
            Compression::Gzip
        } else {
            Compression::None
        };
        match config.kind() {
            DestinationKind::Http => {
                Serializer::new(EventFormat::Raw, config.separator().as_bytes(), compression)
            }
            DestinationKind::Splunk => Serializer::new(
                EventFormat::SplunkHec {
                    index: config.index().map(str::to_string),
                },
                "\n",
                compression,
            ),
            DestinationKind::SumoLogic => Serializer::new(EventFormat::Raw, "\n", compression),
        }
    }

    /// Transport and serializer for one destination, sharing one HTTP client
    /// for the life of the transport.
    pub fn build(config: Arc<TransportConfig>) -> Result<(Transport, Serializer), ConfigError> {
        let routing = Self::routing(&config)?;
        let serializer = Self::serializer(&config);
        let client = build_client(&config)?;
        let transport = Transport::new(config, client, routing.as_ref(), serializer.clone());
        Ok((transport, serializer))
    }

    /// Validates `settings` and builds the transport in one step.
    pub async fn from_settings(
        settings: TransportSettings,
        decryptor: Arc<dyn SecretDecryptor>,
    ) -> Result<Transport, ConfigError> {
        let config = TransportConfig::new(settings, decryptor).await?;
        debug!(
            destination = %config.destination_id(),
            batch_size = config.batch_size(),
            retry_count = config.retry_count(),
            "DESTINATIONS | Built transport"
        );
        let (transport, _) = Self::build(Arc::new(config))?;
        Ok(transport)
    }
}
