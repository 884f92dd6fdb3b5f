// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for destination transports.

use crate::config::TransportConfig;
use crate::errors::ConfigError;
use core::time::Duration;
use shipper_tls::{create_reqwest_client_builder, TlsOptions};

/// Builds the client for one destination: TLS per its settings, its socket
/// timeout on connect and on every read, pooled connections with TCP
/// keep-alive.
///
/// Redirects are never followed; a 3xx reaches the transport and fails the
/// batch.
///
/// HTTP/1.1 is negotiated by default; collectors behind load balancers
/// commonly do not speak h2c.
pub fn build_client(config: &TransportConfig) -> Result<reqwest::Client, ConfigError> {
    let tls = TlsOptions {
        validate_certificates: config.validate_certificates(),
    };
    let builder = create_reqwest_client_builder(tls)
        .map_err(|e| ConfigError::HttpClient(e.to_string()))?
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(config.timeout())
        .read_timeout(config.timeout())
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Detects dead connections between batches.
        .tcp_keepalive(Some(Duration::from_secs(120)));

    builder
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}
