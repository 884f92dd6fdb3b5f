// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! TLS setup for the HTTP clients used by destination transports.
//!
//! Without the `fips` feature the builder uses reqwest's bundled rustls
//! configuration. With `fips`, a process-wide FIPS crypto provider must have
//! been installed before any client is built.

use reqwest::ClientBuilder;
use std::error::Error;
#[cfg(feature = "fips")]
use tracing::debug;
use tracing::warn;

/// Certificate handling for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsOptions {
    /// When false, server certificates and host names are not checked.
    pub validate_certificates: bool,
}

/// Creates a reqwest client builder honouring `options`.
#[cfg(not(feature = "fips"))]
pub fn create_reqwest_client_builder(
    options: TlsOptions,
) -> Result<ClientBuilder, Box<dyn Error + Send + Sync>> {
    let builder = reqwest::Client::builder().use_rustls_tls();
    if options.validate_certificates {
        return Ok(builder);
    }
    warn!("TLS | certificate validation is disabled for this destination");
    Ok(builder
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true))
}

/// Creates a reqwest client builder backed by the installed FIPS provider and
/// the native root store. Skipping validation is refused in this mode.
#[cfg(feature = "fips")]
pub fn create_reqwest_client_builder(
    options: TlsOptions,
) -> Result<ClientBuilder, Box<dyn Error + Send + Sync>> {
    if !options.validate_certificates {
        warn!("TLS | refusing to disable certificate validation in FIPS mode");
        return Err("certificate validation cannot be disabled in FIPS mode".into());
    }

    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;
    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    let mut valid_count = 0;
    for cert in native_certs.certs {
        match root_cert_store.add(cert) {
            Ok(()) => valid_count += 1,
            Err(err) => debug!("TLS | skipping unparsable root certificate: {:?}", err),
        }
    }
    if valid_count == 0 {
        return Err("No valid certificates found in native root store".into());
    }

    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(rustls::ALL_VERSIONS)
        .map_err(|_| "Failed to set protocol versions")?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("TLS | client builder configured with FIPS provider");

    Ok(reqwest::Client::builder().use_preconfigured_tls(config))
}
