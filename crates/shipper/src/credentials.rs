// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destination credentials.
//!
//! A configured token prefixed with [`ENCRYPTED_PREFIX`] is an encrypted
//! reference; the remainder is handed to a [`SecretDecryptor`] once and the
//! plaintext is kept for the life of the process. Anything else is used as is.

use crate::errors::ConfigError;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const ENCRYPTED_PREFIX: &str = "KMS=";

/// Decrypts an opaque ciphertext into the plaintext secret. Typically backed by
/// a cloud key management service.
#[async_trait]
pub trait SecretDecryptor: Send + Sync {
    async fn decrypt(&self, ciphertext: &str) -> Result<String, String>;
}

/// Used when no key management integration is configured. Any encrypted
/// credential is then a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecryptor;

#[async_trait]
impl SecretDecryptor for NoDecryptor {
    async fn decrypt(&self, _ciphertext: &str) -> Result<String, String> {
        Err("no decryptor configured for encrypted credentials".to_string())
    }
}

#[derive(Clone)]
pub enum CredentialFactory {
    Static(String),
    Encrypted {
        ciphertext: String,
        decryptor: Arc<dyn SecretDecryptor>,
        secret: Arc<OnceCell<String>>,
    },
}

impl CredentialFactory {
    pub fn new(raw: &str, decryptor: Arc<dyn SecretDecryptor>) -> Self {
        match raw.strip_prefix(ENCRYPTED_PREFIX) {
            Some(ciphertext) => Self::Encrypted {
                ciphertext: ciphertext.to_string(),
                decryptor,
                secret: Arc::new(OnceCell::new()),
            },
            None => Self::Static(raw.to_string()),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }

    /// Returns the plaintext, decrypting on first use. A failed decryption is
    /// not cached, so the next call tries again.
    pub async fn resolve(&self) -> Result<&str, ConfigError> {
        match self {
            Self::Static(secret) => Ok(secret),
            Self::Encrypted {
                ciphertext,
                decryptor,
                secret,
            } => {
                let plaintext = secret
                    .get_or_try_init(|| async {
                        let plaintext = decryptor
                            .decrypt(ciphertext)
                            .await
                            .map_err(ConfigError::Decryption)?;
                        if plaintext.is_empty() {
                            return Err(ConfigError::Decryption(
                                "decrypted credential is empty".to_string(),
                            ));
                        }
                        Ok::<_, ConfigError>(plaintext)
                    })
                    .await?;
                Ok(plaintext.as_str())
            }
        }
    }

    /// The plaintext if it is already known, without decrypting.
    pub fn cached(&self) -> Option<&str> {
        match self {
            Self::Static(secret) => Some(secret),
            Self::Encrypted { secret, .. } => secret.get().map(String::as_str),
        }
    }
}

impl Debug for CredentialFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => write!(f, "CredentialFactory::Static(<redacted>)"),
            Self::Encrypted { .. } => write!(f, "CredentialFactory::Encrypted(<redacted>)"),
        }
    }
}
