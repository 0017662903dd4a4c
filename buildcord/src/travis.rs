//! Travis CI webhook signature verification.
//!
//! Travis signs the raw `payload` form field with RSA-SHA1 and sends the base64 signature
//! in the `Signature` header. The public key is published in the Travis API config
//! document under `config.notifications.webhook.public_key`; it's fetched on first use
//! and cached.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde::Deserialize;
use sha1::Sha1;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::ingress::PayloadVerifier;

#[derive(Debug, Deserialize)]
struct TravisConfigResponse {
    config: TravisConfig,
}

#[derive(Debug, Deserialize)]
struct TravisConfig {
    notifications: TravisNotifications,
}

#[derive(Debug, Deserialize)]
struct TravisNotifications {
    webhook: TravisWebhook,
}

#[derive(Debug, Deserialize)]
struct TravisWebhook {
    public_key: String,
}

/// Verifies webhook signatures against the key Travis publishes.
pub struct TravisVerifier {
    http_client: Client,
    config_url: String,
    key: RwLock<Option<RsaPublicKey>>,
}

impl TravisVerifier {
    pub fn new(config_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            config_url: config_url.to_string(),
            key: RwLock::new(None),
        }
    }

    /// Cached key, fetched on first call. A failed fetch is retried on the next call.
    async fn public_key(&self) -> Result<RsaPublicKey> {
        if let Some(key) = self.key.read().await.as_ref() {
            return Ok(key.clone());
        }

        let mut cached = self.key.write().await;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }
        let key = self.fetch_key().await?;
        *cached = Some(key.clone());
        Ok(key)
    }

    async fn fetch_key(&self) -> Result<RsaPublicKey> {
        tracing::info!("Fetching webhook public key from {}", self.config_url);

        let response = self.http_client.get(&self.config_url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        let body: TravisConfigResponse = response.json().await?;
        parse_public_key(&body.config.notifications.webhook.public_key)
    }
}

/// Parse a PEM public key, SubjectPublicKeyInfo or PKCS#1.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::WebhookKey(e.to_string()))
}

/// Check a base64 RSA-SHA1 `signature` over `payload`.
pub fn verify_signature(key: &RsaPublicKey, payload: &str, signature: &str) -> bool {
    let Ok(bytes) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    VerifyingKey::<Sha1>::new(key.clone())
        .verify(payload.as_bytes(), &signature)
        .is_ok()
}

#[async_trait]
impl PayloadVerifier for TravisVerifier {
    async fn verify(&self, payload: &str, signature: &str) -> bool {
        match self.public_key().await {
            Ok(key) => verify_signature(&key, payload, signature),
            Err(e) => {
                tracing::warn!("Cannot verify webhook signature: {}", e);
                false
            }
        }
    }
}
