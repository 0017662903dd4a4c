//! Configuration for the relay.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use url::Url;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Chat platform credentials and destination.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Bot token, used for the gateway handshake and the REST API.
    pub token: String,
    /// Channel receiving the build notifications.
    pub channel_id: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Game name announced once the session is ready.
    #[serde(default = "default_presence_name")]
    pub presence_name: String,
}

/// What to do with the cached session when the gateway sends `INVALID_SESSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidSessionPolicy {
    /// Log and keep the session; the next handshake resumes it.
    #[default]
    Keep,
    /// Forget the session and reconnect; the next handshake identifies.
    Reidentify,
}

/// Gateway connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket URL. Discovered through `GET /gateway` when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_gateway_version")]
    pub version: u8,
    /// Pause between generations. 0 reconnects immediately.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub invalid_session: InvalidSessionPolicy,
    /// Extra attempts for a failed outbound message. 0 only logs the failure.
    #[serde(default)]
    pub send_retries: u32,
    /// How long teardown waits for in-flight sends before cancelling them.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            version: default_gateway_version(),
            reconnect_delay_ms: default_reconnect_delay(),
            invalid_session: InvalidSessionPolicy::default(),
            send_retries: 0,
            drain_timeout_ms: default_drain_timeout(),
        }
    }
}

/// Webhook HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Reject webhooks whose `Signature` doesn't match the Travis public key.
    #[serde(default = "default_true")]
    pub verify_signatures: bool,
    /// Travis API document publishing the webhook public key.
    #[serde(default = "default_travis_config_url")]
    pub travis_config_url: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            verify_signatures: true,
            travis_config_url: default_travis_config_url(),
        }
    }
}

// Default values
fn default_api_url() -> String {
    "https://discordapp.com/api".to_string()
}
fn default_presence_name() -> String {
    "with Travis CI".to_string()
}
fn default_gateway_version() -> u8 {
    5
}
fn default_reconnect_delay() -> u64 {
    5000
}
fn default_drain_timeout() -> u64 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_travis_config_url() -> String {
    "https://api.travis-ci.org/config".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (BUILDCORD__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("discord.api_url", default_api_url())?
            .set_default("ingress.host", default_host())?
            .set_default("ingress.port", default_port() as i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("BUILDCORD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl GatewayConfig {
    /// Connection URL with the protocol version and encoding appended.
    ///
    /// A base without a path gets `/`, so the upgrade request line stays valid.
    pub fn connect_url(&self, base: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(base)?;
        if url.path().is_empty() {
            url.set_path("/");
        }
        url.query_pairs_mut()
            .append_pair("v", &self.version.to_string())
            .append_pair("encoding", "json");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gateway_config() {
        let gateway = GatewayConfig::default();
        assert!(gateway.url.is_none());
        assert_eq!(gateway.version, 5);
        assert_eq!(gateway.reconnect_delay_ms, 5000);
        assert_eq!(gateway.invalid_session, InvalidSessionPolicy::Keep);
        assert_eq!(gateway.send_retries, 0);
        assert_eq!(gateway.drain_timeout_ms, 5000);
    }

    #[test]
    fn test_default_ingress_config() {
        let ingress = IngressConfig::default();
        assert!(ingress.enabled);
        assert_eq!(ingress.host, "127.0.0.1");
        assert_eq!(ingress.port, 8888);
        assert!(ingress.verify_signatures);
        assert_eq!(ingress.travis_config_url, "https://api.travis-ci.org/config");
    }

    #[test]
    fn test_connect_url() {
        let gateway = GatewayConfig::default();
        assert_eq!(
            gateway.connect_url("wss://gateway.discord.gg").unwrap().as_str(),
            "wss://gateway.discord.gg/?v=5&encoding=json"
        );
        assert_eq!(
            gateway.connect_url("ws://127.0.0.1:4000").unwrap().as_str(),
            "ws://127.0.0.1:4000/?v=5&encoding=json"
        );
        assert_eq!(
            gateway.connect_url("ws://localhost:1234/?x=1").unwrap().as_str(),
            "ws://localhost:1234/?x=1&v=5&encoding=json"
        );
        assert_eq!(
            gateway.connect_url("wss://gateway.example/ws").unwrap().path(),
            "/ws"
        );
    }

    #[test]
    fn test_connect_url_rejects_garbage() {
        assert!(GatewayConfig::default().connect_url("not a url").is_err());
    }

    #[test]
    fn test_invalid_session_policy_parsing() {
        let policy: InvalidSessionPolicy = serde_json::from_str(r#""reidentify""#).unwrap();
        assert_eq!(policy, InvalidSessionPolicy::Reidentify);
    }
}
