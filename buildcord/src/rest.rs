//! Chat platform REST API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use buildcord_common::MessageBody;

use crate::error::{Error, Result};

/// Directory API capability used by the relay: posting messages to a channel.
///
/// Implemented by [`RestClient`]; tests substitute recording mocks.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Post `body` to `channel_id`. Any non-2xx response is an error.
    async fn send_message(&self, channel_id: &str, body: &MessageBody) -> Result<()>;
}

/// HTTP client for the platform's REST API, authenticated as a bot.
pub struct RestClient {
    http_client: Client,
    base_url: String,
    token: String,
}

/// Response from the /gateway endpoint.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    url: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Ask the API where the gateway lives.
    pub async fn gateway_url(&self) -> Result<String> {
        let url = format!("{}/gateway", self.base_url);

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        let gateway: GatewayResponse = response.json().await?;
        Ok(gateway.url)
    }
}

#[async_trait]
impl DirectoryApi for RestClient {
    async fn send_message(&self, channel_id: &str, body: &MessageBody) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel_id);

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        tracing::debug!(channel_id, "Message posted");
        Ok(())
    }
}
