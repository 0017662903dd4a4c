//! Build notifications and the chat messages made from them.

use serde::{Deserialize, Serialize};

/// A CI build-status record, produced by the webhook ingress and consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildNotification {
    pub repository_name: String,
    pub owner_name: String,
    pub status_message: String,
    pub author_name: String,
    /// Build type (e.g. "push", "pull_request").
    #[serde(rename = "type")]
    pub build_type: String,
    pub compare_url: String,
    pub build_url: String,
}

impl BuildNotification {
    /// Rich embed announcing this build.
    pub fn to_embed(&self) -> Embed {
        Embed {
            title: format!(
                "{}/{} {}",
                self.owner_name, self.repository_name, self.status_message
            ),
            kind: "rich".to_string(),
            description: format!(
                "{} {} <{}>",
                self.author_name, self.build_type, self.compare_url
            ),
            url: self.build_url.clone(),
        }
    }

    /// Placeholder notification used to test the relay end to end.
    pub fn fake() -> Self {
        Self {
            repository_name: "travisbot".to_string(),
            owner_name: String::new(),
            status_message: "test".to_string(),
            author_name: String::new(),
            build_type: String::new(),
            compare_url: String::new(),
            build_url: String::new(),
        }
    }
}

/// Rich message embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub url: String,
}

/// Body of a create-message request: `{"content": ..}` or `{"embed": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBody {
    Content(String),
    Embed(Embed),
}

/// Webhook payload as posted by Travis CI. Only the fields the relay uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TravisPayload {
    #[serde(default)]
    pub repository: TravisRepository,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default, rename = "type")]
    pub build_type: Option<String>,
    #[serde(default)]
    pub compare_url: Option<String>,
    #[serde(default)]
    pub build_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TravisRepository {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl From<TravisPayload> for BuildNotification {
    fn from(payload: TravisPayload) -> Self {
        Self {
            repository_name: payload.repository.name.unwrap_or_default(),
            owner_name: payload.repository.owner_name.unwrap_or_default(),
            status_message: payload.status_message.unwrap_or_default(),
            author_name: payload.author_name.unwrap_or_default(),
            build_type: payload.build_type.unwrap_or_default(),
            compare_url: payload.compare_url.unwrap_or_default(),
            build_url: payload.build_url.unwrap_or_default(),
        }
    }
}
