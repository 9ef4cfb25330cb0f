use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use clerky_core::exchange::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// One message in the transcript handed to a remote agent.
#[derive(Clone, Debug, Serialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Transport seam for every remote agent. Implementations must be usable
/// behind an `Arc` from the session loop.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// Short human-readable label used in logs and error messages.
    fn label(&self) -> &str;

    /// Send a transcript and return the agent's raw reply text.
    async fn converse(&self, messages: &[AgentMessage]) -> Result<String>;
}

/// Send a single serialized payload as one user message.
pub async fn send_payload(
    channel: &dyn AgentChannel,
    payload: &impl Serialize,
) -> Result<String> {
    let body = serde_json::to_string(payload)?;
    channel.converse(&[AgentMessage::user(body)]).await
}
