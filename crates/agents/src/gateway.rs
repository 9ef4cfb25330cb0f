//! HTTP transport to the agent gateway.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use clerky_core::config::GatewayConfig;

use crate::channel::{AgentChannel, AgentMessage};

/// One remote agent reachable through the gateway's `/responses` endpoint.
pub struct GatewayChannel {
    client: reqwest::Client,
    endpoint: String,
    agent_name: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    agent: AgentReference<'a>,
    input: &'a [AgentMessage],
}

#[derive(Serialize)]
struct AgentReference<'a> {
    name: &'a str,
    r#type: &'static str,
}

impl GatewayChannel {
    pub fn new(gateway: &GatewayConfig, agent_name: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(gateway.timeout_secs))
            .build()
            .context("could not build gateway http client")?;

        let endpoint = format!("{}/responses", gateway.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            agent_name: agent_name.into(),
            api_key: gateway.api_key.clone(),
        })
    }
}

#[async_trait]
impl AgentChannel for GatewayChannel {
    fn label(&self) -> &str {
        &self.agent_name
    }

    async fn converse(&self, messages: &[AgentMessage]) -> Result<String> {
        let request = ResponsesRequest {
            agent: AgentReference { name: &self.agent_name, r#type: "agent_reference" },
            input: messages,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("gateway request to `{}` failed", self.agent_name))?;

        let status = response.status();
        if !status.is_success() {
            bail!("gateway returned {status} for agent `{}`", self.agent_name);
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("gateway reply for `{}` was not JSON", self.agent_name))?;

        match body.get("output_text").and_then(Value::as_str) {
            Some(text) => Ok(text.to_string()),
            None => bail!("gateway reply for `{}` is missing `output_text`", self.agent_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use clerky_core::config::GatewayConfig;

    use super::GatewayChannel;

    #[test]
    fn endpoint_is_normalized_against_trailing_slashes() {
        let gateway = GatewayConfig {
            base_url: "http://localhost:8088/".to_string(),
            api_key: None,
            timeout_secs: 30,
        };

        let channel = GatewayChannel::new(&gateway, "orchestrator_agent").expect("channel builds");
        assert_eq!(channel.endpoint, "http://localhost:8088/responses");
        assert_eq!(channel.agent_name, "orchestrator_agent");
    }
}
