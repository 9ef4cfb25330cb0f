//! Scripted agent channel for tests and smoke checks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::channel::{AgentChannel, AgentMessage};

enum ScriptedReply {
    Text(String),
    Failure(String),
}

/// Replays a queue of canned replies in order. Running out of replies is an
/// error so tests notice unexpected extra calls.
pub struct ScriptedAgent {
    label: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), replies: Mutex::new(VecDeque::new()), calls: AtomicUsize::new(0) }
    }

    pub fn enqueue(&self, reply: impl Into<String>) {
        self.locked_replies().push_back(ScriptedReply::Text(reply.into()));
    }

    pub fn enqueue_failure(&self, message: impl Into<String>) {
        self.locked_replies().push_back(ScriptedReply::Failure(message.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn locked_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedReply>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AgentChannel for ScriptedAgent {
    fn label(&self) -> &str {
        &self.label
    }

    async fn converse(&self, _messages: &[AgentMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.locked_replies().pop_front();
        match next {
            Some(ScriptedReply::Text(reply)) => Ok(reply),
            Some(ScriptedReply::Failure(message)) => bail!(message),
            None => Err(anyhow!("scripted agent `{}` has no scripted reply remaining", self.label)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::{AgentChannel, AgentMessage};

    use super::ScriptedAgent;

    #[tokio::test]
    async fn replays_replies_in_order_then_errors() {
        let agent = ScriptedAgent::new("product");
        agent.enqueue("first");
        agent.enqueue_failure("gateway timeout");

        let messages = [AgentMessage::user("hello")];
        assert_eq!(agent.converse(&messages).await.unwrap(), "first");
        assert!(agent.converse(&messages).await.is_err());
        assert!(agent.converse(&messages).await.is_err());
        assert_eq!(agent.call_count(), 3);
    }
}
