//! Customer-facing intake: first contact with the customer agent and
//! assembly of the per-turn handoff packet.

use tracing::warn;

use clerky_core::exchange::{ChatTurn, HistoryExcerpt, IntakePacket};
use clerky_core::extract::extract_requirements;
use clerky_core::metadata::{parse_state_metadata, strip_state_metadata};
use clerky_core::state::{ConversationState, IterationCounters};

use crate::channel::{AgentChannel, AgentMessage};

/// How many trailing history turns are sent to the customer agent and
/// echoed into the packet excerpt.
pub const CUSTOMER_CONTEXT_TURNS: usize = 10;

/// Draft used when the customer agent cannot be reached. The turn still
/// proceeds on the raw user input.
pub const CUSTOMER_UNAVAILABLE_NOTICE: &str =
    "I had trouble reaching our customer assistant, so I am working directly from your message.";

/// Run the intake step for one turn.
///
/// Calls the customer agent with the trailing history plus the new input,
/// parses the state metadata out of its reply, and packages everything for
/// the decision engine. Total: a transport failure keeps the prior state
/// and substitutes a notice draft.
pub async fn collect_customer_input(
    user_input: &str,
    customer: Option<&dyn AgentChannel>,
    history: &[ChatTurn],
    state: &ConversationState,
    counters: &IterationCounters,
) -> IntakePacket {
    let (draft, turn_state) = match customer {
        Some(channel) => match channel.converse(&context_messages(history, user_input)).await {
            Ok(reply) => (strip_state_metadata(&reply), parse_state_metadata(&reply)),
            Err(error) => {
                warn!(
                    event_name = "intake.customer_agent_failed",
                    agent = channel.label(),
                    error = %error,
                    "customer agent unavailable, continuing with raw input"
                );
                (CUSTOMER_UNAVAILABLE_NOTICE.to_string(), *state)
            }
        },
        None => (user_input.trim().to_string(), *state),
    };

    let mut scan_history: Vec<ChatTurn> = history.to_vec();
    scan_history.push(ChatTurn::user(user_input));
    let requirements = extract_requirements(&scan_history);

    let excerpt: Vec<HistoryExcerpt> = history
        .iter()
        .rev()
        .take(CUSTOMER_CONTEXT_TURNS)
        .rev()
        .map(|turn| HistoryExcerpt { role: turn.role, content: turn.content.clone() })
        .collect();

    IntakePacket::new(user_input, draft, requirements, turn_state, turn_state.routing, *counters)
        .with_recent_history(excerpt)
}

fn context_messages(history: &[ChatTurn], user_input: &str) -> Vec<AgentMessage> {
    let mut messages: Vec<AgentMessage> = history
        .iter()
        .rev()
        .take(CUSTOMER_CONTEXT_TURNS)
        .rev()
        .map(|turn| AgentMessage { role: turn.role.into(), content: turn.content.clone() })
        .collect();
    messages.push(AgentMessage::user(user_input));
    messages
}
