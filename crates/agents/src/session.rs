//! Conversation session: carries state, history, and counters across turns.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use clerky_core::config::AppConfig;
use clerky_core::exchange::{ChatTurn, OrchestratorResult};
use clerky_core::state::{
    ConversationState, IterationCounters, OverallStatus, Routing, SESSION_CLARIFICATION_CAP,
    SPECIALIST_CALL_CAP,
};
use clerky_core::trace::TurnTrace;

use crate::channel::AgentChannel;
use crate::engine::Orchestrator;
use crate::gateway::GatewayChannel;
use crate::intake::collect_customer_input;

pub const SESSION_GREETING: &str =
    "Hello! I'm your retail assistant. Tell me what you're looking for and I'll check our \
     stock and options for you.";

pub const SESSION_CAP_NOTICE: &str =
    "We've reached the maximum number of conversation iterations for this session. Please \
     reset the chat to start over.";

/// The four remote agents a session can talk to. Any of them may be absent;
/// the session degrades rather than failing.
#[derive(Clone, Default)]
pub struct AgentRoster {
    pub customer: Option<Arc<dyn AgentChannel>>,
    pub orchestrator: Option<Arc<dyn AgentChannel>>,
    pub product: Option<Arc<dyn AgentChannel>>,
    pub insurance: Option<Arc<dyn AgentChannel>>,
}

impl AgentRoster {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build gateway channels for every enabled roster entry.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let channel = |agent: &clerky_core::config::AgentRef| -> Result<Option<Arc<dyn AgentChannel>>> {
            if !agent.enabled {
                return Ok(None);
            }
            let channel = GatewayChannel::new(&config.gateway, agent.name.clone())?;
            Ok(Some(Arc::new(channel)))
        };

        Ok(Self {
            customer: channel(&config.roster.customer)?,
            orchestrator: channel(&config.roster.orchestrator)?,
            product: channel(&config.roster.product)?,
            insurance: channel(&config.roster.insurance)?,
        })
    }
}

/// Everything one turn produced: the consolidated result plus the decision
/// trace for operator display.
pub struct SessionReply {
    pub result: OrchestratorResult,
    pub trace: TurnTrace,
}

pub struct Session {
    state: ConversationState,
    history: Vec<ChatTurn>,
    counters: IterationCounters,
    customer: Option<Arc<dyn AgentChannel>>,
    engine: Orchestrator,
    session_clarification_cap: u32,
}

impl Session {
    pub fn new(roster: AgentRoster) -> Self {
        Self::build(roster, SPECIALIST_CALL_CAP, SESSION_CLARIFICATION_CAP)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let roster = AgentRoster::from_config(config)?;
        Ok(Self::build(
            roster,
            config.limits.specialist_call_cap,
            config.limits.session_clarification_cap,
        ))
    }

    fn build(roster: AgentRoster, specialist_call_cap: u32, session_clarification_cap: u32) -> Self {
        let mut engine = Orchestrator::new().with_specialist_call_cap(specialist_call_cap);
        if let Some(orchestrator) = roster.orchestrator {
            engine = engine.with_orchestrator(orchestrator);
        }
        if let Some(product) = roster.product {
            engine = engine.with_product(product);
        }
        if let Some(insurance) = roster.insurance {
            engine = engine.with_insurance(insurance);
        }

        Self {
            state: ConversationState::default(),
            history: vec![ChatTurn::assistant(SESSION_GREETING)],
            counters: IterationCounters::new(),
            customer: roster.customer,
            engine,
            session_clarification_cap,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn counters(&self) -> &IterationCounters {
        &self.counters
    }

    /// Run one full turn. The session cap is checked before any agent call
    /// so a runaway conversation stops without spending another request.
    pub async fn submit(&mut self, user_input: &str) -> SessionReply {
        let mut trace = TurnTrace::new();

        if self.counters.session_capped(self.session_clarification_cap) {
            info!(
                event_name = "session.cap_reached",
                clarifications = self.counters.customer_clarifications,
                "session iteration cap reached"
            );
            trace.push("session iteration cap reached");

            self.state.overall_status = OverallStatus::Stopped;
            self.state.routing = Routing::None;

            let mut result = OrchestratorResult::new(self.state, Routing::None);
            result.customer_response = SESSION_CAP_NOTICE.to_string();

            self.history.push(ChatTurn::user(user_input));
            self.history.push(ChatTurn::assistant(SESSION_CAP_NOTICE));
            return SessionReply { result, trace };
        }

        trace.push("intake started");
        let packet = collect_customer_input(
            user_input,
            self.customer.as_deref(),
            &self.history,
            &self.state,
            &self.counters,
        )
        .await;
        trace.push("intake complete");

        let result =
            self.engine.process_turn(&packet, &self.history, &mut self.counters, &mut trace).await;

        self.history.push(ChatTurn::user(user_input));
        let mut assistant_turn = ChatTurn::assistant(result.customer_response.clone());
        assistant_turn.specialist_responses = result.specialist_responses.clone();
        self.history.push(assistant_turn);

        self.state = result.state;
        self.counters.customer_clarifications += 1;

        SessionReply { result, trace }
    }

    /// Drop all conversation state and start over with the greeting.
    pub fn reset(&mut self) {
        self.state = ConversationState::default();
        self.history = vec![ChatTurn::assistant(SESSION_GREETING)];
        self.counters.reset();
    }
}
