//! The turn decision engine.
//!
//! Each turn first asks the orchestrator agent for a structured decision.
//! When that reply is unusable (transport failure, prose, malformed JSON)
//! the engine falls back to deterministic routing derived from the intake
//! packet. Both paths then run through the same policy pass that enforces
//! the inventory-first gate, the insurance preconditions, and the
//! per-specialist call caps, so no agent reply can bypass a policy.

use std::sync::Arc;

use tracing::{info, warn};

use clerky_core::exchange::{
    extract_json_object, is_valid_orchestrator_result, ChatTurn, IntakePacket,
    OrchestratorResult, Speaker, SpecialistEntry,
};
use clerky_core::extract::{validate_insurance_context, validate_product_context};
use clerky_core::inventory::{has_failed_internal_option_agreement, InventoryCheckResult};
use clerky_core::respond::{
    build_customer_summary, digest_specialist_reply, merge_summary_parts,
    sanitize_customer_response,
};
use clerky_core::state::{ConversationState, IterationCounters, Routing, SPECIALIST_CALL_CAP};
use clerky_core::state::{OverallStatus, ProductStatus};
use clerky_core::trace::TurnTrace;

use crate::channel::{send_payload, AgentChannel};
use crate::specialists::{consult_insurance, consult_product};

/// Explicit customer requests that force a route regardless of the hint.
const PRODUCT_REQUEST_KEYWORDS: [&str; 5] =
    ["product specialist", "product_agent", "product agent", "catalog specialist", "refer to product"];

const INSURANCE_REQUEST_KEYWORDS: [&str; 4] =
    ["insurance specialist", "insurance_agent", "insurance offer", "protection plan"];

/// Phrases in the customer agent's draft that suggest a route. Weaker than
/// an explicit request, so they only apply in a matching state.
const PRODUCT_DRAFT_KEYWORDS: [&str; 3] =
    ["product specialist", "external catalog", "catalog specialist"];

const INSURANCE_DRAFT_KEYWORDS: [&str; 3] =
    ["insurance specialist", "insurance offer", "protection plan"];

const CONFIRM_INTERNAL_OPTIONS_PROMPT: &str =
    "Before I search the wider catalog, please take a look at our internal options - do any of \
     them work for you? If none fit, say \"show more options\" and I will bring in our product \
     specialist.";

const INVENTORY_DEFERRAL_NOTICE: &str =
    "External product search deferred until the internal inventory options are reviewed.";

const PRODUCT_CAP_NOTICE: &str =
    "Maximum product specialist consultations reached. Using the best available information.";

const INSURANCE_CAP_NOTICE: &str =
    "Maximum insurance specialist consultations reached. Using the best available information.";

const PRODUCT_EMPTY_REPLY: &str =
    "The product specialist returned no concrete result yet. Please ask again in a moment.";

const INSURANCE_EMPTY_REPLY: &str =
    "The insurance specialist returned no concrete result yet. Please ask again in a moment.";

/// Routes one turn. Holds channels only; all conversation state comes in
/// and goes out through `process_turn`.
pub struct Orchestrator {
    orchestrator: Option<Arc<dyn AgentChannel>>,
    product: Option<Arc<dyn AgentChannel>>,
    insurance: Option<Arc<dyn AgentChannel>>,
    specialist_call_cap: u32,
}

struct TurnSeed {
    state: ConversationState,
    routing: Routing,
    entries: Vec<SpecialistEntry>,
    inventory: Option<InventoryCheckResult>,
    base_draft: String,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            orchestrator: None,
            product: None,
            insurance: None,
            specialist_call_cap: SPECIALIST_CALL_CAP,
        }
    }

    pub fn with_orchestrator(mut self, channel: Arc<dyn AgentChannel>) -> Self {
        self.orchestrator = Some(channel);
        self
    }

    pub fn with_product(mut self, channel: Arc<dyn AgentChannel>) -> Self {
        self.product = Some(channel);
        self
    }

    pub fn with_insurance(mut self, channel: Arc<dyn AgentChannel>) -> Self {
        self.insurance = Some(channel);
        self
    }

    pub fn with_specialist_call_cap(mut self, cap: u32) -> Self {
        self.specialist_call_cap = cap;
        self
    }

    /// Decide and execute one turn. Never fails: every error path degrades
    /// into System entries inside the returned result.
    pub async fn process_turn(
        &self,
        packet: &IntakePacket,
        history: &[ChatTurn],
        counters: &mut IterationCounters,
        trace: &mut TurnTrace,
    ) -> OrchestratorResult {
        let mut scan_history: Vec<ChatTurn> = history.to_vec();
        scan_history.push(ChatTurn::user(&packet.conversation.latest_user_input));

        let seed = match self.consult_orchestrator(packet, trace).await {
            Some(seed) => seed,
            None => self.deterministic_seed(packet, &scan_history, trace),
        };

        self.run_policy(seed, packet, &scan_history, counters, trace).await
    }

    async fn consult_orchestrator(
        &self,
        packet: &IntakePacket,
        trace: &mut TurnTrace,
    ) -> Option<TurnSeed> {
        let channel = self.orchestrator.as_ref()?;

        let raw = match send_payload(channel.as_ref(), packet).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "engine.orchestrator_failed",
                    agent = channel.label(),
                    error = %error,
                    "orchestrator agent unavailable"
                );
                trace.push("orchestrator unavailable, falling back to deterministic routing");
                return None;
            }
        };

        let Some(value) = extract_json_object(&raw) else {
            warn!(
                event_name = "engine.orchestrator_unparseable",
                agent = channel.label(),
                "orchestrator reply carried no JSON object"
            );
            trace.push("orchestrator reply unparseable, falling back to deterministic routing");
            return None;
        };

        if !is_valid_orchestrator_result(&value) {
            warn!(
                event_name = "engine.orchestrator_invalid",
                agent = channel.label(),
                "orchestrator reply is not a turn result"
            );
            trace.push("orchestrator reply invalid, falling back to deterministic routing");
            return None;
        }

        let fallback_state = packet.routing_context.state;
        let state = ConversationState::from_value_lenient(&value["state"], &fallback_state);

        let entries: Vec<SpecialistEntry> = value
            .get("specialist_responses")
            .and_then(serde_json::Value::as_array)
            .map(|items| items.iter().filter_map(SpecialistEntry::from_value).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(redigest_entry)
            .collect();

        let mut routing = value
            .get("routing")
            .and_then(serde_json::Value::as_str)
            .map(Routing::parse_lenient)
            .unwrap_or(state.routing);
        if routing == Routing::None {
            // Some orchestrator replies state the intended route only in a
            // System note instead of the routing field.
            routing = routing_from_system_entries(&entries);
        }

        let inventory = value
            .get("inventory_check")
            .and_then(|check| InventoryCheckResult::from_value(check, &state));

        let base_draft = value
            .get("customer_response")
            .and_then(serde_json::Value::as_str)
            .map(sanitize_customer_response)
            .filter(|draft| !draft.is_empty())
            .unwrap_or_else(|| sanitize_customer_response(&packet.intake.customer_visible_draft));

        trace.push("orchestrator decision accepted");
        Some(TurnSeed { state, routing, entries, inventory, base_draft })
    }

    fn deterministic_seed(
        &self,
        packet: &IntakePacket,
        scan_history: &[ChatTurn],
        trace: &mut TurnTrace,
    ) -> TurnSeed {
        let state = packet.routing_context.state;
        let mut routing = packet.routing_context.routing_hint;

        if routing == Routing::None {
            routing = infer_routing(packet, &state, scan_history);
        }

        info!(
            event_name = "engine.deterministic_route",
            route = ?routing,
            phase = state.phase(),
            "deterministic routing decision"
        );
        trace.push(format!("deterministic routing: {routing:?}"));

        TurnSeed {
            state,
            routing,
            entries: Vec::new(),
            inventory: None,
            base_draft: sanitize_customer_response(&packet.intake.customer_visible_draft),
        }
    }

    async fn run_policy(
        &self,
        seed: TurnSeed,
        packet: &IntakePacket,
        scan_history: &[ChatTurn],
        counters: &mut IterationCounters,
        trace: &mut TurnTrace,
    ) -> OrchestratorResult {
        let TurnSeed { mut state, mut routing, mut entries, mut inventory, base_draft } = seed;
        let product_related = routing == Routing::ProductAgent;
        let mut gated = false;

        if routing == Routing::ProductAgent
            && !has_failed_internal_option_agreement(&state, inventory.as_ref(), scan_history)
        {
            warn!(
                event_name = "engine.inventory_gate",
                turn_id = %trace.turn_id,
                "external product routing blocked pending internal option review"
            );
            trace.push("inventory-first gate: external product search deferred");
            routing = Routing::None;
            entries = vec![SpecialistEntry::system(INVENTORY_DEFERRAL_NOTICE)];
            gated = true;
        }

        if !gated && routing.is_specialist() {
            self.consult_specialist(
                routing,
                packet,
                scan_history,
                &state,
                inventory.as_ref(),
                &mut entries,
                counters,
                trace,
            )
            .await;
        }

        let has_product_entry =
            entries.iter().any(|entry| entry.speaker == Speaker::ProductSpecialist);
        if inventory.is_none()
            && (state.inventory_checked || product_related || has_product_entry)
        {
            inventory = Some(if state.inventory_checked {
                InventoryCheckResult::performed(&state)
            } else {
                InventoryCheckResult::pending(&state)
            });
        }
        if let Some(check) = inventory.as_mut() {
            check.normalize();
        }

        let customer_response = if gated {
            CONFIRM_INTERNAL_OPTIONS_PROMPT.to_string()
        } else if entries.is_empty() {
            build_customer_summary(&base_draft, &entries)
        } else {
            merge_summary_parts(&base_draft, &entries)
        };

        state.routing = routing;

        let mut result = OrchestratorResult::new(state, routing);
        result.inventory_check = inventory;
        result.specialist_responses = entries;
        result.customer_response = customer_response;
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn consult_specialist(
        &self,
        routing: Routing,
        packet: &IntakePacket,
        scan_history: &[ChatTurn],
        state: &ConversationState,
        inventory: Option<&InventoryCheckResult>,
        entries: &mut Vec<SpecialistEntry>,
        counters: &mut IterationCounters,
        trace: &mut TurnTrace,
    ) {
        let speaker = match routing {
            Routing::ProductAgent => Speaker::ProductSpecialist,
            Routing::InsuranceAgent => Speaker::InsuranceSpecialist,
            Routing::None => return,
        };

        // The orchestrator agent may have consulted already; one entry per
        // specialist per turn.
        if entries.iter().any(|entry| entry.speaker == speaker) {
            trace.push(format!("{} already consulted this turn", speaker.agent_name()));
            return;
        }

        match speaker {
            Speaker::ProductSpecialist => {
                if counters.product_capped(self.specialist_call_cap) {
                    trace.push("product specialist call cap reached");
                    entries.push(SpecialistEntry::system(PRODUCT_CAP_NOTICE));
                    return;
                }
                let Some(channel) = self.product.as_ref() else {
                    entries.push(SpecialistEntry::system(
                        "Product specialist is not configured; continuing without an external \
                         consultation.",
                    ));
                    return;
                };

                match consult_product(channel.as_ref(), packet, inventory).await {
                    Ok(raw) => {
                        let mut digest = digest_specialist_reply(speaker, &raw);
                        if digest.is_empty() {
                            digest = PRODUCT_EMPTY_REPLY.to_string();
                        }
                        entries.push(SpecialistEntry::with_raw(speaker, digest, raw));
                        counters.product_specialist_calls += 1;
                        trace.push("consulted: product specialist");
                        info!(
                            event_name = "engine.specialist_consulted",
                            agent = channel.label(),
                            calls = counters.product_specialist_calls,
                            "product specialist consulted"
                        );
                    }
                    Err(error) => {
                        warn!(
                            event_name = "engine.specialist_failed",
                            agent = channel.label(),
                            error = %error,
                            "product specialist unavailable"
                        );
                        entries.push(SpecialistEntry::system(format!(
                            "Product specialist unavailable: {error}"
                        )));
                    }
                }
            }
            Speaker::InsuranceSpecialist => {
                if let Err(reason) = validate_insurance_context(state, scan_history) {
                    trace.push("insurance preconditions not met");
                    entries.push(SpecialistEntry::system(format!(
                        "Cannot route to insurance specialist: {reason}"
                    )));
                    return;
                }
                if counters.insurance_capped(self.specialist_call_cap) {
                    trace.push("insurance specialist call cap reached");
                    entries.push(SpecialistEntry::system(INSURANCE_CAP_NOTICE));
                    return;
                }
                let Some(channel) = self.insurance.as_ref() else {
                    entries.push(SpecialistEntry::system(
                        "Insurance specialist is not configured; continuing without a quote.",
                    ));
                    return;
                };

                match consult_insurance(channel.as_ref(), packet, scan_history).await {
                    Ok(raw) => {
                        let mut digest = digest_specialist_reply(speaker, &raw);
                        if digest.is_empty() {
                            digest = INSURANCE_EMPTY_REPLY.to_string();
                        }
                        entries.push(SpecialistEntry::with_raw(speaker, digest, raw));
                        counters.insurance_specialist_calls += 1;
                        trace.push("consulted: insurance specialist");
                        info!(
                            event_name = "engine.specialist_consulted",
                            agent = channel.label(),
                            calls = counters.insurance_specialist_calls,
                            "insurance specialist consulted"
                        );
                    }
                    Err(error) => {
                        warn!(
                            event_name = "engine.specialist_failed",
                            agent = channel.label(),
                            error = %error,
                            "insurance specialist unavailable"
                        );
                        entries.push(SpecialistEntry::system(format!(
                            "Insurance specialist unavailable: {error}"
                        )));
                    }
                }
            }
            Speaker::System => {}
        }
    }
}

fn infer_routing(
    packet: &IntakePacket,
    state: &ConversationState,
    scan_history: &[ChatTurn],
) -> Routing {
    let user_input = packet.conversation.latest_user_input.to_lowercase();

    if PRODUCT_REQUEST_KEYWORDS.iter().any(|keyword| user_input.contains(keyword)) {
        return Routing::ProductAgent;
    }
    if INSURANCE_REQUEST_KEYWORDS.iter().any(|keyword| user_input.contains(keyword)) {
        return Routing::InsuranceAgent;
    }

    let draft = packet.intake.customer_visible_draft.to_lowercase();

    let product_phase = state.overall_status != OverallStatus::Intake
        && matches!(state.product_status, ProductStatus::Searching | ProductStatus::Proposed);
    if product_phase
        && validate_product_context(scan_history)
        && PRODUCT_DRAFT_KEYWORDS.iter().any(|keyword| draft.contains(keyword))
    {
        return Routing::ProductAgent;
    }

    if state.product_status == ProductStatus::Agreed
        && INSURANCE_DRAFT_KEYWORDS.iter().any(|keyword| draft.contains(keyword))
    {
        return Routing::InsuranceAgent;
    }

    Routing::None
}

fn routing_from_system_entries(entries: &[SpecialistEntry]) -> Routing {
    for entry in entries.iter().filter(|entry| entry.speaker == Speaker::System) {
        let text = entry.response.to_lowercase();
        if PRODUCT_REQUEST_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
            return Routing::ProductAgent;
        }
        if INSURANCE_REQUEST_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
            return Routing::InsuranceAgent;
        }
    }
    Routing::None
}

fn redigest_entry(entry: SpecialistEntry) -> SpecialistEntry {
    let digest = digest_specialist_reply(entry.speaker, &entry.raw_response);
    if digest.is_empty() {
        entry
    } else {
        SpecialistEntry::with_raw(entry.speaker, digest, entry.raw_response)
    }
}
