use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::Requirements;
use crate::inventory::InventoryCheckResult;
use crate::state::{ConversationState, IterationCounters, Routing};

/// Wire schema version stamped on every packet and result.
pub const SCHEMA_VERSION: &str = "1.0";

pub const CUSTOMER_PACKET_TYPE: &str = "customer_packet";
pub const ORCHESTRATOR_RESULT_TYPE: &str = "orchestrator_result";

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").expect("fenced json pattern")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of conversation history as the session records it.
///
/// Assistant turns keep the specialist entries that were attached to them so
/// the detail extractor can scan embedded specialist text on later turns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialist_responses: Vec<SpecialistEntry>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), specialist_responses: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), specialist_responses: Vec::new() }
    }
}

/// Identity of a specialist entry's author.
///
/// The tagged variant carries its own display metadata; nothing in the
/// system branches on human-readable agent labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    ProductSpecialist,
    InsuranceSpecialist,
    System,
}

impl Speaker {
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::ProductSpecialist => "Product Specialist",
            Self::InsuranceSpecialist => "Insurance Specialist",
            Self::System => "System",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::ProductSpecialist => "📦",
            Self::InsuranceSpecialist => "🛡️",
            Self::System => "⚠️",
        }
    }

    pub fn display_class(self) -> &'static str {
        match self {
            Self::ProductSpecialist => "product-message",
            Self::InsuranceSpecialist => "insurance-message",
            Self::System => "system-message",
        }
    }

    /// Classify a wire-form agent label. Tolerant on purpose: orchestrator
    /// replies label entries with free-form names.
    pub fn from_wire_name(name: &str) -> Self {
        let lowered = name.to_lowercase();
        if lowered.contains("product") {
            Self::ProductSpecialist
        } else if lowered.contains("insurance") {
            Self::InsuranceSpecialist
        } else {
            Self::System
        }
    }
}

/// One specialist (or System) contribution to a turn.
///
/// In memory this is the tagged form; the six-field wire shape with icon and
/// display class is derived on serialization.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecialistEntry {
    pub speaker: Speaker,
    pub response: String,
    pub raw_response: String,
}

impl SpecialistEntry {
    pub fn new(speaker: Speaker, response: impl Into<String>) -> Self {
        let response = response.into();
        let raw_response = response.clone();
        Self { speaker, response, raw_response }
    }

    pub fn with_raw(
        speaker: Speaker,
        response: impl Into<String>,
        raw_response: impl Into<String>,
    ) -> Self {
        Self { speaker, response: response.into(), raw_response: raw_response.into() }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(Speaker::System, message)
    }

    /// Tolerant read of one wire entry from agent JSON. Returns `None` for
    /// shapes that are not an object or carry no response text at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let agent = object.get("agent").and_then(Value::as_str).unwrap_or("System");
        let response = object.get("response").and_then(Value::as_str).unwrap_or_default();
        let raw_response =
            object.get("raw_response").and_then(Value::as_str).unwrap_or(response);

        if response.is_empty() && raw_response.is_empty() {
            return None;
        }

        Some(Self {
            speaker: Speaker::from_wire_name(agent),
            response: response.to_string(),
            raw_response: raw_response.to_string(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    agent: String,
    response: String,
    #[serde(default)]
    raw_response: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    css_class: String,
    #[serde(default = "wire_exchange_format")]
    exchange_format: String,
}

fn wire_exchange_format() -> String {
    "json".to_string()
}

impl Serialize for SpecialistEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEntry {
            agent: self.speaker.agent_name().to_string(),
            response: self.response.clone(),
            raw_response: self.raw_response.clone(),
            icon: self.speaker.icon().to_string(),
            css_class: self.speaker.display_class().to_string(),
            exchange_format: wire_exchange_format(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SpecialistEntry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEntry::deserialize(deserializer)?;
        let raw_response =
            if wire.raw_response.is_empty() { wire.response.clone() } else { wire.raw_response };
        Ok(Self {
            speaker: Speaker::from_wire_name(&wire.agent),
            response: wire.response,
            raw_response,
        })
    }
}

/// Pull a JSON object out of loosely structured agent output.
///
/// Tries a fenced ```json block first, then the whole text, then the
/// outermost `{...}` span. Anything that does not yield a JSON object maps
/// to `None`.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(captures) = FENCED_JSON.captures(trimmed) {
        if let Ok(parsed) = serde_json::from_str::<Value>(captures[1].trim()) {
            if parsed.is_object() {
                return Some(parsed);
            }
        }
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        if parsed.is_object() {
            return Some(parsed);
        }
    }

    let first = trimmed.find('{')?;
    let last = trimmed.rfind('}')?;
    if last <= first {
        return None;
    }
    let candidate = trimmed[first..=last].trim();
    match serde_json::from_str::<Value>(candidate) {
        Ok(parsed) if parsed.is_object() => Some(parsed),
        _ => None,
    }
}

/// Render a raw specialist reply for display: pretty-printed JSON when one
/// can be recovered, plain text otherwise. Empty input yields an empty
/// string; callers substitute their own placeholder.
pub fn format_specialist_response(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        if parsed.is_object() || parsed.is_array() {
            return serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| trimmed.to_string());
        }
    }

    if let Some(object) = extract_json_object(trimmed) {
        return serde_json::to_string_pretty(&object).unwrap_or_else(|_| trimmed.to_string());
    }

    trimmed.to_string()
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryExcerpt {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationSection {
    pub latest_user_input: String,
    pub recent_history: Vec<HistoryExcerpt>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IntakeSection {
    pub customer_visible_draft: String,
    pub extracted_requirements: Requirements,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoutingContext {
    pub state: ConversationState,
    pub routing_hint: Routing,
    pub iteration_counts: IterationCounters,
}

/// Structured handoff from the customer-facing intake step to the decision
/// engine. Built fresh each turn and immutable afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct IntakePacket {
    pub schema_version: String,
    pub message_type: String,
    pub conversation: ConversationSection,
    pub intake: IntakeSection,
    pub routing_context: RoutingContext,
}

impl IntakePacket {
    pub fn new(
        latest_user_input: impl Into<String>,
        customer_visible_draft: impl Into<String>,
        extracted_requirements: Requirements,
        state: ConversationState,
        routing_hint: Routing,
        iteration_counts: IterationCounters,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            message_type: CUSTOMER_PACKET_TYPE.to_string(),
            conversation: ConversationSection {
                latest_user_input: latest_user_input.into(),
                recent_history: Vec::new(),
            },
            intake: IntakeSection {
                customer_visible_draft: customer_visible_draft.into(),
                extracted_requirements,
            },
            routing_context: RoutingContext { state, routing_hint, iteration_counts },
        }
    }

    pub fn with_recent_history(mut self, excerpt: Vec<HistoryExcerpt>) -> Self {
        self.conversation.recent_history = excerpt;
        self
    }
}

/// The consolidated output of one turn. Only the `state` field outlives the
/// turn; the caller must carry it forward as the next `ConversationState`.
#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorResult {
    pub schema_version: String,
    pub message_type: String,
    pub source_agent: String,
    pub target_agent: String,
    pub state: ConversationState,
    pub routing: Routing,
    pub inventory_check: Option<InventoryCheckResult>,
    pub specialist_responses: Vec<SpecialistEntry>,
    pub customer_response: String,
    pub exchange_format: String,
}

impl OrchestratorResult {
    pub fn new(state: ConversationState, routing: Routing) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            message_type: ORCHESTRATOR_RESULT_TYPE.to_string(),
            source_agent: "orchestrator".to_string(),
            target_agent: "customer_agent".to_string(),
            state,
            routing,
            inventory_check: None,
            specialist_responses: Vec::new(),
            customer_response: String::new(),
            exchange_format: "json".to_string(),
        }
    }
}

/// A parsed orchestrator-agent reply is usable only when it carries the
/// result tag and a state object; anything else falls back to deterministic
/// routing.
pub fn is_valid_orchestrator_result(value: &Value) -> bool {
    value.get("message_type").and_then(Value::as_str) == Some(ORCHESTRATOR_RESULT_TYPE)
        && value.get("state").map(Value::is_object).unwrap_or(false)
}
