use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default per-specialist consultation cap for one session.
pub const SPECIALIST_CALL_CAP: u32 = 3;

/// Default cap on customer-facing clarification turns for one session.
pub const SESSION_CLARIFICATION_CAP: u32 = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Collecting,
    Searching,
    Proposed,
    Agreed,
}

impl ProductStatus {
    /// Parse a metadata token, falling back to the default on unknown input.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "collecting" => Self::Collecting,
            "searching" => Self::Searching,
            "proposed" => Self::Proposed,
            "agreed" => Self::Agreed,
            _ => Self::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsuranceStatus {
    #[default]
    NotOffered,
    Offered,
}

impl InsuranceStatus {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_offered" => Self::NotOffered,
            "offered" => Self::Offered,
            _ => Self::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    Intake,
    InventoryCheck,
    ProductNegotiation,
    InsurancePhase,
    ReadyToCheckout,
    Stopped,
}

impl OverallStatus {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "intake" => Self::Intake,
            "inventory_check" => Self::InventoryCheck,
            "product_negotiation" => Self::ProductNegotiation,
            "insurance_phase" => Self::InsurancePhase,
            "ready_to_checkout" => Self::ReadyToCheckout,
            "stopped" => Self::Stopped,
            _ => Self::default(),
        }
    }

    /// UI-facing phase number. `Stopped` is the terminal phase, not an error.
    pub fn phase(self) -> u8 {
        match self {
            Self::Intake => 1,
            Self::InventoryCheck => 2,
            Self::ProductNegotiation => 3,
            Self::InsurancePhase => 4,
            Self::ReadyToCheckout | Self::Stopped => 5,
        }
    }
}

/// Routing hint for the current turn.
///
/// `ergo_agent` is a deprecated alias for the insurance route that older
/// customer-agent prompts still emit; it is accepted on input and normalized
/// here, and nothing downstream ever sees the alias.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    #[default]
    None,
    ProductAgent,
    #[serde(alias = "ergo_agent")]
    InsuranceAgent,
}

impl Routing {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "product_agent" => Self::ProductAgent,
            "insurance_agent" | "ergo_agent" => Self::InsuranceAgent,
            _ => Self::None,
        }
    }

    pub fn is_specialist(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Canonical conversation state, carried across turns by the calling session.
///
/// The orchestrator never stores this itself; each turn receives the previous
/// state and returns the next one inside the `OrchestratorResult`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub product_status: ProductStatus,
    #[serde(default)]
    pub insurance_status: InsuranceStatus,
    #[serde(default)]
    pub overall_status: OverallStatus,
    #[serde(default)]
    pub routing: Routing,
    #[serde(default)]
    pub inventory_checked: bool,
    #[serde(default)]
    pub iteration_count: u32,
}

impl ConversationState {
    pub fn phase(&self) -> u8 {
        self.overall_status.phase()
    }

    /// Field-by-field lenient read of a state object from agent JSON.
    ///
    /// Unknown or missing fields keep the fallback value rather than failing
    /// the whole object, because agent replies routinely drop fields.
    pub fn from_value_lenient(value: &Value, fallback: &ConversationState) -> ConversationState {
        let Some(object) = value.as_object() else {
            return *fallback;
        };

        ConversationState {
            product_status: object
                .get("product_status")
                .and_then(Value::as_str)
                .map(ProductStatus::parse_lenient)
                .unwrap_or(fallback.product_status),
            insurance_status: object
                .get("insurance_status")
                .and_then(Value::as_str)
                .map(InsuranceStatus::parse_lenient)
                .unwrap_or(fallback.insurance_status),
            overall_status: object
                .get("overall_status")
                .and_then(Value::as_str)
                .map(OverallStatus::parse_lenient)
                .unwrap_or(fallback.overall_status),
            routing: object
                .get("routing")
                .and_then(Value::as_str)
                .map(Routing::parse_lenient)
                .unwrap_or(fallback.routing),
            inventory_checked: object
                .get("inventory_checked")
                .and_then(Value::as_bool)
                .unwrap_or(fallback.inventory_checked),
            iteration_count: object
                .get("iteration_count")
                .and_then(Value::as_u64)
                .map(|count| count.min(u64::from(u32::MAX)) as u32)
                .unwrap_or(fallback.iteration_count),
        }
    }
}

/// Per-session consultation counters, one instance per conversation session.
///
/// Created at session start, reset on explicit "reset chat", and passed
/// mutably into every turn. There is no global counter state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounters {
    pub customer_clarifications: u32,
    pub product_specialist_calls: u32,
    pub insurance_specialist_calls: u32,
}

impl IterationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn product_capped(&self, cap: u32) -> bool {
        self.product_specialist_calls >= cap
    }

    pub fn insurance_capped(&self, cap: u32) -> bool {
        self.insurance_specialist_calls >= cap
    }

    pub fn session_capped(&self, cap: u32) -> bool {
        self.customer_clarifications >= cap
    }
}
