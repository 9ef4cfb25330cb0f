use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PolicyError;
use crate::exchange::ChatTurn;
use crate::state::{ConversationState, ProductStatus};

/// How many trailing history turns feed the requirement scan.
const REQUIREMENT_WINDOW: usize = 5;

/// How many trailing history turns feed the product-detail scan.
const PRODUCT_DETAIL_WINDOW: usize = 12;

const KNOWN_REGIONS: [&str; 5] = ["germany", "france", "austria", "switzerland", "europe"];

const FEATURE_KEYWORDS: [&str; 5] =
    ["ice maker", "water dispenser", "french door", "energy efficient", "smart"];

const EXTENDED_FEATURE_KEYWORDS: [&str; 10] = [
    "ice maker",
    "water dispenser",
    "french door",
    "energy efficient",
    "energy-efficient",
    "no frost",
    "a+++",
    "nofrost",
    "biofresh",
    "smart",
];

const MODEL_STOPWORDS: [&str; 5] = ["from", "with", "this", "that", "model"];

static BUDGET_AMOUNT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:[.,]\d+)*\s*(?:eur|euro|€|dollar|\$)").expect("budget pattern")
});

static BUDGET_CURRENCY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:eur|euro|€|dollar|\$)\s*\d+(?:[.,]\d+)*").expect("budget pattern")
});

static MODEL_EXPLICIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bmodel\s*[:#-]?\s*([A-Za-z0-9][A-Za-z0-9\-_/]{1,30})\b")
        .expect("model pattern")
});

static MODEL_CODE_DASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{1,5}-\d{2,6}[A-Z0-9-]*)\b").expect("model pattern"));

static MODEL_CODE_COMPACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,5}\d{2,6}[A-Z0-9-]*)\b").expect("model pattern"));

static FENCED_JSON_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```json\s*(\{[\s\S]*?\})\s*```").expect("fenced json pattern")
});

/// Structured facts recovered from free-form conversation text. Recomputed
/// each turn, never persisted independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub budget: Option<String>,
    pub region: Option<String>,
    pub usage: Option<String>,
    pub features: Vec<String>,
    pub constraints: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_model: Option<String>,
    pub key_features: Vec<String>,
}

/// Scan the last few history turns for budget, region, and feature tags.
///
/// Pure function of its input; empty history yields the default-filled
/// struct.
pub fn extract_requirements(history: &[ChatTurn]) -> Requirements {
    let mut requirements = Requirements::default();
    if history.is_empty() {
        return requirements;
    }

    let window_start = history.len().saturating_sub(REQUIREMENT_WINDOW);
    let text = history[window_start..]
        .iter()
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let text_lower = text.to_lowercase();

    requirements.budget = BUDGET_AMOUNT_FIRST
        .find(&text_lower)
        .or_else(|| BUDGET_CURRENCY_FIRST.find(&text_lower))
        .map(|found| found.as_str().to_string());

    requirements.region = KNOWN_REGIONS
        .iter()
        .find(|region| text_lower.contains(*region))
        .map(|region| title_case(region));

    requirements.features = FEATURE_KEYWORDS
        .iter()
        .filter(|feature| text_lower.contains(*feature))
        .map(|feature| feature.to_string())
        .collect();

    requirements
}

/// Recover the chosen product model and its key features from history.
///
/// Specialist output format is not guaranteed, so this degrades through
/// several heuristics: an explicit "model:" mention, bare model-code tokens,
/// any embedded JSON blob, and finally the plain feature keyword scan.
pub fn extract_product_details(history: &[ChatTurn]) -> ProductDetails {
    let mut details = ProductDetails::default();
    if history.is_empty() {
        return details;
    }

    let window_start = history.len().saturating_sub(PRODUCT_DETAIL_WINDOW);
    let mut text_parts: Vec<&str> = Vec::new();
    for turn in &history[window_start..] {
        if !turn.content.is_empty() {
            text_parts.push(&turn.content);
        }
        for entry in &turn.specialist_responses {
            if !entry.response.is_empty() {
                text_parts.push(&entry.response);
            }
        }
    }

    let text = text_parts.join(" ");
    let text_lower = text.to_lowercase();

    details.product_model = find_model_candidate(&text);

    let mut features: Vec<String> = EXTENDED_FEATURE_KEYWORDS
        .iter()
        .filter(|feature| text_lower.contains(*feature))
        .map(|feature| feature.to_string())
        .collect();

    if let Some(blob) = find_json_candidate(&text) {
        apply_json_details(&blob, &mut details, &mut features);
    }

    if features.is_empty() {
        features = extract_requirements(history).features;
    }

    details.key_features = dedup_lowercase(features);
    details
}

/// True when at least one of budget, region, or features was extracted: the
/// minimum context for a meaningful catalog query.
pub fn validate_product_context(history: &[ChatTurn]) -> bool {
    let requirements = extract_requirements(history);
    requirements.budget.is_some()
        || requirements.region.is_some()
        || !requirements.features.is_empty()
}

/// Check the insurance-routing preconditions: an agreed product, a confirmed
/// price, and a confirmed model. Failures come back as structured reasons
/// rather than panics so the engine can surface them verbatim.
pub fn validate_insurance_context(
    state: &ConversationState,
    history: &[ChatTurn],
) -> Result<(), PolicyError> {
    if state.product_status != ProductStatus::Agreed {
        return Err(PolicyError::ProductNotAgreed);
    }

    if extract_requirements(history).budget.is_none() {
        return Err(PolicyError::PriceNotConfirmed);
    }

    if extract_product_details(history).product_model.is_none() {
        return Err(PolicyError::ModelNotConfirmed);
    }

    Ok(())
}

fn find_model_candidate(text: &str) -> Option<String> {
    for pattern in [&*MODEL_EXPLICIT, &*MODEL_CODE_DASHED, &*MODEL_CODE_COMPACT] {
        if let Some(captures) = pattern.captures(text) {
            let candidate = captures[1].trim().to_string();
            if !candidate.is_empty()
                && !MODEL_STOPWORDS.contains(&candidate.to_lowercase().as_str())
            {
                return Some(candidate);
            }
        }
    }
    None
}

fn find_json_candidate(text: &str) -> Option<Value> {
    for captures in FENCED_JSON_BLOCKS.captures_iter(text) {
        if let Ok(parsed) = serde_json::from_str::<Value>(captures[1].trim()) {
            if parsed.is_object() {
                return Some(parsed);
            }
        }
    }

    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last <= first {
        return None;
    }
    match serde_json::from_str::<Value>(text[first..=last].trim()) {
        Ok(parsed) if parsed.is_object() => Some(parsed),
        _ => None,
    }
}

fn apply_json_details(blob: &Value, details: &mut ProductDetails, features: &mut Vec<String>) {
    if details.product_model.is_none() {
        details.product_model =
            blob.get("product_model").and_then(Value::as_str).map(str::to_string);
    }

    if let Some(listed) = blob.get("key_features").and_then(Value::as_array) {
        features.extend(string_items(listed));
    }

    let Some(recommended) = blob.get("recommended_models").and_then(Value::as_array) else {
        return;
    };
    let Some(first_model) = recommended.first().and_then(Value::as_object) else {
        return;
    };

    if details.product_model.is_none() {
        details.product_model = first_model
            .get("model_number")
            .or_else(|| first_model.get("model_name"))
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    if let Some(model_features) = first_model.get("features").and_then(Value::as_array) {
        features.extend(string_items(model_features));
    }
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn dedup_lowercase(features: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    for feature in features {
        let value = feature.trim().to_lowercase();
        if value.is_empty() || !seen.insert(value.clone()) {
            continue;
        }
        normalized.push(value);
    }
    normalized
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::exchange::{ChatTurn, Speaker, SpecialistEntry};
    use crate::state::{ConversationState, ProductStatus};

    use super::{
        extract_product_details, extract_requirements, validate_insurance_context,
        validate_product_context,
    };

    fn user_turns(lines: &[&str]) -> Vec<ChatTurn> {
        lines.iter().map(|line| ChatTurn::user(*line)).collect()
    }

    #[test]
    fn extracts_budget_region_and_features() {
        let history = user_turns(&[
            "I need a fridge for my flat in Germany",
            "Budget is around 1000 EUR, ideally with an ice maker and smart controls",
        ]);

        let requirements = extract_requirements(&history);
        assert_eq!(requirements.budget.as_deref(), Some("1000 eur"));
        assert_eq!(requirements.region.as_deref(), Some("Germany"));
        assert_eq!(requirements.features, vec!["ice maker", "smart"]);
    }

    #[test]
    fn budget_accepts_currency_first_and_separators() {
        let history = user_turns(&["can you stay under €1.299,00 please"]);
        let requirements = extract_requirements(&history);
        assert_eq!(requirements.budget.as_deref(), Some("€1.299,00"));

        let dollars = extract_requirements(&user_turns(&["my cap is $1,200"]));
        assert_eq!(dollars.budget.as_deref(), Some("$1,200"));
    }

    #[test]
    fn empty_history_yields_defaults() {
        let requirements = extract_requirements(&[]);
        assert!(requirements.budget.is_none());
        assert!(requirements.region.is_none());
        assert!(requirements.features.is_empty());
        assert!(extract_product_details(&[]).product_model.is_none());
    }

    #[test]
    fn extraction_is_a_pure_function_of_history() {
        let history = user_turns(&["fridge around 800 eur for Austria"]);
        assert_eq!(extract_requirements(&history), extract_requirements(&history));
    }

    #[test]
    fn only_last_five_turns_are_scanned() {
        let mut history = user_turns(&["budget 500 EUR"]);
        for _ in 0..5 {
            history.push(ChatTurn::user("anything else"));
        }
        assert!(extract_requirements(&history).budget.is_none());
    }

    #[test]
    fn model_code_beats_feature_fallback() {
        let history = user_turns(&["I like the CN-5200 with biofresh"]);
        let details = extract_product_details(&history);
        assert_eq!(details.product_model.as_deref(), Some("CN-5200"));
        assert_eq!(details.key_features, vec!["biofresh"]);
    }

    #[test]
    fn explicit_model_mention_wins_over_codes() {
        let history = user_turns(&["let's go with model: KGN39 over the XR-100"]);
        let details = extract_product_details(&history);
        assert_eq!(details.product_model.as_deref(), Some("KGN39"));
    }

    #[test]
    fn stopword_candidates_are_rejected() {
        let history = user_turns(&["the model with everything included"]);
        let details = extract_product_details(&history);
        assert_eq!(details.product_model, None);
    }

    #[test]
    fn model_recovered_from_embedded_specialist_json() {
        let mut turn = ChatTurn::assistant("Here is what the specialist found.");
        turn.specialist_responses.push(SpecialistEntry::new(
            Speaker::ProductSpecialist,
            r#"```json
{"recommended_models": [{"model_number": "GNP-4355", "features": ["NoFrost", "BioFresh"]}]}
```"#,
        ));

        let details = extract_product_details(&[turn]);
        assert_eq!(details.product_model.as_deref(), Some("GNP-4355"));
        assert!(details.key_features.contains(&"nofrost".to_string()));
        assert!(details.key_features.contains(&"biofresh".to_string()));
    }

    #[test]
    fn features_are_deduplicated_case_insensitively() {
        let mut turn = ChatTurn::user("I want BioFresh and biofresh and no frost");
        turn.specialist_responses.push(SpecialistEntry::new(
            Speaker::ProductSpecialist,
            r#"{"key_features": ["BioFresh", "No Frost"]}"#,
        ));

        let details = extract_product_details(&[turn]);
        let biofresh_count =
            details.key_features.iter().filter(|feature| feature.as_str() == "biofresh").count();
        assert_eq!(biofresh_count, 1);
    }

    #[test]
    fn product_context_requires_one_concrete_dimension() {
        assert!(!validate_product_context(&user_turns(&["hello there"])));
        assert!(validate_product_context(&user_turns(&["something for France"])));
        assert!(validate_product_context(&user_turns(&["about 900 euro"])));
    }

    #[test]
    fn insurance_context_gates_on_agreement_price_and_model() {
        let history = user_turns(&["I'll take the CN-5200 at 1200 EUR"]);
        let mut state = ConversationState::default();

        assert!(validate_insurance_context(&state, &history).is_err());

        state.product_status = ProductStatus::Agreed;
        assert!(validate_insurance_context(&state, &history).is_ok());

        let no_price = user_turns(&["I'll take the CN-5200"]);
        assert!(validate_insurance_context(&state, &no_price).is_err());

        let no_model = user_turns(&["happy to pay 1200 EUR"]);
        assert!(validate_insurance_context(&state, &no_model).is_err());
    }
}
