//! Customer-facing text shaping: specialist digests, response sanitizing,
//! and turn-summary assembly.
//!
//! Specialists answer in JSON when the prompt holds and in prose when it
//! does not. Everything here is total over both shapes: a digest never
//! errors, it degrades to a short fixed sentence instead of leaking a raw
//! payload to the customer.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::exchange::{extract_json_object, Speaker, SpecialistEntry};

/// Fallback summary when no other customer-visible text survived the turn.
pub const GENERIC_TURN_SUMMARY: &str =
    "I consulted our specialists and prepared an updated recommendation.";

/// Hand-off sentence used when specialists answered but the primary agent
/// produced no phrasing of its own.
pub const SPECIALIST_HANDOFF_NOTICE: &str =
    "I checked with our specialists and shared their responses below.";

/// Replacement for customer text that turned out to be a raw payload.
pub const SANITIZED_FALLBACK: &str =
    "I reviewed your request and coordinated with our specialists.";

/// Raw payloads this long with braces are treated as machine output even
/// when no known marker is present.
const BLOB_MARKER_LENGTH: usize = 180;
const RESPONSE_BLOB_LENGTH: usize = 250;

static TRAILING_COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d+\s*$").expect("trailing counter pattern"));

/// Condense a product-specialist reply into one or two customer sentences.
pub fn digest_product_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let Some(blob) = extract_json_object(trimmed) else {
        if trimmed.contains("recommended_models")
            || (trimmed.contains('{') && trimmed.len() > BLOB_MARKER_LENGTH)
        {
            return "I reviewed the catalog results and shortlisted suitable models. \
                    Let me know which one you would like to hear more about."
                .to_string();
        }
        return trimmed.to_string();
    };

    let reason = first_string(&blob, &["reasoning", "reason", "summary", "notes"]);
    let models = blob
        .get("recommended_models")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if models.is_empty() {
        return match reason {
            Some(reason) => format!("I reviewed the specialist recommendations. {reason}"),
            None => "I reviewed the specialist recommendations, but no clear recommendation \
                     was returned."
                .to_string(),
        };
    }

    let lines: Vec<String> = models.iter().take(2).filter_map(describe_model).collect();
    if lines.is_empty() {
        return "I reviewed the specialist recommendations, but no clear recommendation \
                was returned."
            .to_string();
    }

    let mut digest = format!("Top options: {}.", lines.join("; "));
    if let Some(reason) = reason {
        digest.push_str(&format!(" Why these: {reason}"));
    }
    digest
}

/// Condense an insurance-specialist reply into one customer sentence.
pub fn digest_insurance_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let Some(blob) = extract_json_object(trimmed) else {
        if trimmed.contains("coverage_options")
            || (trimmed.contains('{') && trimmed.len() > BLOB_MARKER_LENGTH)
        {
            return "I received the insurance assessment and can walk you through the \
                    coverage options."
                .to_string();
        }
        return trimmed.to_string();
    };

    let status = first_string(&blob, &["status", "quote_status"]).unwrap_or_default();
    let status = status.to_lowercase();

    if status.contains("incomplete") || status.contains("needs") {
        let missing = blob
            .get("missing_fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", ")
            })
            .filter(|joined| !joined.is_empty())
            .unwrap_or_else(|| "additional product details".to_string());
        return format!("The insurance specialist needs a few more details: {missing}.");
    }

    if status.contains("declined") || status.contains("rejected") {
        let reason = first_string(&blob, &["reason", "reasoning"]).or_else(|| {
            blob.get("risk_assessment")
                .and_then(|risk| first_string(risk, &["justification", "reason"]))
        });
        let mut digest = "Insurance is not available for this product.".to_string();
        if let Some(reason) = reason {
            digest.push_str(&format!(" Reason: {reason}"));
        }
        return digest;
    }

    if let Some(options) = blob.get("coverage_options").and_then(Value::as_array) {
        let lines: Vec<String> = options.iter().take(2).filter_map(describe_coverage).collect();
        if !lines.is_empty() {
            return format!("Insurance is available: {}.", lines.join("; "));
        }
    }

    let quote = blob.get("quote").filter(|value| value.is_object()).unwrap_or(&blob);
    let bundle = first_string(quote, &["bundle", "bundle_name", "coverage_name", "product"]);
    let premium = first_string(quote, &["monthly_premium", "premium", "monthly_rate"]);
    let duration = first_string(quote, &["duration", "term", "coverage_period"]);

    match (bundle, premium) {
        (Some(bundle), Some(premium)) => {
            let mut digest = format!("Insurance is available: {bundle} ({premium}/month)");
            if let Some(duration) = duration {
                digest.push_str(&format!(" for {duration}"));
            }
            digest.push('.');
            digest
        }
        _ => "Insurance is available. I can share the full quote details on request."
            .to_string(),
    }
}

/// Digest a raw specialist reply according to who produced it. System text
/// passes through untouched.
pub fn digest_specialist_reply(speaker: Speaker, raw: &str) -> String {
    match speaker {
        Speaker::ProductSpecialist => digest_product_reply(raw),
        Speaker::InsuranceSpecialist => digest_insurance_reply(raw),
        Speaker::System => raw.trim().to_string(),
    }
}

/// Clean a customer-visible response: trim, drop a stray trailing counter,
/// and replace payload-shaped text with a safe sentence.
pub fn sanitize_customer_response(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let cleaned = TRAILING_COUNTER.replace(trimmed, "");
    let cleaned = cleaned.trim();

    let looks_like_payload = cleaned.contains("recommended_models")
        || cleaned.contains("coverage_options")
        || cleaned.contains("\"message_type\"")
        || (cleaned.contains('{') && cleaned.len() > RESPONSE_BLOB_LENGTH);

    if !looks_like_payload {
        return cleaned.to_string();
    }

    // Salvage any prose the agent put before the payload: the specialist
    // dump usually starts at a "Product update:" marker, else at a brace.
    let prefix = match cleaned.find("Product update:") {
        Some(index) => &cleaned[..index],
        None => cleaned.split('{').next().unwrap_or(""),
    };
    let prefix = prefix.trim();

    let still_payload =
        prefix.contains("recommended_models") || prefix.contains("coverage_options");
    if prefix.len() > 10 && !still_payload {
        prefix.to_string()
    } else {
        SANITIZED_FALLBACK.to_string()
    }
}

/// Pick the customer summary by precedence: the base draft, then the
/// specialist hand-off notice, then a System entry, then the generic
/// sentence.
pub fn build_customer_summary(base: &str, entries: &[SpecialistEntry]) -> String {
    let base = base.trim();
    if !base.is_empty() {
        return base.to_string();
    }

    let has_specialist_text = entries
        .iter()
        .any(|entry| entry.speaker != Speaker::System && !entry.response.trim().is_empty());
    if has_specialist_text {
        return SPECIALIST_HANDOFF_NOTICE.to_string();
    }

    if let Some(entry) = entries.iter().find(|entry| !entry.response.trim().is_empty()) {
        return entry.response.trim().to_string();
    }

    GENERIC_TURN_SUMMARY.to_string()
}

/// Merge the base draft with per-specialist updates into one reply. Used
/// when specialists actually contributed this turn; labels each update by
/// its source so the customer can tell them apart.
pub fn merge_summary_parts(base: &str, entries: &[SpecialistEntry]) -> String {
    if entries.is_empty() {
        return build_customer_summary(base, entries);
    }

    let mut parts: Vec<String> = Vec::new();
    let base = base.trim();
    if !base.is_empty() {
        parts.push(base.to_string());
    }

    for entry in entries {
        let response = entry.response.trim();
        if response.is_empty() {
            continue;
        }
        match entry.speaker {
            Speaker::ProductSpecialist => parts.push(format!("Product update: {response}")),
            Speaker::InsuranceSpecialist => parts.push(format!("Insurance update: {response}")),
            Speaker::System => parts.push(response.to_string()),
        }
    }

    if parts.is_empty() {
        GENERIC_TURN_SUMMARY.to_string()
    } else {
        parts.join(" ")
    }
}

fn first_string(blob: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        blob.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

fn describe_coverage(option: &Value) -> Option<String> {
    let bundle = first_string(option, &["bundle_name", "bundle", "coverage_name"])?;
    let mut line = bundle;

    if let Some(premium) = first_string(option, &["monthly_premium", "premium", "monthly_rate"]) {
        line.push_str(&format!(" ({premium}/month)"));
    }
    if let Some(duration) = first_string(option, &["duration", "term", "coverage_period"]) {
        line.push_str(&format!(" for {duration}"));
    }

    Some(line)
}

fn describe_model(model: &Value) -> Option<String> {
    let name = first_string(model, &["model_name", "model_number", "name", "model"])?;
    let mut line = name;

    if let Some(price) = first_string(model, &["price", "price_eur", "estimated_price"]) {
        line.push_str(&format!(" ({price})"));
    }

    if let Some(features) = model.get("features").and_then(Value::as_array) {
        let listed: Vec<&str> = features.iter().filter_map(Value::as_str).take(3).collect();
        if !listed.is_empty() {
            line.push_str(&format!(" - {}", listed.join(", ")));
        }
    }

    Some(line)
}
