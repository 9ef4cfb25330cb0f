//! Trailing metadata block parsing for customer-agent replies.
//!
//! The customer-facing agent appends a `---`-delimited textual block with
//! `STATE:`, `ROUTING:`, `INVENTORY_CHECKED:`, and `ITERATION_COUNT:` lines.
//! This is a prompt convention, not JSON, and the agent gets it wrong often
//! enough that both functions here must be total: any parse failure yields
//! the default state, and stripping never destroys the visible reply.

use std::sync::LazyLock;

use regex::Regex;

use crate::state::{
    ConversationState, InsuranceStatus, OverallStatus, ProductStatus, Routing,
};

static STATE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)STATE:\s*product_status=([\w-]+)\s*\|\s*insurance_status=([\w-]+)\s*\|\s*overall_status=([\w-]+)",
    )
    .expect("state line pattern")
});

static ROUTING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ROUTING:\s*([\w-]+)").expect("routing line pattern"));

static INVENTORY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)INVENTORY_CHECKED:\s*(true|false)").expect("inventory line pattern")
});

static ITERATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ITERATION_COUNT:\s*(\d+)").expect("iteration line pattern"));

static METADATA_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\n?\s*---\s*\n\s*STATE:.*?\n\s*ROUTING:.*?\n\s*INVENTORY_CHECKED:.*?\n\s*ITERATION_COUNT:[^\n]*(?:\n\s*---\s*)?",
    )
    .expect("metadata block pattern")
});

static STRAY_METADATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:STATE|ROUTING|INVENTORY_CHECKED|ITERATION_COUNT)\s*:.*$")
        .expect("stray line pattern")
});

static BARE_DELIMITER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*---\s*$").expect("delimiter pattern"));

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run pattern"));

/// Parse the trailing metadata block into a `ConversationState`.
///
/// Segments are scanned from the end so the common shape "reply + `---` +
/// metadata" resolves to the metadata segment even when the split leaves
/// empty trailing parts. Absent or malformed metadata yields the default
/// state.
pub fn parse_state_metadata(response: &str) -> ConversationState {
    let mut state = ConversationState::default();

    if !response.contains("---") {
        return state;
    }

    let segments: Vec<&str> =
        response.split("---").map(str::trim).filter(|segment| !segment.is_empty()).collect();

    let Some(metadata) = segments.iter().rev().find(|segment| {
        let lowered = segment.to_lowercase();
        lowered.contains("state:") || lowered.contains("routing:")
    }) else {
        return state;
    };

    if let Some(captures) = STATE_LINE.captures(metadata) {
        state.product_status = ProductStatus::parse_lenient(&captures[1]);
        state.insurance_status = InsuranceStatus::parse_lenient(&captures[2]);
        state.overall_status = OverallStatus::parse_lenient(&captures[3]);
    }

    if let Some(captures) = ROUTING_LINE.captures(metadata) {
        state.routing = Routing::parse_lenient(&captures[1]);
    }

    if let Some(captures) = INVENTORY_LINE.captures(metadata) {
        state.inventory_checked = captures[1].eq_ignore_ascii_case("true");
    }

    if let Some(captures) = ITERATION_LINE.captures(metadata) {
        state.iteration_count = captures[1].parse().unwrap_or(0);
    }

    state
}

/// Remove the metadata block and any stray metadata lines, producing the
/// customer-visible draft. Falls back to the trimmed original if stripping
/// would leave nothing.
pub fn strip_state_metadata(response: &str) -> String {
    if response.is_empty() {
        return String::new();
    }

    let cleaned = METADATA_BLOCK.replace_all(response, "\n");
    let cleaned = STRAY_METADATA_LINE.replace_all(&cleaned, "");
    let cleaned = BARE_DELIMITER_LINE.replace_all(&cleaned, "");
    let cleaned = BLANK_RUNS.replace_all(&cleaned, "\n\n");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        response.trim().to_string()
    } else {
        cleaned.to_string()
    }
}
