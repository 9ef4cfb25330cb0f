use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clerky_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: Option<&str>| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "gateway.base_url",
        &config.gateway.base_url,
        source("gateway.base_url", Some("CLERKY_GATEWAY_BASE_URL")),
    ));
    lines.push(render_line(
        "gateway.timeout_secs",
        &config.gateway.timeout_secs.to_string(),
        source("gateway.timeout_secs", Some("CLERKY_GATEWAY_TIMEOUT_SECS")),
    ));

    let api_key = if config.gateway.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "gateway.api_key",
        api_key,
        source("gateway.api_key", Some("CLERKY_GATEWAY_API_KEY")),
    ));

    for (label, key_path, env_key, agent) in [
        ("roster.customer", "roster.customer.name", "CLERKY_ROSTER_CUSTOMER_NAME", &config.roster.customer),
        (
            "roster.orchestrator",
            "roster.orchestrator.name",
            "CLERKY_ROSTER_ORCHESTRATOR_NAME",
            &config.roster.orchestrator,
        ),
        ("roster.product", "roster.product.name", "CLERKY_ROSTER_PRODUCT_NAME", &config.roster.product),
        (
            "roster.insurance",
            "roster.insurance.name",
            "CLERKY_ROSTER_INSURANCE_NAME",
            &config.roster.insurance,
        ),
    ] {
        let enabled = if agent.enabled { "enabled" } else { "disabled" };
        lines.push(render_line(
            label,
            &format!("{} ({enabled})", agent.name),
            source(key_path, Some(env_key)),
        ));
    }

    lines.push(render_line(
        "limits.specialist_call_cap",
        &config.limits.specialist_call_cap.to_string(),
        source("limits.specialist_call_cap", Some("CLERKY_LIMITS_SPECIALIST_CALL_CAP")),
    ));
    lines.push(render_line(
        "limits.session_clarification_cap",
        &config.limits.session_clarification_cap.to_string(),
        source("limits.session_clarification_cap", Some("CLERKY_LIMITS_SESSION_CLARIFICATION_CAP")),
    ));
    lines.push(render_line(
        "limits.recent_history_turns",
        &config.limits.recent_history_turns.to_string(),
        source("limits.recent_history_turns", Some("CLERKY_LIMITS_RECENT_HISTORY_TURNS")),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("CLERKY_LOGGING_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("CLERKY_LOGGING_FORMAT")),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("clerky.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/clerky.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
