use std::env;
use std::sync::{Mutex, OnceLock};

use clerky_cli::commands::{config, doctor, smoke};
use serde_json::Value;

#[test]
fn smoke_runs_all_routing_scenarios_green() {
    with_env(&[], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 4);
        let names: Vec<&str> =
            checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert!(names.contains(&"inventory_first_gate"));
        assert!(names.contains(&"escalation_unlocks_product_specialist"));
        assert!(names.contains(&"insurance_preconditions"));
    });
}

#[test]
fn smoke_fails_fast_on_invalid_config() {
    with_env(&[("CLERKY_GATEWAY_BASE_URL", "ftp://nope")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");

        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn doctor_passes_on_defaults_and_emits_json() {
    with_env(&[], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        let names: Vec<&str> =
            checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(names, vec!["config_validation", "gateway_endpoint", "roster_readiness"]);
    });
}

#[test]
fn doctor_reports_config_failures_and_skips_the_rest() {
    with_env(&[("CLERKY_LIMITS_SPECIALIST_CALL_CAP", "0")], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[0]["details"]
            .as_str()
            .unwrap_or_default()
            .contains("specialist_call_cap"));
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn config_output_attributes_env_sources() {
    with_env(&[("CLERKY_GATEWAY_BASE_URL", "https://gateway.internal")], || {
        let output = config::run();

        assert!(output.contains("- gateway.base_url = https://gateway.internal"));
        assert!(output.contains("(source: env (CLERKY_GATEWAY_BASE_URL))"));
        assert!(output.contains("- gateway.api_key = <unset>"));
        assert!(output.contains("- limits.specialist_call_cap = 3 (source: default)"));
        assert!(output.contains("- roster.insurance = insurance_agent (enabled)"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CLERKY_GATEWAY_BASE_URL",
        "CLERKY_GATEWAY_API_KEY",
        "CLERKY_GATEWAY_TIMEOUT_SECS",
        "CLERKY_ROSTER_CUSTOMER_NAME",
        "CLERKY_ROSTER_ORCHESTRATOR_NAME",
        "CLERKY_ROSTER_PRODUCT_NAME",
        "CLERKY_ROSTER_INSURANCE_NAME",
        "CLERKY_ROSTER_PRODUCT_ENABLED",
        "CLERKY_ROSTER_INSURANCE_ENABLED",
        "CLERKY_LIMITS_SPECIALIST_CALL_CAP",
        "CLERKY_LIMITS_SESSION_CLARIFICATION_CAP",
        "CLERKY_LIMITS_RECENT_HISTORY_TURNS",
        "CLERKY_LOGGING_LEVEL",
        "CLERKY_LOGGING_FORMAT",
        "CLERKY_LOG_LEVEL",
        "CLERKY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
