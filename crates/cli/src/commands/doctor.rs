use clerky_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_gateway_endpoint(&config));
            checks.push(check_roster_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "gateway_endpoint",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "roster_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_gateway_endpoint(config: &AppConfig) -> DoctorCheck {
    let base_url = config.gateway.base_url.trim();
    let has_host = base_url
        .strip_prefix("http://")
        .or_else(|| base_url.strip_prefix("https://"))
        .map(|rest| !rest.trim_start_matches('/').is_empty())
        .unwrap_or(false);

    if !has_host {
        return DoctorCheck {
            name: "gateway_endpoint",
            status: CheckStatus::Fail,
            details: format!("gateway base url `{base_url}` has no host"),
        };
    }

    let auth = if config.gateway.api_key.is_some() { "with api key" } else { "without api key" };
    DoctorCheck {
        name: "gateway_endpoint",
        status: CheckStatus::Pass,
        details: format!(
            "gateway endpoint `{base_url}/responses` ({auth}, timeout {}s)",
            config.gateway.timeout_secs
        ),
    }
}

fn check_roster_readiness(config: &AppConfig) -> DoctorCheck {
    if !config.roster.customer.enabled {
        return DoctorCheck {
            name: "roster_readiness",
            status: CheckStatus::Fail,
            details: "customer agent is disabled; no conversation entrypoint".to_string(),
        };
    }

    let disabled: Vec<&str> = [
        ("orchestrator", config.roster.orchestrator.enabled),
        ("product", config.roster.product.enabled),
        ("insurance", config.roster.insurance.enabled),
    ]
    .into_iter()
    .filter(|(_, enabled)| !enabled)
    .map(|(name, _)| name)
    .collect();

    let details = if disabled.is_empty() {
        "all roster agents enabled".to_string()
    } else {
        format!("degraded roster, disabled agents: {}", disabled.join(", "))
    };

    DoctorCheck { name: "roster_readiness", status: CheckStatus::Pass, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
