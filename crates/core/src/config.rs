use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub roster: RosterConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RosterConfig {
    pub customer: AgentRef,
    pub orchestrator: AgentRef,
    pub product: AgentRef,
    pub insurance: AgentRef,
}

#[derive(Clone, Debug)]
pub struct AgentRef {
    pub name: String,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LimitsConfig {
    pub specialist_call_cap: u32,
    pub session_clarification_cap: u32,
    pub recent_history_turns: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub gateway_base_url: Option<String>,
    pub gateway_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                base_url: "http://localhost:8088".to_string(),
                api_key: None,
                timeout_secs: 30,
            },
            roster: RosterConfig {
                customer: AgentRef { name: "customer_agent".to_string(), enabled: true },
                orchestrator: AgentRef { name: "orchestrator_agent".to_string(), enabled: true },
                product: AgentRef { name: "product_agent".to_string(), enabled: true },
                insurance: AgentRef { name: "insurance_agent".to_string(), enabled: true },
            },
            limits: LimitsConfig {
                specialist_call_cap: 3,
                session_clarification_cap: 10,
                recent_history_turns: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("clerky.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(gateway) = patch.gateway {
            if let Some(base_url) = gateway.base_url {
                self.gateway.base_url = base_url;
            }
            if let Some(gateway_api_key_value) = gateway.api_key {
                self.gateway.api_key = Some(secret_value(gateway_api_key_value));
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
        }

        if let Some(roster) = patch.roster {
            apply_agent_patch(&mut self.roster.customer, roster.customer);
            apply_agent_patch(&mut self.roster.orchestrator, roster.orchestrator);
            apply_agent_patch(&mut self.roster.product, roster.product);
            apply_agent_patch(&mut self.roster.insurance, roster.insurance);
        }

        if let Some(limits) = patch.limits {
            if let Some(specialist_call_cap) = limits.specialist_call_cap {
                self.limits.specialist_call_cap = specialist_call_cap;
            }
            if let Some(session_clarification_cap) = limits.session_clarification_cap {
                self.limits.session_clarification_cap = session_clarification_cap;
            }
            if let Some(recent_history_turns) = limits.recent_history_turns {
                self.limits.recent_history_turns = recent_history_turns;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLERKY_GATEWAY_BASE_URL") {
            self.gateway.base_url = value;
        }
        if let Some(value) = read_env("CLERKY_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLERKY_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("CLERKY_GATEWAY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLERKY_ROSTER_CUSTOMER_NAME") {
            self.roster.customer.name = value;
        }
        if let Some(value) = read_env("CLERKY_ROSTER_ORCHESTRATOR_NAME") {
            self.roster.orchestrator.name = value;
        }
        if let Some(value) = read_env("CLERKY_ROSTER_PRODUCT_NAME") {
            self.roster.product.name = value;
        }
        if let Some(value) = read_env("CLERKY_ROSTER_INSURANCE_NAME") {
            self.roster.insurance.name = value;
        }
        if let Some(value) = read_env("CLERKY_ROSTER_PRODUCT_ENABLED") {
            self.roster.product.enabled = parse_bool("CLERKY_ROSTER_PRODUCT_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CLERKY_ROSTER_INSURANCE_ENABLED") {
            self.roster.insurance.enabled = parse_bool("CLERKY_ROSTER_INSURANCE_ENABLED", &value)?;
        }

        if let Some(value) = read_env("CLERKY_LIMITS_SPECIALIST_CALL_CAP") {
            self.limits.specialist_call_cap =
                parse_u32("CLERKY_LIMITS_SPECIALIST_CALL_CAP", &value)?;
        }
        if let Some(value) = read_env("CLERKY_LIMITS_SESSION_CLARIFICATION_CAP") {
            self.limits.session_clarification_cap =
                parse_u32("CLERKY_LIMITS_SESSION_CLARIFICATION_CAP", &value)?;
        }
        if let Some(value) = read_env("CLERKY_LIMITS_RECENT_HISTORY_TURNS") {
            self.limits.recent_history_turns =
                parse_u32("CLERKY_LIMITS_RECENT_HISTORY_TURNS", &value)? as usize;
        }

        let log_level = read_env("CLERKY_LOGGING_LEVEL").or_else(|| read_env("CLERKY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLERKY_LOGGING_FORMAT").or_else(|| read_env("CLERKY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(gateway_base_url) = overrides.gateway_base_url {
            self.gateway.base_url = gateway_base_url;
        }
        if let Some(gateway_api_key) = overrides.gateway_api_key {
            self.gateway.api_key = Some(secret_value(gateway_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway(&self.gateway)?;
        validate_roster(&self.roster)?;
        validate_limits(&self.limits)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_agent_patch(target: &mut AgentRef, patch: Option<AgentPatch>) {
    let Some(patch) = patch else {
        return;
    };
    if let Some(name) = patch.name {
        target.name = name;
    }
    if let Some(enabled) = patch.enabled {
        target.enabled = enabled;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("clerky.toml"), PathBuf::from("config/clerky.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    let base_url = gateway.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "gateway.base_url must start with http:// or https://".to_string(),
        ));
    }

    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(api_key) = &gateway.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "gateway.api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_roster(roster: &RosterConfig) -> Result<(), ConfigError> {
    for (section, agent) in [
        ("roster.customer", &roster.customer),
        ("roster.orchestrator", &roster.orchestrator),
        ("roster.product", &roster.product),
        ("roster.insurance", &roster.insurance),
    ] {
        if agent.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{section}.name must not be empty")));
        }
    }

    Ok(())
}

fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    if limits.specialist_call_cap == 0 {
        return Err(ConfigError::Validation(
            "limits.specialist_call_cap must be greater than zero".to_string(),
        ));
    }

    if limits.session_clarification_cap == 0 {
        return Err(ConfigError::Validation(
            "limits.session_clarification_cap must be greater than zero".to_string(),
        ));
    }

    if limits.recent_history_turns == 0 {
        return Err(ConfigError::Validation(
            "limits.recent_history_turns must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    gateway: Option<GatewayPatch>,
    roster: Option<RosterPatch>,
    limits: Option<LimitsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RosterPatch {
    customer: Option<AgentPatch>,
    orchestrator: Option<AgentPatch>,
    product: Option<AgentPatch>,
    insurance: Option<AgentPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    name: Option<String>,
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitsPatch {
    specialist_call_cap: Option<u32>,
    session_clarification_cap: Option<u32>,
    recent_history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_cleanly() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.gateway.base_url == "http://localhost:8088", "default gateway url")?;
        ensure(config.limits.specialist_call_cap == 3, "default specialist cap")?;
        ensure(config.limits.session_clarification_cap == 10, "default session cap")?;
        ensure(config.roster.customer.name == "customer_agent", "default customer agent name")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_GATEWAY_API_KEY", "key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("clerky.toml");
            fs::write(
                &path,
                r#"
[gateway]
base_url = "https://gateway.internal"
api_key = "${TEST_GATEWAY_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.base_url == "https://gateway.internal",
                "gateway url should come from the file",
            )?;
            let api_key = config
                .gateway
                .api_key
                .as_ref()
                .map(|key| key.expose_secret().to_string())
                .unwrap_or_default();
            ensure(api_key == "key-from-env", "api key should be loaded from environment")?;
            Ok(())
        })();

        clear_vars(&["TEST_GATEWAY_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLERKY_LOG_LEVEL", "warn");
        env::set_var("CLERKY_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CLERKY_LOG_LEVEL", "CLERKY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLERKY_GATEWAY_BASE_URL", "https://from-env.internal");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("clerky.toml");
            fs::write(
                &path,
                r#"
[gateway]
base_url = "https://from-file.internal"

[limits]
specialist_call_cap = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gateway.base_url == "https://from-env.internal",
                "env gateway url should win over file and defaults",
            )?;
            ensure(config.limits.specialist_call_cap == 5, "file cap should win over default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["CLERKY_GATEWAY_BASE_URL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLERKY_GATEWAY_BASE_URL", "ftp://nope");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("gateway.base_url")
            );
            ensure(has_message, "validation failure should mention gateway.base_url")
        })();

        clear_vars(&["CLERKY_GATEWAY_BASE_URL"]);
        result
    }

    #[test]
    fn zero_caps_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLERKY_LIMITS_SPECIALIST_CALL_CAP", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("specialist_call_cap")
            );
            ensure(has_message, "validation failure should mention specialist_call_cap")
        })();

        clear_vars(&["CLERKY_LIMITS_SPECIALIST_CALL_CAP"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLERKY_GATEWAY_API_KEY", "super-secret-key");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-key"),
                "debug output should not contain the api key",
            )?;
            Ok(())
        })();

        clear_vars(&["CLERKY_GATEWAY_API_KEY"]);
        result
    }
}
