use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hrdesk_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// Environment aliases read besides the derived `HRDESK_<SECTION>_<KEY>`.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("bot.environment", "HRDESK_ENV"),
    ("logging.level", "HRDESK_LOG_LEVEL"),
    ("logging.format", "HRDESK_LOG_FORMAT"),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in effective_values(&config) {
        let source = field_source(key, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }
    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "<unset>".to_string());
    let webhook = config.notifications.webhook_url.as_deref().map_or("<unset>", strip_query);

    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("llm.provider", format!("{:?}", config.llm.provider)),
        ("llm.model", config.llm.model.clone()),
        ("llm.base_url", optional(&config.llm.base_url)),
        ("llm.api_key", redact(config.llm.api_key.as_ref())),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        ("llm.max_retries", config.llm.max_retries.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("bot.environment", config.bot.environment.clone()),
        ("bot.test_user_id", optional(&config.bot.test_user_id)),
        ("bot.default_approver", optional(&config.bot.default_approver)),
        ("bot.token_secret", redact(Some(&config.bot.token_secret))),
        ("bot.token_ttl_hours", config.bot.token_ttl_hours.to_string()),
        ("bot.confidence_threshold", config.bot.confidence_threshold.to_string()),
        ("bot.capability_timeout_secs", config.bot.capability_timeout_secs.to_string()),
        ("bot.email_domain", config.bot.email_domain.clone()),
        ("bot.default_license_sku", optional(&config.bot.default_license_sku)),
        ("time_off.vacation_days", config.time_off.vacation_days.to_string()),
        ("time_off.sick_days", config.time_off.sick_days.to_string()),
        ("time_off.days_off", config.time_off.days_off.to_string()),
        ("notifications.webhook_url", webhook.to_string()),
        ("notifications.sender", config.notifications.sender.clone()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("hrdesk.toml"), PathBuf::from("config/hrdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn env_keys(key_path: &str) -> Vec<String> {
    let mut keys = vec![format!("HRDESK_{}", key_path.replace('.', "_").to_ascii_uppercase())];
    keys.extend(
        ENV_ALIASES
            .iter()
            .filter(|(key, _)| *key == key_path)
            .map(|(_, alias)| (*alias).to_string()),
    );
    keys
}

fn field_source(key_path: &str, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = env_keys(key_path).into_iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, key_path) {
            let file_path = file_path
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

fn redact(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim().is_empty()) {
        Some(false) => "<redacted>".to_string(),
        _ => "<unset>".to_string(),
    }
}

/// Relay URLs may carry access tokens in the query string.
fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
