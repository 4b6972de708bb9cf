use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::LeaveBalances;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub time_off: TimeOffConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Behaviour of the conversational core.
#[derive(Clone, Debug)]
pub struct BotConfig {
    /// `development` (or `dev`/`local`) exposes error detail to users.
    pub environment: String,
    /// When set, every inbound user claim is replaced by this identity.
    pub test_user_id: Option<String>,
    pub default_approver: Option<String>,
    pub token_secret: SecretString,
    pub token_ttl_hours: u32,
    pub confidence_threshold: f32,
    pub capability_timeout_secs: u64,
    pub email_domain: String,
    pub default_license_sku: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TimeOffConfig {
    pub vacation_days: i64,
    pub sick_days: i64,
    pub days_off: i64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub sender: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    Disabled,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub environment: Option<String>,
    pub test_user_id: Option<String>,
    pub default_approver: Option<String>,
    pub token_secret: Option<String>,
    pub port: Option<u16>,
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
            database: DatabaseConfig {
                url: "sqlite://hrdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-3.5-turbo".to_string(),
                timeout_secs: 10,
                max_retries: 1,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3978,
                graceful_shutdown_secs: 15,
            },
            bot: BotConfig {
                environment: "production".to_string(),
                test_user_id: None,
                default_approver: None,
                token_secret: String::new().into(),
                token_ttl_hours: 336,
                confidence_threshold: 0.55,
                capability_timeout_secs: 10,
                email_domain: "example.com".to_string(),
                default_license_sku: None,
            },
            time_off: TimeOffConfig {
                vacation_days: 20,
                sick_days: 10,
                days_off: 5,
            },
            notifications: NotificationConfig {
                webhook_url: None,
                sender: "hr-bot@example.com".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl BotConfig {
    pub fn is_development(&self) -> bool {
        matches!(
            self.environment.trim().to_ascii_lowercase().as_str(),
            "development" | "dev" | "local"
        )
    }

    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.token_ttl_hours))
    }
}

impl TimeOffConfig {
    /// Balances granted to an employee record on first sight.
    pub fn opening_balances(&self) -> LeaveBalances {
        LeaveBalances::new(self.vacation_days, self.sick_days, self.days_off)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hrdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            replace(&mut self.database.url, database.url);
            replace(&mut self.database.max_connections, database.max_connections);
            replace(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            replace(&mut self.llm.provider, llm.provider);
            replace(&mut self.llm.model, llm.model);
            replace(&mut self.llm.timeout_secs, llm.timeout_secs);
            replace(&mut self.llm.max_retries, llm.max_retries);
            if llm.api_key.is_some() {
                self.llm.api_key = llm.api_key.map(secret_value);
            }
            if llm.base_url.is_some() {
                self.llm.base_url = llm.base_url;
            }
        }

        if let Some(server) = patch.server {
            replace(&mut self.server.bind_address, server.bind_address);
            replace(&mut self.server.port, server.port);
            replace(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(bot) = patch.bot {
            let bot_config = &mut self.bot;
            replace(&mut bot_config.environment, bot.environment);
            replace(&mut bot_config.token_secret, bot.token_secret.map(secret_value));
            replace(&mut bot_config.token_ttl_hours, bot.token_ttl_hours);
            replace(&mut bot_config.confidence_threshold, bot.confidence_threshold);
            replace(&mut bot_config.capability_timeout_secs, bot.capability_timeout_secs);
            replace(&mut bot_config.email_domain, bot.email_domain);
            // An empty string in the file clears these back to unset.
            replace(&mut bot_config.test_user_id, bot.test_user_id.map(non_empty));
            replace(&mut bot_config.default_approver, bot.default_approver.map(non_empty));
            replace(&mut bot_config.default_license_sku, bot.default_license_sku.map(non_empty));
        }

        if let Some(time_off) = patch.time_off {
            replace(&mut self.time_off.vacation_days, time_off.vacation_days);
            replace(&mut self.time_off.sick_days, time_off.sick_days);
            replace(&mut self.time_off.days_off, time_off.days_off);
        }

        if let Some(notifications) = patch.notifications {
            replace(&mut self.notifications.webhook_url, notifications.webhook_url.map(non_empty));
            replace(&mut self.notifications.sender, notifications.sender);
        }

        if let Some(logging) = patch.logging {
            replace(&mut self.logging.level, logging.level);
            replace(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        replace(&mut self.database.url, read_env("HRDESK_DATABASE_URL"));
        replace(&mut self.database.max_connections, env_number("HRDESK_DATABASE_MAX_CONNECTIONS")?);
        replace(&mut self.database.timeout_secs, env_number("HRDESK_DATABASE_TIMEOUT_SECS")?);

        if let Some(value) = read_env("HRDESK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("HRDESK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HRDESK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        replace(&mut self.llm.model, read_env("HRDESK_LLM_MODEL"));
        replace(&mut self.llm.timeout_secs, env_number("HRDESK_LLM_TIMEOUT_SECS")?);
        replace(&mut self.llm.max_retries, env_number("HRDESK_LLM_MAX_RETRIES")?);

        replace(&mut self.server.bind_address, read_env("HRDESK_SERVER_BIND_ADDRESS"));
        replace(&mut self.server.port, env_number("HRDESK_SERVER_PORT")?);
        replace(
            &mut self.server.graceful_shutdown_secs,
            env_number("HRDESK_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        let bot = &mut self.bot;
        let environment = read_env("HRDESK_BOT_ENVIRONMENT").or_else(|| read_env("HRDESK_ENV"));
        replace(&mut bot.environment, environment);
        replace(&mut bot.test_user_id, read_env("HRDESK_BOT_TEST_USER_ID").map(Some));
        replace(&mut bot.default_approver, read_env("HRDESK_BOT_DEFAULT_APPROVER").map(Some));
        replace(&mut bot.token_secret, read_env("HRDESK_BOT_TOKEN_SECRET").map(secret_value));
        replace(&mut bot.token_ttl_hours, env_number("HRDESK_BOT_TOKEN_TTL_HOURS")?);
        replace(&mut bot.confidence_threshold, env_number("HRDESK_BOT_CONFIDENCE_THRESHOLD")?);
        replace(
            &mut bot.capability_timeout_secs,
            env_number("HRDESK_BOT_CAPABILITY_TIMEOUT_SECS")?,
        );
        replace(&mut bot.email_domain, read_env("HRDESK_BOT_EMAIL_DOMAIN"));
        replace(
            &mut bot.default_license_sku,
            read_env("HRDESK_BOT_DEFAULT_LICENSE_SKU").map(Some),
        );

        let time_off = &mut self.time_off;
        replace(&mut time_off.vacation_days, env_number("HRDESK_TIME_OFF_VACATION_DAYS")?);
        replace(&mut time_off.sick_days, env_number("HRDESK_TIME_OFF_SICK_DAYS")?);
        replace(&mut time_off.days_off, env_number("HRDESK_TIME_OFF_DAYS_OFF")?);

        replace(
            &mut self.notifications.webhook_url,
            read_env("HRDESK_NOTIFICATIONS_WEBHOOK_URL").map(Some),
        );
        replace(&mut self.notifications.sender, read_env("HRDESK_NOTIFICATIONS_SENDER"));

        let log_level = read_env("HRDESK_LOGGING_LEVEL").or_else(|| read_env("HRDESK_LOG_LEVEL"));
        replace(&mut self.logging.level, log_level);
        let log_format =
            read_env("HRDESK_LOGGING_FORMAT").or_else(|| read_env("HRDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(environment) = overrides.environment {
            self.bot.environment = environment;
        }
        if let Some(test_user_id) = overrides.test_user_id {
            self.bot.test_user_id = Some(test_user_id);
        }
        if let Some(default_approver) = overrides.default_approver {
            self.bot.default_approver = Some(default_approver);
        }
        if let Some(token_secret) = overrides.token_secret {
            self.bot.token_secret = secret_value(token_secret);
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_bot(&self.bot)?;
        validate_time_off(&self.time_off)?;
        validate_notifications(&self.notifications)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("hrdesk.toml"), PathBuf::from("config/hrdesk.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_retries > 1 {
        return Err(ConfigError::Validation(
            "llm.max_retries must be 0 or 1 to keep turn latency bounded".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    let secret = bot.token_secret.expose_secret();
    if secret.is_empty() {
        return Err(ConfigError::Validation(
            "bot.token_secret is required to sign card actions (set HRDESK_BOT_TOKEN_SECRET)"
                .to_string(),
        ));
    }
    if secret.len() < 16 {
        return Err(ConfigError::Validation(
            "bot.token_secret must be at least 16 characters".to_string(),
        ));
    }

    if bot.token_ttl_hours == 0 {
        return Err(ConfigError::Validation(
            "bot.token_ttl_hours must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&bot.confidence_threshold) {
        return Err(ConfigError::Validation(
            "bot.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if bot.capability_timeout_secs == 0 || bot.capability_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "bot.capability_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    let domain = bot.email_domain.trim();
    if domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(
            "bot.email_domain must be a bare domain such as `example.com`".to_string(),
        ));
    }

    Ok(())
}

fn validate_time_off(time_off: &TimeOffConfig) -> Result<(), ConfigError> {
    let negative = [
        ("time_off.vacation_days", time_off.vacation_days),
        ("time_off.sick_days", time_off.sick_days),
        ("time_off.days_off", time_off.days_off),
    ]
    .into_iter()
    .find(|(_, value)| *value < 0);

    if let Some((key, _)) = negative {
        return Err(ConfigError::Validation(format!("{key} must not be negative")));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if let Some(url) = &notifications.webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "notifications.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if !notifications.sender.contains('@') {
        return Err(ConfigError::Validation(
            "notifications.sender must be an email address".to_string(),
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

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Layers a value over the current one when the source provided it.
fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.clone(),
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    bot: Option<BotPatch>,
    time_off: Option<TimeOffPatch>,
    notifications: Option<NotificationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    environment: Option<String>,
    test_user_id: Option<String>,
    default_approver: Option<String>,
    token_secret: Option<String>,
    token_ttl_hours: Option<u32>,
    confidence_threshold: Option<f32>,
    capability_timeout_secs: Option<u64>,
    email_domain: Option<String>,
    default_license_sku: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TimeOffPatch {
    vacation_days: Option<i64>,
    sick_days: Option<i64>,
    days_off: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    webhook_url: Option<String>,
    sender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
