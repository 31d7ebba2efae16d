use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub guard: GuardConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// How long a connection waits on a locked database before failing.
    /// Distinct from `guard.acquire_timeout_ms`, which bounds lease waits.
    pub busy_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Turns kept in the context window used for hint extraction.
    pub context_window_turns: usize,
    /// Generation attempts before falling back to the category default.
    pub max_response_attempts: u32,
    /// Percentage applied to the budget ceiling on cheaper/pricier feedback.
    pub budget_adjust_pct: u8,
    /// Generate conversation titles in the background on first message.
    pub title_generation: bool,
}

#[derive(Clone, Debug)]
pub struct GuardConfig {
    pub interactive: PoolLimits,
    pub background: PoolLimits,
    pub acquire_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct PoolLimits {
    pub db_sessions: usize,
    pub generation_slots: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
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
    pub llm_api_key: Option<String>,
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
                url: "sqlite://closetmind.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                busy_timeout_ms: 5_000,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            agent: AgentConfig {
                context_window_turns: 6,
                max_response_attempts: 3,
                budget_adjust_pct: 20,
                title_generation: true,
            },
            guard: GuardConfig {
                interactive: PoolLimits { db_sessions: 4, generation_slots: 4 },
                background: PoolLimits { db_sessions: 2, generation_slots: 2 },
                acquire_timeout_ms: 5_000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("closetmind.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
            if let Some(busy_timeout_ms) = database.busy_timeout_ms {
                self.database.busy_timeout_ms = busy_timeout_ms;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(context_window_turns) = agent.context_window_turns {
                self.agent.context_window_turns = context_window_turns;
            }
            if let Some(max_response_attempts) = agent.max_response_attempts {
                self.agent.max_response_attempts = max_response_attempts;
            }
            if let Some(budget_adjust_pct) = agent.budget_adjust_pct {
                self.agent.budget_adjust_pct = budget_adjust_pct;
            }
            if let Some(title_generation) = agent.title_generation {
                self.agent.title_generation = title_generation;
            }
        }

        if let Some(guard) = patch.guard {
            if let Some(interactive) = guard.interactive {
                apply_pool_patch(&mut self.guard.interactive, interactive);
            }
            if let Some(background) = guard.background {
                apply_pool_patch(&mut self.guard.background, background);
            }
            if let Some(acquire_timeout_ms) = guard.acquire_timeout_ms {
                self.guard.acquire_timeout_ms = acquire_timeout_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("CLOSETMIND_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CLOSETMIND_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CLOSETMIND_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CLOSETMIND_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_DATABASE_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms =
                parse_u64("CLOSETMIND_DATABASE_BUSY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("CLOSETMIND_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CLOSETMIND_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLOSETMIND_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CLOSETMIND_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CLOSETMIND_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CLOSETMIND_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLOSETMIND_AGENT_CONTEXT_WINDOW_TURNS") {
            self.agent.context_window_turns =
                parse_usize("CLOSETMIND_AGENT_CONTEXT_WINDOW_TURNS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_AGENT_MAX_RESPONSE_ATTEMPTS") {
            self.agent.max_response_attempts =
                parse_u32("CLOSETMIND_AGENT_MAX_RESPONSE_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_AGENT_BUDGET_ADJUST_PCT") {
            self.agent.budget_adjust_pct = parse_u8("CLOSETMIND_AGENT_BUDGET_ADJUST_PCT", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_AGENT_TITLE_GENERATION") {
            self.agent.title_generation = parse_bool("CLOSETMIND_AGENT_TITLE_GENERATION", &value)?;
        }

        if let Some(value) = read_env("CLOSETMIND_GUARD_INTERACTIVE_DB_SESSIONS") {
            self.guard.interactive.db_sessions =
                parse_usize("CLOSETMIND_GUARD_INTERACTIVE_DB_SESSIONS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_GUARD_INTERACTIVE_GENERATION_SLOTS") {
            self.guard.interactive.generation_slots =
                parse_usize("CLOSETMIND_GUARD_INTERACTIVE_GENERATION_SLOTS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_GUARD_BACKGROUND_DB_SESSIONS") {
            self.guard.background.db_sessions =
                parse_usize("CLOSETMIND_GUARD_BACKGROUND_DB_SESSIONS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_GUARD_BACKGROUND_GENERATION_SLOTS") {
            self.guard.background.generation_slots =
                parse_usize("CLOSETMIND_GUARD_BACKGROUND_GENERATION_SLOTS", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_GUARD_ACQUIRE_TIMEOUT_MS") {
            self.guard.acquire_timeout_ms =
                parse_u64("CLOSETMIND_GUARD_ACQUIRE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("CLOSETMIND_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CLOSETMIND_SERVER_PORT") {
            self.server.port = parse_u16("CLOSETMIND_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CLOSETMIND_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CLOSETMIND_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CLOSETMIND_LOGGING_LEVEL").or_else(|| read_env("CLOSETMIND_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLOSETMIND_LOGGING_FORMAT").or_else(|| read_env("CLOSETMIND_LOG_FORMAT"));
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
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_guard(&self.guard)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_pool_patch(limits: &mut PoolLimits, patch: PoolPatch) {
    if let Some(db_sessions) = patch.db_sessions {
        limits.db_sessions = db_sessions;
    }
    if let Some(generation_slots) = patch.generation_slots {
        limits.generation_slots = generation_slots;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("closetmind.toml"), PathBuf::from("config/closetmind.toml")]
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

    if database.busy_timeout_ms == 0 || database.busy_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "database.busy_timeout_ms must be in range 1..=60000".to_string(),
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

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.context_window_turns == 0 || agent.context_window_turns > 50 {
        return Err(ConfigError::Validation(
            "agent.context_window_turns must be in range 1..=50".to_string(),
        ));
    }
    if agent.max_response_attempts == 0 || agent.max_response_attempts > 10 {
        return Err(ConfigError::Validation(
            "agent.max_response_attempts must be in range 1..=10".to_string(),
        ));
    }
    if agent.budget_adjust_pct == 0 || agent.budget_adjust_pct > 90 {
        return Err(ConfigError::Validation(
            "agent.budget_adjust_pct must be in range 1..=90".to_string(),
        ));
    }
    Ok(())
}

fn validate_guard(guard: &GuardConfig) -> Result<(), ConfigError> {
    for (name, limits) in [("interactive", guard.interactive), ("background", guard.background)] {
        if limits.db_sessions == 0 {
            return Err(ConfigError::Validation(format!(
                "guard.{name}.db_sessions must be greater than zero"
            )));
        }
        if limits.generation_slots == 0 {
            return Err(ConfigError::Validation(format!(
                "guard.{name}.generation_slots must be greater than zero"
            )));
        }
    }

    if guard.acquire_timeout_ms == 0 || guard.acquire_timeout_ms > 300_000 {
        return Err(ConfigError::Validation(
            "guard.acquire_timeout_ms must be in range 1..=300000".to_string(),
        ));
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

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
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
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    guard: Option<GuardPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    context_window_turns: Option<usize>,
    max_response_attempts: Option<u32>,
    budget_adjust_pct: Option<u8>,
    title_generation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardPatch {
    interactive: Option<PoolPatch>,
    background: Option<PoolPatch>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PoolPatch {
    db_sessions: Option<usize>,
    generation_slots: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

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
    fn defaults_validate_without_a_config_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.agent.context_window_turns == 6, "default window should be six turns")?;
        ensure(config.agent.max_response_attempts == 3, "default attempts should be three")?;
        ensure(
            config.guard.interactive.db_sessions > 0,
            "interactive pool should have db capacity",
        )?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_LLM_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("closetmind.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_LLM_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_LLM_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSETMIND_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CLOSETMIND_AGENT_CONTEXT_WINDOW_TURNS", "8");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("closetmind.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[agent]
context_window_turns = 4

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.agent.context_window_turns == 8,
                "env window size should win over file value",
            )?;
            Ok(())
        })();

        clear_vars(&["CLOSETMIND_DATABASE_URL", "CLOSETMIND_AGENT_CONTEXT_WINDOW_TURNS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSETMIND_LOG_LEVEL", "warn");
        env::set_var("CLOSETMIND_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CLOSETMIND_LOG_LEVEL", "CLOSETMIND_LOG_FORMAT"]);
        result
    }

    #[test]
    fn openai_provider_requires_an_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSETMIND_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["CLOSETMIND_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn guard_ceilings_must_be_positive() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSETMIND_GUARD_BACKGROUND_GENERATION_SLOTS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("guard.background.generation_slots")
            );
            ensure(has_message, "validation failure should name the offending pool")
        })();

        clear_vars(&["CLOSETMIND_GUARD_BACKGROUND_GENERATION_SLOTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSETMIND_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            Ok(())
        })();

        clear_vars(&["CLOSETMIND_LLM_API_KEY"]);
        result
    }
}
