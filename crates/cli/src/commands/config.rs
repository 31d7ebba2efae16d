use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use closetmind_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        field_source(
            "database.url",
            Some("CLOSETMIND_DATABASE_URL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        field_source(
            "database.max_connections",
            Some("CLOSETMIND_DATABASE_MAX_CONNECTIONS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "database.busy_timeout_ms",
        &config.database.busy_timeout_ms.to_string(),
        field_source(
            "database.busy_timeout_ms",
            Some("CLOSETMIND_DATABASE_BUSY_TIMEOUT_MS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        field_source(
            "llm.provider",
            Some("CLOSETMIND_LLM_PROVIDER"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        field_source(
            "llm.model",
            Some("CLOSETMIND_LLM_MODEL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        field_source(
            "llm.base_url",
            Some("CLOSETMIND_LLM_BASE_URL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        field_source(
            "llm.api_key",
            Some("CLOSETMIND_LLM_API_KEY"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "agent.context_window_turns",
        &config.agent.context_window_turns.to_string(),
        field_source(
            "agent.context_window_turns",
            Some("CLOSETMIND_AGENT_CONTEXT_WINDOW_TURNS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "agent.max_response_attempts",
        &config.agent.max_response_attempts.to_string(),
        field_source(
            "agent.max_response_attempts",
            Some("CLOSETMIND_AGENT_MAX_RESPONSE_ATTEMPTS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "agent.budget_adjust_pct",
        &config.agent.budget_adjust_pct.to_string(),
        field_source(
            "agent.budget_adjust_pct",
            Some("CLOSETMIND_AGENT_BUDGET_ADJUST_PCT"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "guard.interactive.db_sessions",
        &config.guard.interactive.db_sessions.to_string(),
        field_source(
            "guard.interactive.db_sessions",
            Some("CLOSETMIND_GUARD_INTERACTIVE_DB_SESSIONS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "guard.background.generation_slots",
        &config.guard.background.generation_slots.to_string(),
        field_source(
            "guard.background.generation_slots",
            Some("CLOSETMIND_GUARD_BACKGROUND_GENERATION_SLOTS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        field_source(
            "server.bind_address",
            Some("CLOSETMIND_SERVER_BIND_ADDRESS"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        field_source(
            "server.port",
            Some("CLOSETMIND_SERVER_PORT"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source(
            "logging.level",
            Some("CLOSETMIND_LOGGING_LEVEL"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        field_source(
            "logging.format",
            Some("CLOSETMIND_LOGGING_FORMAT"),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        ),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("closetmind.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/closetmind.toml");
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
