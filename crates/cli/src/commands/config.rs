use std::env;
use std::fs;
use std::path::PathBuf;

use netops_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Table;

pub fn run() -> String {
    let config = match AppConfig::load_for_devices(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file = resolve_config_path(None).and_then(FileDoc::read);

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let registry_path = config
        .capabilities
        .registry_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<built-in catalog>".to_string());

    let mut push = |key_path: &str, value: String, aliases: &[&str]| {
        lines.push(render_line(key_path, &value, field_source(key_path, aliases, file.as_ref())));
    };
    push("llm.provider", format!("{:?}", config.llm.provider), &[]);
    push("llm.model", config.llm.model.clone(), &[]);
    push("llm.base_url", config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()), &[]);
    push("llm.api_key", api_key, &["OPENAI_API_KEY"]);
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), &[]);
    push("llm.max_retries", config.llm.max_retries.to_string(), &[]);
    push("server.bind_address", config.server.bind_address.clone(), &[]);
    push("server.port", config.server.port.to_string(), &[]);
    push("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string(), &[]);
    push("server.allowed_origins", config.server.allowed_origins.join(","), &[]);
    push("devices.management_port", config.devices.management_port.to_string(), &[]);
    push("devices.connect_timeout_secs", config.devices.connect_timeout_secs.to_string(), &[]);
    push("devices.session_timeout_secs", config.devices.session_timeout_secs.to_string(), &[]);
    push("devices.domain_suffixes", config.devices.domain_suffixes.join(","), &[]);
    push("devices.max_concurrency", config.devices.max_concurrency.to_string(), &[]);
    push("devices.output_dir", config.devices.output_dir.display().to_string(), &[]);
    push("capabilities.registry_path", registry_path, &[]);
    push("capabilities.base_dir", config.capabilities.base_dir.display().to_string(), &[]);
    push("capabilities.mode", format!("{:?}", config.capabilities.mode), &[]);
    push("capabilities.executable", config.capabilities.executable.clone(), &[]);
    push(
        "conversation.max_transcript_turns",
        config.conversation.max_transcript_turns.to_string(),
        &[],
    );
    push("conversation.reuse_context", config.conversation.reuse_context.to_string(), &[]);
    push("conversation.max_sessions", config.conversation.max_sessions.to_string(), &[]);
    push("conversation.session_idle_secs", config.conversation.session_idle_secs.to_string(), &[]);
    push("logging.level", config.logging.level.clone(), &["NETOPS_LOG_LEVEL"]);
    push("logging.format", format!("{:?}", config.logging.format), &["NETOPS_LOG_FORMAT"]);

    match config.validate() {
        Ok(()) => lines.push("validation: ok".to_string()),
        Err(error) => lines.push(format!("validation: {error}")),
    }

    lines.join("\n")
}

/// The config file as written, used only to tell which keys it sets.
struct FileDoc {
    path: PathBuf,
    table: Table,
}

impl FileDoc {
    fn read(path: PathBuf) -> Option<Self> {
        let table = fs::read_to_string(&path).ok()?.parse::<Table>().ok()?;
        Some(Self { path, table })
    }

    fn defines(&self, key_path: &str) -> bool {
        let mut keys = key_path.split('.');
        let Some(section) = keys.next().and_then(|first| self.table.get(first)) else {
            return false;
        };
        keys.try_fold(section, |value, key| value.get(key)).is_some()
    }
}

/// `llm.api_key` -> `NETOPS_LLM_API_KEY`.
pub fn env_key(key_path: &str) -> String {
    format!("NETOPS_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

/// Mirrors the load order: an env variable beats the file, which beats the default.
fn field_source(key_path: &str, aliases: &[&str], file: Option<&FileDoc>) -> String {
    let primary = env_key(key_path);
    if let Some(var) = std::iter::once(primary.as_str())
        .chain(aliases.iter().copied())
        .find(|var| env::var(var).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({var})");
    }
    match file {
        Some(file) if file.defines(key_path) => format!("file ({})", file.path.display()),
        _ => "default".to_string(),
    }
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a provider prefix such as `sk` so the operator can tell which key is loaded.
fn redact_token(token: &str) -> String {
    match token.trim() {
        "" => "<empty>".to_string(),
        trimmed => match trimmed.split_once('-') {
            Some((prefix, _)) => format!("{prefix}-***"),
            None => "<redacted>".to_string(),
        },
    }
}
