use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub devices: DevicesConfig,
    pub capabilities: CapabilitiesConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
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
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DevicesConfig {
    pub management_port: u16,
    pub connect_timeout_secs: u64,
    pub session_timeout_secs: u64,
    pub domain_suffixes: Vec<String>,
    pub max_concurrency: usize,
    pub output_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct CapabilitiesConfig {
    pub registry_path: Option<PathBuf>,
    pub base_dir: PathBuf,
    pub mode: ExecutionMode,
    pub executable: String,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub max_transcript_turns: usize,
    pub reuse_context: bool,
    /// Sessions kept in memory; the least recently used one goes first.
    pub max_sessions: usize,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
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
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Process,
    InProcess,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub server_port: Option<u16>,
    pub capabilities_mode: Option<ExecutionMode>,
    pub capabilities_base_dir: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
    pub output_dir: Option<PathBuf>,
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

pub const DEFAULT_DOMAIN_SUFFIXES: [&str; 3] =
    ["mgmt.internal.das", "cm.mgmt.internal.das", "mgmt.wellpoint.com"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: Some("https://api.openai.com/v1".to_string()),
                model: "gpt-5-nano".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
                allowed_origins: vec!["*".to_string()],
            },
            devices: DevicesConfig::default(),
            capabilities: CapabilitiesConfig {
                registry_path: None,
                base_dir: PathBuf::from("capabilities"),
                mode: ExecutionMode::Process,
                executable: "netops".to_string(),
            },
            conversation: ConversationConfig {
                max_transcript_turns: 40,
                reuse_context: true,
                max_sessions: 1_000,
                session_idle_secs: 1_800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            management_port: 22,
            connect_timeout_secs: 3,
            session_timeout_secs: 120,
            domain_suffixes: DEFAULT_DOMAIN_SUFFIXES.iter().map(|s| (*s).to_string()).collect(),
            max_concurrency: 100,
            output_dir: PathBuf::from("Outputs"),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn invalid_choice(field: &str, other: &str, expected: &str) -> ConfigError {
    ConfigError::Validation(format!("unsupported {field} `{other}` (expected {expected})"))
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(invalid_choice("llm provider", other, "openai|ollama")),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "in_process" | "in-process" => Ok(Self::InProcess),
            other => Err(invalid_choice("capabilities mode", other, "process|in_process")),
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
            other => Err(invalid_choice("log format", other, "compact|pretty|json")),
        }
    }
}

/// Reads `NETOPS_*` overrides through a lookup function, so the process
/// environment can be swapped for a fixed map.
pub struct EnvLayer<F> {
    lookup: F,
}

impl EnvLayer<fn(&str) -> Option<String>> {
    pub fn process() -> Self {
        Self { lookup: |key| env::var(key).ok() }
    }
}

impl<F> EnvLayer<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// First non-blank value among `keys`, in order.
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| (self.lookup)(key).filter(|value| !value.trim().is_empty()))
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.text(&[key])
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.text(&[key]).map(|value| {
            value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
        })
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::layered(options, &EnvLayer::process())?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load for capability executables: the collaborator section is not validated.
    pub fn load_for_devices(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::layered(options, &EnvLayer::process())?;
        let mut problems = Problems::default();
        problems.check_devices(&config.devices);
        problems.check_logging(&config.logging);
        problems.into_result()?;
        Ok(config)
    }

    pub fn layered<F>(options: LoadOptions, env: &EnvLayer<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.merge_file(read_file_layer(&path)?),
            None if options.require_file => {
                return Err(ConfigError::MissingConfigFile(
                    options.config_path.unwrap_or_else(|| PathBuf::from("netops.toml")),
                ));
            }
            None => {}
        }

        config.merge_env(env)?;
        config.merge_overrides(options.overrides);
        Ok(config)
    }

    fn merge_file(&mut self, file: FileLayer) {
        let FileLayer { llm, server, devices, capabilities, conversation, logging } = file;

        if let Some(llm) = llm {
            set(&mut self.llm.provider, llm.provider);
            set(&mut self.llm.api_key, llm.api_key.map(|key| Some(secret_value(key))));
            set(&mut self.llm.base_url, llm.base_url.map(Some));
            set(&mut self.llm.model, llm.model);
            set(&mut self.llm.timeout_secs, llm.timeout_secs);
            set(&mut self.llm.max_retries, llm.max_retries);
        }
        if let Some(server) = server {
            set(&mut self.server.bind_address, server.bind_address);
            set(&mut self.server.port, server.port);
            set(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
            set(&mut self.server.allowed_origins, server.allowed_origins);
        }
        if let Some(devices) = devices {
            set(&mut self.devices.management_port, devices.management_port);
            set(&mut self.devices.connect_timeout_secs, devices.connect_timeout_secs);
            set(&mut self.devices.session_timeout_secs, devices.session_timeout_secs);
            set(&mut self.devices.domain_suffixes, devices.domain_suffixes);
            set(&mut self.devices.max_concurrency, devices.max_concurrency);
            set(&mut self.devices.output_dir, devices.output_dir);
        }
        if let Some(capabilities) = capabilities {
            set(&mut self.capabilities.registry_path, capabilities.registry_path.map(Some));
            set(&mut self.capabilities.base_dir, capabilities.base_dir);
            set(&mut self.capabilities.mode, capabilities.mode);
            set(&mut self.capabilities.executable, capabilities.executable);
        }
        if let Some(conversation) = conversation {
            set(&mut self.conversation.max_transcript_turns, conversation.max_transcript_turns);
            set(&mut self.conversation.reuse_context, conversation.reuse_context);
            set(&mut self.conversation.max_sessions, conversation.max_sessions);
            set(&mut self.conversation.session_idle_secs, conversation.session_idle_secs);
        }
        if let Some(logging) = logging {
            set(&mut self.logging.level, logging.level);
            set(&mut self.logging.format, logging.format);
        }
    }

    fn merge_env<F>(&mut self, env: &EnvLayer<F>) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm = &mut self.llm;
        set(&mut llm.provider, env.parsed("NETOPS_LLM_PROVIDER")?);
        // The bare OpenAI variable is honoured so existing deployments keep working.
        set(
            &mut llm.api_key,
            env.text(&["NETOPS_LLM_API_KEY", "OPENAI_API_KEY"]).map(|key| Some(secret_value(key))),
        );
        set(&mut llm.base_url, env.text(&["NETOPS_LLM_BASE_URL"]).map(Some));
        set(&mut llm.model, env.text(&["NETOPS_LLM_MODEL"]));
        set(&mut llm.timeout_secs, env.parsed("NETOPS_LLM_TIMEOUT_SECS")?);
        set(&mut llm.max_retries, env.parsed("NETOPS_LLM_MAX_RETRIES")?);

        let server = &mut self.server;
        set(&mut server.bind_address, env.text(&["NETOPS_SERVER_BIND_ADDRESS"]));
        set(&mut server.port, env.parsed("NETOPS_SERVER_PORT")?);
        set(&mut server.graceful_shutdown_secs, env.parsed("NETOPS_SERVER_GRACEFUL_SHUTDOWN_SECS")?);
        set(&mut server.allowed_origins, env.list("NETOPS_SERVER_ALLOWED_ORIGINS"));

        let devices = &mut self.devices;
        set(&mut devices.management_port, env.parsed("NETOPS_DEVICES_MANAGEMENT_PORT")?);
        set(&mut devices.connect_timeout_secs, env.parsed("NETOPS_DEVICES_CONNECT_TIMEOUT_SECS")?);
        set(&mut devices.session_timeout_secs, env.parsed("NETOPS_DEVICES_SESSION_TIMEOUT_SECS")?);
        set(&mut devices.domain_suffixes, env.list("NETOPS_DEVICES_DOMAIN_SUFFIXES"));
        set(&mut devices.max_concurrency, env.parsed("NETOPS_DEVICES_MAX_CONCURRENCY")?);
        set(&mut devices.output_dir, env.parsed("NETOPS_DEVICES_OUTPUT_DIR")?);

        let capabilities = &mut self.capabilities;
        set(
            &mut capabilities.registry_path,
            env.parsed::<PathBuf>("NETOPS_CAPABILITIES_REGISTRY_PATH")?.map(Some),
        );
        set(&mut capabilities.base_dir, env.parsed("NETOPS_CAPABILITIES_BASE_DIR")?);
        set(&mut capabilities.mode, env.text(&["NETOPS_CAPABILITIES_MODE"]).map(|v| v.parse()).transpose()?);
        set(&mut capabilities.executable, env.text(&["NETOPS_CAPABILITIES_EXECUTABLE"]));

        let conversation = &mut self.conversation;
        set(
            &mut conversation.max_transcript_turns,
            env.parsed("NETOPS_CONVERSATION_MAX_TRANSCRIPT_TURNS")?,
        );
        set(&mut conversation.reuse_context, env.parsed("NETOPS_CONVERSATION_REUSE_CONTEXT")?);
        set(&mut conversation.max_sessions, env.parsed("NETOPS_CONVERSATION_MAX_SESSIONS")?);
        set(
            &mut conversation.session_idle_secs,
            env.parsed("NETOPS_CONVERSATION_SESSION_IDLE_SECS")?,
        );

        set(&mut self.logging.level, env.text(&["NETOPS_LOGGING_LEVEL", "NETOPS_LOG_LEVEL"]));
        set(
            &mut self.logging.format,
            env.text(&["NETOPS_LOGGING_FORMAT", "NETOPS_LOG_FORMAT"]).map(|v| v.parse()).transpose()?,
        );
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        set(&mut self.logging.level, overrides.log_level);
        set(&mut self.llm.provider, overrides.llm_provider);
        set(&mut self.llm.model, overrides.llm_model);
        set(&mut self.llm.api_key, overrides.llm_api_key.map(|key| Some(secret_value(key))));
        set(&mut self.server.port, overrides.server_port);
        set(&mut self.capabilities.mode, overrides.capabilities_mode);
        set(&mut self.capabilities.base_dir, overrides.capabilities_base_dir);
        set(&mut self.devices.max_concurrency, overrides.max_concurrency);
        set(&mut self.devices.output_dir, overrides.output_dir);
    }

    /// Checks every section and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Problems::default();
        problems.check_llm(&self.llm);
        problems.check_server(&self.server);
        problems.check_devices(&self.devices);
        problems.check_capabilities(&self.capabilities);
        problems.require(
            self.conversation.max_transcript_turns >= 2,
            "conversation.max_transcript_turns must be at least 2",
        );
        problems.require(self.conversation.max_sessions >= 1, "conversation.max_sessions must be at least 1");
        problems.require(
            self.conversation.session_idle_secs >= 1,
            "conversation.session_idle_secs must be at least 1",
        );
        problems.check_logging(&self.logging);
        problems.into_result()
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => ["netops.toml", "config/netops.toml"].into_iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_file_layer(path: &Path) -> Result<FileLayer, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_references(&raw, |key| env::var(key).ok())?;
    toml::from_str(&expanded).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` in `input`; an unset variable is an error rather than an empty string.
fn expand_env_references(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value =
            lookup(var).ok_or_else(|| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn require(&mut self, ok: bool, problem: impl Into<String>) {
        if !ok {
            self.0.push(problem.into());
        }
    }

    fn into_result(self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(self.0.join("; ")))
        }
    }

    fn check_llm(&mut self, llm: &LlmConfig) {
        self.require((1..=300).contains(&llm.timeout_secs), "llm.timeout_secs must be in range 1..=300");
        self.require(!llm.model.trim().is_empty(), "llm.model must not be empty");

        let has_key = llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
        let base_url = llm.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        match llm.provider {
            LlmProvider::OpenAi => self.require(
                has_key,
                "llm.api_key is required for the openai provider (set NETOPS_LLM_API_KEY or OPENAI_API_KEY)",
            ),
            LlmProvider::Ollama => {
                self.require(base_url.is_some(), "llm.base_url is required for the ollama provider")
            }
        }
        if let Some(url) = base_url {
            self.require(
                url.starts_with("http://") || url.starts_with("https://"),
                "llm.base_url must start with http:// or https://",
            );
        }
    }

    fn check_server(&mut self, server: &ServerConfig) {
        self.require(server.port != 0, "server.port must be greater than zero");
        self.require(
            server.graceful_shutdown_secs != 0,
            "server.graceful_shutdown_secs must be greater than zero",
        );
    }

    fn check_devices(&mut self, devices: &DevicesConfig) {
        self.require(devices.management_port != 0, "devices.management_port must be greater than zero");
        self.require(
            (1..=60).contains(&devices.connect_timeout_secs),
            "devices.connect_timeout_secs must be in range 1..=60",
        );
        self.require(
            devices.session_timeout_secs != 0,
            "devices.session_timeout_secs must be greater than zero",
        );
        self.require(devices.max_concurrency != 0, "devices.max_concurrency must be greater than zero");
        for suffix in &devices.domain_suffixes {
            let trimmed = suffix.trim();
            self.require(
                !(trimmed.is_empty() || trimmed.starts_with('.') || trimmed.contains(char::is_whitespace)),
                format!(
                    "devices.domain_suffixes contains an invalid suffix `{suffix}` (use `example.net`, without a leading dot)"
                ),
            );
        }
    }

    fn check_capabilities(&mut self, capabilities: &CapabilitiesConfig) {
        self.require(
            !capabilities.executable.trim().is_empty(),
            "capabilities.executable must not be empty",
        );
    }

    fn check_logging(&mut self, logging: &LoggingConfig) {
        let level = logging.level.trim().to_ascii_lowercase();
        self.require(
            matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"),
            "logging.level must be one of trace|debug|info|warn|error",
        );
    }
}

/// Shape of `netops.toml`; every key is optional and only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLayer {
    llm: Option<LlmFile>,
    server: Option<ServerFile>,
    devices: Option<DevicesFile>,
    capabilities: Option<CapabilitiesFile>,
    conversation: Option<ConversationFile>,
    logging: Option<LoggingFile>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmFile {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFile {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DevicesFile {
    management_port: Option<u16>,
    connect_timeout_secs: Option<u64>,
    session_timeout_secs: Option<u64>,
    domain_suffixes: Option<Vec<String>>,
    max_concurrency: Option<usize>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct CapabilitiesFile {
    registry_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    mode: Option<ExecutionMode>,
    executable: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationFile {
    max_transcript_turns: Option<usize>,
    reuse_context: Option<bool>,
    max_sessions: Option<usize>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingFile {
    level: Option<String>,
    format: Option<LogFormat>,
}
