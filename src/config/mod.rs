//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{BackendOverrides, CliArgs, Command, ResolveArgs, ServeArgs, ServeOverrides};

use crate::graphql::stages::RetryPolicy;
use crate::persistence::DEFAULT_NAMESPACE;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vetrina";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_GRAPHQL_PATH: &str = "/graphql";
const DEFAULT_STORE_CODE: &str = "default";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROXY_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 300;
const DEFAULT_RETRY_FACTOR: u32 = 2;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RESPONSE_CACHE_TTL_SECS: u64 = 10_000;
const DEFAULT_RESPONSE_CACHE_CAPACITY: usize = 500;
const DEFAULT_STATIC_DIR: &str = "public";

/// Page type tags and the bundles rendered for them when `[views]` is absent.
const DEFAULT_VIEWS: &[(&str, &str)] = &[
    ("CATEGORY", "category"),
    ("CMS_PAGE", "cms-page"),
    ("PRODUCT", "product"),
];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub backend: BackendSettings,
    pub persistence: PersistenceSettings,
    pub retry: RetrySettings,
    pub response_cache: ResponseCacheSettings,
    pub shell: ShellSettings,
    pub views: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub origin: Url,
    pub graphql_url: Url,
    pub store_code: String,
    /// Store codes recognised as a leading path segment. Empty when store
    /// codes are not carried in URLs.
    pub url_store_codes: Vec<String>,
    pub timeout: Duration,
    pub proxy_max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub initial_delay: Duration,
    pub factor: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub max_delay: Option<Duration>,
    pub jitter: bool,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: self.initial_delay,
            factor: self.factor.get(),
            max_attempts: self.max_attempts.get(),
            max_delay: self.max_delay,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseCacheSettings {
    pub enabled: bool,
    pub ttl_secs: NonZeroU64,
    pub capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ShellSettings {
    pub index_path: Option<PathBuf>,
    pub static_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("VETRINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Resolve(args)) => raw.apply_backend_overrides(&args.backend),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    backend: RawBackendSettings,
    persistence: RawPersistenceSettings,
    retry: RawRetrySettings,
    response_cache: RawResponseCacheSettings,
    shell: RawShellSettings,
    views: Option<BTreeMap<String, String>>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_backend_overrides(&overrides.backend);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.response_cache_enabled {
            self.response_cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.response_cache_ttl_seconds {
            self.response_cache.ttl_seconds = Some(ttl);
        }
        if let Some(path) = overrides.shell_index_path.as_ref() {
            self.shell.index_path = Some(path.clone());
        }
        if let Some(dir) = overrides.shell_static_dir.as_ref() {
            self.shell.static_dir = Some(dir.clone());
        }
    }

    fn apply_backend_overrides(&mut self, overrides: &BackendOverrides) {
        if let Some(origin) = overrides.origin.as_ref() {
            self.backend.origin = Some(origin.clone());
        }
        if let Some(code) = overrides.store_code.as_ref() {
            self.backend.store_code = Some(code.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            backend,
            persistence,
            retry,
            response_cache,
            shell,
            views,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let backend = build_backend_settings(backend)?;
        let persistence = build_persistence_settings(persistence)?;
        let retry = build_retry_settings(retry)?;
        let response_cache = build_response_cache_settings(response_cache)?;
        let shell = build_shell_settings(shell);
        let views = build_views(views)?;

        Ok(Self {
            server,
            logging,
            backend,
            persistence,
            retry,
            response_cache,
            shell,
            views,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_backend_settings(backend: RawBackendSettings) -> Result<BackendSettings, LoadError> {
    let origin = backend
        .origin
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("backend.origin", "backend origin must be set"))?;
    let origin = Url::parse(&origin)
        .map_err(|err| LoadError::invalid("backend.origin", format!("invalid URL: {err}")))?;
    if !matches!(origin.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "backend.origin",
            "scheme must be http or https",
        ));
    }

    let graphql_path = backend
        .graphql_path
        .unwrap_or_else(|| DEFAULT_GRAPHQL_PATH.to_string());
    let graphql_url = origin
        .join(&graphql_path)
        .map_err(|err| LoadError::invalid("backend.graphql_path", err.to_string()))?;

    let store_code = backend
        .store_code
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_STORE_CODE.to_string());

    let url_store_codes = if backend.store_code_in_url.unwrap_or(false) {
        let mut codes = vec![store_code.clone()];
        for code in backend.store_codes.unwrap_or_default() {
            let code = code.trim().to_string();
            if code.is_empty() || code.contains(['/', '?', '#']) {
                return Err(LoadError::invalid(
                    "backend.store_codes",
                    format!("`{code}` is not a valid path segment"),
                ));
            }
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        codes
    } else {
        Vec::new()
    };

    let timeout_secs = backend
        .timeout_seconds
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "backend.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let proxy_max_body_bytes = NonZeroU64::new(
        backend
            .proxy_max_body_bytes
            .unwrap_or(DEFAULT_PROXY_MAX_BODY_BYTES),
    )
    .ok_or_else(|| LoadError::invalid("backend.proxy_max_body_bytes", "must be greater than zero"))?;

    Ok(BackendSettings {
        origin,
        graphql_url,
        store_code,
        url_store_codes,
        timeout: Duration::from_secs(timeout_secs),
        proxy_max_body_bytes,
    })
}

fn build_persistence_settings(
    persistence: RawPersistenceSettings,
) -> Result<PersistenceSettings, LoadError> {
    let namespace = persistence
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace.trim().is_empty() || namespace.contains(['=', ';', ' ']) {
        return Err(LoadError::invalid(
            "persistence.namespace",
            "namespace must be a non-empty cookie-safe token",
        ));
    }
    Ok(PersistenceSettings { namespace })
}

fn build_retry_settings(retry: RawRetrySettings) -> Result<RetrySettings, LoadError> {
    let initial_delay_ms = retry
        .initial_delay_ms
        .unwrap_or(DEFAULT_RETRY_INITIAL_DELAY_MS);
    let factor = non_zero_u32(
        u64::from(retry.factor.unwrap_or(DEFAULT_RETRY_FACTOR)),
        "retry.factor",
    )?;
    let max_attempts = non_zero_u32(
        u64::from(retry.max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS)),
        "retry.max_attempts",
    )?;
    let max_delay = match retry.max_delay_ms {
        Some(0) => {
            return Err(LoadError::invalid(
                "retry.max_delay_ms",
                "must be greater than zero when set",
            ));
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => None,
    };

    Ok(RetrySettings {
        initial_delay: Duration::from_millis(initial_delay_ms),
        factor,
        max_attempts,
        max_delay,
        jitter: retry.jitter.unwrap_or(true),
    })
}

fn build_response_cache_settings(
    cache: RawResponseCacheSettings,
) -> Result<ResponseCacheSettings, LoadError> {
    let ttl_secs = NonZeroU64::new(cache.ttl_seconds.unwrap_or(DEFAULT_RESPONSE_CACHE_TTL_SECS))
        .ok_or_else(|| {
            LoadError::invalid("response_cache.ttl_seconds", "must be greater than zero")
        })?;
    let capacity = NonZeroUsize::new(cache.capacity.unwrap_or(DEFAULT_RESPONSE_CACHE_CAPACITY))
        .ok_or_else(|| LoadError::invalid("response_cache.capacity", "must be greater than zero"))?;

    Ok(ResponseCacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        ttl_secs,
        capacity,
    })
}

fn build_shell_settings(shell: RawShellSettings) -> ShellSettings {
    ShellSettings {
        index_path: shell.index_path,
        static_dir: shell
            .static_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
    }
}

fn build_views(
    views: Option<BTreeMap<String, String>>,
) -> Result<BTreeMap<String, String>, LoadError> {
    let views = views.unwrap_or_else(|| {
        DEFAULT_VIEWS
            .iter()
            .map(|(tag, bundle)| (tag.to_string(), bundle.to_string()))
            .collect()
    });
    if let Some((tag, _)) = views.iter().find(|(_, bundle)| bundle.trim().is_empty()) {
        return Err(LoadError::invalid(
            "views",
            format!("bundle for `{tag}` must not be empty"),
        ));
    }
    // Sources may fold key case; page type tags are upper case on the wire.
    Ok(views
        .into_iter()
        .map(|(tag, bundle)| (tag.to_ascii_uppercase(), bundle))
        .collect())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBackendSettings {
    origin: Option<String>,
    graphql_path: Option<String>,
    store_code: Option<String>,
    store_code_in_url: Option<bool>,
    store_codes: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
    proxy_max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPersistenceSettings {
    namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetrySettings {
    initial_delay_ms: Option<u64>,
    factor: Option<u32>,
    max_attempts: Option<u32>,
    max_delay_ms: Option<u64>,
    jitter: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawResponseCacheSettings {
    enabled: Option<bool>,
    ttl_seconds: Option<u64>,
    capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawShellSettings {
    index_path: Option<PathBuf>,
    static_dir: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
