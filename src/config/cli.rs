use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the vetrina binary.
#[derive(Debug, Parser)]
#[command(name = "vetrina", version, about = "Vetrina storefront render server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VETRINA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the storefront HTTP server.
    Serve(Box<ServeArgs>),
    /// Resolve one URL against the backend and print the outcome as JSON.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BackendOverrides {
    /// Override the backend origin that serves GraphQL, REST and media.
    #[arg(long = "backend-origin", value_name = "URL", value_hint = ValueHint::Url)]
    pub origin: Option<String>,

    /// Override the store code used for visitors without a stored choice.
    #[arg(long = "backend-store-code", value_name = "CODE")]
    pub store_code: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub backend: BackendOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the rendered-page cache.
    #[arg(
        long = "response-cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub response_cache_enabled: Option<bool>,

    /// Override the rendered-page time to live.
    #[arg(long = "response-cache-ttl-seconds", value_name = "SECONDS")]
    pub response_cache_ttl_seconds: Option<u64>,

    /// Override the document shell template.
    #[arg(long = "shell-index-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub shell_index_path: Option<PathBuf>,

    /// Override the directory static files are served from.
    #[arg(long = "shell-static-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub shell_static_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub backend: BackendOverrides,

    /// Storefront URL or pathname to resolve.
    #[arg(value_name = "URL")]
    pub url: String,
}
