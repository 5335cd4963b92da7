use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the Stampa binary.
#[derive(Debug, Parser)]
#[command(name = "stampa", version, about = "Stampa document and PDF server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public and admin HTTP services.
    Serve(Box<ServeArgs>),
    /// Evict a document's cached PDF and forget its stored artifact name.
    #[command(name = "reset-key")]
    ResetKey(ResetKeyArgs),
    /// Delete every cached PDF.
    #[command(name = "purge-cache")]
    PurgeCache(PurgeCacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheDirOverride {
    /// Override the PDF cache directory.
    #[arg(long = "pdf-cache-dir", value_name = "PATH")]
    pub pdf_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ResetKeyArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub cache: CacheDirOverride,

    /// Identifier of the document whose key is reset.
    #[arg(value_name = "DOCUMENT_ID")]
    pub document_id: Uuid,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PurgeCacheArgs {
    #[command(flatten)]
    pub cache: CacheDirOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PdfOverrides {
    #[command(flatten)]
    pub cache: CacheDirOverride,

    /// Toggle the PDF cache.
    #[arg(
        long = "pdf-cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub pdf_cache_enabled: Option<bool>,

    /// Toggle cookie forwarding on the loop-back fetch.
    #[arg(
        long = "pdf-forward-cookies",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub pdf_forward_cookies: Option<bool>,

    /// Toggle verbose pipeline diagnostics.
    #[arg(
        long = "pdf-debug",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub pdf_debug: Option<bool>,

    /// Override the paper size (a3|a4|a5|letter|legal|tabloid).
    #[arg(long = "pdf-paper-size", value_name = "SIZE")]
    pub pdf_paper_size: Option<String>,

    /// Override the page orientation (portrait|landscape).
    #[arg(long = "pdf-orientation", value_name = "ORIENTATION")]
    pub pdf_orientation: Option<String>,

    /// Override the HTML-to-PDF executable.
    #[arg(long = "pdf-engine-path", value_name = "PATH")]
    pub pdf_engine_path: Option<PathBuf>,

    /// Override the origin targeted by the loop-back fetch.
    #[arg(long = "pdf-loopback-base-url", value_name = "URL")]
    pub pdf_loopback_base_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub pdf: PdfOverrides,

    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the public site base URL.
    #[arg(long = "site-base-url", value_name = "URL")]
    pub site_base_url: Option<String>,
}
