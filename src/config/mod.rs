//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CacheDirOverride, CliArgs, Command, DatabaseOverride, PdfOverrides, PurgeCacheArgs,
    ResetKeyArgs, ServeArgs, ServeOverrides,
};

use std::{
    collections::BTreeSet, net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    application::pdf::CookiePolicy,
    domain::types::{Orientation, PaperConfig, PaperSize},
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const ENV_PREFIX: &str = "STAMPA";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SITE_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_PDF_CACHE_DIR: &str = "pdf-cache";
const DEFAULT_PDF_ENGINE_PATH: &str = "wkhtmltopdf";
const DEFAULT_PDF_ELIGIBLE_TYPES: [&str; 2] = ["post", "page"];
const DEFAULT_PDF_RENDER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PDF_FETCH_TIMEOUT_SECS: u64 = 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub site: SiteSettings,
    pub pdf: PdfSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct PdfSettings {
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub forward_cookies: bool,
    pub debug: bool,
    pub paper: PaperConfig,
    pub eligible_types: BTreeSet<String>,
    pub engine_path: PathBuf,
    pub render_timeout: Duration,
    pub fetch_timeout: Duration,
    pub loopback_base_url: Url,
    pub cookies: CookiePolicy,
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

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("pdf.eligible_types"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::ResetKey(args)) => {
            raw.apply_database_override(&args.database);
            raw.apply_cache_dir_override(&args.cache);
        }
        Some(Command::PurgeCache(args)) => raw.apply_cache_dir_override(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    site: RawSiteSettings,
    pdf: RawPdfSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.site_base_url.as_ref() {
            self.site.base_url = Some(url.clone());
        }

        self.apply_pdf_overrides(&overrides.pdf);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_cache_dir_override(&mut self, overrides: &CacheDirOverride) {
        if let Some(dir) = overrides.pdf_cache_dir.as_ref() {
            self.pdf.cache_dir = Some(dir.clone());
        }
    }

    fn apply_pdf_overrides(&mut self, overrides: &PdfOverrides) {
        self.apply_cache_dir_override(&overrides.cache);
        if let Some(enabled) = overrides.pdf_cache_enabled {
            self.pdf.cache_enabled = Some(enabled);
        }
        if let Some(forward) = overrides.pdf_forward_cookies {
            self.pdf.forward_cookies = Some(forward);
        }
        if let Some(debug) = overrides.pdf_debug {
            self.pdf.debug = Some(debug);
        }
        if let Some(size) = overrides.pdf_paper_size.as_ref() {
            self.pdf.paper_size = Some(size.clone());
        }
        if let Some(orientation) = overrides.pdf_orientation.as_ref() {
            self.pdf.orientation = Some(orientation.clone());
        }
        if let Some(path) = overrides.pdf_engine_path.as_ref() {
            self.pdf.engine_path = Some(path.clone());
        }
        if let Some(url) = overrides.pdf_loopback_base_url.as_ref() {
            self.pdf.loopback_base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            site,
            pdf,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let site = build_site_settings(site)?;
        let pdf = build_pdf_settings(pdf, &site)?;

        Ok(Self {
            server,
            logging,
            database,
            site,
            pdf,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

    Ok(ServerSettings {
        public_addr,
        admin_addr,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let raw = site
        .base_url
        .unwrap_or_else(|| DEFAULT_SITE_BASE_URL.to_string());
    let base_url = parse_http_url(&raw, "site.base_url")?;
    Ok(SiteSettings { base_url })
}

fn build_pdf_settings(pdf: RawPdfSettings, site: &SiteSettings) -> Result<PdfSettings, LoadError> {
    let cache_dir = pdf
        .cache_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PDF_CACHE_DIR));
    if cache_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("pdf.cache_dir", "path must not be empty"));
    }

    let engine_path = pdf
        .engine_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PDF_ENGINE_PATH));
    if engine_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "pdf.engine_path",
            "path must not be empty",
        ));
    }

    let size = match pdf.paper_size {
        Some(value) => PaperSize::from_str(&value)
            .map_err(|err| LoadError::invalid("pdf.paper_size", err.to_string()))?,
        None => PaperSize::default(),
    };
    let orientation = match pdf.orientation {
        Some(value) => Orientation::from_str(&value)
            .map_err(|err| LoadError::invalid("pdf.orientation", err.to_string()))?,
        None => Orientation::default(),
    };

    let eligible_types: BTreeSet<String> = match pdf.eligible_types {
        Some(kinds) => kinds
            .into_iter()
            .map(|kind| kind.trim().to_string())
            .filter(|kind| !kind.is_empty())
            .collect(),
        None => DEFAULT_PDF_ELIGIBLE_TYPES
            .iter()
            .map(|kind| kind.to_string())
            .collect(),
    };
    if eligible_types.is_empty() {
        return Err(LoadError::invalid(
            "pdf.eligible_types",
            "at least one document kind is required",
        ));
    }

    let render_timeout = non_zero_seconds(
        pdf.render_timeout_seconds
            .unwrap_or(DEFAULT_PDF_RENDER_TIMEOUT_SECS),
        "pdf.render_timeout_seconds",
    )?;
    let fetch_timeout = non_zero_seconds(
        pdf.fetch_timeout_seconds
            .unwrap_or(DEFAULT_PDF_FETCH_TIMEOUT_SECS),
        "pdf.fetch_timeout_seconds",
    )?;

    let loopback_base_url = match pdf.loopback_base_url {
        Some(value) => parse_http_url(&value, "pdf.loopback_base_url")?,
        None => site.base_url.clone(),
    };

    let mut cookies = CookiePolicy::default();
    if let Some(marker) = pdf.session_cookie_marker {
        if marker.trim().is_empty() {
            return Err(LoadError::invalid(
                "pdf.session_cookie_marker",
                "marker must not be empty",
            ));
        }
        cookies.session_marker = marker;
    }
    if let Some(name) = pdf.locale_cookie {
        cookies.locale_cookie = name;
    }
    if let Some(pair) = pdf.test_cookie {
        if !pair.is_empty() && !pair.contains('=') {
            return Err(LoadError::invalid(
                "pdf.test_cookie",
                "expected a `name=value` pair",
            ));
        }
        cookies.test_cookie = pair;
    }

    Ok(PdfSettings {
        cache_enabled: pdf.cache_enabled.unwrap_or(true),
        cache_dir,
        forward_cookies: pdf.forward_cookies.unwrap_or(false),
        debug: pdf.debug.unwrap_or(false),
        paper: PaperConfig { size, orientation },
        eligible_types,
        engine_path,
        render_timeout,
        fetch_timeout,
        loopback_base_url,
        cookies,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPdfSettings {
    cache_enabled: Option<bool>,
    cache_dir: Option<PathBuf>,
    forward_cookies: Option<bool>,
    debug: Option<bool>,
    paper_size: Option<String>,
    orientation: Option<String>,
    eligible_types: Option<Vec<String>>,
    engine_path: Option<PathBuf>,
    render_timeout_seconds: Option<u64>,
    fetch_timeout_seconds: Option<u64>,
    loopback_base_url: Option<String>,
    session_cookie_marker: Option<String>,
    locale_cookie: Option<String>,
    test_cookie: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "scheme must be http or https"));
    }
    Ok(url)
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

fn non_zero_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}
