//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use nucache_records::ItemKind;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::error::parse_item_kind;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "nucache";
const DEFAULT_ROUTE_CACHE_LIMIT: usize = 10_000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 1_000;

/// Command-line arguments for the NuCache inspection binary.
#[derive(Debug, Parser)]
#[command(
    name = "nucache",
    version,
    about = "Load a seed file into a published-content snapshot and query it"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "NUCACHE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print one item as JSON.
    Get(GetArgs),
    /// Resolve a route to an item.
    Route(RouteArgs),
    /// Print the item tree.
    Tree(TreeArgs),
    /// Print generation and cache statistics.
    Stats(StatsArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    /// JSON seed file with content types, items and domains.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub seed: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    /// Item id.
    #[arg(allow_negative_numbers = true)]
    pub id: i32,

    /// Item kind (content|media|member).
    #[arg(long, value_name = "KIND", default_value = "content", value_parser = parse_kind)]
    pub kind: ItemKind,

    /// Read drafts instead of published versions.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub preview: bool,

    /// Culture for names and culture-variant property values.
    #[arg(long, value_name = "CULTURE")]
    pub culture: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RouteArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    /// Route such as `/about/team` or `1172/contact`.
    pub route: String,

    /// Read drafts instead of published versions.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub preview: bool,
}

#[derive(Debug, Args, Clone)]
pub struct TreeArgs {
    #[command(flatten)]
    pub seed: SeedArgs,

    /// Item kind (content|media|member).
    #[arg(long, value_name = "KIND", default_value = "content", value_parser = parse_kind)]
    pub kind: ItemKind,

    /// Read drafts instead of published versions.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub preview: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    pub seed: SeedArgs,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override whether the top-level node's segment is omitted from routes.
    #[arg(
        long = "hide-top-level-node",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub hide_top_level_node: Option<bool>,

    /// Override the route cache capacity per preview flag.
    #[arg(long = "route-cache-limit", value_name = "COUNT", global = true)]
    pub route_cache_limit: Option<usize>,
}

fn parse_kind(value: &str) -> Result<ItemKind, String> {
    parse_item_kind(value).map_err(|err| err.to_string())
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
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
pub struct CacheSettings {
    pub route_cache_limit: NonZeroUsize,
    pub hide_top_level_node: bool,
    pub full_cache_when_previewing: bool,
    pub members_use_snapshot_cache: bool,
    pub consume_batch_limit: NonZeroUsize,
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

    builder = builder.add_source(Environment::with_prefix("NUCACHE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(hide) = overrides.hide_top_level_node {
            self.cache.hide_top_level_node = Some(hide);
        }
        if let Some(limit) = overrides.route_cache_limit {
            self.cache.route_cache_limit = Some(limit);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let route_cache_limit = non_zero_usize(
        cache.route_cache_limit.unwrap_or(DEFAULT_ROUTE_CACHE_LIMIT),
        "cache.route_cache_limit",
    )?;
    let consume_batch_limit = non_zero_usize(
        cache
            .consume_batch_limit
            .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT),
        "cache.consume_batch_limit",
    )?;

    Ok(CacheSettings {
        route_cache_limit,
        hide_top_level_node: cache.hide_top_level_node.unwrap_or(true),
        full_cache_when_previewing: cache.full_cache_when_previewing.unwrap_or(false),
        members_use_snapshot_cache: cache.members_use_snapshot_cache.unwrap_or(true),
        consume_batch_limit,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    route_cache_limit: Option<usize>,
    hide_top_level_node: Option<bool>,
    full_cache_when_previewing: Option<bool>,
    members_use_snapshot_cache: Option<bool>,
    consume_batch_limit: Option<usize>,
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
