mod media;
mod related;
mod search;
mod song;
mod trending;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use tunefetch_core::{
    CacheMode, CatalogResponse, CatalogService, ErrorPayload, ReqwestHttpClient, ServiceConfig, ServiceError,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;
use crate::output::Envelope;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<ErrorPayload>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub source_endpoint: Option<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
            source_endpoint: None,
        }
    }

    pub fn from_response<T>(response: CatalogResponse<T>) -> Result<Self, CliError>
    where
        T: serde::Serialize,
    {
        Ok(Self {
            data: serde_json::to_value(&response.data)?,
            warnings: response.warnings,
            errors: Vec::new(),
            latency_ms: response.latency_ms,
            cache_hit: response.cache_hit,
            source_endpoint: response
                .source_endpoint
                .map(|endpoint| endpoint.as_str().to_owned()),
        })
    }

    /// A failed lookup still produces an envelope; the error goes in `errors`.
    pub fn failed(error: &ServiceError) -> Self {
        Self {
            errors: vec![error.to_payload()],
            ..Self::ok(Value::Null)
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let config = build_config(cli)?;
    let http = Arc::new(ReqwestHttpClient::new());
    let catalog = CatalogService::new(&config, http.clone())?;
    let mode: CacheMode = cli.cache.into();
    debug!(mode = ?mode, media_dir = %config.media.directory.display(), "catalog ready");

    let command_result = match &cli.command {
        Command::Song(args) => song::run(args, &catalog, mode).await?,
        Command::Related(args) => related::run(args, &catalog, mode).await?,
        Command::Search(args) => search::run(args, &catalog, mode).await?,
        Command::Trending(args) => trending::run(args, &catalog, mode).await?,
        Command::Media(args) => media::run(args, &catalog, &config, http).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        cache_hit,
        source_endpoint,
    } = command_result;

    let mut meta = Metadata::new(source_endpoint, latency_ms, cache_hit);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope { meta, data, errors })
}

/// Environment first, then command-line overrides.
fn build_config(cli: &Cli) -> Result<ServiceConfig, CliError> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(timeout_ms) = cli.timeout_ms.filter(|ms| *ms > 0) {
        config.retry = config
            .retry
            .with_base_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(directory) = &cli.media_dir {
        config.media.directory = directory.clone();
    }
    Ok(config)
}
