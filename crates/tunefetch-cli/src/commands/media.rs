use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tunefetch_core::{
    ByteRange, CatalogService, MediaCache, MediaId, MediaState, ReqwestHttpClient, ServiceConfig,
};

use crate::cli::MediaArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct MediaResponseData {
    id: MediaId,
    status: u16,
    total_bytes: u64,
    served_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    cache: MediaState,
}

pub async fn run(
    args: &MediaArgs,
    catalog: &CatalogService,
    config: &ServiceConfig,
    http: Arc<ReqwestHttpClient>,
) -> Result<CommandResult, CliError> {
    let started = Instant::now();
    let id = MediaId::parse(&args.id)?;
    let range = args.range.as_deref().map(ByteRange::parse).transpose()?;

    let cache = MediaCache::new(config.media.clone(), Arc::new(catalog.media_origin()), http);
    let report = match cache.initialize().await {
        Ok(report) => report,
        Err(error) => return Ok(CommandResult::failed(&error)),
    };
    let was_cached = matches!(cache.state(&id).await, MediaState::Cached { .. });

    if args.refresh {
        if let Err(error) = cache.refresh(&id).await {
            return Ok(CommandResult::failed(&error));
        }
    }

    let body = match cache.serve(&id, range).await {
        Ok(body) => body,
        Err(error) => return Ok(CommandResult::failed(&error)),
    };

    if let Some(path) = &args.output {
        tokio::fs::write(path, &body.bytes).await?;
    }

    let data = MediaResponseData {
        status: body.status(),
        total_bytes: body.total,
        served_bytes: body.bytes.len(),
        content_range: body.content_range_header(),
        output: args.output.as_ref().map(|path| path.display().to_string()),
        cache: cache.state(&id).await,
        id,
    };

    let mut result = CommandResult::ok(serde_json::to_value(data)?)
        .with_latency(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
        .with_cache_hit(was_cached && !args.refresh);
    if report.swept_parts > 0 {
        result = result.with_warning(format!(
            "removed {} incomplete download(s) from a previous run",
            report.swept_parts
        ));
    }
    if report.expired > 0 {
        result = result.with_warning(format!(
            "deleted {} cached file(s) older than the media ttl",
            report.expired
        ));
    }
    if args.output.is_none() {
        result = result.with_warning("no --output given; bytes were served but not written");
    }
    Ok(result)
}
