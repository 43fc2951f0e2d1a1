use tunefetch_core::{CacheMode, CatalogService};

use crate::cli::TrendingArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &TrendingArgs, catalog: &CatalogService, mode: CacheMode) -> Result<CommandResult, CliError> {
    match catalog.trending(&args.language, args.limit, mode).await {
        Ok(response) => CommandResult::from_response(response),
        Err(error) => Ok(CommandResult::failed(&error)),
    }
}
