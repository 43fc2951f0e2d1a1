use tunefetch_core::{CacheMode, CatalogService};

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &SearchArgs, catalog: &CatalogService, mode: CacheMode) -> Result<CommandResult, CliError> {
    match catalog.search(&args.query, args.limit, mode).await {
        Ok(response) => CommandResult::from_response(response),
        Err(error) => Ok(CommandResult::failed(&error)),
    }
}
