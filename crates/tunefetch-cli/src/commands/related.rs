use tunefetch_core::{CacheMode, CatalogService, SongId};

use crate::cli::RelatedArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &RelatedArgs, catalog: &CatalogService, mode: CacheMode) -> Result<CommandResult, CliError> {
    let id = SongId::parse(&args.id)?;

    match catalog.related(&id, args.limit, mode).await {
        Ok(response) => CommandResult::from_response(response),
        Err(error) => Ok(CommandResult::failed(&error)),
    }
}
