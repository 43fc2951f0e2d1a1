use tunefetch_core::{CacheMode, CatalogService, SongId};

use crate::cli::SongArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(args: &SongArgs, catalog: &CatalogService, mode: CacheMode) -> Result<CommandResult, CliError> {
    let id = SongId::parse(&args.id)?;

    match catalog.song_details(&id, mode).await {
        Ok(response) => CommandResult::from_response(response),
        Err(error) => Ok(CommandResult::failed(&error)),
    }
}
