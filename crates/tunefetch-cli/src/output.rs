use serde::Serialize;
use serde_json::Value;
use tunefetch_core::ErrorPayload;

use crate::error::CliError;
use crate::metadata::Metadata;

/// Top-level JSON document printed for every command.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: Metadata,
    pub data: Value,
    pub errors: Vec<ErrorPayload>,
}

pub fn render(envelope: &Envelope, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    println!("{payload}");
    Ok(())
}
