use thiserror::Error;
use tunefetch_core::ServiceErrorKind;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tunefetch_core::ValidationError),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::StrictModeViolation { .. } => 5,
            Self::Logging(_) => 6,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

/// Exit code for a command that completed with an error payload.
pub const fn exit_code_for(kind: ServiceErrorKind) -> u8 {
    match kind {
        ServiceErrorKind::InvalidInput | ServiceErrorKind::RangeUnsatisfiable => 2,
        ServiceErrorKind::NotFound => 7,
        ServiceErrorKind::UpstreamUnavailable | ServiceErrorKind::DownloadFailed => 3,
    }
}
