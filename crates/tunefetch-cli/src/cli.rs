//! CLI argument definitions for tunefetch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `song` | Song details by id |
//! | `related` | Related songs with download links |
//! | `search` | Search songs |
//! | `trending` | Trending songs with download links |
//! | `media` | Download (or reuse) a song's audio and serve bytes |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--cache` | `use` | Metadata cache mode |
//! | `--timeout-ms` | env / `3000` | First attempt timeout |
//! | `--media-dir` | env / temp dir | Media cache directory |
//! | `--verbose` | `false` | Debug logging on stderr |
//! | `--log-format` | `pretty` | Log format (pretty, json) |
//!
//! # Examples
//!
//! ```bash
//! tunefetch song 3IoDK8qI --pretty
//! tunefetch related 3IoDK8qI --limit 5
//! tunefetch trending --language punjabi
//! tunefetch media 3IoDK8qI --range bytes=0-1023 --output head.mp4
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tunefetch_core::CacheMode;

/// Resilient music metadata and media fetcher
#[derive(Debug, Parser)]
#[command(name = "tunefetch", author, version, about = "Resilient music metadata and media fetcher")]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// How metadata lookups use the in-process cache.
    #[arg(long, global = true, value_enum, default_value_t = CacheSelector::Use)]
    pub cache: CacheSelector,

    /// Timeout of the first attempt per endpoint, in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Directory holding cached media files.
    #[arg(long, global = true)]
    pub media_dir: Option<PathBuf>,

    /// Emit debug logs on stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheSelector {
    /// Serve fresh cached entries, fetch and store otherwise.
    Use,
    /// Always fetch, then store.
    Refresh,
    /// Always fetch, never store.
    Bypass,
}

impl From<CacheSelector> for CacheMode {
    fn from(value: CacheSelector) -> Self {
        match value {
            CacheSelector::Use => Self::Use,
            CacheSelector::Refresh => Self::Refresh,
            CacheSelector::Bypass => Self::Bypass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch details for one song.
    Song(SongArgs),
    /// Fetch songs related to a song, with download links.
    Related(RelatedArgs),
    /// Search songs by free text.
    Search(SearchArgs),
    /// Fetch trending songs for a language, with download links.
    Trending(TrendingArgs),
    /// Cache a song's audio on disk and serve it, optionally as a byte range.
    Media(MediaArgs),
}

#[derive(Debug, Args)]
pub struct SongArgs {
    /// Upstream song id.
    pub id: String,
}

#[derive(Debug, Args)]
pub struct RelatedArgs {
    /// Seed song id.
    pub id: String,

    /// Maximum number of related songs.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Search text.
    pub query: String,

    /// Maximum number of results.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct TrendingArgs {
    /// Catalog language, e.g. `hindi` or `punjabi`.
    #[arg(long, default_value = "hindi")]
    pub language: String,

    /// Maximum number of songs.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct MediaArgs {
    /// Song id whose audio is served.
    pub id: String,

    /// Byte range, e.g. `bytes=0-1023`, `bytes=500-` or `bytes=-200`.
    #[arg(long)]
    pub range: Option<String>,

    /// Write the served bytes to this file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Re-download even if a cached copy exists.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}
