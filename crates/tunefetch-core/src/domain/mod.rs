//! # Domain Models
//!
//! Canonical types shared by the catalog, orchestrator and media cache.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SongId`] | Validated upstream song identifier |
//! | [`MediaId`] | Filesystem-safe media cache key |
//! | [`Song`] | Normalized song metadata |
//! | [`DownloadLinks`] | Per-quality media links attached by enrichment |
//! | [`UtcDateTime`] | UTC timestamp |

mod ids;
mod song;
mod timestamp;

pub use ids::{MediaId, SongId};
pub use song::{DownloadLink, DownloadLinks, Song, PLACEHOLDER_IMAGE};
pub use timestamp::UtcDateTime;
