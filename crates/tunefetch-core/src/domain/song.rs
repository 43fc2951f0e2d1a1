use serde::{Deserialize, Serialize};

use crate::domain::SongId;

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/500x500.png?text=No+Image";

/// Canonical song metadata, independent of the upstream shape it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub primary_artists: String,
    #[serde(default)]
    pub featured_artists: String,
    pub album: String,
    pub year: String,
    pub duration: String,
    pub language: String,
    pub image: String,
    #[serde(default)]
    pub perma_url: String,
    pub play_count: String,
    pub has_lyrics: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_preview_url: Option<String>,
}

impl Song {
    /// Query used to find songs by the same artists, falling back to the title.
    pub fn artist_query(&self) -> &str {
        if self.primary_artists.trim().is_empty() {
            &self.title
        } else {
            &self.primary_artists
        }
    }
}

/// One downloadable rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub quality: String,
    pub url: String,
}

impl DownloadLink {
    /// Bitrate in kbps parsed from labels like `320kbps` or `160`.
    pub fn kbps(&self) -> u32 {
        self.quality
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0)
    }
}

/// Download links attached to a song by enrichment. Empty is the placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLinks {
    pub download_links: Vec<DownloadLink>,
}

impl DownloadLinks {
    pub fn new(mut links: Vec<DownloadLink>) -> Self {
        links.sort_by_key(DownloadLink::kbps);
        links.dedup_by(|left, right| left.url == right.url);
        Self {
            download_links: links,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.download_links.is_empty()
    }

    /// Highest-bitrate link.
    pub fn best(&self) -> Option<&DownloadLink> {
        self.download_links.iter().max_by_key(|link| link.kbps())
    }
}
