//! JioSaavn api.php and mirror API adapter.

use serde_json::Value;
use tracing::debug;

use crate::domain::{DownloadLink, DownloadLinks, MediaId, Song, SongId, PLACEHOLDER_IMAGE};
use crate::error::ServiceError;
use crate::http_client::HttpRequest;
use crate::media::{MediaFuture, MediaOrigin, MediaSource};
use crate::orchestrator::{Endpoint, EndpointSet, FetchOrchestrator};
use crate::shape::{first_text, flag, non_empty_array, text, Extractors};

pub const DEFAULT_API_ENDPOINTS: [&str; 3] = [
    "https://www.jiosaavn.com/api.php",
    "https://jiosaavn.com/api.php",
    "https://saavn.me/api.php",
];

pub const DEFAULT_MIRRORS: [&str; 1] = ["https://saavn.dev/api"];

/// Headers api.php expects from a browser session.
pub const BROWSER_HEADERS: [(&str, &str); 7] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "en-US,en;q=0.9,hi;q=0.8"),
    ("Referer", "https://www.jiosaavn.com/"),
    ("Origin", "https://www.jiosaavn.com"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
];

const DEFAULT_LANGUAGE: &str = "hindi";
const PREVIEW_BITRATES: [u32; 3] = [96, 160, 320];

pub type QueryParams = Vec<(&'static str, String)>;

/// api.php variants that return one song's details, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongQuery {
    Details,
    WebApi,
    DetailsV4,
}

impl SongQuery {
    pub const ALL: [Self; 3] = [Self::Details, Self::WebApi, Self::DetailsV4];

    pub fn params(self, id: &SongId) -> QueryParams {
        let id = id.as_str().to_owned();
        match self {
            Self::Details => vec![
                ("__call", String::from("song.getDetails")),
                ("cc", String::from("in")),
                ("_marker", String::from("0")),
                ("_format", String::from("json")),
                ("pids", id),
            ],
            Self::WebApi => vec![
                ("__call", String::from("webapi.get")),
                ("token", id),
                ("type", String::from("song")),
                ("_format", String::from("json")),
                ("_marker", String::from("0")),
            ],
            Self::DetailsV4 => vec![
                ("__call", String::from("song.getDetails")),
                ("api_version", String::from("4")),
                ("_format", String::from("json")),
                ("_marker", String::from("0")),
                ("pids", id),
                ("includeMetaTags", String::from("1")),
                ("ctx", String::from("web6dot0")),
            ],
        }
    }
}

pub fn search_params(query: &str, page_size: usize) -> QueryParams {
    vec![
        ("__call", String::from("search.getResults")),
        ("api_version", String::from("4")),
        ("_format", String::from("json")),
        ("_marker", String::from("0")),
        ("query", query.to_owned()),
        ("p", String::from("1")),
        ("n", page_size.to_string()),
    ]
}

/// `language` trimmed, or the catalog default when blank.
pub fn language_or_default(language: &str) -> &str {
    match language.trim() {
        "" => DEFAULT_LANGUAGE,
        trimmed => trimmed,
    }
}

pub fn reco_params(seed: &SongId, language: &str) -> QueryParams {
    let language = language_or_default(language);
    vec![
        ("__call", String::from("reco.getreco")),
        ("api_version", String::from("4")),
        ("_format", String::from("json")),
        ("_marker", String::from("0")),
        ("pid", seed.as_str().to_owned()),
        ("language", language.to_owned()),
        ("n", String::from("50")),
    ]
}

pub fn reco_by_song_params(seed: &SongId) -> QueryParams {
    vec![
        ("__call", String::from("song.getRecoBySong")),
        ("api_version", String::from("4")),
        ("_format", String::from("json")),
        ("_marker", String::from("0")),
        ("pid", seed.as_str().to_owned()),
        ("n", String::from("50")),
    ]
}

/// api.php variants listing trending songs, in preference order. The launch
/// data feed is not language specific.
pub fn trending_queries(language: &str) -> [QueryParams; 2] {
    [
        vec![
            ("__call", String::from("content.getTrending")),
            ("api_version", String::from("4")),
            ("_format", String::from("json")),
            ("_marker", String::from("0")),
            ("ctx", String::from("web6dot0")),
            ("entity_type", String::from("song")),
            ("entity_language", language_or_default(language).to_owned()),
        ],
        vec![
            ("__call", String::from("webapi.getLaunchData")),
            ("api_version", String::from("4")),
            ("_format", String::from("json")),
            ("_marker", String::from("0")),
            ("ctx", String::from("web6dot0")),
        ],
    ]
}

/// GET `{endpoint}?{params}` with browser headers.
pub fn api_request(endpoint: &Endpoint, params: &[(&'static str, String)]) -> HttpRequest {
    params.iter().fold(
        HttpRequest::get(endpoint.as_str()).with_headers(BROWSER_HEADERS),
        |request, (name, value)| request.with_query(name, value),
    )
}

/// GET `{mirror}/songs/{id}`.
pub fn mirror_song_request(endpoint: &Endpoint, id: &SongId) -> HttpRequest {
    HttpRequest::get(endpoint.join(&format!("songs/{}", id.as_str())))
        .with_header("User-Agent", BROWSER_HEADERS[0].1)
}

/// Raw song object from a mirror body: `data` as an object or a one-element array.
pub fn mirror_song(body: &Value) -> Option<Value> {
    let data = body.get("data")?;
    let song = match data {
        Value::Array(items) => items.first()?,
        other => other,
    };
    text(song, "id").map(|_| song.clone())
}

/// Raw song object from the api.php detail shapes.
pub fn song_payload_extractors(id: &SongId) -> Extractors<Value> {
    let keyed = id.as_str().to_owned();
    Extractors::new()
        .with("keyed_by_id", move |body: &Value| {
            body.get(keyed.as_str()).and_then(accept_song)
        })
        .with("songs_list", |body: &Value| {
            body.get("songs").and_then(|songs| songs.get(0)).and_then(accept_song)
        })
        .with("bare_list", |body: &Value| body.get(0).and_then(accept_song))
        .with("data_list", |body: &Value| {
            body.get("data").and_then(|data| data.get(0)).and_then(accept_song)
        })
}

fn accept_song(candidate: &Value) -> Option<Value> {
    let recognizable = candidate.is_object()
        && (text(candidate, "id").is_some()
            || text(candidate, "song").is_some()
            || text(candidate, "title").is_some());
    recognizable.then(|| candidate.clone())
}

/// Song objects from a search response (`results.song.data`, `results.song` or `results`).
pub fn search_results(body: &Value) -> Option<Vec<Value>> {
    let results = body.get("results")?;
    let songs = match results.get("song") {
        Some(song) => song.get("data").filter(|data| data.is_array()).unwrap_or(song),
        None => results,
    };
    songs.as_array().cloned()
}

/// Suggestion lists from the four observed recommendation shapes. The seed
/// song is never part of the result.
pub fn suggestion_extractors(seed: &SongId) -> Extractors<Vec<Value>> {
    let keyed = seed.as_str().to_owned();
    let nested_seed = keyed.clone();
    let bare_seed = keyed.clone();
    let scan_seed = keyed.clone();

    Extractors::new()
        .with("keyed_by_seed", move |body: &Value| {
            body.get(keyed.as_str())
                .and_then(Value::as_array)
                .cloned()
        })
        .with("search_results", move |body: &Value| {
            body.get("results")
                .and_then(|results| results.get("song"))
                .and_then(|song| song.get("data").filter(|data| data.is_array()).or(Some(song)))
                .and_then(Value::as_array)
                .map(|items| excluding(items, &nested_seed))
        })
        .with("bare_list", move |body: &Value| {
            body.as_array().map(|items| excluding(items, &bare_seed))
        })
        .with("any_list", move |body: &Value| {
            body.as_object()?.values().find_map(|value| {
                let items = non_empty_array(value)?;
                let suggestions: Vec<Value> = excluding(items, &scan_seed)
                    .into_iter()
                    .filter(|item| text(item, "id").is_some())
                    .collect();
                (!suggestions.is_empty()).then_some(suggestions)
            })
        })
}

/// Trending song lists: a bare list, the launch feed's `new_trending`, or a
/// `data` list. Entries typed as anything but `song` are dropped.
pub fn trending_extractors() -> Extractors<Vec<Value>> {
    Extractors::new()
        .with("bare_list", |body: &Value| body.as_array().and_then(|items| songs_only(items)))
        .with("new_trending", |body: &Value| {
            body.get("new_trending")
                .and_then(Value::as_array)
                .and_then(|items| songs_only(items))
        })
        .with("data_list", |body: &Value| {
            body.get("data")
                .and_then(Value::as_array)
                .and_then(|items| songs_only(items))
        })
}

fn songs_only(items: &[Value]) -> Option<Vec<Value>> {
    let songs: Vec<Value> = items
        .iter()
        .filter(|item| text(item, "id").is_some())
        .filter(|item| text(item, "type").is_none_or(|kind| kind == "song"))
        .cloned()
        .collect();
    (!songs.is_empty()).then_some(songs)
}

fn excluding(items: &[Value], seed: &str) -> Vec<Value> {
    items
        .iter()
        .filter(|item| text(item, "id").as_deref() != Some(seed))
        .cloned()
        .collect()
}

/// Look up a key on the song object, then inside its `more_info` block.
fn field(raw: &Value, keys: &[&str]) -> Option<String> {
    first_text(raw, keys).or_else(|| raw.get("more_info").and_then(|info| first_text(info, keys)))
}

/// Mirror APIs return `image` as a list of renditions; the last is the largest.
fn image_url(raw: &Value) -> Option<String> {
    match raw.get("image") {
        Some(Value::Array(renditions)) => renditions
            .iter()
            .rev()
            .find_map(|rendition| first_text(rendition, &["url", "link"])),
        _ => field(raw, &["image", "media_preview_url"]),
    }
}

fn album_name(raw: &Value) -> Option<String> {
    match raw.get("album") {
        Some(album @ Value::Object(_)) => text(album, "name"),
        _ => field(raw, &["album", "album_name"]),
    }
}

/// Normalize any recognized song shape. `fallback_id` is used when the
/// object carries no usable id of its own.
pub fn normalize_song(raw: &Value, fallback_id: Option<&SongId>) -> Option<Song> {
    let id = text(raw, "id")
        .and_then(|id| SongId::parse(&id).ok())
        .or_else(|| fallback_id.cloned())?;

    Some(Song {
        id,
        title: first_text(raw, &["song", "name", "title"])
            .unwrap_or_else(|| String::from("Unknown Title")),
        primary_artists: field(raw, &["primary_artists", "primaryArtists", "subtitle"])
            .unwrap_or_default(),
        featured_artists: field(raw, &["featured_artists", "featuredArtists"]).unwrap_or_default(),
        album: album_name(raw).unwrap_or_else(|| String::from("Unknown Album")),
        year: field(raw, &["year", "release_date"]).unwrap_or_else(|| String::from("2023")),
        duration: field(raw, &["duration"]).unwrap_or_else(|| String::from("0")),
        language: field(raw, &["language"]).unwrap_or_else(|| String::from(DEFAULT_LANGUAGE)),
        image: image_url(raw).unwrap_or_else(|| String::from(PLACEHOLDER_IMAGE)),
        perma_url: field(raw, &["perma_url", "permaUrl", "url"]).unwrap_or_default(),
        play_count: field(raw, &["play_count", "playCount"]).unwrap_or_else(|| String::from("0")),
        has_lyrics: flag(raw, &["has_lyrics", "hasLyrics"])
            || raw
                .get("more_info")
                .is_some_and(|info| flag(info, &["has_lyrics", "hasLyrics"])),
        media_preview_url: field(raw, &["media_preview_url", "vlink"]),
    })
}

/// Download links from `downloadUrl`/`download_url`, or derived from the
/// 96kbps preview URL when only that is present.
pub fn download_links(raw: &Value) -> DownloadLinks {
    let listed = ["downloadUrl", "download_url"]
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| {
            Some(DownloadLink {
                quality: text(entry, "quality")?,
                url: first_text(entry, &["url", "link"])?,
            })
        })
        .collect::<Vec<_>>();
    if !listed.is_empty() {
        return DownloadLinks::new(listed);
    }

    let Some(preview) = field(raw, &["media_preview_url", "vlink"]) else {
        return DownloadLinks::default();
    };
    if !preview.contains("_96_p.") {
        return DownloadLinks::default();
    }

    let base = preview.replace("preview.saavncdn.com", "aac.saavncdn.com");
    let links = PREVIEW_BITRATES
        .iter()
        .map(|kbps| DownloadLink {
            quality: format!("{kbps}kbps"),
            url: base.replace("_96_p.", &format!("_{kbps}.")),
        })
        .collect();
    DownloadLinks::new(links)
}

/// Resolves media ids to the highest-bitrate download link of the song.
#[derive(Clone)]
pub struct SaavnMediaOrigin {
    orchestrator: FetchOrchestrator,
    mirrors: EndpointSet,
    api_endpoints: EndpointSet,
}

impl SaavnMediaOrigin {
    pub fn new(orchestrator: FetchOrchestrator, mirrors: EndpointSet, api_endpoints: EndpointSet) -> Self {
        Self {
            orchestrator,
            mirrors,
            api_endpoints,
        }
    }

    /// Download links for one song, trying the mirrors first.
    pub async fn links_for(&self, id: &SongId) -> Result<DownloadLinks, ServiceError> {
        let mirrored = self
            .orchestrator
            .fetch(
                &self.mirrors,
                |endpoint| mirror_song_request(endpoint, id),
                |body| mirror_song(body).map(|raw| download_links(&raw)).filter(|links| !links.is_empty()),
            )
            .await;
        let mut attempts = match mirrored {
            Ok(success) => return Ok(success.payload),
            Err(failure) => failure.attempts,
        };

        let extractors = song_payload_extractors(id);
        for query in SongQuery::ALL {
            let params = query.params(id);
            let fetched = self
                .orchestrator
                .fetch(
                    &self.api_endpoints,
                    |endpoint| api_request(endpoint, &params),
                    |body| {
                        extractors
                            .first_match(body)
                            .map(|raw| download_links(&raw))
                            .filter(|links| !links.is_empty())
                    },
                )
                .await;
            match fetched {
                Ok(success) => return Ok(success.payload),
                Err(failure) => attempts.extend(failure.attempts),
            }
        }

        Err(ServiceError::upstream_unavailable(
            format!("no download links found for song '{id}'"),
            attempts,
        ))
    }
}

impl MediaOrigin for SaavnMediaOrigin {
    fn resolve<'a>(&'a self, id: &'a MediaId) -> MediaFuture<'a, MediaSource> {
        Box::pin(async move {
            let song_id = SongId::from(id);
            let links = self.links_for(&song_id).await.map_err(|error| {
                ServiceError::download_failed(format!("could not resolve media for '{id}': {}", error.message()))
            })?;
            let best = links.best().ok_or_else(|| {
                ServiceError::download_failed(format!("song '{id}' has no downloadable rendition"))
            })?;
            debug!(media_id = %id, quality = %best.quality, "media origin resolved");
            Ok(MediaSource::new(best.url.clone()))
        })
    }
}
