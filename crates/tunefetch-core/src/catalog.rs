//! Song metadata service: cache first, orchestrated upstream fallback, normalization.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::adapters::saavn::{
    self, api_request, language_or_default, mirror_song, mirror_song_request, normalize_song,
    reco_by_song_params, reco_params, search_params, song_payload_extractors,
    suggestion_extractors, trending_extractors, trending_queries, QueryParams, SaavnMediaOrigin,
    SongQuery,
};
use crate::cache::{CacheMode, TtlCache};
use crate::config::ServiceConfig;
use crate::domain::{DownloadLinks, Song, SongId};
use crate::error::{ServiceError, ValidationError};
use crate::fanout::{Enriched, EnrichmentFanout};
use crate::http_client::HttpClient;
use crate::orchestrator::{
    elapsed_ms, AttemptRecord, Endpoint, EndpointSet, FetchOrchestrator, FetchSuccess,
};
use crate::throttling::UpstreamThrottle;

/// Target number of related songs gathered before the recommendation chain stops.
pub const RELATED_TARGET: usize = 20;
const BACKUP_SEARCH_SIZE: usize = 30;

pub type RelatedSong = Enriched<Song, DownloadLinks>;

/// Catalog answer plus the provenance the CLI reports.
#[derive(Debug, Clone)]
pub struct CatalogResponse<T> {
    pub data: T,
    /// `None` when served from cache.
    pub source_endpoint: Option<Endpoint>,
    pub cache_hit: bool,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

impl<T> CatalogResponse<T> {
    fn cached(data: T, started: Instant) -> Self {
        Self {
            data,
            source_endpoint: None,
            cache_hit: true,
            warnings: Vec::new(),
            latency_ms: elapsed_ms(started),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CatalogResponse<U> {
        CatalogResponse {
            data: f(self.data),
            source_endpoint: self.source_endpoint,
            cache_hit: self.cache_hit,
            warnings: self.warnings,
            latency_ms: self.latency_ms,
        }
    }
}

/// Owns the metadata caches and runs the upstream fallback chains.
#[derive(Clone)]
pub struct CatalogService {
    orchestrator: FetchOrchestrator,
    mirrors: EndpointSet,
    api_endpoints: EndpointSet,
    songs: TtlCache<SongId, Song>,
    related: TtlCache<SongId, Vec<RelatedSong>>,
    searches: TtlCache<String, Vec<Song>>,
    trending: TtlCache<String, Vec<RelatedSong>>,
    fanout: EnrichmentFanout,
    links: SaavnMediaOrigin,
}

impl CatalogService {
    pub fn new(config: &ServiceConfig, http: Arc<dyn HttpClient>) -> Result<Self, ValidationError> {
        let mut orchestrator = FetchOrchestrator::new(http, config.retry);
        if let Some(quota) = config.upstream_quota {
            orchestrator = orchestrator.with_throttle(UpstreamThrottle::per_minute(quota));
        }
        let mirrors = config.mirror_set()?;
        let api_endpoints = config.api_endpoint_set()?;

        Ok(Self {
            links: SaavnMediaOrigin::new(orchestrator.clone(), mirrors.clone(), api_endpoints.clone()),
            orchestrator,
            mirrors,
            api_endpoints,
            songs: TtlCache::new(config.metadata_ttl),
            related: TtlCache::new(config.metadata_ttl),
            searches: TtlCache::new(config.metadata_ttl),
            trending: TtlCache::new(config.metadata_ttl),
            fanout: EnrichmentFanout::new().with_timeout(config.enrichment_timeout),
        })
    }

    /// Media origin sharing this catalog's orchestrator and endpoints.
    pub fn media_origin(&self) -> SaavnMediaOrigin {
        self.links.clone()
    }

    /// Song details: mirrors, then api.php detail variants, then a search by id.
    #[instrument(skip_all, fields(song_id = %id, mode = ?mode))]
    pub async fn song_details(&self, id: &SongId, mode: CacheMode) -> Result<CatalogResponse<Song>, ServiceError> {
        let started = Instant::now();
        if mode.reads() {
            if let Some(song) = self.songs.get(id).await {
                debug!("song cache hit");
                return Ok(CatalogResponse::cached(song, started));
            }
        }

        let mut attempts = Vec::new();

        let mirrored = self
            .orchestrator
            .fetch(
                &self.mirrors,
                |endpoint| mirror_song_request(endpoint, id),
                |body| mirror_song(body).and_then(|raw| normalize_song(&raw, Some(id))),
            )
            .await;
        let found = match mirrored {
            Ok(success) => Some(success),
            Err(failure) => {
                attempts.extend(failure.attempts);
                None
            }
        };

        let found = match found {
            Some(found) => Some(found),
            None => self.song_from_detail_queries(id, &mut attempts).await,
        };

        let found = match found {
            Some(found) => found,
            None => self.song_from_search(id, &mut attempts).await?,
        };

        let response = respond(found, attempts, started);
        if mode.writes() {
            self.songs.set(id.clone(), response.data.clone()).await;
        }
        info!(source = ?response.source_endpoint.as_ref().map(Endpoint::as_str), "song details resolved");
        Ok(response)
    }

    async fn song_from_detail_queries(
        &self,
        id: &SongId,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Option<FetchSuccess<Song>> {
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
                            .and_then(|raw| normalize_song(&raw, Some(id)))
                    },
                )
                .await;
            match fetched {
                Ok(success) => return Some(success),
                Err(failure) => attempts.extend(failure.attempts),
            }
        }
        None
    }

    async fn song_from_search(
        &self,
        id: &SongId,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<FetchSuccess<Song>, ServiceError> {
        let params = search_params(id.as_str(), 1);
        match self.fetch_api(&params, saavn::search_results).await {
            Ok(success) => {
                let song = success
                    .payload
                    .first()
                    .and_then(|raw| normalize_song(raw, Some(id)))
                    .ok_or_else(|| ServiceError::not_found(format!("song '{id}' was not found")))?;
                Ok(FetchSuccess {
                    payload: song,
                    source_endpoint: success.source_endpoint,
                    attempts: success.attempts,
                    latency_ms: success.latency_ms,
                })
            }
            Err(failure) => {
                attempts.extend(failure.attempts);
                Err(ServiceError::upstream_unavailable(
                    format!("unable to fetch song '{id}' from any source"),
                    std::mem::take(attempts),
                ))
            }
        }
    }

    /// Songs related to `id`, each enriched with its download links.
    ///
    /// Recommendation variants are tried until [`RELATED_TARGET`] songs are
    /// gathered; a broader artist search runs only when nothing was found.
    #[instrument(skip_all, fields(song_id = %id, limit = limit))]
    pub async fn related(
        &self,
        id: &SongId,
        limit: usize,
        mode: CacheMode,
    ) -> Result<CatalogResponse<Vec<RelatedSong>>, ServiceError> {
        if limit == 0 {
            return Err(ValidationError::ZeroLimit.into());
        }
        let started = Instant::now();
        if mode.reads() {
            if let Some(mut related) = self.related.get(id).await {
                debug!("related cache hit");
                related.truncate(limit);
                return Ok(CatalogResponse::cached(related, started));
            }
        }

        let seed = self.song_details(id, mode).await?.data;
        let mut gathered: Vec<Song> = Vec::new();
        let mut attempts = Vec::new();
        let mut warnings = Vec::new();
        let mut source_endpoint = None;
        let mut any_valid = false;

        let queries: [QueryParams; 3] = [
            reco_params(id, &seed.language),
            reco_by_song_params(id),
            search_params(seed.artist_query(), RELATED_TARGET),
        ];
        let extractors = suggestion_extractors(id);

        for params in &queries {
            if gathered.len() >= RELATED_TARGET {
                break;
            }
            match self.fetch_api(params, |body| extractors.first_match(body)).await {
                Ok(success) => {
                    any_valid = true;
                    source_endpoint.get_or_insert(success.source_endpoint);
                    gathered.extend(success.payload.iter().filter_map(|raw| normalize_song(raw, None)));
                    debug!(total = gathered.len(), "suggestions gathered");
                }
                Err(failure) => {
                    warnings.push(format!(
                        "recommendation query '{}' failed after {} attempt(s)",
                        params.first().map(|(_, call)| call.as_str()).unwrap_or_default(),
                        failure.attempts.len()
                    ));
                    attempts.extend(failure.attempts);
                }
            }
        }

        if gathered.is_empty() {
            let params = search_params(seed.artist_query(), BACKUP_SEARCH_SIZE);
            match self.fetch_api(&params, saavn::search_results).await {
                Ok(success) => {
                    any_valid = true;
                    source_endpoint.get_or_insert(success.source_endpoint);
                    gathered.extend(
                        success
                            .payload
                            .iter()
                            .filter_map(|raw| normalize_song(raw, None))
                            .filter(|song| song.id != seed.id)
                            .take(RELATED_TARGET),
                    );
                }
                Err(failure) => attempts.extend(failure.attempts),
            }
        }

        let mut seen = HashSet::new();
        gathered.retain(|song| song.id != seed.id && seen.insert(song.id.clone()));

        if gathered.is_empty() {
            return Err(if any_valid {
                ServiceError::not_found(format!("no related songs found for '{id}'"))
            } else {
                ServiceError::upstream_unavailable(
                    format!("unable to fetch related songs for '{id}'"),
                    attempts,
                )
            });
        }

        let enriched = self.attach_links(gathered, &mut warnings).await;

        if mode.writes() {
            self.related.set(id.clone(), enriched.clone()).await;
        }

        let mut data = enriched;
        data.truncate(limit);
        info!(count = data.len(), "related songs resolved");
        Ok(CatalogResponse {
            data,
            source_endpoint,
            cache_hit: false,
            warnings,
            latency_ms: elapsed_ms(started),
        })
    }

    /// Trending songs for a language, each enriched with its download links.
    ///
    /// The language-specific trending list is tried first, then the launch
    /// feed. Blank languages fall back to the catalog default.
    #[instrument(skip_all, fields(language = %language, limit = limit))]
    pub async fn trending(
        &self,
        language: &str,
        limit: usize,
        mode: CacheMode,
    ) -> Result<CatalogResponse<Vec<RelatedSong>>, ServiceError> {
        if limit == 0 {
            return Err(ValidationError::ZeroLimit.into());
        }
        let started = Instant::now();
        let language = language_or_default(language).to_lowercase();
        if mode.reads() {
            if let Some(mut trending) = self.trending.get(&language).await {
                debug!("trending cache hit");
                trending.truncate(limit);
                return Ok(CatalogResponse::cached(trending, started));
            }
        }

        let extractors = trending_extractors();
        let mut attempts = Vec::new();
        let mut found = None;
        for params in trending_queries(&language) {
            match self.fetch_api(&params, |body| extractors.first_match(body)).await {
                Ok(success) => {
                    found = Some(success);
                    break;
                }
                Err(failure) => attempts.extend(failure.attempts),
            }
        }
        let Some(found) = found else {
            return Err(ServiceError::upstream_unavailable(
                format!("unable to fetch trending songs for '{language}'"),
                attempts,
            ));
        };

        let mut seen = HashSet::new();
        let songs: Vec<Song> = found
            .payload
            .iter()
            .filter_map(|raw| normalize_song(raw, None))
            .filter(|song| seen.insert(song.id.clone()))
            .collect();
        if songs.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no trending songs found for '{language}'"
            )));
        }

        let mut warnings = Vec::new();
        let enriched = self.attach_links(songs, &mut warnings).await;
        let mut response = respond(
            FetchSuccess {
                payload: enriched,
                source_endpoint: found.source_endpoint,
                attempts: found.attempts,
                latency_ms: found.latency_ms,
            },
            attempts,
            started,
        );
        response.warnings.extend(warnings);

        if mode.writes() {
            self.trending.set(language, response.data.clone()).await;
        }
        response.data.truncate(limit);
        info!(count = response.data.len(), "trending songs resolved");
        Ok(response)
    }

    #[instrument(skip_all, fields(query = %query, limit = limit))]
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        mode: CacheMode,
    ) -> Result<CatalogResponse<Vec<Song>>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        if limit == 0 {
            return Err(ValidationError::ZeroLimit.into());
        }

        let started = Instant::now();
        let key = format!("{}|{limit}", query.to_lowercase());
        if mode.reads() {
            if let Some(songs) = self.searches.get(&key).await {
                debug!("search cache hit");
                return Ok(CatalogResponse::cached(songs, started));
            }
        }

        let params = search_params(query, limit);
        let success = self
            .fetch_api(&params, saavn::search_results)
            .await
            .map_err(|failure| failure.into_service_error(&format!("search for '{query}'")))?;

        let songs: Vec<Song> = success
            .payload
            .iter()
            .filter_map(|raw| normalize_song(raw, None))
            .take(limit)
            .collect();

        let mut response = respond(
            FetchSuccess {
                payload: songs,
                source_endpoint: success.source_endpoint,
                attempts: success.attempts,
                latency_ms: success.latency_ms,
            },
            Vec::new(),
            started,
        );
        if response.data.is_empty() {
            response.warnings.push(format!("no songs matched '{query}'"));
        }
        if mode.writes() {
            self.searches.set(key, response.data.clone()).await;
        }
        Ok(response)
    }

    /// Drop expired entries from every metadata cache.
    pub async fn purge_expired(&self) -> usize {
        self.songs.purge_expired().await
            + self.related.purge_expired().await
            + self.searches.purge_expired().await
            + self.trending.purge_expired().await
    }

    /// Fan out download-link lookups; songs whose lookup fails keep empty links.
    async fn attach_links(&self, songs: Vec<Song>, warnings: &mut Vec<String>) -> Vec<RelatedSong> {
        let enriched = self
            .fanout
            .enrich(songs, |song: &Song| {
                let song_id = song.id.clone();
                let links = &self.links;
                async move { links.links_for(&song_id).await }
            })
            .await;

        let placeholders = enriched.iter().filter(|item| item.fallback).count();
        if placeholders > 0 {
            warnings.push(format!(
                "download links unavailable for {placeholders} of {} song(s)",
                enriched.len()
            ));
        }
        debug!(count = enriched.len(), placeholders, "download links attached");
        enriched
    }

    async fn fetch_api<T, E>(
        &self,
        params: &[(&'static str, String)],
        extract: E,
    ) -> crate::orchestrator::FetchResult<T>
    where
        E: Fn(&Value) -> Option<T>,
    {
        self.orchestrator
            .fetch(&self.api_endpoints, |endpoint| api_request(endpoint, params), extract)
            .await
    }
}

fn respond<T>(found: FetchSuccess<T>, earlier: Vec<AttemptRecord>, started: Instant) -> CatalogResponse<T> {
    let failed = earlier.len() + found.attempts.len();
    let mut warnings = Vec::new();
    if failed > 0 {
        warnings.push(format!(
            "source fallback succeeded with '{}' after {failed} failed attempt(s)",
            found.source_endpoint
        ));
    }

    CatalogResponse {
        data: found.payload,
        source_endpoint: Some(found.source_endpoint),
        cache_hit: false,
        warnings,
        latency_ms: elapsed_ms(started),
    }
}
