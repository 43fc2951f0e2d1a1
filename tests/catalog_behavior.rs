//! Behavior-driven tests for the song catalog
//!
//! These tests verify HOW song details, related and trending songs and searches move
//! through the cache, the mirror APIs and the api.php fallbacks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tunefetch_core::{
    CacheMode, CatalogService, RetryPolicy, ScriptedHttpClient, ScriptedReply, ServiceConfig,
    ServiceErrorKind, SongId,
};

const MIRROR: &str = "mirror.example.test";

fn config() -> ServiceConfig {
    ServiceConfig::default()
        .with_mirrors(vec![format!("https://{MIRROR}/api")])
        .with_api_endpoints(vec![
            String::from("https://api-a.example.test/api.php"),
            String::from("https://api-b.example.test/api.php"),
        ])
        .with_retry(RetryPolicy::single_attempt(Duration::from_secs(1)))
}

fn catalog(http: &Arc<ScriptedHttpClient>) -> CatalogService {
    CatalogService::new(&config(), http.clone()).expect("valid configuration")
}

fn song_id(raw: &str) -> SongId {
    SongId::parse(raw).expect("valid song id")
}

fn seed_mirror_body() -> String {
    json!({
        "success": true,
        "data": [{
            "id": "abc123",
            "name": "Tum Hi Ho",
            "primaryArtists": "Arijit Singh",
            "album": { "id": "al1", "name": "Aashiqui 2" },
            "year": "2013",
            "duration": "262",
            "language": "hindi",
            "image": [
                { "quality": "50x50", "url": "https://c.example.test/small.jpg" },
                { "quality": "500x500", "url": "https://c.example.test/large.jpg" }
            ],
            "downloadUrl": [
                { "quality": "96kbps", "url": "https://aac.example.test/abc123_96.mp4" },
                { "quality": "320kbps", "url": "https://aac.example.test/abc123_320.mp4" }
            ]
        }]
    })
    .to_string()
}

// =============================================================================
// Song Details
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_mirror_answers_system_normalizes_song_and_caches_it() {
    // Given: A healthy mirror
    let http = Arc::new(
        ScriptedHttpClient::new().route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())]),
    );
    let catalog = catalog(&http);
    let id = song_id("abc123");

    // When: Details are requested twice
    let first = catalog
        .song_details(&id, CacheMode::Use)
        .await
        .expect("mirror should answer");
    let second = catalog
        .song_details(&id, CacheMode::Use)
        .await
        .expect("cache should answer");

    // Then: The first answer is normalized from the mirror shape
    assert_eq!(first.data.title, "Tum Hi Ho");
    assert_eq!(first.data.primary_artists, "Arijit Singh");
    assert_eq!(first.data.album, "Aashiqui 2");
    assert_eq!(first.data.image, "https://c.example.test/large.jpg");
    assert!(!first.cache_hit);
    assert_eq!(
        first.source_endpoint.as_ref().map(|endpoint| endpoint.as_str()),
        Some("https://mirror.example.test/api")
    );
    assert!(first.warnings.is_empty());

    // And: The second answer is served from cache without an upstream call
    assert!(second.cache_hit);
    assert!(second.source_endpoint.is_none());
    assert_eq!(second.data, first.data);
    assert_eq!(http.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn when_mirror_is_down_system_falls_back_to_api_detail_query() {
    // Given: A failing mirror and an api.php answering the keyed detail shape
    let detail = json!({
        "abc123": {
            "id": "abc123",
            "song": "Tum Hi Ho",
            "primary_artists": "Arijit Singh",
            "album": "Aashiqui 2",
            "language": "hindi",
            "more_info": { "has_lyrics": "true" }
        }
    })
    .to_string();
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route(MIRROR, vec![ScriptedReply::status(500)])
            .route("api-a.example.test", vec![ScriptedReply::json(detail)]),
    );
    let catalog = catalog(&http);

    // When: Details are requested
    let response = catalog
        .song_details(&song_id("abc123"), CacheMode::Use)
        .await
        .expect("fallback should answer");

    // Then: The api.php answer is used and the fallback is reported
    assert_eq!(response.data.title, "Tum Hi Ho");
    assert!(response.data.has_lyrics);
    assert_eq!(
        response.source_endpoint.as_ref().map(|endpoint| endpoint.as_str()),
        Some("https://api-a.example.test/api.php")
    );
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].contains("after 1 failed attempt(s)"));
}

#[tokio::test(start_paused = true)]
async fn when_cache_mode_is_refresh_or_bypass_system_skips_cached_entry() {
    // Given: A cached song
    let http = Arc::new(
        ScriptedHttpClient::new().route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())]),
    );
    let catalog = catalog(&http);
    let id = song_id("abc123");
    catalog.song_details(&id, CacheMode::Use).await.expect("first fetch");

    // When: The song is requested with refresh and then bypass
    let refreshed = catalog
        .song_details(&id, CacheMode::Refresh)
        .await
        .expect("refresh fetch");
    let bypassed = catalog
        .song_details(&id, CacheMode::Bypass)
        .await
        .expect("bypass fetch");

    // Then: Both went upstream
    assert!(!refreshed.cache_hit);
    assert!(!bypassed.cache_hit);
    assert_eq!(http.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn when_metadata_ttl_elapses_system_fetches_again() {
    // Given: A cached song and a 10 minute metadata TTL
    let http = Arc::new(
        ScriptedHttpClient::new().route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())]),
    );
    let catalog = catalog(&http);
    let id = song_id("abc123");
    catalog.song_details(&id, CacheMode::Use).await.expect("first fetch");

    // When: The TTL passes
    tokio::time::advance(Duration::from_secs(601)).await;
    let response = catalog.song_details(&id, CacheMode::Use).await.expect("second fetch");

    // Then: The entry was refetched
    assert!(!response.cache_hit);
    assert_eq!(http.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn when_search_by_id_finds_nothing_system_reports_not_found() {
    // Given: Detail sources fail and the search answers an empty list
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route("__call=search.getResults", vec![ScriptedReply::json(r#"{"results":[]}"#)])
            .route(MIRROR, vec![ScriptedReply::status(500)])
            .route("api.php", vec![ScriptedReply::status(500)]),
    );
    let catalog = catalog(&http);

    // When: Details are requested
    let error = catalog
        .song_details(&song_id("missing1"), CacheMode::Use)
        .await
        .expect_err("lookup should fail");

    // Then: A valid but empty answer means the song does not exist
    assert_eq!(error.kind(), ServiceErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn when_every_source_fails_system_reports_upstream_unavailable_with_attempts() {
    // Given: Every source is broken
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route(MIRROR, vec![ScriptedReply::status(500)])
            .route("api-a.example.test", vec![ScriptedReply::status(503)])
            .route("api-b.example.test", vec![ScriptedReply::Hang]),
    );
    let catalog = catalog(&http);

    // When: Details are requested
    let error = catalog
        .song_details(&song_id("abc123"), CacheMode::Use)
        .await
        .expect_err("lookup should fail");

    // Then: One mirror attempt, three detail queries and one search on two endpoints
    assert_eq!(error.kind(), ServiceErrorKind::UpstreamUnavailable);
    assert_eq!(error.attempts().len(), 1 + 3 * 2 + 2);
    assert!(error.retryable());
}

// =============================================================================
// Related Songs
// =============================================================================

fn related_client() -> ScriptedHttpClient {
    let seed = json!({ "id": "abc123", "song": "Tum Hi Ho" });
    let reco = json!({
        "abc123": [
            seed,
            { "id": "r1", "song": "One", "primary_artists": "A" },
            { "id": "r2", "song": "Two", "primary_artists": "B" },
            { "id": "r1", "song": "One again" }
        ]
    })
    .to_string();
    let by_song = json!([{ "id": "r3", "song": "Three" }]).to_string();
    let search = json!({ "results": [{ "id": "r4", "title": "Four" }] }).to_string();

    ScriptedHttpClient::new()
        .route("songs/r2", vec![ScriptedReply::status(500)])
        .route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())])
        .route("__call=reco.getreco", vec![ScriptedReply::json(reco)])
        .route("__call=song.getRecoBySong", vec![ScriptedReply::json(by_song)])
        .route("__call=search.getResults", vec![ScriptedReply::json(search)])
        .route("api.php", vec![ScriptedReply::status(500)])
}

#[tokio::test(start_paused = true)]
async fn when_related_songs_are_gathered_system_dedupes_and_keeps_input_order() {
    // Given: Recommendation sources returning the seed, a duplicate and fresh songs
    let http = Arc::new(related_client());
    let catalog = catalog(&http);

    // When: Related songs are requested
    let response = catalog
        .related(&song_id("abc123"), 20, CacheMode::Use)
        .await
        .expect("related should succeed");

    // Then: The seed and the duplicate are gone and source order is kept
    let ids: Vec<&str> = response
        .data
        .iter()
        .map(|item| item.entity.id.as_str())
        .collect();
    assert_eq!(ids, vec!["r1", "r2", "r3", "r4"]);
}

#[tokio::test(start_paused = true)]
async fn when_one_enrichment_fails_system_keeps_song_with_placeholder_links() {
    // Given: Download links for r2 cannot be fetched from any source
    let http = Arc::new(related_client());
    let catalog = catalog(&http);

    // When: Related songs are requested
    let response = catalog
        .related(&song_id("abc123"), 20, CacheMode::Use)
        .await
        .expect("related should succeed");

    // Then: r2 is still present, with empty links and a fallback flag
    let r2 = &response.data[1];
    assert_eq!(r2.entity.id.as_str(), "r2");
    assert!(r2.fallback);
    assert!(r2.supplement.is_empty());

    // And: The others carry real links, best first
    let r1 = &response.data[0];
    assert!(!r1.fallback);
    assert_eq!(
        r1.supplement.best().map(|link| link.quality.as_str()),
        Some("320kbps")
    );

    // And: The partial failure is surfaced as a warning
    assert!(response
        .warnings
        .iter()
        .any(|warning| warning.contains("download links unavailable for 1 of 4")));
}

#[tokio::test(start_paused = true)]
async fn when_related_limit_is_smaller_system_truncates_and_caches_full_list() {
    // Given: A catalog with four related songs available
    let http = Arc::new(related_client());
    let catalog = catalog(&http);
    let id = song_id("abc123");

    // When: Two are requested, then three
    let first = catalog.related(&id, 2, CacheMode::Use).await.expect("first call");
    let calls_after_first = http.calls().len();
    let second = catalog.related(&id, 3, CacheMode::Use).await.expect("second call");

    // Then: Each answer honors its limit and the second came from cache
    assert_eq!(first.data.len(), 2);
    assert_eq!(second.data.len(), 3);
    assert!(second.cache_hit);
    assert_eq!(http.calls().len(), calls_after_first);
}

#[tokio::test(start_paused = true)]
async fn when_related_serializes_system_flattens_song_and_links() {
    // Given: Related songs with links
    let http = Arc::new(related_client());
    let catalog = catalog(&http);

    // When: The answer is serialized
    let response = catalog
        .related(&song_id("abc123"), 1, CacheMode::Use)
        .await
        .expect("related should succeed");
    let json = serde_json::to_value(&response.data).expect("serializes");

    // Then: Song fields and download links sit side by side
    assert_eq!(json[0]["id"], "r1");
    assert_eq!(json[0]["title"], "One");
    assert!(json[0]["download_links"].is_array());
    assert!(json[0].get("fallback").is_none());
}

#[tokio::test(start_paused = true)]
async fn when_recommendations_are_valid_but_empty_system_reports_not_found() {
    // Given: Every api.php call answers an empty keyed list
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())])
            .route("api.php", vec![ScriptedReply::json(r#"{"abc123":[]}"#)]),
    );
    let catalog = catalog(&http);

    // When: Related songs are requested
    let error = catalog
        .related(&song_id("abc123"), 5, CacheMode::Use)
        .await
        .expect_err("nothing related");

    // Then: Absence is reported, not an outage
    assert_eq!(error.kind(), ServiceErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn when_every_recommendation_source_fails_system_reports_upstream_unavailable() {
    // Given: The seed resolves but every api.php call fails
    let http = Arc::new(
        ScriptedHttpClient::new()
            .route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())])
            .route("api.php", vec![ScriptedReply::status(502)]),
    );
    let catalog = catalog(&http);

    // When: Related songs are requested
    let error = catalog
        .related(&song_id("abc123"), 5, CacheMode::Use)
        .await
        .expect_err("all sources down");

    // Then: The outage is reported with its attempt trail
    assert_eq!(error.kind(), ServiceErrorKind::UpstreamUnavailable);
    assert!(!error.attempts().is_empty());
}

#[tokio::test]
async fn when_related_limit_is_zero_system_rejects_request() {
    // Given: Any catalog
    let http = Arc::new(ScriptedHttpClient::new());
    let catalog = catalog(&http);

    // When: Zero related songs are requested
    let error = catalog
        .related(&song_id("abc123"), 0, CacheMode::Use)
        .await
        .expect_err("zero limit is invalid");

    // Then: The request is rejected before any upstream call
    assert_eq!(error.kind(), ServiceErrorKind::InvalidInput);
    assert!(http.calls().is_empty());
}

// =============================================================================
// Trending Songs
// =============================================================================

fn trending_client() -> ScriptedHttpClient {
    let launch = json!({
        "new_trending": [
            { "id": "t1", "type": "song", "title": "First" },
            { "id": "pl1", "type": "playlist", "title": "Weekly Top" },
            { "id": "t2", "type": "song", "title": "Second" },
            { "id": "t1", "type": "song", "title": "First again" }
        ]
    })
    .to_string();

    ScriptedHttpClient::new()
        .route("songs/t2", vec![ScriptedReply::status(500)])
        .route(MIRROR, vec![ScriptedReply::json(seed_mirror_body())])
        .route("__call=content.getTrending", vec![ScriptedReply::status(502)])
        .route("__call=webapi.getLaunchData", vec![ScriptedReply::json(launch)])
        .route("api.php", vec![ScriptedReply::status(500)])
}

#[tokio::test(start_paused = true)]
async fn when_trending_list_fails_system_falls_back_to_launch_feed_and_enriches() {
    // Given: The language trending call fails and links for t2 cannot be fetched
    let http = Arc::new(trending_client());
    let catalog = catalog(&http);

    // When: Trending songs are requested
    let response = catalog
        .trending("Hindi", 10, CacheMode::Use)
        .await
        .expect("trending should succeed");

    // Then: Only songs survive, deduplicated, in feed order
    let ids: Vec<&str> = response
        .data
        .iter()
        .map(|item| item.entity.id.as_str())
        .collect();
    assert_eq!(ids, vec!["t1", "t2"]);
    assert_eq!(
        response.source_endpoint.as_ref().map(|endpoint| endpoint.as_str()),
        Some("https://api-a.example.test/api.php")
    );
    assert!(http
        .calls()
        .iter()
        .any(|url| url.contains("entity_language=hindi")));

    // And: t2 keeps a placeholder while t1 carries real links
    assert!(!response.data[0].fallback);
    assert!(response.data[1].fallback);
    assert!(response.data[1].supplement.is_empty());
    assert!(response
        .warnings
        .iter()
        .any(|warning| warning.contains("download links unavailable for 1 of 2")));
}

#[tokio::test(start_paused = true)]
async fn when_trending_is_requested_again_system_serves_from_cache() {
    // Given: A first trending call for a language
    let http = Arc::new(trending_client());
    let catalog = catalog(&http);
    let first = catalog
        .trending("hindi", 1, CacheMode::Use)
        .await
        .expect("first call");
    let calls_after_first = http.calls().len();

    // When: The same language is requested with a larger limit
    let second = catalog
        .trending(" HINDI ", 2, CacheMode::Use)
        .await
        .expect("second call");

    // Then: The cached full list answers without upstream calls
    assert_eq!(first.data.len(), 1);
    assert_eq!(second.data.len(), 2);
    assert!(second.cache_hit);
    assert_eq!(http.calls().len(), calls_after_first);
}

#[tokio::test(start_paused = true)]
async fn when_every_trending_source_fails_system_reports_upstream_unavailable() {
    // Given: Every api.php call fails
    let http = Arc::new(ScriptedHttpClient::new().route("api.php", vec![ScriptedReply::status(503)]));
    let catalog = catalog(&http);

    // When: Trending songs are requested
    let error = catalog
        .trending("punjabi", 5, CacheMode::Use)
        .await
        .expect_err("all sources down");

    // Then: Both query variants on both endpoints are in the trail
    assert_eq!(error.kind(), ServiceErrorKind::UpstreamUnavailable);
    assert_eq!(error.attempts().len(), 4);
}

// =============================================================================
// Search
// =============================================================================

fn search_body() -> String {
    json!({
        "results": {
            "song": {
                "data": [
                    { "id": "s1", "title": "First", "subtitle": "Arijit Singh" },
                    { "id": "s2", "title": "Second" },
                    { "id": "s3", "title": "Third" }
                ]
            }
        }
    })
    .to_string()
}

#[tokio::test(start_paused = true)]
async fn when_search_succeeds_system_truncates_and_caches_case_insensitively() {
    // Given: An api.php search answering three songs
    let http = Arc::new(
        ScriptedHttpClient::new().route("__call=search.getResults", vec![ScriptedReply::json(search_body())]),
    );
    let catalog = catalog(&http);

    // When: The same query is searched with different casing
    let first = catalog.search("Arijit", 2, CacheMode::Use).await.expect("search");
    let second = catalog.search("  arijit ", 2, CacheMode::Use).await.expect("cached search");

    // Then: Two songs are returned and the second search hit the cache
    assert_eq!(first.data.len(), 2);
    assert_eq!(first.data[0].primary_artists, "Arijit Singh");
    assert!(second.cache_hit);
    assert_eq!(http.calls().len(), 1);
    assert!(http.calls()[0].contains("query=Arijit"));
}

#[tokio::test]
async fn when_search_query_is_blank_system_rejects_it() {
    // Given: Any catalog
    let http = Arc::new(ScriptedHttpClient::new());
    let catalog = catalog(&http);

    // When: A blank query is searched
    let error = catalog
        .search("   ", 10, CacheMode::Use)
        .await
        .expect_err("blank query");

    // Then: It is rejected as invalid input
    assert_eq!(error.kind(), ServiceErrorKind::InvalidInput);
    assert!(http.calls().is_empty());
}
