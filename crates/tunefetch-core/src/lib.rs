//! # Tunefetch Core
//!
//! Resilience layer between a music API and its flaky upstream providers.
//!
//! ## Overview
//!
//! - **Retry policy** with per-attempt timeouts and same-endpoint backoff
//! - **TTL cache** for normalized metadata
//! - **Fetch orchestrator** trying interchangeable endpoints in preference order
//! - **Enrichment fanout** attaching per-item data concurrently, tolerating failures
//! - **Media cache** with single-flight downloads, TTL eviction and byte ranges
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider request builders, shape extractors and normalizers |
//! | [`cache`] | Expiring in-memory cache |
//! | [`catalog`] | Song details, related and trending songs, search |
//! | [`config`] | Service configuration from the environment |
//! | [`domain`] | Song, identifiers and timestamps |
//! | [`error`] | Validation and service errors |
//! | [`fanout`] | Concurrent per-entity enrichment |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`media`] | Disk-backed media cache |
//! | [`orchestrator`] | Endpoint fallback with retries |
//! | [`retry`] | Retry policy and backoff |
//! | [`shape`] | Ordered JSON shape extractors |
//! | [`throttling`] | Per-endpoint rate limiting |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / API      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Catalog Service │────▶│ TTL Cache        │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Orchestrator    │────▶│ Retry / Throttle │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ HTTP Client     │     │ Media Cache      │
//! │ (reqwest)       │◀────│ (disk, ranges)   │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use tunefetch_core::{ServiceError, ServiceErrorKind};
//!
//! fn handle_error(error: ServiceError) {
//!     match error.kind() {
//!         ServiceErrorKind::UpstreamUnavailable => {
//!             // Every endpoint failed; `error.attempts()` says how
//!         }
//!         ServiceErrorKind::InvalidInput => {
//!             // Report to user, never retried
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod http_client;
pub mod media;
pub mod orchestrator;
pub mod retry;
pub mod shape;
pub mod throttling;

// Adapters
pub use adapters::SaavnMediaOrigin;

// Caching
pub use cache::{CacheMode, TtlCache};

// Catalog
pub use catalog::{CatalogResponse, CatalogService, RelatedSong};

// Configuration
pub use config::ServiceConfig;

// Domain models
pub use domain::{DownloadLink, DownloadLinks, MediaId, Song, SongId, UtcDateTime};

// Error types
pub use error::{ErrorPayload, ServiceError, ServiceErrorKind, ValidationError};

// Enrichment
pub use fanout::{Enriched, EnrichmentFanout};

// HTTP client types
pub use http_client::{
    DownloadClient, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient, ScriptedReply,
};

// Media
pub use media::{
    ByteRange, ContentRange, InitReport, MediaBody, MediaCache, MediaCacheConfig, MediaFuture,
    MediaOrigin, MediaSource, MediaState,
};

// Orchestration
pub use orchestrator::{
    AttemptError, AttemptRecord, Endpoint, EndpointSet, FetchFailure, FetchOrchestrator,
    FetchResult, FetchSuccess,
};

// Retry logic
pub use retry::{AttemptPlan, Backoff, RetryPolicy};

// Shapes
pub use shape::Extractors;

// Throttling
pub use throttling::UpstreamThrottle;
