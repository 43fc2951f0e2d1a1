//! Ordered endpoint fallback with per-endpoint retry and timeout.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{ServiceError, ValidationError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryPolicy;
use crate::throttling::UpstreamThrottle;

/// Absolute http(s) base address of one interchangeable upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim().trim_end_matches('/');
        let host = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"));

        match host {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') && !rest.contains(' ') => {
                Ok(Self(trimmed.to_owned()))
            }
            _ => Err(ValidationError::InvalidEndpoint {
                value: input.to_owned(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a path segment: `https://host/api` + `songs/1` -> `https://host/api/songs/1`.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty list of endpoint candidates. Order encodes preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet(Vec<Endpoint>);

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ValidationError> {
        if endpoints.is_empty() {
            return Err(ValidationError::EmptyEndpointList);
        }
        Ok(Self(endpoints))
    }

    pub fn parse_all<'s>(inputs: impl IntoIterator<Item = &'s str>) -> Result<Self, ValidationError> {
        let endpoints = inputs
            .into_iter()
            .map(Endpoint::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints)
    }

    pub fn single(endpoint: Endpoint) -> Self {
        Self(vec![endpoint])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why one attempt against one endpoint was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    Timeout,
    Transport(String),
    Status(u16),
    InvalidShape(String),
}

impl Display for AttemptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Status(status) => write!(f, "upstream status {status}"),
            Self::InvalidShape(message) => write!(f, "invalid shape: {message}"),
        }
    }
}

/// One failed attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub endpoint: Endpoint,
    pub attempt: u32,
    pub error: AttemptError,
}

impl AttemptRecord {
    pub fn new(endpoint: Endpoint, attempt: u32, error: AttemptError) -> Self {
        Self {
            endpoint,
            attempt,
            error,
        }
    }
}

impl Display for AttemptRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (attempt {}): {}",
            self.endpoint,
            self.attempt + 1,
            self.error
        )
    }
}

/// Successful orchestrated call.
#[derive(Debug, Clone)]
pub struct FetchSuccess<T> {
    pub payload: T,
    pub source_endpoint: Endpoint,
    /// Failed attempts that preceded the accepted one.
    pub attempts: Vec<AttemptRecord>,
    pub latency_ms: u64,
}

/// Failed orchestrated call after exhausting every candidate.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub attempts: Vec<AttemptRecord>,
    pub latency_ms: u64,
}

impl FetchFailure {
    pub fn into_service_error(self, context: &str) -> ServiceError {
        let message = format!(
            "{context}: all {} attempt(s) failed",
            self.attempts.len()
        );
        ServiceError::upstream_unavailable(message, self.attempts)
    }
}

pub type FetchResult<T> = Result<FetchSuccess<T>, FetchFailure>;

/// Tries endpoint candidates in order and returns the first structurally valid payload.
///
/// Holds no cache and performs no normalization. Timeouts, transport errors,
/// unexpected statuses and unrecognized bodies are all plain attempt failures.
#[derive(Clone)]
pub struct FetchOrchestrator {
    http: Arc<dyn HttpClient>,
    policy: RetryPolicy,
    throttle: Option<UpstreamThrottle>,
}

impl FetchOrchestrator {
    pub fn new(http: Arc<dyn HttpClient>, policy: RetryPolicy) -> Self {
        Self {
            http,
            policy,
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, throttle: UpstreamThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// `build_request` maps an endpoint to the request to send; `extract`
    /// returns `Some` only for a structurally valid body.
    #[instrument(skip_all, fields(endpoints = endpoints.len()))]
    pub async fn fetch<T, B, E>(
        &self,
        endpoints: &EndpointSet,
        build_request: B,
        extract: E,
    ) -> FetchResult<T>
    where
        B: Fn(&Endpoint) -> HttpRequest,
        E: Fn(&Value) -> Option<T>,
    {
        let started = Instant::now();
        let mut attempts = Vec::new();

        for endpoint in endpoints.iter() {
            let mut attempt = 0_u32;
            loop {
                let plan = self.policy.plan(attempt);
                if !plan.permitted {
                    break;
                }

                if let Some(throttle) = &self.throttle {
                    throttle.until_ready(endpoint).await;
                }

                let request = build_request(endpoint).with_timeout(plan.timeout);
                debug!(endpoint = %endpoint, attempt, url = %request.url, "upstream attempt");

                match self.attempt_once(request, plan.timeout, &extract).await {
                    Ok(payload) => {
                        let latency_ms = elapsed_ms(started);
                        info!(
                            endpoint = %endpoint,
                            attempt,
                            failed_attempts = attempts.len(),
                            latency_ms,
                            "upstream attempt accepted"
                        );
                        return Ok(FetchSuccess {
                            payload,
                            source_endpoint: endpoint.clone(),
                            attempts,
                            latency_ms,
                        });
                    }
                    Err(error) => {
                        warn!(endpoint = %endpoint, attempt, error = %error, "upstream attempt failed");
                        attempts.push(AttemptRecord::new(endpoint.clone(), attempt, error));
                    }
                }

                match self.policy.delay_after(attempt) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => break,
                }
                attempt += 1;
            }
        }

        Err(FetchFailure {
            attempts,
            latency_ms: elapsed_ms(started),
        })
    }

    async fn attempt_once<T, E>(
        &self,
        request: HttpRequest,
        timeout: std::time::Duration,
        extract: &E,
    ) -> Result<T, AttemptError>
    where
        E: Fn(&Value) -> Option<T>,
    {
        let response = match tokio::time::timeout(timeout, self.http.execute(request)).await {
            Err(_) => return Err(AttemptError::Timeout),
            Ok(Err(error)) if error.is_timeout() => return Err(AttemptError::Timeout),
            Ok(Err(error)) => return Err(AttemptError::Transport(error.to_string())),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(AttemptError::Status(response.status));
        }

        let body = response
            .json()
            .map_err(|error| AttemptError::InvalidShape(format!("body is not JSON: {error}")))?;

        extract(&body)
            .ok_or_else(|| AttemptError::InvalidShape(String::from("expected fields missing")))
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
