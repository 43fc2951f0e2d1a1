//! Concurrent per-entity enrichment with partial-failure tolerance.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ServiceError;

/// An input entity paired with its supplement, or with `S::default()` when
/// the per-entity fetch failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enriched<E, S> {
    #[serde(flatten)]
    pub entity: E,
    #[serde(flatten)]
    pub supplement: S,
    #[serde(skip)]
    pub fallback: bool,
}

impl<E, S> Enriched<E, S> {
    pub fn into_parts(self) -> (E, S) {
        (self.entity, self.supplement)
    }
}

/// Issues every per-entity fetch at once and reassembles results by input position.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichmentFanout {
    per_entity_timeout: Option<Duration>,
}

impl EnrichmentFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_entity_timeout = Some(timeout);
        self
    }

    /// The output always has the same length and order as `entities`.
    pub async fn enrich<E, S, F, Fut>(&self, entities: Vec<E>, per_entity_fetch: F) -> Vec<Enriched<E, S>>
    where
        S: Default,
        F: Fn(&E) -> Fut,
        Fut: Future<Output = Result<S, ServiceError>>,
    {
        let timeout = self.per_entity_timeout;
        let mut pending = entities
            .iter()
            .enumerate()
            .map(|(index, entity)| {
                let fetch = per_entity_fetch(entity);
                async move {
                    let outcome = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, fetch).await {
                            Ok(result) => result,
                            Err(_) => Err(timed_out(limit)),
                        },
                        None => fetch.await,
                    };
                    (index, outcome)
                }
            })
            .collect::<FuturesUnordered<_>>();

        let mut slots: Vec<Option<S>> = entities.iter().map(|_| None).collect();
        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                Ok(supplement) => {
                    debug!(index, "enrichment completed");
                    slots[index] = Some(supplement);
                }
                Err(error) => {
                    warn!(index, error = %error, "enrichment failed, using placeholder");
                }
            }
        }
        drop(pending);

        entities
            .into_iter()
            .zip(slots)
            .map(|(entity, slot)| match slot {
                Some(supplement) => Enriched {
                    entity,
                    supplement,
                    fallback: false,
                },
                None => Enriched {
                    entity,
                    supplement: S::default(),
                    fallback: true,
                },
            })
            .collect()
    }
}

fn timed_out(limit: Duration) -> ServiceError {
    ServiceError::upstream_unavailable(
        format!("enrichment lookup timed out after {}ms", limit.as_millis()),
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn completions_are_matched_back_to_their_inputs() {
        let fanout = EnrichmentFanout::new();
        let entities = vec![30_u64, 10, 20];

        let enriched = fanout
            .enrich(entities, |delay| {
                let delay = *delay;
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, ServiceError>(delay * 2)
                }
            })
            .await;

        let pairs: Vec<_> = enriched.into_iter().map(Enriched::into_parts).collect();
        assert_eq!(pairs, vec![(30, 60), (10, 20), (20, 40)]);
    }

    #[tokio::test]
    async fn failures_yield_default_only_for_the_failing_entity() {
        let fanout = EnrichmentFanout::new();

        let enriched = fanout
            .enrich(vec![1_u32, 2, 3], |n| {
                let n = *n;
                async move {
                    if n == 2 {
                        Err(ServiceError::download_failed("boom"))
                    } else {
                        Ok(String::from("ok"))
                    }
                }
            })
            .await;

        assert_eq!(enriched.len(), 3);
        assert_eq!(enriched[1].supplement, "");
        assert!(enriched[1].fallback);
        assert!(!enriched[0].fallback && !enriched[2].fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_time_out_into_placeholders() {
        let fanout = EnrichmentFanout::new().with_timeout(Duration::from_millis(50));

        let enriched = fanout
            .enrich(vec![10_u64, 500], |delay| {
                let delay = *delay;
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, ServiceError>(Some(delay))
                }
            })
            .await;

        assert_eq!(enriched[0].supplement, Some(10));
        assert_eq!(enriched[1].supplement, None);
        assert!(enriched[1].fallback);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let enriched = EnrichmentFanout::new()
            .enrich(Vec::<u8>::new(), |_| async { Ok::<u8, ServiceError>(1) })
            .await;

        assert!(enriched.is_empty());
    }

    #[test]
    fn timeouts_are_reported_as_upstream_unavailable() {
        let error = timed_out(Duration::from_millis(250));

        assert_eq!(error.kind(), crate::ServiceErrorKind::UpstreamUnavailable);
        assert_eq!(error.message(), "enrichment lookup timed out after 250ms");
    }
}
