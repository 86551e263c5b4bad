//! Capacity-aware batch execution across several API keys.
//!
//! A batch is planned against each key's remaining window capacity, then
//! executed with one lane per key (or one global lane). Every item is
//! retried with exponential backoff; failures end up in the results rather
//! than aborting the batch.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::rate_limit::{backoff_delay, RateLimiter};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("No API keys available for batch")]
    NoKeys,
}

/// One unit of work in a batch.
#[derive(Debug, Clone)]
pub struct BatchRequest<T> {
    pub id: String,
    pub item: T,
}

impl<T> BatchRequest<T> {
    pub fn new(id: impl Into<String>, item: T) -> Self {
        Self {
            id: id.into(),
            item,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome<R> {
    Success(R),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BatchResult<R> {
    pub id: String,
    pub key_used: String,
    pub outcome: BatchOutcome<R>,
    /// Handler invocations, including the first.
    pub attempts: u32,
}

impl<R> BatchResult<R> {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Success(_))
    }
}

/// Remaining window capacity for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCapacity {
    pub key: String,
    pub used: u64,
    pub remaining: u64,
}

/// Request indices assigned to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAssignment {
    pub key: String,
    pub requests: Vec<usize>,
}

/// Result of [`BatchHandler::plan_distribution`]. Indices refer to the
/// planned request slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    pub assignments: Vec<KeyAssignment>,
    pub unassigned: Vec<usize>,
    pub total_capacity: u64,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// One lane per key when true; a single input-ordered lane otherwise.
    pub concurrent: bool,
    /// Pause between items dispatched on the same lane.
    pub delay: Duration,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    /// First retry delay; doubles on every retry.
    pub retry_base_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrent: true,
            delay: Duration::ZERO,
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage of successful results; 0 for an empty batch.
    pub success_rate: f64,
}

pub struct BatchHandler {
    limiter: RateLimiter,
}

impl BatchHandler {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    /// Remaining capacity per key.
    ///
    /// A key whose count cannot be read is reported as exhausted.
    pub async fn analyze_key_capacity(&self, keys: &[String]) -> Vec<KeyCapacity> {
        let max = self.limiter.max_requests();
        let mut capacities = Vec::with_capacity(keys.len());
        for key in keys {
            let capacity = match self.limiter.request_count(key).await {
                Ok(used) => KeyCapacity {
                    key: key.clone(),
                    used,
                    remaining: max.saturating_sub(used),
                },
                Err(e) => {
                    warn!("Could not read key usage, treating key as exhausted: {}", e);
                    KeyCapacity {
                        key: key.clone(),
                        used: max,
                        remaining: 0,
                    }
                }
            };
            capacities.push(capacity);
        }
        capacities
    }

    /// Assign `request_count` requests round-robin over keys with capacity.
    pub fn plan_distribution(
        &self,
        request_count: usize,
        capacities: &[KeyCapacity],
    ) -> DistributionPlan {
        let total_capacity: u64 = capacities.iter().map(|c| c.remaining).sum();
        if total_capacity.saturating_mul(2) < request_count as u64 {
            warn!(
                "Low API capacity: {} requests across {} keys with {} calls remaining",
                request_count,
                capacities.len(),
                total_capacity
            );
        }

        let mut remaining: Vec<u64> = capacities.iter().map(|c| c.remaining).collect();
        let mut assignments: Vec<KeyAssignment> = capacities
            .iter()
            .map(|c| KeyAssignment {
                key: c.key.clone(),
                requests: Vec::new(),
            })
            .collect();
        let mut unassigned = Vec::new();
        let mut cursor = 0usize;

        for index in 0..request_count {
            let slot = (0..remaining.len())
                .map(|offset| (cursor + offset) % remaining.len())
                .find(|&k| remaining[k] > 0);

            match slot {
                Some(k) => {
                    assignments[k].requests.push(index);
                    remaining[k] -= 1;
                    cursor = k + 1;
                }
                None => {
                    unassigned.extend(index..request_count);
                    break;
                }
            }
        }

        assignments.retain(|a| !a.requests.is_empty());
        DistributionPlan {
            assignments,
            unassigned,
            total_capacity,
        }
    }

    /// Run every request through `handler`, spreading them across `keys`.
    ///
    /// Requests the plan could not place are still attempted: they are
    /// spread round-robin over all keys and wait on the rate limiter. Each
    /// attempt passes `wait_if_needed` first. Results are in input order.
    pub async fn execute_batch<T, R, E, F, Fut>(
        &self,
        requests: Vec<BatchRequest<T>>,
        keys: &[String],
        handler: F,
        options: &BatchOptions,
    ) -> Result<Vec<BatchResult<R>>, BatchError>
    where
        T: Clone,
        E: Display,
        F: Fn(T, String) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        if keys.is_empty() {
            return Err(BatchError::NoKeys);
        }

        let capacities = self.analyze_key_capacity(keys).await;
        let plan = self.plan_distribution(requests.len(), &capacities);

        let mut key_for = vec![0usize; requests.len()];
        for assignment in &plan.assignments {
            let k = keys
                .iter()
                .position(|key| *key == assignment.key)
                .unwrap_or(0);
            for &index in &assignment.requests {
                key_for[index] = k;
            }
        }
        if !plan.unassigned.is_empty() {
            info!(
                "{} requests exceed current key capacity and will wait for the window",
                plan.unassigned.len()
            );
        }
        for (n, &index) in plan.unassigned.iter().enumerate() {
            key_for[index] = n % keys.len();
        }

        let handler = &handler;
        let mut indexed: Vec<(usize, BatchResult<R>)> = if options.concurrent {
            let mut lanes: Vec<Vec<(usize, BatchRequest<T>)>> =
                (0..keys.len()).map(|_| Vec::new()).collect();
            for (index, request) in requests.into_iter().enumerate() {
                lanes[key_for[index]].push((index, request));
            }

            let lane_futures = lanes
                .into_iter()
                .zip(keys.iter())
                .filter(|(lane, _)| !lane.is_empty())
                .map(|(lane, key)| async move {
                    let mut out = Vec::with_capacity(lane.len());
                    for (pos, (index, request)) in lane.into_iter().enumerate() {
                        if pos > 0 && !options.delay.is_zero() {
                            tokio::time::sleep(options.delay).await;
                        }
                        out.push((index, self.run_one(request, key, handler, options).await));
                    }
                    out
                });

            join_all(lane_futures).await.into_iter().flatten().collect()
        } else {
            let mut out = Vec::with_capacity(requests.len());
            for (index, request) in requests.into_iter().enumerate() {
                if index > 0 && !options.delay.is_zero() {
                    tokio::time::sleep(options.delay).await;
                }
                let key = &keys[key_for[index]];
                out.push((index, self.run_one(request, key, handler, options).await));
            }
            out
        };

        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }

    async fn run_one<T, R, E, F, Fut>(
        &self,
        request: BatchRequest<T>,
        key: &str,
        handler: &F,
        options: &BatchOptions,
    ) -> BatchResult<R>
    where
        T: Clone,
        E: Display,
        F: Fn(T, String) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match self.limiter.wait_if_needed(key).await {
                Ok(()) => handler(request.item.clone(), key.to_string())
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(value) => {
                    return BatchResult {
                        id: request.id,
                        key_used: key.to_string(),
                        outcome: BatchOutcome::Success(value),
                        attempts: attempt + 1,
                    }
                }
                Err(message) if attempt < options.retry_attempts => {
                    let delay = backoff_delay(attempt, options.retry_base_delay);
                    debug!(
                        "Batch request {} failed (attempt {}), retrying in {:?}: {}",
                        request.id,
                        attempt + 1,
                        delay,
                        message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(message) => {
                    warn!(
                        "Batch request {} failed after {} attempts: {}",
                        request.id,
                        attempt + 1,
                        message
                    );
                    return BatchResult {
                        id: request.id,
                        key_used: key.to_string(),
                        outcome: BatchOutcome::Failed(message),
                        attempts: attempt + 1,
                    };
                }
            }
        }
    }
}

/// Successful results as `(id, value)` pairs, in order.
pub fn filter_successful<R>(results: Vec<BatchResult<R>>) -> Vec<(String, R)> {
    results
        .into_iter()
        .filter_map(|r| match r.outcome {
            BatchOutcome::Success(value) => Some((r.id, value)),
            BatchOutcome::Failed(_) => None,
        })
        .collect()
}

pub fn summary<R>(results: &[BatchResult<R>]) -> BatchSummary {
    let total = results.len();
    let successful = results.iter().filter(|r| r.is_success()).count();
    let success_rate = if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    };
    BatchSummary {
        total,
        successful,
        failed: total - successful,
        success_rate,
    }
}
