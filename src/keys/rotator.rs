//! Round-robin API key rotation.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::try_join_all;

#[derive(Debug, thiserror::Error)]
pub enum KeyPoolError {
    #[error("No API keys configured")]
    Empty,
}

/// Hands out keys in order, wrapping around.
///
/// The cursor lives on the instance, so two rotators over the same keys
/// rotate independently.
#[derive(Debug)]
pub struct ApiKeyRotator {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl ApiKeyRotator {
    pub fn new(keys: Vec<String>) -> Result<Self, KeyPoolError> {
        if keys.is_empty() {
            return Err(KeyPoolError::Empty);
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next key in rotation, starting from the first.
    pub fn next_key(&self) -> &str {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[index]
    }

    /// Run `handler` over `items` one at a time, each with the next key.
    ///
    /// Sleeps `delay` between items. The first error aborts the run.
    pub async fn process_sequential<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        handler: F,
        delay: Duration,
    ) -> Result<Vec<R>, E>
    where
        F: Fn(T, String) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut results = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let key = self.next_key().to_string();
            results.push(handler(item, key).await?);
        }
        Ok(results)
    }

    /// Run `handler` over `items` with one concurrent lane per key.
    ///
    /// Item `i` goes to key `i % len`. Each lane is sequential with `delay`
    /// between its own items. Results come back in input order; the first
    /// error from any lane is returned.
    pub async fn process_concurrent<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        handler: F,
        delay: Duration,
    ) -> Result<Vec<R>, E>
    where
        F: Fn(T, String) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let lanes = self.keys.len();
        let mut groups: Vec<Vec<(usize, T)>> = (0..lanes).map(|_| Vec::new()).collect();
        for (index, item) in items.into_iter().enumerate() {
            groups[index % lanes].push((index, item));
        }

        let handler = &handler;
        let lane_futures = groups
            .into_iter()
            .zip(self.keys.iter())
            .filter(|(group, _)| !group.is_empty())
            .map(|(group, key)| async move {
                let mut out = Vec::with_capacity(group.len());
                for (pos, (index, item)) in group.into_iter().enumerate() {
                    if pos > 0 && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    out.push((index, handler(item, key.clone()).await?));
                }
                Ok::<_, E>(out)
            });

        let mut indexed: Vec<(usize, R)> = try_join_all(lane_futures)
            .await?
            .into_iter()
            .flatten()
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }
}
