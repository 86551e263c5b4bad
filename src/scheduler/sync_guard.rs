//! In-process mutual exclusion by name.
//!
//! A second run of the same name is refused while the first is active,
//! unless the first has held the lock longer than the caller's timeout, in
//! which case it is force-unlocked and the new run proceeds. Each run holds a
//! generation number so a force-unlocked run finishing late cannot release
//! the lock of the run that replaced it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

struct ActiveRun {
    started: Instant,
    generation: u64,
}

#[derive(Default)]
pub struct SyncGuard {
    active: Mutex<HashMap<String, ActiveRun>>,
    next_generation: AtomicU64,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Run `f` unless a run under `name` is already active.
    ///
    /// Returns `Ok(None)` without calling `f` when another run started less
    /// than `timeout` ago.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        timeout: Duration,
        f: F,
    ) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = {
            let mut active = self.lock();
            if let Some(run) = active.get(name) {
                let elapsed = run.started.elapsed();
                if elapsed < timeout {
                    debug!("'{}' already running for {:?}, skipping", name, elapsed);
                    return Ok(None);
                }
                warn!(
                    "'{}' held for {:?} (timeout {:?}), force-unlocking",
                    name, elapsed, timeout
                );
            }
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            active.insert(
                name.to_string(),
                ActiveRun {
                    started: Instant::now(),
                    generation,
                },
            );
            generation
        };

        let _release = Release {
            guard: self,
            name,
            generation,
        };
        f().await.map(Some)
    }
}

/// Releases the lock on drop, including when the run's future is cancelled.
struct Release<'a> {
    guard: &'a SyncGuard,
    name: &'a str,
    generation: u64,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut active = self.guard.lock();
        if active.get(self.name).map(|run| run.generation) == Some(self.generation) {
            active.remove(self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runs_and_releases() {
        let guard = SyncGuard::new();
        let result: Result<Option<u32>, String> = guard
            .execute("faction", Duration::from_secs(10), || async { Ok(7) })
            .await;
        assert_eq!(result, Ok(Some(7)));
        assert!(!guard.is_running("faction"));
    }

    #[tokio::test]
    async fn test_error_releases() {
        let guard = SyncGuard::new();
        let result: Result<Option<u32>, String> = guard
            .execute("faction", Duration::from_secs(10), || async {
                Err("boom".to_string())
            })
            .await;
        assert_eq!(result, Err("boom".to_string()));
        assert!(!guard.is_running("faction"));
    }

    #[tokio::test]
    async fn test_overlap_is_refused() {
        let guard = Arc::new(SyncGuard::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (finish_tx, finish_rx) = oneshot::channel::<()>();

        let first = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .execute("faction", Duration::from_secs(10), || async move {
                        let _ = started_tx.send(());
                        let _ = finish_rx.await;
                        Ok::<_, String>("first")
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let ran = AtomicBool::new(false);
        let second = guard
            .execute("faction", Duration::from_secs(10), || async {
                ran.store(true, Ordering::SeqCst);
                Ok::<_, String>("second")
            })
            .await;
        assert_eq!(second, Ok(None));
        assert!(!ran.load(Ordering::SeqCst));

        // Other names are independent
        let other = guard
            .execute("war", Duration::from_secs(10), || async { Ok::<_, String>(1) })
            .await;
        assert_eq!(other, Ok(Some(1)));

        finish_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), Ok(Some("first")));
        assert!(!guard.is_running("faction"));
    }

    #[tokio::test]
    async fn test_force_unlock_after_timeout() {
        let guard = Arc::new(SyncGuard::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (finish_stale_tx, finish_stale_rx) = oneshot::channel::<()>();

        let stale = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .execute("faction", Duration::from_millis(20), || async move {
                        let _ = started_tx.send(());
                        let _ = finish_stale_rx.await;
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (replaced_tx, replaced_rx) = oneshot::channel();
        let (finish_new_tx, finish_new_rx) = oneshot::channel::<()>();
        let replacement = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .execute("faction", Duration::from_millis(20), || async move {
                        let _ = replaced_tx.send(());
                        let _ = finish_new_rx.await;
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        replaced_rx.await.unwrap();

        // The stale run finishing must not release the replacement's lock
        finish_stale_tx.send(()).unwrap();
        assert_eq!(stale.await.unwrap(), Ok(Some(())));
        assert!(guard.is_running("faction"));

        finish_new_tx.send(()).unwrap();
        assert_eq!(replacement.await.unwrap(), Ok(Some(())));
        assert!(!guard.is_running("faction"));
    }
}
