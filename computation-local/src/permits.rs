//! Counting gate bounding the number of batches running at once

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use computation_core::{ComputationError, ComputationResult, ResourcesStatus};

/// Semaphore sized to the usable core count, with a busy-core counter
#[derive(Debug)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    available_cores: usize,
    busy_cores: Arc<AtomicUsize>,
}

/// One core held for the whole duration of a batch.
///
/// Dropping the permit decrements the busy-core count and then returns the
/// permit to the pool, so the count never exceeds the pool size.
#[derive(Debug)]
pub struct CorePermit {
    busy_cores: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for CorePermit {
    fn drop(&mut self) {
        let previous = self.busy_cores.fetch_sub(1, Ordering::SeqCst);
        trace!("Released core permit, {} busy cores", previous - 1);
    }
}

impl PermitPool {
    pub fn new(available_cores: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(available_cores)),
            available_cores,
            busy_cores: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free core and mark it busy
    pub async fn enter(&self) -> ComputationResult<CorePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ComputationError::Cancelled)?;
        Ok(self.occupy(permit))
    }

    /// Like [`enter`](Self::enter), but gives up with `Cancelled` if `token`
    /// fires first; nothing is marked busy in that case
    pub async fn enter_cancellable(&self, token: &CancellationToken) -> ComputationResult<CorePermit> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ComputationError::Cancelled),
            permit = self.enter() => permit,
        }
    }

    fn occupy(&self, permit: OwnedSemaphorePermit) -> CorePermit {
        let busy = self.busy_cores.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Acquired core permit, {} busy cores", busy);
        CorePermit {
            busy_cores: Arc::clone(&self.busy_cores),
            _permit: permit,
        }
    }

    pub fn available_cores(&self) -> usize {
        self.available_cores
    }

    pub fn busy_cores(&self) -> usize {
        self.busy_cores.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ResourcesStatus {
        ResourcesStatus::new(self.available_cores, self.busy_cores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_enter_and_exit_track_busy_cores() {
        let pool = PermitPool::new(2);
        assert_eq!(pool.busy_cores(), 0);

        let first = pool.enter().await.unwrap();
        let second = pool.enter().await.unwrap();
        assert_eq!(pool.busy_cores(), 2);
        assert_eq!(pool.status().idle_cores(), 0);

        drop(first);
        assert_eq!(pool.busy_cores(), 1);
        drop(second);
        assert_eq!(pool.busy_cores(), 0);
    }

    #[tokio::test]
    async fn test_enter_waits_for_a_free_core() {
        let pool = Arc::new(PermitPool::new(1));
        let held = pool.enter().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.enter().await.map(|_permit| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(pool.busy_cores(), 1);

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.busy_cores(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_wait_consumes_nothing() {
        let pool = PermitPool::new(1);
        let held = pool.enter().await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = pool.enter_cancellable(&token).await;
        assert!(matches!(result, Err(ComputationError::Cancelled)));
        assert_eq!(pool.busy_cores(), 1);

        drop(held);
        assert_eq!(pool.busy_cores(), 0);
        assert!(pool.enter().await.is_ok());
    }

    #[tokio::test]
    async fn test_busy_cores_never_exceed_total() {
        let pool = Arc::new(PermitPool::new(3));
        let mut tasks = Vec::new();

        for _ in 0..24 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                let _permit = pool.enter().await.unwrap();
                let busy = pool.busy_cores();
                assert!(busy >= 1 && busy <= pool.available_cores());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(pool.busy_cores(), 0);
    }
}
