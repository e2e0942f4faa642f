//! Background lifetime refresher for the address pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::domain::PoolError;
use crate::ports::inbound::AddressPoolApi;

/// Run a pool operation on the blocking thread pool.
///
/// Pool operations hold a mutex across kernel round trips and must stay off
/// the async workers. A panic inside `op` leaves the kernel and the tracked
/// list in an unknown state and is reported as [`PoolError::Poisoned`].
pub async fn call_blocking<T, F>(pool: &Arc<dyn AddressPoolApi>, op: F) -> Result<T, PoolError>
where
    T: Send + 'static,
    F: FnOnce(&dyn AddressPoolApi) -> Result<T, PoolError> + Send + 'static,
{
    let pool = pool.clone();
    match tokio::task::spawn_blocking(move || op(pool.as_ref())).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "pool operation panicked");
            Err(PoolError::Poisoned)
        }
    }
}

/// Handle to a running refresher task.
///
/// Dropping the handle stops the task at its next wake-up.
pub struct RefresherHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), PoolError>>>,
}

/// Spawn a task calling [`AddressPoolApi::refresh`] every `period`.
///
/// The first refresh happens one full period after start. The task ends
/// with the error when a refresh breaks the pool invariant.
pub fn spawn_refresher(pool: Arc<dyn AddressPoolApi>, period: Duration) -> RefresherHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "address refresher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => match call_blocking(&pool, |pool| pool.refresh()).await {
                    Ok(refreshed) => debug!(refreshed, "refresher tick"),
                    Err(e) => {
                        error!(error = %e, "address refresher stopping on failure");
                        return Err(e);
                    }
                },
                _ = shutdown_rx.changed() => {
                    info!("address refresher shutdown signal received");
                    return Ok(());
                }
            }
        }
    });

    RefresherHandle {
        shutdown_tx,
        task: Some(task),
    }
}

impl RefresherHandle {
    /// Resolves when the task ends on its own. Pending forever once it has
    /// already been observed, so it can sit in a `select!` loop.
    pub async fn finished(&mut self) -> Result<(), PoolError> {
        match self.task.as_mut() {
            Some(task) => {
                let outcome = task.await;
                self.task = None;
                flatten(outcome)
            }
            None => std::future::pending().await,
        }
    }

    /// Signal shutdown and wait for the task.
    pub async fn stop(mut self) -> Result<(), PoolError> {
        let _ = self.shutdown_tx.send(true);
        match self.task.take() {
            Some(task) => flatten(task.await),
            None => Ok(()),
        }
    }
}

/// A panicked refresher may have stopped between a kernel call and the
/// tracked-list update, so the pool is treated as poisoned. Cancellation is
/// a clean stop.
fn flatten(outcome: Result<Result<(), PoolError>, JoinError>) -> Result<(), PoolError> {
    match outcome {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            error!(error = %e, "address refresher panicked");
            Err(PoolError::Poisoned)
        }
        Err(e) => {
            debug!(error = %e, "address refresher cancelled");
            Ok(())
        }
    }
}
