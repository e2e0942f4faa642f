//! # Pool Supervisor
//!
//! Runs the background work a rotating pool needs (lifetime refresher,
//! rotation triggers) until shutdown or a fatal pool error, then drains the
//! pool so no managed address outlives the process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rsip_selection::{call_blocking, spawn_refresher, AddressPoolApi, PoolError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::rotation::{rotate_every, rotate_on_request};
use crate::socks::ServerHandle;

/// Background work of a rotating pool.
pub struct Supervisor {
    pub pool: Arc<dyn AddressPoolApi>,
    pub refresh_period: Duration,
    pub rotate_interval: Option<Duration>,
    pub rotate_requests: Option<mpsc::Receiver<()>>,
    /// Front end stopped before the drain so no dial installs behind it.
    pub server: Option<ServerHandle>,
}

impl Supervisor {
    /// Run until `shutdown` resolves or a pool task fails.
    ///
    /// The pool is drained either way. Returns the error that stopped the
    /// pool, if any.
    pub async fn run<F>(self, shutdown: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()>,
    {
        let mut refresher = spawn_refresher(self.pool.clone(), self.refresh_period);
        let mut manual = self
            .rotate_requests
            .map(|rx| tokio::spawn(rotate_on_request(rx, self.pool.clone())));
        let mut timed = self
            .rotate_interval
            .map(|period| tokio::spawn(rotate_every(period, self.pool.clone())));
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("supervisor shutdown requested");
                    break Ok(());
                }
                result = refresher.finished() => break result,
                result = join_task(&mut manual) => match result {
                    Ok(rotations) => {
                        info!(rotations, "manual rotation trigger finished");
                        manual = None;
                    }
                    Err(e) => break Err(e),
                },
                result = join_task(&mut timed) => {
                    timed = None;
                    if let Err(e) = result {
                        break Err(e);
                    }
                }
            }
        };

        if let Some(server) = self.server {
            server.stop().await;
        }
        if let Some(task) = manual {
            task.abort();
        }
        if let Some(task) = timed {
            task.abort();
        }
        if let Err(e) = refresher.stop().await {
            warn!(error = %e, "refresher failed while stopping");
        }

        match call_blocking(&self.pool, |pool| pool.drain()).await {
            Ok(removed) => info!(removed, "address pool drained"),
            Err(e) => error!(error = %e, "draining address pool failed"),
        }

        if let Err(e) = &outcome {
            error!(error = %e, "address pool stopped");
        }
        outcome
    }
}

/// Await an optional task. Pending forever when there is none.
///
/// A panicked rotation may have left the kernel out of step with the
/// tracked list, so it counts as a poisoned pool.
async fn join_task<T>(task: &mut Option<JoinHandle<Result<T, PoolError>>>) -> Result<T, PoolError>
where
    T: Send + 'static,
{
    match task.as_mut() {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "rotation task panicked");
                Err(PoolError::Poisoned)
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rsip_selection::test_utils::{FakeKernel, FakeOp, ScriptedRandomSource};
    use rsip_selection::{AddressPool, Epoch, InterfaceIndex, PoolConfig, PoolStats};

    const ETH0: InterfaceIndex = InterfaceIndex::new(2);

    fn make_pool() -> (Arc<FakeKernel>, Arc<AddressPool>) {
        let kernel = Arc::new(FakeKernel::new().with_link(ETH0, "eth0", &["2001:db8::10/64"]));
        let random = Arc::new(ScriptedRandomSource::new([0x1111, 0x2222, 0x3333]));
        let pool = AddressPool::new(kernel.clone(), random, PoolConfig::default()).unwrap();
        (kernel, Arc::new(pool))
    }

    /// Pool whose refresh panics. Counts drains.
    #[derive(Default)]
    struct PanickingRefresh {
        drains: AtomicUsize,
    }

    impl AddressPoolApi for PanickingRefresh {
        fn get_source_address(&self, _interface: InterfaceIndex) -> Result<Ipv6Addr, PoolError> {
            Ok(Ipv6Addr::LOCALHOST)
        }

        fn rotate(&self) -> Result<Epoch, PoolError> {
            Err(PoolError::Poisoned)
        }

        fn refresh(&self) -> Result<usize, PoolError> {
            panic!("refresh exploded");
        }

        fn drain(&self) -> Result<usize, PoolError> {
            self.drains.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        fn stats(&self) -> PoolStats {
            PoolStats::default()
        }
    }

    fn supervisor(pool: Arc<dyn AddressPoolApi>) -> Supervisor {
        Supervisor {
            pool,
            refresh_period: Duration::from_secs(60),
            rotate_interval: None,
            rotate_requests: None,
            server: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_pool() {
        let (kernel, pool) = make_pool();
        let address = pool.get_source_address(ETH0).unwrap();

        let outcome = supervisor(pool.clone())
            .run(tokio::time::sleep(Duration::from_secs(150)))
            .await;

        assert!(outcome.is_ok());
        assert!(!kernel.has_address(ETH0, address));
        assert_eq!(pool.stats().tracked, 0);
        assert_eq!(pool.stats().refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_stops_and_drains() {
        let (kernel, pool) = make_pool();
        let address = pool.get_source_address(ETH0).unwrap();
        kernel.fail(FakeOp::Replace);

        let outcome = tokio::time::timeout(
            Duration::from_secs(600),
            supervisor(pool.clone()).run(std::future::pending()),
        )
        .await
        .expect("refresh failure should end the supervisor");

        assert!(outcome.unwrap_err().is_fatal());
        assert!(!kernel.has_address(ETH0, address));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_panic_is_fatal() {
        let pool = Arc::new(PanickingRefresh::default());

        let outcome = tokio::time::timeout(
            Duration::from_secs(600),
            supervisor(pool.clone()).run(std::future::pending()),
        )
        .await
        .expect("refresher panic should end the supervisor");

        assert!(matches!(outcome, Err(PoolError::Poisoned)));
        assert_eq!(pool.drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_request_channel_keeps_serving() {
        let (_kernel, pool) = make_pool();
        pool.get_source_address(ETH0).unwrap();

        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();
        drop(tx);

        let mut sup = supervisor(pool.clone());
        sup.rotate_requests = Some(rx);
        let outcome = sup.run(tokio::time::sleep(Duration::from_secs(10))).await;

        assert!(outcome.is_ok());
        assert_eq!(pool.stats().epoch.map(|e| e.number), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_rotation_failure_is_fatal() {
        let (kernel, pool) = make_pool();
        pool.get_source_address(ETH0).unwrap();
        kernel.fail(FakeOp::Delete);

        let mut sup = supervisor(pool.clone());
        sup.rotate_interval = Some(Duration::from_secs(5));
        let outcome = tokio::time::timeout(Duration::from_secs(600), sup.run(std::future::pending()))
            .await
            .expect("failed rotation should end the supervisor");

        assert!(outcome.unwrap_err().is_fatal());
        assert!(pool.stats().poisoned);
    }
}
