//! Rotation triggers: operator requests on stdin and an optional timer.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use rsip_selection::{call_blocking, AddressPoolApi, PoolError};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Forward every stdin line as a rotation request.
///
/// Reads on a dedicated thread so a pending read never holds up runtime
/// shutdown. The channel closes on EOF or a read error.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("stdin-rotate".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if let Err(e) = line {
                    warn!(error = %e, "reading stdin failed");
                    break;
                }
                if tx.blocking_send(()).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Rotate once per request until the sender side closes.
///
/// Rotations run on the blocking pool. Returns the number of rotations performed. A closed channel only ends
/// manual rotation; the proxy keeps serving.
pub async fn rotate_on_request(
    mut requests: mpsc::Receiver<()>,
    pool: Arc<dyn AddressPoolApi>,
) -> Result<u64, PoolError> {
    let mut rotations = 0;
    while requests.recv().await.is_some() {
        let epoch = call_blocking(&pool, |pool| pool.rotate()).await?;
        rotations += 1;
        info!(epoch = epoch.number, "rotation requested by operator");
    }
    info!("stdin closed, manual rotation disabled");
    Ok(rotations)
}

/// Rotate every `period`, first one full period after start.
///
/// Only returns on a pool failure.
pub async fn rotate_every(period: Duration, pool: Arc<dyn AddressPoolApi>) -> Result<(), PoolError> {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let epoch = call_blocking(&pool, |pool| pool.rotate()).await?;
        info!(epoch = epoch.number, "timed rotation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsip_selection::test_utils::{FakeKernel, FakeOp, ScriptedRandomSource};
    use rsip_selection::{AddressPool, InterfaceIndex, PoolConfig};

    const ETH0: InterfaceIndex = InterfaceIndex::new(2);
    const LINK_ADDRESS: &str = "2001:db8::10";

    fn make_pool() -> (Arc<FakeKernel>, Arc<AddressPool>) {
        let kernel = Arc::new(FakeKernel::new().with_link(ETH0, "eth0", &["2001:db8::10/64"]));
        let random = Arc::new(ScriptedRandomSource::new([0x1111, 0x2222, 0x3333]));
        let pool = AddressPool::new(kernel.clone(), random, PoolConfig::default()).unwrap();
        (kernel, Arc::new(pool))
    }

    #[tokio::test]
    async fn test_each_request_rotates() {
        let (kernel, pool) = make_pool();
        let first = pool.get_source_address(ETH0).unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();
        drop(tx);

        assert_eq!(rotate_on_request(rx, pool.clone()).await.unwrap(), 2);
        assert!(!kernel.has_address(ETH0, first));
        assert_eq!(pool.stats().epoch.map(|e| e.number), Some(2));
    }

    #[tokio::test]
    async fn test_rotation_never_touches_link_address() {
        let (kernel, pool) = make_pool();
        let link_address = LINK_ADDRESS.parse().unwrap();
        let first = pool.get_source_address(ETH0).unwrap();
        assert_ne!(first, link_address);

        let (tx, rx) = mpsc::channel(4);
        tx.send(()).await.unwrap();
        drop(tx);
        rotate_on_request(rx, pool.clone()).await.unwrap();

        let second = pool.get_source_address(ETH0).unwrap();
        assert_ne!(second, first);
        assert!(kernel.has_address(ETH0, link_address));
        assert!(kernel.has_address(ETH0, second));
    }

    #[tokio::test]
    async fn test_closed_channel_ends_quietly() {
        let (_kernel, pool) = make_pool();
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        assert_eq!(rotate_on_request(rx, pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_request_trigger_stops_on_poisoned_pool() {
        let (kernel, pool) = make_pool();
        pool.get_source_address(ETH0).unwrap();
        kernel.fail(FakeOp::Delete);

        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();
        let err = tokio::time::timeout(Duration::from_secs(10), rotate_on_request(rx, pool))
            .await
            .expect("trigger should stop on the failed rotation")
            .unwrap_err();
        assert!(err.is_fatal());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rotates_every_period() {
        let (_kernel, pool) = make_pool();
        let task = tokio::spawn(rotate_every(Duration::from_secs(10), pool.clone()));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(pool.stats().epoch.map(|e| e.number), Some(2));
        task.abort();
    }
}
