//! Periodic timeout sweep over open consensus requests.
//!
//! Timeouts are also evaluated lazily on every access; the sweeper makes
//! sure requests nobody polls still move to Timeout close to their deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::coordinator::ConsensusCoordinator;

/// Sweep interval derived from the voting window: a tenth of it, at least one second.
pub fn default_sweep_interval(timeout_secs: u64) -> Duration {
    Duration::from_secs((timeout_secs / 10).max(1))
}

/// Spawn a task that calls [`ConsensusCoordinator::sweep_timeouts`] every
/// `interval` until `shutdown` fires.
///
/// The task resolves to the total number of requests it timed out.
pub fn spawn_timeout_sweeper(
    coordinator: Arc<ConsensusCoordinator>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut total = 0usize;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = coordinator.sweep_timeouts();
                    if !expired.is_empty() {
                        tracing::debug!(count = expired.len(), "timeout sweep expired requests");
                    }
                    total += expired.len();
                }
                _ = shutdown.recv() => {
                    tracing::debug!(total, "timeout sweeper shutting down");
                    break;
                }
            }
        }
        total
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusConfig;
    use warden_nullables::NullClock;
    use warden_types::{AccountId, Fingerprint};

    #[test]
    fn interval_is_a_tenth_of_the_window() {
        assert_eq!(default_sweep_interval(300), Duration::from_secs(30));
        assert_eq!(default_sweep_interval(5), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sweeper_times_out_unpolled_requests() {
        let clock = Arc::new(NullClock::new(0));
        let config = ConsensusConfig::with_voters(
            AccountId::new("admin"),
            [AccountId::new("v1")],
            1,
        );
        let c = Arc::new(ConsensusCoordinator::new(config, clock.clone()).unwrap());
        c.submit_request(AccountId::new("s"), Fingerprint::new([1; 32]), vec![]);
        c.submit_request(AccountId::new("t"), Fingerprint::new([2; 32]), vec![]);
        clock.set(301);

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_timeout_sweeper(Arc::clone(&c), Duration::from_millis(5), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let clock = Arc::new(NullClock::new(0));
        let c = Arc::new(ConsensusCoordinator::new(ConsensusConfig::default(), clock).unwrap());
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_timeout_sweeper(c, Duration::from_secs(3600), rx);
        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), 0);
    }
}
