use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::criteria::FilterCriteria;
use crate::provider::{DataProvider, FetchState};
use crate::ranking::rank_owned;
use crate::types::{EntityId, Opportunity};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub criteria: FilterCriteria,
    /// Stop after this many fetches; `None` polls until cancelled.
    pub max_iterations: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            criteria: FilterCriteria::default(),
            max_iterations: None,
        }
    }
}

/// One refresh of a match's opportunities, already filtered and ordered.
#[derive(Debug, Clone, Serialize)]
pub struct PollUpdate {
    pub iteration: u64,
    pub fetched_at: DateTime<Utc>,
    pub state: FetchState<Vec<Opportunity>>,
}

/// Owns a running poller. Dropping the handle stops it.
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancels the poller and waits for its task to exit.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("poller task ended abnormally: {err}");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Starts polling `match_id` on a fixed interval. The first fetch happens
/// immediately; failures are published and polling continues.
pub fn spawn_poller<P>(
    provider: Arc<P>,
    match_id: EntityId,
    config: PollerConfig,
) -> (PollHandle, mpsc::Receiver<PollUpdate>)
where
    P: DataProvider + ?Sized + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
    let task = tokio::spawn(run(provider, match_id, config, shutdown_rx, updates_tx));
    (
        PollHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        },
        updates_rx,
    )
}

async fn run<P>(
    provider: Arc<P>,
    match_id: EntityId,
    config: PollerConfig,
    mut shutdown: watch::Receiver<bool>,
    updates: mpsc::Sender<PollUpdate>,
) where
    P: DataProvider + ?Sized,
{
    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut iteration = 0u64;
    info!(match_id = %match_id, interval_secs = config.interval.as_secs_f64(), "poller started");

    loop {
        if config.max_iterations.is_some_and(|max| iteration >= max) {
            break;
        }
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            result = provider.fetch_opportunities(&match_id) => result,
        };
        iteration += 1;

        let state = match result {
            Ok(opportunities) => {
                let ranked = rank_owned(&opportunities, &config.criteria);
                debug!(iteration, fetched = opportunities.len(), shown = ranked.len(), "poll ok");
                FetchState::Ready(ranked)
            }
            Err(err) => {
                warn!(iteration, "poll failed: {err}");
                FetchState::Failed(err.to_string())
            }
        };
        let update = PollUpdate {
            iteration,
            fetched_at: Utc::now(),
            state,
        };
        if updates.send(update).await.is_err() {
            debug!("poll receiver dropped");
            break;
        }
    }
    info!(match_id = %match_id, iterations = iteration, "poller stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::{spawn_poller, PollerConfig};
    use crate::criteria::FilterCriteria;
    use crate::provider::testing::{opportunity, StubProvider};
    use crate::provider::FetchState;
    use crate::types::EntityId;

    fn fast(max_iterations: Option<u64>) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(10),
            criteria: FilterCriteria::default(),
            max_iterations,
        }
    }

    #[tokio::test]
    async fn publishes_ranked_updates_until_the_cap() {
        let stub = Arc::new(StubProvider::with_opportunities(
            "9",
            vec![
                opportunity("1X2", "home", 2.0, 0.5, 5.0),
                opportunity("BTTS", "yes", 1.9, 0.6, 14.0),
                opportunity("1X2", "draw", 3.4, 0.3, 2.0),
            ],
        ));
        let (handle, mut updates) = spawn_poller(stub.clone(), EntityId::from("9"), fast(Some(2)));

        let first = timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("first update in time")
            .expect("first update");
        assert_eq!(first.iteration, 1);
        let ranked = first.state.ready().expect("ready");
        let evs: Vec<f64> = ranked.iter().map(|o| o.ev_percent).collect();
        assert_eq!(evs, vec![14.0, 5.0]);

        let second = timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("second update in time")
            .expect("second update");
        assert_eq!(second.iteration, 2);

        let closed = timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("channel closes");
        assert!(closed.is_none());
        assert_eq!(stub.call_count(), 2);
        handle.stop().await;
    }

    #[tokio::test]
    async fn failures_are_published_and_polling_continues() {
        let stub = Arc::new(StubProvider::with_opportunities(
            "9",
            vec![opportunity("1X2", "home", 2.0, 0.5, 5.0)],
        ));
        stub.set_failing(true);
        let (handle, mut updates) = spawn_poller(stub.clone(), EntityId::from("9"), fast(None));

        let failed = timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("update in time")
            .expect("update");
        assert!(matches!(failed.state, FetchState::Failed(ref msg) if msg.contains("down")));

        stub.set_failing(false);
        let recovered = loop {
            let update = timeout(Duration::from_secs(2), updates.recv())
                .await
                .expect("update in time")
                .expect("update");
            if update.state.ready().is_some() {
                break update;
            }
        };
        assert!(recovered.iteration >= 2);
        handle.stop().await;
    }

    #[tokio::test]
    async fn cancel_stops_further_fetches() {
        let stub = Arc::new(StubProvider::with_opportunities("9", Vec::new()));
        let config = PollerConfig {
            interval: Duration::from_secs(3_600),
            ..fast(None)
        };
        let (handle, mut updates) = spawn_poller(stub.clone(), EntityId::from("9"), config);

        timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("immediate first fetch")
            .expect("update");
        handle.cancel();
        let closed = timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("channel closes after cancel");
        assert!(closed.is_none());
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_task() {
        let stub = Arc::new(StubProvider::with_opportunities("9", Vec::new()));
        let config = PollerConfig {
            interval: Duration::from_secs(3_600),
            ..fast(None)
        };
        let (handle, mut updates) = spawn_poller(stub, EntityId::from("9"), config);
        updates.recv().await.expect("first update");
        drop(handle);
        let closed = timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("channel closes after drop");
        assert!(closed.is_none());
    }
}
