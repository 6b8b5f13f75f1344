use crate::db::PollStore;
use crate::sse::models::{ChannelHandle, Payload, PushError, Update};
use crate::sse::registry::Registry;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Handles in the registry snapshot the pass pushed to.
    pub recipients: usize,
    pub delivered: usize,
    /// Handles removed because their push failed.
    pub dropped: usize,
}

/// Fetches the current poll state and fans it out to every open viewer stream.
#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<dyn PollStore>,
    registry: Registry,
    push_timeout: Duration,
    seq: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new(store: Arc<dyn PollStore>, registry: Registry, push_timeout: Duration) -> Self {
        Broadcaster {
            store,
            registry,
            push_timeout,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sends the current state down one freshly opened stream.
    ///
    /// Returns `false` when nothing was sent: no poll configured, the fetch failed, or the
    /// handle rejected the push. A failed push also removes the handle.
    pub async fn push_initial(&self, handle: &ChannelHandle) -> bool {
        let Some(update) = self.fetch_update().await else {
            return false;
        };

        match handle.push(update, self.push_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = %handle.id(), error = %e, "initial push failed, dropping connection");
                self.registry.remove(handle.id());
                false
            }
        }
    }

    /// Pushes the current state to every registered stream. Never fails; a handle that
    /// cannot accept the push is removed and the others still receive it.
    pub async fn broadcast(&self) -> BroadcastReport {
        let Some(update) = self.fetch_update().await else {
            return BroadcastReport::default();
        };

        let mut pushes = Vec::new();
        self.registry.for_each(|handle| {
            let handle = handle.clone();
            let update = update.clone();
            let timeout = self.push_timeout;
            pushes.push(async move {
                let result = handle.push(update, timeout).await;
                (handle, result)
            });
        });

        let mut report = BroadcastReport {
            recipients: pushes.len(),
            ..BroadcastReport::default()
        };

        for (handle, result) in join_all(pushes).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.drop_handle(&handle, e);
                    report.dropped += 1;
                }
            }
        }

        info!(
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast poll update"
        );
        report
    }

    fn drop_handle(&self, handle: &ChannelHandle, reason: PushError) {
        if self.registry.remove(handle.id()) {
            debug!(connection = %handle.id(), error = %reason, "removed connection after failed push");
        }
    }

    /// One fetch and one encode per push cycle. The sequence number is taken before the
    /// read, so a higher number always reflects every vote recorded before a lower one.
    async fn fetch_update(&self) -> Option<Update> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = match self.store.current_poll().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("no poll configured, skipping push");
                return None;
            }
            Err(e) => {
                error!("Failed to load poll state: {}", e);
                return None;
            }
        };

        match serde_json::to_string(&snapshot) {
            Ok(json) => Some(Update::new(seq, Payload::from(json))),
            Err(e) => {
                error!("Failed to encode poll state: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryPollStore, PollSnapshot};
    use crate::sse::models::ChannelReceiver;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn setup(store: MemoryPollStore) -> (Arc<MemoryPollStore>, Registry, Broadcaster) {
        let store = Arc::new(store);
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(store.clone(), registry.clone(), TIMEOUT);
        (store, registry, broadcaster)
    }

    fn open(registry: &Registry) -> (ChannelHandle, ChannelReceiver) {
        let (handle, rx) = ChannelHandle::new(8);
        registry.add(handle.clone());
        (handle, rx)
    }

    fn decode(payload: &Payload) -> PollSnapshot {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn initial_push_then_vote_broadcast() {
        let (store, registry, broadcaster) = setup(MemoryPollStore::with_poll(
            "Favorite language?",
            &["Rust", "Go"],
        ));
        let (a, mut rx) = open(&registry);

        assert!(broadcaster.push_initial(&a).await);
        let first = decode(&rx.recv().await.unwrap());
        assert_eq!(first.total_votes, 0);
        assert!(rx.try_recv().is_err());

        let rust = store.option_id("Rust");
        store.record_vote(rust, "10.0.0.1").await.unwrap();
        let report = broadcaster.broadcast().await;

        assert_eq!(report.delivered, 1);
        let second = decode(&rx.recv().await.unwrap());
        assert_eq!(second.total_votes, 1);
        let tally = second.options.iter().find(|o| o.id == rust).unwrap();
        assert_eq!(tally.votes, 1);
        assert_eq!(
            second.total_votes,
            second.options.iter().map(|o| o.votes).sum::<i64>()
        );
    }

    #[tokio::test]
    async fn broken_handle_is_pruned_and_others_still_receive() {
        let (_store, registry, broadcaster) =
            setup(MemoryPollStore::with_poll("Poll", &["yes", "no"]));
        let (_a, mut rx_a) = open(&registry);
        let (b, rx_b) = open(&registry);
        drop(rx_b);

        let report = broadcaster.broadcast().await;

        assert_eq!(
            report,
            BroadcastReport {
                recipients: 2,
                delivered: 1,
                dropped: 1
            }
        );
        assert!(rx_a.recv().await.is_some());
        assert!(!registry.contains(b.id()));
        assert_eq!(registry.size(), 1);
    }

    #[tokio::test]
    async fn slow_handle_times_out_without_stalling_others() {
        let (_store, registry, broadcaster) =
            setup(MemoryPollStore::with_poll("Poll", &["yes", "no"]));
        let (slow, _slow_rx) = ChannelHandle::new(1);
        registry.add(slow.clone());
        slow.push(Update::new(0, Payload::from("backlog")), TIMEOUT)
            .await
            .unwrap();
        let (_fast, mut fast_rx) = open(&registry);

        let report = broadcaster.broadcast().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert!(!registry.contains(slow.id()));
        assert!(fast_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn every_handle_gets_the_same_payload() {
        let (store, registry, broadcaster) =
            setup(MemoryPollStore::with_poll("Poll", &["yes", "no"]));
        let mut receivers: Vec<_> = (0..4).map(|_| open(&registry).1).collect();

        broadcaster.broadcast().await;

        assert_eq!(store.reads(), 1);
        let payloads: Vec<Payload> = receivers
            .iter_mut()
            .map(|rx| rx.try_recv().unwrap())
            .collect();
        assert!(payloads.iter().all(|p| Arc::ptr_eq(p, &payloads[0])));
    }

    #[tokio::test]
    async fn fetch_failure_is_swallowed() {
        let (store, registry, broadcaster) =
            setup(MemoryPollStore::with_poll("Poll", &["yes", "no"]));
        let (a, mut rx) = open(&registry);
        store.set_fail_reads(true);

        assert!(!broadcaster.push_initial(&a).await);
        assert_eq!(broadcaster.broadcast().await, BroadcastReport::default());
        assert!(rx.try_recv().is_err());
        assert!(registry.contains(a.id()));
    }

    #[tokio::test]
    async fn no_poll_configured_sends_nothing() {
        let (_store, registry, broadcaster) = setup(MemoryPollStore::empty());
        let (a, mut rx) = open(&registry);

        assert!(!broadcaster.push_initial(&a).await);
        assert_eq!(broadcaster.broadcast().await.recipients, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_before_broadcast_receives_nothing() {
        let (_store, registry, broadcaster) =
            setup(MemoryPollStore::with_poll("Poll", &["yes", "no"]));
        let (a, mut rx) = open(&registry);
        registry.remove(a.id());

        let report = broadcaster.broadcast().await;

        assert_eq!(report, BroadcastReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_initial_push_removes_the_handle() {
        let (_store, registry, broadcaster) =
            setup(MemoryPollStore::with_poll("Poll", &["yes", "no"]));
        let (a, rx) = open(&registry);
        drop(rx);

        assert!(!broadcaster.push_initial(&a).await);
        assert!(!registry.contains(a.id()));
    }

    #[tokio::test]
    async fn slow_initial_fetch_never_overwrites_a_newer_broadcast() {
        let (store, registry, broadcaster) = setup(MemoryPollStore::with_poll(
            "Favorite language?",
            &["Rust", "Go"],
        ));
        let (a, mut rx) = open(&registry);
        let release = store.gate_next_read();

        let initial = tokio::spawn({
            let broadcaster = broadcaster.clone();
            let a = a.clone();
            async move { broadcaster.push_initial(&a).await }
        });
        while store.reads() == 0 {
            tokio::task::yield_now().await;
        }

        store
            .record_vote(store.option_id("Go"), "10.0.0.3")
            .await
            .unwrap();
        assert_eq!(broadcaster.broadcast().await.delivered, 1);
        release.send(()).unwrap();
        assert!(initial.await.unwrap());

        registry.remove(a.id());
        drop(a);
        drop(broadcaster);

        assert_eq!(decode(&rx.recv().await.unwrap()).total_votes, 1);
        // the initial snapshot was read before the vote and is skipped
        assert!(rx.recv().await.is_none());
    }
}
