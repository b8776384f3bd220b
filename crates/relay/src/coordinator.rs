use std::{
    collections::HashSet,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

#[cfg(feature = "metrics")]
use mirror_metrics::{channels as channel_metrics, counter, labels, relay as relay_metrics};
use {
    futures::future::join_all,
    mirror_channels::ChannelRegistry,
    mirror_common::{ChannelId, MessageKind, MessageRef, SourceMessage, UserId},
    mirror_config::RelayConfig,
    mirror_routing::{RouteEntry, RoutingTable},
    tokio::{sync::watch, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, trace, warn},
};

use crate::{Delivered, DeliveryEngine, EditSyncTracker, Result, filter::skip_reason};

/// Timing of the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between readiness and the first iteration.
    pub start_delay: Duration,
    /// Pause between iterations.
    pub interval: Duration,
    /// Messages per history page; a full first page triggers deeper paging.
    pub page_size: usize,
    /// Pause after each watched message compared.
    pub entry_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl PollSettings {
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            start_delay: Duration::from_millis(config.poll_start_delay_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
            page_size: config.poll_page_size,
            entry_delay: Duration::from_millis(config.poll_entry_delay_ms),
        }
    }
}

/// Entry point for chat session notifications.
///
/// Message handlers wait until [`start`](Self::start) has preloaded the
/// destinations. Errors are logged per route and never escape a handler.
pub struct RelayCoordinator {
    routes: Arc<RoutingTable>,
    channels: Arc<ChannelRegistry>,
    engine: Arc<DeliveryEngine>,
    tracker: Arc<EditSyncTracker>,
    poll: PollSettings,
    self_id: OnceLock<UserId>,
    /// Destinations that are not text channels; their routes are skipped.
    unavailable: Mutex<HashSet<ChannelId>>,
    ready: watch::Sender<bool>,
}

impl RelayCoordinator {
    pub fn new(
        routes: Arc<RoutingTable>,
        channels: Arc<ChannelRegistry>,
        engine: Arc<DeliveryEngine>,
        tracker: Arc<EditSyncTracker>,
        poll: PollSettings,
    ) -> Self {
        Self {
            routes,
            channels,
            engine,
            tracker,
            poll,
            self_id: OnceLock::new(),
            unavailable: Mutex::new(HashSet::new()),
            ready: watch::Sender::new(false),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    #[must_use]
    pub fn tracker(&self) -> &EditSyncTracker {
        &self.tracker
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Called once the chat session is ready: remembers the relay's own
    /// account and resolves every destination once.
    ///
    /// Destinations that are not text channels are disabled for the process;
    /// other failures are resolved again on first use. Returns every
    /// destination that could not be resolved now.
    pub async fn start(&self, self_id: UserId) -> Vec<ChannelId> {
        if self.self_id.set(self_id).is_err() {
            debug!("session ready again, channels already loaded");
            return Vec::new();
        }

        info!(destinations = self.routes.destinations().len(), "loading channels");
        let failures = self.channels.preload(self.routes.destinations()).await;
        let mut unusable = Vec::new();
        for (id, e) in &failures {
            #[cfg(feature = "metrics")]
            counter!(channel_metrics::RESOLUTION_FAILURES_TOTAL).increment(1);
            if e.is_resolution_failure() {
                error!(destination = %id, "destination unusable, its routes are disabled");
                unusable.push(*id);
            } else {
                warn!(destination = %id, "destination not loaded, retrying on first use");
            }
        }
        self.unavailable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(unusable);

        self.ready.send_replace(true);
        info!("channels loaded");
        failures.into_iter().map(|(id, _)| id).collect()
    }

    async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = ready.wait_for(|r| *r).await;
    }

    fn is_relayable(&self, message: &SourceMessage) -> bool {
        if self.self_id.get() == Some(&message.author.id) {
            return false;
        }
        message.kind == MessageKind::Default
    }

    fn is_unavailable(&self, destination: ChannelId) -> bool {
        self.unavailable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&destination)
    }

    /// Forward a new message along every matching route.
    ///
    /// Destinations are served concurrently; watch entries are recorded in
    /// route order afterwards. Returns the number of successful deliveries.
    pub async fn on_message_created(&self, message: &SourceMessage) -> usize {
        self.wait_ready().await;
        if !self.is_relayable(message) {
            trace!(message_id = %message.id, "ignoring own or system message");
            return 0;
        }

        let routes: Vec<&RouteEntry> = self
            .routes
            .lookup(message.channel_id)
            .iter()
            .filter(|route| self.accepts(message, route))
            .collect();
        if routes.is_empty() {
            return 0;
        }

        let results = join_all(routes.iter().map(|route| self.forward(message, route))).await;

        let mut delivered = 0;
        for (route, result) in routes.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    self.tracker.record(message, outcome);
                    delivered += 1;
                },
                Err(e) => error!(
                    source = %message.channel_id,
                    destination = %route.destination,
                    message_id = %message.id,
                    error = %e,
                    "failed to forward message"
                ),
            }
        }
        delivered
    }

    fn accepts(&self, message: &SourceMessage, route: &RouteEntry) -> bool {
        if self.is_unavailable(route.destination) {
            debug!(destination = %route.destination, "skipping unusable destination");
            return false;
        }
        match skip_reason(message, &route.options) {
            None => true,
            Some(reason) => {
                debug!(
                    message_id = %message.id,
                    destination = %route.destination,
                    reason = reason.as_str(),
                    "message filtered"
                );
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::MESSAGES_FILTERED_TOTAL, labels::REASON => reason.as_str())
                    .increment(1);
                false
            },
        }
    }

    async fn forward(&self, message: &SourceMessage, route: &RouteEntry) -> Result<Delivered> {
        let channel = self.channels.get(route.destination).await?;
        self.engine
            .deliver(&*channel, message, &route.options, None)
            .await
    }

    /// Native edit notification. `message` must be the full, current
    /// version of the edited message.
    pub async fn on_message_updated(&self, message: &SourceMessage) -> usize {
        self.wait_ready().await;
        self.tracker.on_source_edited(message).await
    }

    pub async fn on_message_deleted(&self, original: MessageRef) -> usize {
        self.wait_ready().await;
        self.tracker.on_source_deleted(original).await
    }

    /// One pass over every source that needs polling. Returns the number of
    /// copies updated.
    pub async fn reconcile_once(&self, cancel: &CancellationToken) -> usize {
        let mut updated = 0;
        for source in self.routes.sources() {
            if cancel.is_cancelled() {
                break;
            }
            let depth = self.routes.poll_depth(source);
            if depth == 0 {
                continue;
            }

            let channel = match self.channels.get(source).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(source = %source, error = %e, "cannot poll source");
                    continue;
                },
            };
            if channel.pushes_edits() {
                continue;
            }

            match self
                .tracker
                .reconcile(&*channel, depth, self.poll.page_size, self.poll.entry_delay)
                .await
            {
                Ok(n) => updated += n,
                Err(e) => warn!(source = %source, error = %e, "failed to fetch recent messages"),
            }
        }
        updated
    }

    /// Run the reconciliation loop until `cancel` fires.
    pub fn spawn_reconciler(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = coordinator.wait_ready() => {},
            }
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(coordinator.poll.start_delay) => {},
            }
            debug!("reconciliation loop started");

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(coordinator.poll.interval) => {},
                }
                let updated = coordinator.reconcile_once(&cancel).await;
                if updated > 0 {
                    debug!(updated, "reconciliation pass finished");
                }
            }
            debug!("reconciliation loop stopped");
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            RetryPolicy,
            testing::{FakeChannel, FakeEndpoint, FakeResolver, message},
        },
        mirror_config::{AuthorRule, RedirectConfig, RouteOptions},
        mirror_store::PersistentStore,
        tempfile::TempDir,
    };

    const SELF_ID: UserId = UserId(999);

    struct Harness {
        _tmp: TempDir,
        coordinator: Arc<RelayCoordinator>,
    }

    async fn harness(redirects: Vec<RedirectConfig>, channels: Vec<Arc<FakeChannel>>) -> Harness {
        let resolver = channels
            .into_iter()
            .fold(FakeResolver::default(), FakeResolver::with);
        harness_with(redirects, resolver).await
    }

    async fn harness_with(redirects: Vec<RedirectConfig>, resolver: FakeResolver) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(
            PersistentStore::load(tmp.path().join("db.json"))
                .await
                .unwrap(),
        );
        let registry = Arc::new(ChannelRegistry::new(Arc::new(resolver)));
        let engine = Arc::new(DeliveryEngine::new(RetryPolicy {
            retries: 1,
            backoff: Duration::ZERO,
        }));
        let tracker = Arc::new(EditSyncTracker::new(
            store,
            Arc::clone(&engine),
            Arc::clone(&registry),
        ));
        let routes = Arc::new(RoutingTable::build(&redirects).unwrap());
        let poll = PollSettings {
            start_delay: Duration::ZERO,
            interval: Duration::from_millis(5),
            page_size: 50,
            entry_delay: Duration::ZERO,
        };
        Harness {
            _tmp: tmp,
            coordinator: Arc::new(RelayCoordinator::new(
                routes, registry, engine, tracker, poll,
            )),
        }
    }

    fn redirect(sources: &[u64], destinations: &[u64], options: RouteOptions) -> RedirectConfig {
        RedirectConfig {
            sources: sources.iter().map(u64::to_string).collect(),
            destinations: destinations.iter().map(u64::to_string).collect(),
            options,
        }
    }

    #[tokio::test]
    async fn forwards_to_every_destination_and_records() {
        let a = Arc::new(FakeChannel::new(2));
        let b = Arc::new(FakeChannel::new(3));
        let h = harness(
            vec![redirect(&[1], &[2, 3], RouteOptions::default())],
            vec![a.clone(), b.clone()],
        )
        .await;
        assert!(h.coordinator.start(SELF_ID).await.is_empty());

        let delivered = h.coordinator.on_message_created(&message(1, 10, "hi")).await;
        assert_eq!(delivered, 2);
        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
        assert_eq!(h.coordinator.tracker().len(), 2);
    }

    #[tokio::test]
    async fn unrouted_own_and_system_messages_are_ignored() {
        let dest = Arc::new(FakeChannel::new(2));
        let h = harness(
            vec![redirect(&[1], &[2], RouteOptions::default())],
            vec![dest.clone()],
        )
        .await;
        h.coordinator.start(SELF_ID).await;

        assert_eq!(h.coordinator.on_message_created(&message(5, 10, "hi")).await, 0);

        let mut own = message(1, 11, "hi");
        own.author.id = SELF_ID;
        assert_eq!(h.coordinator.on_message_created(&own).await, 0);

        let mut pinned = message(1, 12, "");
        pinned.kind = MessageKind::System;
        assert_eq!(h.coordinator.on_message_created(&pinned).await, 0);

        assert!(dest.sent().is_empty());
    }

    #[tokio::test]
    async fn short_message_is_skipped_without_watch_entry() {
        let dest = Arc::new(FakeChannel::new(2));
        let options = RouteOptions {
            min_length: Some(10),
            ..Default::default()
        };
        let h = harness(vec![redirect(&[1], &[2], options)], vec![dest.clone()]).await;
        h.coordinator.start(SELF_ID).await;

        assert_eq!(h.coordinator.on_message_created(&message(1, 10, "abc")).await, 0);
        assert!(dest.sent().is_empty());
        assert!(h.coordinator.tracker().is_empty());
    }

    #[tokio::test]
    async fn allow_list_of_bots_skips_humans() {
        let dest = Arc::new(FakeChannel::new(2));
        let options = RouteOptions {
            allow_list: Some(vec![AuthorRule::Bots]),
            ..Default::default()
        };
        let h = harness(vec![redirect(&[1], &[2], options)], vec![dest.clone()]).await;
        h.coordinator.start(SELF_ID).await;

        assert_eq!(h.coordinator.on_message_created(&message(1, 10, "hello")).await, 0);
        assert!(dest.sent().is_empty());
    }

    #[tokio::test]
    async fn unusable_destination_only_disables_its_routes() {
        let good = Arc::new(FakeChannel::new(2));
        let h = harness(
            vec![redirect(&[1], &[2, 404], RouteOptions::default())],
            vec![good.clone()],
        )
        .await;

        let failed = h.coordinator.start(SELF_ID).await;
        assert_eq!(failed, vec![ChannelId(404)]);

        assert_eq!(h.coordinator.on_message_created(&message(1, 10, "hi")).await, 1);
        assert_eq!(good.sent().len(), 1);
    }

    #[tokio::test]
    async fn temporarily_unavailable_destination_is_retried_on_use() {
        let flaky = Arc::new(FakeChannel::new(2));
        let resolver = FakeResolver::default()
            .with(flaky.clone())
            .unavailable_for(2, 1);
        let h = harness_with(
            vec![redirect(&[1], &[2], RouteOptions::default())],
            resolver,
        )
        .await;

        assert_eq!(h.coordinator.start(SELF_ID).await, vec![ChannelId(2)]);

        assert_eq!(h.coordinator.on_message_created(&message(1, 10, "hi")).await, 1);
        assert_eq!(flaky.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_is_contained() {
        let broken = Arc::new(FakeChannel::new(2));
        broken.fail_sends.store(1, std::sync::atomic::Ordering::SeqCst);
        let good = Arc::new(FakeChannel::new(3));
        let h = harness(
            vec![redirect(&[1], &[2, 3], RouteOptions::default())],
            vec![broken.clone(), good.clone()],
        )
        .await;
        h.coordinator.start(SELF_ID).await;

        assert_eq!(h.coordinator.on_message_created(&message(1, 10, "hi")).await, 1);
        assert_eq!(h.coordinator.tracker().len(), 1);
    }

    #[tokio::test]
    async fn fallback_options_are_remembered_for_edits() {
        let endpoint = Arc::new(FakeEndpoint::failing(2));
        let dest = Arc::new(FakeChannel::new(2).with_endpoint(endpoint.clone()));
        let options = RouteOptions {
            webhook: true,
            ..Default::default()
        };
        let h = harness(vec![redirect(&[1], &[2], options)], vec![dest.clone()]).await;
        h.coordinator.start(SELF_ID).await;

        let original = message(1, 10, "before");
        assert_eq!(h.coordinator.on_message_created(&original).await, 1);
        assert_eq!(dest.sent().len(), 1);
        assert!(!h.coordinator.tracker().entries()[0].options.webhook);

        let mut edited = original.clone();
        edited.content = "after".into();
        assert_eq!(h.coordinator.on_message_updated(&edited).await, 1);
        assert_eq!(dest.edited().len(), 1);
        assert!(endpoint.edited().is_empty());
    }

    #[tokio::test]
    async fn delete_notification_reaches_copies() {
        let dest = Arc::new(FakeChannel::new(2));
        let options = RouteOptions {
            allow_delete: true,
            ..Default::default()
        };
        let h = harness(vec![redirect(&[1], &[2], options)], vec![dest.clone()]).await;
        h.coordinator.start(SELF_ID).await;

        let original = message(1, 10, "hi");
        h.coordinator.on_message_created(&original).await;
        assert_eq!(h.coordinator.on_message_deleted(original.reference()).await, 1);
        assert_eq!(dest.deleted().len(), 1);
        assert!(h.coordinator.tracker().is_empty());
    }

    #[tokio::test]
    async fn handlers_wait_for_start() {
        let dest = Arc::new(FakeChannel::new(2));
        let h = harness(
            vec![redirect(&[1], &[2], RouteOptions::default())],
            vec![dest.clone()],
        )
        .await;

        let coordinator = Arc::clone(&h.coordinator);
        let pending = tokio::spawn(async move {
            coordinator.on_message_created(&message(1, 10, "early")).await
        });
        tokio::task::yield_now().await;
        assert!(dest.sent().is_empty());

        h.coordinator.start(SELF_ID).await;
        assert_eq!(pending.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reconciler_polls_only_sources_without_edit_push() {
        let polled = Arc::new(FakeChannel::polled(1));
        let pushed = Arc::new(FakeChannel::new(4));
        let dest = Arc::new(FakeChannel::new(2));
        let h = harness(
            vec![redirect(&[1, 4], &[2], RouteOptions::default())],
            vec![polled.clone(), pushed.clone(), dest.clone()],
        )
        .await;
        h.coordinator.start(SELF_ID).await;

        let original = message(1, 10, "before");
        h.coordinator.on_message_created(&original).await;
        h.coordinator.on_message_created(&message(4, 11, "x")).await;

        let mut edited = original.clone();
        edited.content = "after".into();
        polled.set_history(vec![edited]);

        let cancel = CancellationToken::new();
        assert_eq!(h.coordinator.reconcile_once(&cancel).await, 1);
        assert_eq!(dest.edited()[0].1.content, "after");
        assert_eq!(
            pushed.fetches.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn reconciler_stops_on_cancel() {
        let h = harness(vec![redirect(&[1], &[2], RouteOptions::default())], vec![
            Arc::new(FakeChannel::new(2)),
        ])
        .await;
        h.coordinator.start(SELF_ID).await;

        let cancel = CancellationToken::new();
        let handle = h.coordinator.spawn_reconciler(cancel.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
