//! Assembly of the relay engine from a loaded configuration.

use std::sync::Arc;

use {
    mirror_channels::{ChannelRegistry, ChannelResolver},
    mirror_config::MirrorConfig,
    mirror_discord::DiscordResolver,
    mirror_relay::{
        DeliveryEngine, EditSyncTracker, PollSettings, RelayCoordinator, RetryPolicy,
        WatchDocument,
    },
    mirror_routing::RoutingTable,
    mirror_store::PersistentStore,
};

pub struct App {
    pub coordinator: Arc<RelayCoordinator>,
    pub store: Arc<PersistentStore<WatchDocument>>,
    pub resolver: Arc<DiscordResolver>,
}

impl App {
    /// Build the routing table, load the watch-list and wire the engine.
    /// Nothing talks to Discord until the resolver is attached on ready.
    pub async fn build(config: &MirrorConfig) -> anyhow::Result<Self> {
        let relay = &config.relay;
        let routes = Arc::new(RoutingTable::build(&config.redirects)?);
        let store = Arc::new(PersistentStore::load(relay.db_path.clone()).await?);

        let resolver = Arc::new(DiscordResolver::new(relay.webhook_name.clone()));
        let channels = Arc::new(ChannelRegistry::new(
            Arc::clone(&resolver) as Arc<dyn ChannelResolver>
        ));
        let engine = Arc::new(DeliveryEngine::new(RetryPolicy::from_config(relay)));
        let tracker = Arc::new(EditSyncTracker::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            Arc::clone(&channels),
        ));
        let coordinator = Arc::new(RelayCoordinator::new(
            routes,
            channels,
            engine,
            tracker,
            PollSettings::from_config(relay),
        ));

        Ok(Self {
            coordinator,
            store,
            resolver,
        })
    }
}
