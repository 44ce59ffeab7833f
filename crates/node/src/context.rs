//! Node wiring
//!
//! One `NodeContext` owns every component. Nothing is global.

use crate::config::{LedgerKind, NodeConfig, StoreKind};
use admin_server::{AdminContext, EventFeed};
use anyhow::Context;
use ledger_bridge::{
    ConnectionMonitor, EventMonitor, LedgerClient, MemoryLedger, RpcLedgerClient,
};
use std::sync::Arc;
use vote_sync::{
    MemoryVoteStore, SledVoteStore, SyncManager, TracingObserver, VoteOrchestrator, VoteStore,
};

pub struct NodeContext {
    pub monitor: Arc<ConnectionMonitor>,
    pub sync: Arc<SyncManager>,
    pub events: Arc<EventMonitor>,
    pub admin: Arc<AdminContext>,
    /// Kept for flushing on shutdown
    sled: Option<Arc<SledVoteStore>>,
}

impl NodeContext {
    /// Build and wire every component, then re-queue votes left pending by a
    /// previous run. Nothing is started.
    pub fn build(config: &NodeConfig) -> anyhow::Result<Self> {
        let ledger: Arc<dyn LedgerClient> = match config.ledger {
            LedgerKind::Memory => {
                tracing::warn!("Using the in-memory ledger; votes are not durable on any chain");
                Arc::new(MemoryLedger::new())
            }
            LedgerKind::Rpc => Arc::new(RpcLedgerClient::connect(config.rpc_ledger_config()?)?),
        };

        let sled = match config.store {
            StoreKind::Memory => None,
            StoreKind::Sled => {
                std::fs::create_dir_all(&config.data_dir)?;
                let store = SledVoteStore::open(config.data_dir.join("votes"))
                    .context("opening vote store")?;
                Some(Arc::new(store))
            }
        };
        let store: Arc<dyn VoteStore> = match &sled {
            Some(sled) => sled.clone(),
            None => Arc::new(MemoryVoteStore::new()),
        };

        let feed = Arc::new(EventFeed::default());

        let monitor = Arc::new(ConnectionMonitor::new(ledger.clone(), config.monitor_config()));
        monitor.add_observer(Arc::new(TracingObserver));
        monitor.add_observer(feed.clone());

        let sync = Arc::new(SyncManager::new(ledger.clone(), store.clone(), config.sync_config()));
        sync.add_observer(Arc::new(TracingObserver));
        sync.add_observer(feed.clone());

        let events = Arc::new(EventMonitor::new(ledger.clone()));
        let event_feed = feed.clone();
        events.set_callback(move |event| event_feed.on_vote_cast(event));

        let orchestrator = Arc::new(VoteOrchestrator::new(
            ledger,
            store.clone(),
            sync.clone(),
            monitor.clone(),
            config.orchestrator_config(),
        ));

        let admin = Arc::new(AdminContext::new(
            orchestrator,
            sync.clone(),
            monitor.clone(),
            store,
            feed,
        )?);

        sync.recover_from_store()?;

        Ok(Self {
            monitor,
            sync,
            events,
            admin,
            sled,
        })
    }

    /// Start the probe, sync and event loops
    pub async fn start(&self) -> anyhow::Result<()> {
        self.monitor.start()?;
        self.sync.start()?;

        // The node is useful without the event feed
        if let Err(e) = self.events.start().await {
            tracing::warn!("Vote-cast events unavailable: {}", e);
        }
        Ok(())
    }

    /// Stop every loop and flush local state
    pub async fn stop(&self) {
        self.events.stop().await;
        self.sync.stop().await;
        self.monitor.stop().await;

        if let Some(sled) = &self.sled {
            if let Err(e) = sled.flush() {
                tracing::error!("Failed to flush vote store: {}", e);
            }
        }

        tracing::info!("{} votes still pending at shutdown", self.sync.pending_count());
    }
}
