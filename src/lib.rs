//! logrelay: log event dispatch, live streaming and cached log queries.
//!
//! [`Pipeline`] wires the layers together and is what the binary and the
//! integration harnesses run against.
//!
//! # Architecture
//!
//! ```text
//! Logger / stdin ──► EventBus ──► sink listener ──► LogSink ◄── QueryCache ◄── GET /logs
//!                        │
//!                        └──────► relay listener ──► StreamBroadcaster ──► ws clients
//! ```

pub mod ingest;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use logrelay_core::config::Config;
use logrelay_core::{
    sink, EventBus, LogLevel, LogSink, Logger, QueryCache, ReservedDefaults, Result, Subscription,
};
use logrelay_stream::{query_routes, relay, StreamBroadcaster};
use tracing::info;

/// The assembled pipeline: one bus, one sink, one broadcaster, one cache.
pub struct Pipeline {
    config: Config,
    bus: EventBus,
    logger: Logger,
    broadcaster: StreamBroadcaster,
    query: Arc<QueryCache>,
    sink_subscriptions: Vec<Subscription>,
    relay_subscriptions: Mutex<Vec<Subscription>>,
}

impl Pipeline {
    /// Initialize the bus and attach the persistence and relay listeners on
    /// every level. Nothing is bound until [`start`](Self::start).
    pub fn build(config: Config, sink: Arc<dyn LogSink>) -> Result<Self> {
        config.validate()?;

        let bus = EventBus::new(config.bus.failure_policy);
        bus.initialize();

        let defaults = ReservedDefaults::for_agent(config.store.agent_id.clone());
        let sink_subscriptions = sink::attach(
            &bus,
            Arc::clone(&sink),
            defaults.clone(),
            config.bus.sink_priority,
        )?;

        let broadcaster = StreamBroadcaster::new();
        let relay_subscriptions = Mutex::new(relay::attach(
            &bus,
            &broadcaster,
            &LogLevel::ALL,
            config.bus.relay_priority,
        )?);

        let query = Arc::new(QueryCache::with_ttl(sink, config.query.cache_ttl()));
        let logger = Logger::new(bus.clone(), defaults);

        Ok(Self {
            config,
            bus,
            logger,
            broadcaster,
            query,
            sink_subscriptions,
            relay_subscriptions,
        })
    }

    /// Serve the stream and `GET /logs` on the configured address. After a
    /// [`shutdown`](Self::shutdown) the relay is attached again first.
    pub async fn start(&self) -> Result<SocketAddr> {
        {
            let mut relay_subscriptions = self.relay_subscriptions();
            if relay_subscriptions.is_empty() {
                *relay_subscriptions = relay::attach(
                    &self.bus,
                    &self.broadcaster,
                    &LogLevel::ALL,
                    self.config.bus.relay_priority,
                )?;
            }
        }
        let routes = query_routes(Arc::clone(&self.query), self.config.query.default_page_size);
        let addr = self
            .broadcaster
            .start_with(&self.config.stream.addr(), routes)
            .await?;
        info!(%addr, policy = ?self.bus.policy(), "logrelay pipeline started");
        Ok(addr)
    }

    /// Detach the relay, close every stream client and stop the server.
    /// The bus and the sink listener stay usable.
    pub async fn shutdown(&self) {
        let detached: Vec<Subscription> = self.relay_subscriptions().drain(..).collect();
        for subscription in detached {
            subscription.unsubscribe();
        }
        self.broadcaster.shutdown().await;
        self.query.invalidate_all();
        info!("logrelay pipeline stopped");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn broadcaster(&self) -> &StreamBroadcaster {
        &self.broadcaster
    }

    pub fn query(&self) -> &Arc<QueryCache> {
        &self.query
    }

    pub fn sink_subscriptions(&self) -> &[Subscription] {
        &self.sink_subscriptions
    }

    fn relay_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.relay_subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
