use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::models::order::Order;
use crate::notify::{LogChannel, Notifier, StatusChannel};
use crate::observability::metrics::Metrics;
use crate::store::sequence::SequenceCounters;
use crate::store::{CourierDirectory, OrderStore};

pub struct AppState {
    pub orders: OrderStore,
    pub couriers: CourierDirectory,
    pub sequences: SequenceCounters,
    pub dispatch_tx: mpsc::Sender<Order>,
    /// Offers awaiting a courier response, keyed by order id. An entry is
    /// removed either by the claim that confirms it or by the timeout task
    /// that recycles it. Process-local, lost on restart.
    pub dispatch_pending: DashMap<Uuid, DateTime<Utc>>,
    pub notifier: Notifier,
    pub metrics: Metrics,
    pub sequence_ceiling: u32,
    pub dispatch_backoff: Duration,
    pub response_timeout: Duration,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<Order>) {
        Self::with_channel(config, Arc::new(LogChannel::default()))
    }

    pub fn with_channel(
        config: &Config,
        channel: Arc<dyn StatusChannel>,
    ) -> (Self, mpsc::Receiver<Order>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let metrics = Metrics::new();
        let notifier = Notifier::new(
            config.event_buffer_size,
            channel,
            metrics.notification_failures_total.clone(),
        );

        (
            Self {
                orders: OrderStore::default(),
                couriers: CourierDirectory::default(),
                sequences: SequenceCounters::default(),
                dispatch_tx,
                dispatch_pending: DashMap::new(),
                notifier,
                metrics,
                sequence_ceiling: config.sequence_ceiling,
                dispatch_backoff: Duration::from_secs(config.dispatch_backoff_secs),
                response_timeout: Duration::from_secs(config.response_timeout_secs),
            },
            dispatch_rx,
        )
    }
}
