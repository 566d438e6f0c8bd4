use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use prometheus::IntCounter;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::event::StatusEvent;
use crate::models::order::{Order, OrderStatus};
use crate::store::OrderStore;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// External messaging boundary for the "status card": one chat message per
/// order, replaced on every transition. Implementations wrap Telegram,
/// WhatsApp or push transports; the core only sees this contract.
pub trait StatusChannel: Send + Sync {
    fn delete_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> BoxFuture<'_, Result<(), ChannelError>>;

    /// Sends a new status card and returns its message id.
    fn send_status_card(
        &self,
        chat_id: i64,
        text: String,
    ) -> BoxFuture<'_, Result<i64, ChannelError>>;
}

/// Default channel: logs instead of talking to a real transport. Hands out
/// synthetic message ids so the replace-on-transition flow stays exercised.
#[derive(Default)]
pub struct LogChannel {
    next_id: AtomicI64,
}

impl StatusChannel for LogChannel {
    fn delete_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> BoxFuture<'_, Result<(), ChannelError>> {
        Box::pin(async move {
            debug!(chat_id, message_id, "status card deleted");
            Ok(())
        })
    }

    fn send_status_card(
        &self,
        chat_id: i64,
        text: String,
    ) -> BoxFuture<'_, Result<i64, ChannelError>> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Box::pin(async move {
            debug!(chat_id, message_id, text = %text, "status card sent");
            Ok(message_id)
        })
    }
}

/// Fan-out point for domain events. Everything here is best-effort: a dead
/// broadcast receiver or an unreachable channel is logged and counted,
/// never propagated back to the transition that triggered it.
pub struct Notifier {
    events_tx: broadcast::Sender<StatusEvent>,
    channel: Arc<dyn StatusChannel>,
    failures: IntCounter,
}

impl Notifier {
    pub fn new(
        event_buffer_size: usize,
        channel: Arc<dyn StatusChannel>,
        failures: IntCounter,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            events_tx,
            channel,
            failures,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events_tx.subscribe()
    }

    pub async fn publish(&self, orders: &OrderStore, order: &Order, previous: OrderStatus) {
        let event = StatusEvent {
            order_id: order.id,
            sequence: order.sequence.clone(),
            kind: order.kind,
            previous,
            current: order.status,
            courier_id: order.assigned_courier,
            occurred_at: Utc::now(),
        };
        let _ = self.events_tx.send(event);

        let Some(chat) = order.chat.clone() else {
            return;
        };

        if let Some(old_message) = chat.last_message_id {
            if let Err(err) = self.channel.delete_message(chat.chat_id, old_message).await {
                warn!(order_id = %order.id, error = %err, "failed to delete old status card");
                self.failures.inc();
            }
        }

        match self
            .channel
            .send_status_card(chat.chat_id, status_card_text(order))
            .await
        {
            Ok(message_id) => {
                // A lost id only means the next transition sends a fresh
                // card instead of replacing this one.
                let _ = orders.try_update(&order.id, |stored| {
                    if let Some(chat) = stored.chat.as_mut() {
                        chat.last_message_id = Some(message_id);
                    }
                    Ok(())
                });
            }
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "failed to send status card");
                self.failures.inc();
            }
        }
    }
}

fn status_card_text(order: &Order) -> String {
    format!("Order {} is now {}", order.sequence, order.status)
}
