use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::models::order::Order;
use crate::state::AppState;

/// Hands an order to the dispatch loop without ever blocking the caller.
/// A full queue drops the dispatch attempt: the order is persisted and
/// stays claimable through the pull path, only the proactive push is lost.
/// The loop itself re-enqueues through here too, so it must never be able
/// to block on its own channel.
pub fn enqueue_order(state: &AppState, order: Order) {
    match state.dispatch_tx.try_send(order) {
        Ok(()) => {
            state.metrics.dispatch_queue_depth.inc();
        }
        Err(TrySendError::Full(order)) => {
            warn!(order_id = %order.id, "dispatch queue full; order stays in the pull pool");
        }
        Err(TrySendError::Closed(order)) => {
            warn!(order_id = %order.id, "dispatch engine not running; order stays in the pull pool");
        }
    }
}
