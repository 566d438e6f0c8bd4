use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::queue::enqueue_order;
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Best-effort push loop for express orders: pops the oldest queued order,
/// offers it to the longest-waiting free courier and waits for the claim
/// that confirms the offer. No free courier means backoff and re-enqueue.
/// All bookkeeping is process-local; persisted orders survive a restart,
/// in-flight offers do not.
pub async fn run_dispatch_engine(state: Arc<AppState>, mut dispatch_rx: mpsc::Receiver<Order>) {
    info!("dispatch engine started");

    while let Some(order) = dispatch_rx.recv().await {
        state.metrics.dispatch_queue_depth.dec();

        let start = Instant::now();
        match offer_order(state.clone(), order).await {
            Ok(()) => {
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&["success"])
                    .observe(start.elapsed().as_secs_f64());
            }
            Err(err) => {
                state
                    .metrics
                    .dispatch_latency_seconds
                    .with_label_values(&["error"])
                    .observe(start.elapsed().as_secs_f64());
                error!(error = %err, "failed to dispatch order");
            }
        }
    }

    warn!("dispatch engine stopped: queue channel closed");
}

async fn offer_order(state: Arc<AppState>, order: Order) -> Result<(), AppError> {
    // Fresh read: the order may have been claimed or cancelled while queued.
    let Some(current) = state.orders.get(&order.id) else {
        return Ok(());
    };
    if current.status != OrderStatus::Unassigned || current.assigned_courier.is_some() {
        return Ok(());
    }

    let Some(courier) = state.couriers.free_couriers().into_iter().next() else {
        state
            .metrics
            .dispatch_offers_total
            .with_label_values(&["no_courier"])
            .inc();
        warn!(order_id = %current.id, "no free couriers; re-queueing after backoff");
        // The backoff runs off-loop so the queue keeps draining; sleeping
        // here would let a full channel wedge the loop on its own send.
        let worker = state.clone();
        tokio::spawn(async move {
            sleep(worker.dispatch_backoff).await;
            enqueue_order(&worker, current);
        });
        return Ok(());
    };

    let offered = state.orders.try_update(&order.id, |order| {
        if order.status != OrderStatus::Unassigned || order.assigned_courier.is_some() {
            return Err(AppError::OrderUnavailable);
        }
        order.status = OrderStatus::Pending;
        order.assigned_courier = Some(courier.id);
        Ok(())
    });

    let offered = match offered {
        Ok(order) => order,
        // Lost the race to a pull-based claim; nothing left to dispatch.
        Err(AppError::OrderUnavailable) => return Ok(()),
        Err(err) => return Err(err),
    };

    if let Err(err) = state.couriers.mark_busy(&courier.id) {
        warn!(courier_id = %courier.id, error = %err, "failed to mark courier busy");
    }

    state.dispatch_pending.insert(offered.id, Utc::now());
    state
        .metrics
        .dispatch_offers_total
        .with_label_values(&["offered"])
        .inc();
    info!(
        order_id = %offered.id,
        sequence = %offered.sequence,
        courier_id = %courier.id,
        "order offered to courier"
    );

    state
        .notifier
        .publish(&state.orders, &offered, OrderStatus::Unassigned)
        .await;

    let worker = state.clone();
    let courier_id = courier.id;
    let order_id = offered.id;
    tokio::spawn(async move {
        sleep(worker.response_timeout).await;
        expire_offer(worker, order_id, courier_id).await;
    });

    Ok(())
}

/// Runs once per offer, after the response window. A claim that confirmed
/// the offer already removed the pending entry, making this a no-op.
async fn expire_offer(state: Arc<AppState>, order_id: Uuid, courier_id: Uuid) {
    if state.dispatch_pending.remove(&order_id).is_none() {
        return;
    }

    let reset = state.orders.try_update(&order_id, |order| {
        if order.status != OrderStatus::Pending || order.assigned_courier != Some(courier_id) {
            return Err(AppError::OrderUnavailable);
        }
        order.status = OrderStatus::Unassigned;
        order.assigned_courier = None;
        Ok(())
    });

    let order = match reset {
        Ok(order) => order,
        // The order moved on without us; leave it alone.
        Err(_) => return,
    };

    if let Err(err) = state.couriers.mark_free(&courier_id) {
        warn!(courier_id = %courier_id, error = %err, "failed to free courier after expired offer");
    }

    state
        .metrics
        .dispatch_offers_total
        .with_label_values(&["expired"])
        .inc();
    warn!(order_id = %order_id, courier_id = %courier_id, "offer expired; re-queueing order");

    state
        .notifier
        .publish(&state.orders, &order, OrderStatus::Pending)
        .await;

    enqueue_order(&state, order);
}
