use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderKind, OrderStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Courier,
    Staff,
    Customer,
}

const EXPRESS_FLOW: &[OrderStatus] = &[
    OrderStatus::Unassigned,
    OrderStatus::Pending,
    OrderStatus::Accepted,
    OrderStatus::AtStore,
    OrderStatus::PickedUp,
    OrderStatus::Delivered,
];

const APP_FLOW: &[OrderStatus] = &[
    OrderStatus::Unassigned,
    OrderStatus::Pending,
    OrderStatus::Accepted,
    OrderStatus::AtStore,
    OrderStatus::PickedUp,
    OrderStatus::EnRoute,
    OrderStatus::Delivered,
];

const PACKAGE_FLOW: &[OrderStatus] = &[
    OrderStatus::Unassigned,
    OrderStatus::Pending,
    OrderStatus::Accepted,
    OrderStatus::Collecting,
    OrderStatus::Collected,
    OrderStatus::Delivering,
    OrderStatus::Delivered,
];

pub fn progression(kind: OrderKind) -> &'static [OrderStatus] {
    match kind {
        OrderKind::Express => EXPRESS_FLOW,
        OrderKind::App => APP_FLOW,
        OrderKind::Package => PACKAGE_FLOW,
    }
}

/// The one status a kind may move to next, walking its flow in order.
pub fn successor(kind: OrderKind, status: OrderStatus) -> Option<OrderStatus> {
    let flow = progression(kind);
    flow.iter()
        .position(|s| *s == status)
        .and_then(|i| flow.get(i + 1))
        .copied()
}

/// Cancellation is only open before the courier starts moving.
fn can_cancel_from(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Unassigned | OrderStatus::Pending | OrderStatus::Accepted
    )
}

fn authorize(actor: Actor, requested: OrderStatus) -> Result<(), AppError> {
    match requested {
        OrderStatus::Cancelled if actor == Actor::Courier => Err(AppError::Validation(
            "only the customer or staff can cancel an order".to_string(),
        )),
        OrderStatus::Rejected if actor != Actor::Staff => Err(AppError::Validation(
            "only staff can reject an order".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Pure transition check: forward-only along the kind's flow, no skipping,
/// no repeats, terminal states frozen, cancel/reject short-circuits only
/// from their eligible sources.
pub fn validate(
    kind: OrderKind,
    current: OrderStatus,
    requested: OrderStatus,
) -> Result<(), AppError> {
    if current.is_terminal() {
        return Err(AppError::Terminal(current));
    }
    if requested == current {
        return Err(AppError::AlreadyInState(current));
    }

    match requested {
        OrderStatus::Cancelled => {
            if can_cancel_from(current) {
                Ok(())
            } else {
                Err(AppError::InvalidTransition {
                    from: current,
                    to: requested,
                })
            }
        }
        OrderStatus::Rejected => Ok(()),
        _ => {
            if successor(kind, current) == Some(requested) {
                Ok(())
            } else {
                Err(AppError::InvalidTransition {
                    from: current,
                    to: requested,
                })
            }
        }
    }
}

/// Applies one status change. Validation, the once-only milestone stamp and
/// the write all happen under the store's entry lock, so two handlers racing
/// on the same order serialize here. The notification at the end is
/// best-effort and never rolls the transition back.
pub async fn apply_transition(
    state: &AppState,
    order_id: Uuid,
    requested: OrderStatus,
    actor: Actor,
) -> Result<Order, AppError> {
    authorize(actor, requested)?;

    let now = Utc::now();
    let mut previous = OrderStatus::Unassigned;
    let mut resolved_courier: Option<Uuid> = None;

    let result = state.orders.try_update(&order_id, |order| {
        validate(order.kind, order.status, requested)?;
        previous = order.status;

        if let Some(slot) = order.milestones.slot_mut(requested) {
            if slot.is_some() {
                return Err(AppError::AlreadyInState(requested));
            }
            *slot = Some(now);
        }
        order.status = requested;

        if requested == OrderStatus::Rejected {
            resolved_courier = order.assigned_courier.take();
        } else if requested.is_terminal() {
            // Delivered and cancelled keep the assignment for audit.
            resolved_courier = order.assigned_courier;
        }
        Ok(())
    });

    let updated = match result {
        Ok(order) => order,
        Err(err) => {
            state
                .metrics
                .transitions_total
                .with_label_values(&["invalid"])
                .inc();
            return Err(err);
        }
    };

    // A terminal order no longer occupies its courier.
    if let Some(courier_id) = resolved_courier {
        if let Err(err) = state.couriers.mark_free(&courier_id) {
            warn!(courier_id = %courier_id, error = %err, "failed to free courier");
        }
    }

    // Whatever offer bookkeeping existed for this order is settled now.
    state.dispatch_pending.remove(&order_id);

    state
        .metrics
        .transitions_total
        .with_label_values(&["success"])
        .inc();
    info!(
        order_id = %updated.id,
        sequence = %updated.sequence,
        from = %previous,
        to = %requested,
        "status changed"
    );

    state.notifier.publish(&state.orders, &updated, previous).await;

    Ok(updated)
}
