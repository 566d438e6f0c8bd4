use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Binds a courier to an order, race-free. The precondition check and the
/// write happen inside one store entry lock: of two couriers racing for the
/// same order, exactly one wins and the other sees `OrderUnavailable`.
///
/// An order the dispatch queue already offered to this same courier (status
/// `Pending`, assignment set) is claimable by them; that claim doubles as
/// the offer confirmation.
pub async fn claim(state: &AppState, order_id: Uuid, courier_id: Uuid) -> Result<Order, AppError> {
    let courier = state
        .couriers
        .get(&courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;
    if !courier.enabled || !courier.active {
        return Err(AppError::Validation(
            "courier is not active".to_string(),
        ));
    }

    let now = Utc::now();
    let mut previous = OrderStatus::Unassigned;

    let result = state.orders.try_update(&order_id, |order| {
        let claimable = matches!(order.status, OrderStatus::Unassigned | OrderStatus::Pending)
            && order.assigned_courier.is_none_or(|c| c == courier_id);
        if !claimable {
            return Err(AppError::OrderUnavailable);
        }

        previous = order.status;
        order.status = OrderStatus::Accepted;
        order.assigned_courier = Some(courier_id);
        if order.milestones.accepted_at.is_none() {
            order.milestones.accepted_at = Some(now);
        }
        Ok(())
    });

    let updated = match result {
        Ok(order) => order,
        Err(err) => {
            let outcome = if matches!(err, AppError::OrderUnavailable) {
                "conflict"
            } else {
                "error"
            };
            state.metrics.claims_total.with_label_values(&[outcome]).inc();
            return Err(err);
        }
    };

    // If this was a dispatch offer, the claim confirms it.
    state.dispatch_pending.remove(&order_id);

    if let Err(err) = state.couriers.mark_busy(&courier_id) {
        warn!(courier_id = %courier_id, error = %err, "failed to mark courier busy");
    }

    state
        .metrics
        .claims_total
        .with_label_values(&["success"])
        .inc();
    info!(
        order_id = %updated.id,
        sequence = %updated.sequence,
        courier_id = %courier_id,
        "order claimed"
    );

    state.notifier.publish(&state.orders, &updated, previous).await;

    Ok(updated)
}

/// Undoes a claim. Only allowed before the goods are picked up; the order
/// returns to the claimable pool and the pre-pickup milestones are cleared
/// so the next claim can stamp them afresh.
pub async fn release(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let mut previous = OrderStatus::Unassigned;
    let mut released_courier: Option<Uuid> = None;

    let updated = state.orders.try_update(&order_id, |order| {
        if order.status.is_terminal() {
            return Err(AppError::Terminal(order.status));
        }
        let releasable = matches!(
            order.status,
            OrderStatus::Pending
                | OrderStatus::Accepted
                | OrderStatus::AtStore
                | OrderStatus::Collecting
        );
        if !releasable {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Unassigned,
            });
        }

        previous = order.status;
        released_courier = order.assigned_courier.take();
        order.status = OrderStatus::Unassigned;
        order.milestones.accepted_at = None;
        order.milestones.at_store_at = None;
        order.milestones.collecting_at = None;
        Ok(())
    })?;

    state.dispatch_pending.remove(&order_id);

    if let Some(courier_id) = released_courier {
        if let Err(err) = state.couriers.mark_free(&courier_id) {
            warn!(courier_id = %courier_id, error = %err, "failed to free courier");
        }
    }

    info!(
        order_id = %updated.id,
        sequence = %updated.sequence,
        from = %previous,
        "order released"
    );

    state.notifier.publish(&state.orders, &updated, previous).await;

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::config::Config;
    use crate::engine::transitions::{apply_transition, Actor};
    use crate::models::courier::{Courier, CourierState};
    use crate::models::order::{Milestones, OrderKind, Payment, Waypoint};

    fn app_state() -> Arc<AppState> {
        let (state, _rx) = AppState::new(&Config::default());
        Arc::new(state)
    }

    fn seed_order(state: &AppState, kind: OrderKind) -> Uuid {
        let order = Order {
            id: Uuid::new_v4(),
            sequence: state
                .sequences
                .next(kind.counter_name(), state.sequence_ceiling),
            kind,
            status: OrderStatus::Unassigned,
            pickup: Waypoint {
                address: "Av. Larco 101".to_string(),
                location: None,
            },
            dropoff: Waypoint {
                address: "Jr. Union 550".to_string(),
                location: None,
            },
            assigned_courier: None,
            payment: Payment::Yape,
            items: Vec::new(),
            subtotal: 0.0,
            delivery_fee: 8.0,
            total: 8.0,
            chat: None,
            milestones: Milestones::default(),
            created_at: Utc::now(),
        };
        let id = order.id;
        state.orders.insert(order);
        id
    }

    fn seed_courier(state: &AppState, name: &str) -> Uuid {
        let now = Utc::now();
        let courier = Courier {
            id: Uuid::new_v4(),
            name: name.to_string(),
            enabled: true,
            active: true,
            state: CourierState::Free,
            activated_at: now,
            updated_at: now,
        };
        let id = courier.id;
        state.couriers.insert(courier);
        id
    }

    #[tokio::test]
    async fn claim_binds_courier_and_marks_busy() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let courier_id = seed_courier(&state, "Rosa");

        let claimed = claim(&state, order_id, courier_id).await.unwrap();

        assert_eq!(claimed.status, OrderStatus::Accepted);
        assert_eq!(claimed.assigned_courier, Some(courier_id));
        assert!(claimed.milestones.accepted_at.is_some());
        assert_eq!(
            state.couriers.get(&courier_id).unwrap().state,
            CourierState::Busy
        );
    }

    #[tokio::test]
    async fn second_claim_loses_the_race() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let first = seed_courier(&state, "Rosa");
        let second = seed_courier(&state, "Miguel");

        claim(&state, order_id, first).await.unwrap();
        let err = claim(&state, order_id, second).await.unwrap_err();

        assert!(matches!(err, AppError::OrderUnavailable));
        assert_eq!(
            state.orders.get(&order_id).unwrap().assigned_courier,
            Some(first)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_admit_exactly_one_winner() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::App);
        let first = seed_courier(&state, "Rosa");
        let second = seed_courier(&state, "Miguel");

        let a = {
            let state = state.clone();
            tokio::spawn(async move { claim(&state, order_id, first).await })
        };
        let b = {
            let state = state.clone();
            tokio::spawn(async move { claim(&state, order_id, second).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let wins = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(AppError::OrderUnavailable)));
    }

    #[tokio::test]
    async fn inactive_courier_cannot_claim() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let courier_id = seed_courier(&state, "Rosa");
        state
            .couriers
            .try_update(&courier_id, |c| {
                c.active = false;
                c.state = CourierState::Inactive;
                Ok(())
            })
            .unwrap();

        let err = claim(&state, order_id, courier_id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_confirms_a_dispatch_offer_to_the_same_courier() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let courier_id = seed_courier(&state, "Rosa");

        state
            .orders
            .try_update(&order_id, |o| {
                o.status = OrderStatus::Pending;
                o.assigned_courier = Some(courier_id);
                Ok(())
            })
            .unwrap();
        state.dispatch_pending.insert(order_id, Utc::now());

        let claimed = claim(&state, order_id, courier_id).await.unwrap();
        assert_eq!(claimed.status, OrderStatus::Accepted);
        assert!(state.dispatch_pending.get(&order_id).is_none());
    }

    #[tokio::test]
    async fn other_couriers_cannot_steal_an_offered_order() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let offered_to = seed_courier(&state, "Rosa");
        let rival = seed_courier(&state, "Miguel");

        state
            .orders
            .try_update(&order_id, |o| {
                o.status = OrderStatus::Pending;
                o.assigned_courier = Some(offered_to);
                Ok(())
            })
            .unwrap();

        let err = claim(&state, order_id, rival).await.unwrap_err();
        assert!(matches!(err, AppError::OrderUnavailable));
    }

    #[tokio::test]
    async fn release_returns_order_to_the_pool() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let courier_id = seed_courier(&state, "Rosa");

        claim(&state, order_id, courier_id).await.unwrap();
        let released = release(&state, order_id).await.unwrap();

        assert_eq!(released.status, OrderStatus::Unassigned);
        assert_eq!(released.assigned_courier, None);
        assert!(released.milestones.accepted_at.is_none());
        assert_eq!(
            state.couriers.get(&courier_id).unwrap().state,
            CourierState::Free
        );
    }

    #[tokio::test]
    async fn release_after_pickup_is_refused() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let courier_id = seed_courier(&state, "Rosa");

        claim(&state, order_id, courier_id).await.unwrap();
        apply_transition(&state, order_id, OrderStatus::AtStore, Actor::Courier)
            .await
            .unwrap();
        apply_transition(&state, order_id, OrderStatus::PickedUp, Actor::Courier)
            .await
            .unwrap();

        let err = release(&state, order_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn terminal_orders_cannot_be_claimed_or_released() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::Express);
        let courier_id = seed_courier(&state, "Rosa");

        apply_transition(&state, order_id, OrderStatus::Cancelled, Actor::Customer)
            .await
            .unwrap();

        let err = claim(&state, order_id, courier_id).await.unwrap_err();
        assert!(matches!(err, AppError::OrderUnavailable));
        let err = release(&state, order_id).await.unwrap_err();
        assert!(matches!(err, AppError::Terminal(OrderStatus::Cancelled)));
    }

    #[tokio::test]
    async fn rejection_clears_assignment_and_frees_courier() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::App);
        let courier_id = seed_courier(&state, "Rosa");

        claim(&state, order_id, courier_id).await.unwrap();
        let rejected = apply_transition(&state, order_id, OrderStatus::Rejected, Actor::Staff)
            .await
            .unwrap();

        assert_eq!(rejected.status, OrderStatus::Rejected);
        assert_eq!(rejected.assigned_courier, None);
        assert_eq!(
            state.couriers.get(&courier_id).unwrap().state,
            CourierState::Free
        );
    }

    #[tokio::test]
    async fn full_lifecycle_stamps_each_milestone_once() {
        let state = app_state();
        let order_id = seed_order(&state, OrderKind::App);
        let courier_id = seed_courier(&state, "Rosa");

        claim(&state, order_id, courier_id).await.unwrap();
        for status in [
            OrderStatus::AtStore,
            OrderStatus::PickedUp,
            OrderStatus::EnRoute,
            OrderStatus::Delivered,
        ] {
            apply_transition(&state, order_id, status, Actor::Courier)
                .await
                .unwrap();
        }

        let order = state.orders.get(&order_id).unwrap();
        let m = &order.milestones;
        let accepted = m.accepted_at.unwrap();
        let at_store = m.at_store_at.unwrap();
        let picked_up = m.picked_up_at.unwrap();
        let en_route = m.en_route_at.unwrap();
        let delivered = m.delivered_at.unwrap();

        assert!(accepted >= order.created_at);
        assert!(at_store >= accepted);
        assert!(picked_up >= at_store);
        assert!(en_route >= picked_up);
        assert!(delivered >= en_route);
        assert_eq!(
            state.couriers.get(&courier_id).unwrap().state,
            CourierState::Free
        );
    }
}
