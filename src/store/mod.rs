pub mod sequence;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierState};
use crate::models::order::{Order, OrderKind, OrderStatus};

/// Order persistence collaborator. Every mutation goes through
/// [`OrderStore::try_update`], which runs check-and-mutate under a single
/// map entry lock: the compare-and-set primitive the assignment engine and
/// the transition authority rely on. Plain read-modify-write against a
/// fetched copy is never allowed.
#[derive(Default)]
pub struct OrderStore {
    inner: DashMap<Uuid, Order>,
}

impl OrderStore {
    pub fn insert(&self, order: Order) {
        self.inner.insert(order.id, order);
    }

    pub fn get(&self, id: &Uuid) -> Option<Order> {
        self.inner.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn list(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.inner.iter().map(|e| e.clone()).collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Claimable orders, oldest first.
    pub fn find_unclaimed(&self, kind: Option<OrderKind>) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .inner
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.status == OrderStatus::Unassigned
                    && order.assigned_courier.is_none()
                    && kind.is_none_or(|k| order.kind == k)
            })
            .map(|entry| entry.clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Atomic conditional update. `mutate` runs against a working copy while
    /// the entry lock is held; if it errors, the stored order is untouched.
    /// All-or-nothing: no partial state survives a failed precondition.
    pub fn try_update<F>(&self, id: &Uuid, mutate: F) -> Result<Order, AppError>
    where
        F: FnOnce(&mut Order) -> Result<(), AppError>,
    {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let mut candidate = entry.clone();
        mutate(&mut candidate)?;
        *entry = candidate.clone();
        Ok(candidate)
    }
}

/// Courier directory. Same entry-lock discipline as the order store.
#[derive(Default)]
pub struct CourierDirectory {
    inner: DashMap<Uuid, Courier>,
}

impl CourierDirectory {
    pub fn insert(&self, courier: Courier) {
        self.inner.insert(courier.id, courier);
    }

    pub fn get(&self, id: &Uuid) -> Option<Courier> {
        self.inner.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn list(&self) -> Vec<Courier> {
        self.inner.iter().map(|e| e.clone()).collect()
    }

    /// Couriers eligible for work: enabled, self-activated, not busy.
    /// Sorted by activation time so the longest-waiting courier is offered
    /// work first.
    pub fn free_couriers(&self) -> Vec<Courier> {
        let mut couriers: Vec<Courier> = self
            .inner
            .iter()
            .filter(|entry| entry.value().is_dispatchable())
            .map(|entry| entry.clone())
            .collect();
        couriers.sort_by_key(|c| c.activated_at);
        couriers
    }

    pub fn try_update<F>(&self, id: &Uuid, mutate: F) -> Result<Courier, AppError>
    where
        F: FnOnce(&mut Courier) -> Result<(), AppError>,
    {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

        let mut candidate = entry.clone();
        mutate(&mut candidate)?;
        *entry = candidate.clone();
        Ok(candidate)
    }

    /// Projection maintenance after an order resolves or an offer lapses.
    /// Best-effort: a missing courier is logged upstream, not fatal.
    pub fn mark_free(&self, id: &Uuid) -> Result<Courier, AppError> {
        self.try_update(id, |courier| {
            courier.state = if courier.active {
                CourierState::Free
            } else {
                CourierState::Inactive
            };
            courier.updated_at = Utc::now();
            Ok(())
        })
    }

    pub fn mark_busy(&self, id: &Uuid) -> Result<Courier, AppError> {
        self.try_update(id, |courier| {
            courier.state = CourierState::Busy;
            courier.updated_at = Utc::now();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::order::{Milestones, Payment, Waypoint};

    fn order(kind: OrderKind, sequence: &str) -> Order {
        Order {
            id: Uuid::new_v4(),
            sequence: sequence.to_string(),
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
        }
    }

    #[test]
    fn failed_mutation_leaves_order_untouched() {
        let store = OrderStore::default();
        let o = order(OrderKind::Express, "A-001");
        let id = o.id;
        store.insert(o);

        let result = store.try_update(&id, |order| {
            order.status = OrderStatus::Delivered;
            Err(AppError::OrderUnavailable)
        });

        assert!(result.is_err());
        assert_eq!(store.get(&id).unwrap().status, OrderStatus::Unassigned);
    }

    #[test]
    fn try_update_unknown_id_is_not_found() {
        let store = OrderStore::default();
        let result = store.try_update(&Uuid::new_v4(), |_| Ok(()));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn find_unclaimed_sorts_oldest_first_and_filters_kind() {
        let store = OrderStore::default();
        let mut first = order(OrderKind::Express, "A-001");
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let first_id = first.id;
        let second = order(OrderKind::Express, "A-002");
        let packaged = order(OrderKind::Package, "A-001");

        store.insert(second);
        store.insert(first);
        store.insert(packaged);

        let express = store.find_unclaimed(Some(OrderKind::Express));
        assert_eq!(express.len(), 2);
        assert_eq!(express[0].id, first_id);

        let all = store.find_unclaimed(None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn claimed_orders_are_not_listed_as_unclaimed() {
        let store = OrderStore::default();
        let mut claimed = order(OrderKind::App, "A-001");
        claimed.status = OrderStatus::Accepted;
        claimed.assigned_courier = Some(Uuid::new_v4());
        store.insert(claimed);

        assert!(store.find_unclaimed(None).is_empty());
    }

    #[test]
    fn free_couriers_sorted_by_activation() {
        let directory = CourierDirectory::default();
        let now = Utc::now();

        let mut veteran = Courier {
            id: Uuid::new_v4(),
            name: "Rosa".to_string(),
            enabled: true,
            active: true,
            state: CourierState::Free,
            activated_at: now - chrono::Duration::hours(2),
            updated_at: now,
        };
        let veteran_id = veteran.id;
        directory.insert(veteran.clone());

        veteran.id = Uuid::new_v4();
        veteran.name = "Miguel".to_string();
        veteran.activated_at = now;
        directory.insert(veteran.clone());

        veteran.id = Uuid::new_v4();
        veteran.name = "Busy Bee".to_string();
        veteran.state = CourierState::Busy;
        directory.insert(veteran);

        let free = directory.free_couriers();
        assert_eq!(free.len(), 2);
        assert_eq!(free[0].id, veteran_id);
    }

    #[test]
    fn mark_free_respects_inactive_toggle() {
        let directory = CourierDirectory::default();
        let courier = Courier {
            id: Uuid::new_v4(),
            name: "Lucia".to_string(),
            enabled: true,
            active: false,
            state: CourierState::Busy,
            activated_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = courier.id;
        directory.insert(courier);

        let updated = directory.mark_free(&id).unwrap();
        assert_eq!(updated.state, CourierState::Inactive);
    }
}
