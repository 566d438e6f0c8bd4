use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{OrderKind, OrderStatus};

/// Emitted on every accepted status change. Consumed by the ws endpoint and
/// the status-card channel; delivery is best-effort and never blocks the
/// transition that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub order_id: Uuid,
    pub sequence: String,
    pub kind: OrderKind,
    pub previous: OrderStatus,
    pub current: OrderStatus,
    pub courier_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}
