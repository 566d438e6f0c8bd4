use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A pickup or dropoff point: free-form address plus optional coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub address: String,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Ad-hoc courier errand.
    Express,
    /// Catalog-based store order placed through the app.
    App,
    /// Point-to-point parcel shipment.
    Package,
}

impl OrderKind {
    /// Name of the sequence counter backing this kind's human-facing codes.
    pub fn counter_name(self) -> &'static str {
        match self {
            OrderKind::Express => "express-orders",
            OrderKind::App => "app-orders",
            OrderKind::Package => "package-orders",
        }
    }
}

/// Unified status vocabulary. Each kind walks a subset of these states;
/// the valid progression per kind lives in `engine::transitions`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Unassigned,
    /// Tentatively offered to a courier by the dispatch queue.
    Pending,
    Accepted,
    AtStore,
    PickedUp,
    EnRoute,
    /// Package only: courier heading to the pickup point.
    Collecting,
    /// Package only: parcel in hand.
    Collected,
    /// Package only: heading to the delivery point.
    Delivering,
    Delivered,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Unassigned => "unassigned",
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::AtStore => "at_store",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::EnRoute => "en_route",
            OrderStatus::Collecting => "collecting",
            OrderStatus::Collected => "collected",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Payment {
    /// Cash on delivery; change is computed against the order total at creation.
    Cash { paid_with: f64, change: f64 },
    Yape,
    Plin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub line_total: f64,
    pub options: Vec<String>,
}

/// Linkage to an external chat where a "status card" message mirrors the
/// order's current state. Advisory only: the lifecycle never depends on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRef {
    pub chat_id: i64,
    pub last_message_id: Option<i64>,
}

/// Per-milestone timestamps, each set exactly once when the matching
/// transition is accepted. A released claim clears `accepted_at` so a later
/// claim can stamp it again.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Milestones {
    pub accepted_at: Option<DateTime<Utc>>,
    pub at_store_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub en_route_at: Option<DateTime<Utc>>,
    pub collecting_at: Option<DateTime<Utc>>,
    pub collected_at: Option<DateTime<Utc>>,
    pub delivering_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl Milestones {
    /// The stamp slot belonging to a status, if that status carries one.
    pub fn slot_mut(&mut self, status: OrderStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match status {
            OrderStatus::Accepted => Some(&mut self.accepted_at),
            OrderStatus::AtStore => Some(&mut self.at_store_at),
            OrderStatus::PickedUp => Some(&mut self.picked_up_at),
            OrderStatus::EnRoute => Some(&mut self.en_route_at),
            OrderStatus::Collecting => Some(&mut self.collecting_at),
            OrderStatus::Collected => Some(&mut self.collected_at),
            OrderStatus::Delivering => Some(&mut self.delivering_at),
            OrderStatus::Delivered => Some(&mut self.delivered_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            OrderStatus::Rejected => Some(&mut self.rejected_at),
            OrderStatus::Unassigned | OrderStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    /// Human-facing code, e.g. "A-017". Kind-scoped, monotonic.
    pub sequence: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub pickup: Waypoint,
    pub dropoff: Waypoint,
    pub assigned_courier: Option<Uuid>,
    pub payment: Payment,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total: f64,
    pub chat: Option<ChatRef>,
    pub milestones: Milestones,
    pub created_at: DateTime<Utc>,
}
