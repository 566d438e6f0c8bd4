use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourierState {
    Free,
    Busy,
    Inactive,
}

/// A courier ("motorizado") account. `enabled` is admin-gated; `active` is
/// the courier's own availability toggle. `state` is a cached projection of
/// the courier's current workload, kept advisory rather than enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    pub state: CourierState,
    /// Reset each time the courier toggles themselves active.
    pub activated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    pub fn is_dispatchable(&self) -> bool {
        self.enabled && self.active && self.state == CourierState::Free
    }
}
