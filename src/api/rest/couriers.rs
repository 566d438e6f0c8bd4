use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierState};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/active", get(active_couriers))
        .route("/couriers/:id/availability", patch(set_availability))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let now = Utc::now();
    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        enabled: true,
        active: true,
        state: CourierState::Free,
        activated_at: now,
        updated_at: now,
    };

    state.couriers.insert(courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    Json(state.couriers.list())
}

/// Couriers currently on shift (enabled and self-activated); their `state`
/// field tells free from busy.
async fn active_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let couriers = state
        .couriers
        .list()
        .into_iter()
        .filter(|c| c.enabled && c.active)
        .collect();
    Json(couriers)
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub active: bool,
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<Courier>, AppError> {
    let now = Utc::now();
    let courier = state.couriers.try_update(&id, |courier| {
        courier.active = payload.active;
        if payload.active {
            // A busy courier stays busy; only a parked one becomes free.
            if courier.state == CourierState::Inactive {
                courier.state = CourierState::Free;
            }
            courier.activated_at = now;
        } else {
            courier.state = CourierState::Inactive;
        }
        courier.updated_at = now;
        Ok(())
    })?;

    Ok(Json(courier))
}
