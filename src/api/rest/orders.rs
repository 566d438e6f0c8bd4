use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::assignment;
use crate::engine::queue::enqueue_order;
use crate::engine::transitions::{self, Actor};
use crate::error::AppError;
use crate::models::order::{
    ChatRef, LineItem, Milestones, Order, OrderKind, OrderStatus, Payment, Waypoint,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/unassigned", get(list_unclaimed))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/claim", put(claim_order))
        .route("/orders/:id/release", put(release_order))
        .route("/orders/:id/status", patch(update_status))
}

#[derive(Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentRequest {
    Cash { paid_with: f64 },
    Yape,
    Plin,
}

#[derive(Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub kind: OrderKind,
    pub pickup: Waypoint,
    pub dropoff: Waypoint,
    pub payment: PaymentRequest,
    #[serde(default)]
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub delivery_fee: f64,
    pub chat: Option<ChatRef>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.pickup.address.trim().is_empty() || payload.dropoff.address.trim().is_empty() {
        return Err(AppError::Validation(
            "pickup and dropoff addresses are required".to_string(),
        ));
    }
    if payload.delivery_fee < 0.0 {
        return Err(AppError::Validation(
            "delivery_fee cannot be negative".to_string(),
        ));
    }
    if payload.kind == OrderKind::Package && !payload.items.is_empty() {
        return Err(AppError::Validation(
            "package orders do not carry line items".to_string(),
        ));
    }

    let mut items = Vec::with_capacity(payload.items.len());
    for item in payload.items {
        if item.quantity == 0 {
            return Err(AppError::Validation(format!(
                "quantity for {} must be > 0",
                item.product_id
            )));
        }
        if item.unit_price < 0.0 {
            return Err(AppError::Validation(format!(
                "unit_price for {} cannot be negative",
                item.product_id
            )));
        }
        items.push(LineItem {
            line_total: item.unit_price * item.quantity as f64,
            product_id: item.product_id,
            name: item.name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            options: item.options,
        });
    }

    let subtotal: f64 = items.iter().map(|item| item.line_total).sum();
    let total = subtotal + payload.delivery_fee;

    let payment = match payload.payment {
        PaymentRequest::Cash { paid_with } => {
            if paid_with < total {
                return Err(AppError::Validation(format!(
                    "paid_with {paid_with:.2} does not cover the total {total:.2}"
                )));
            }
            Payment::Cash {
                paid_with,
                change: paid_with - total,
            }
        }
        PaymentRequest::Yape => Payment::Yape,
        PaymentRequest::Plin => Payment::Plin,
    };

    let order = Order {
        id: Uuid::new_v4(),
        sequence: state
            .sequences
            .next(payload.kind.counter_name(), state.sequence_ceiling),
        kind: payload.kind,
        status: OrderStatus::Unassigned,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        assigned_courier: None,
        payment,
        items,
        subtotal,
        delivery_fee: payload.delivery_fee,
        total,
        chat: payload.chat,
        milestones: Milestones::default(),
        created_at: Utc::now(),
    };

    state.orders.insert(order.clone());

    // Express orders get pushed to couriers; the other kinds wait to be
    // browsed and claimed.
    if order.kind == OrderKind::Express {
        enqueue_order(&state, order.clone());
    }

    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(state.orders.list())
}

#[derive(Deserialize)]
pub struct UnclaimedQuery {
    pub kind: Option<OrderKind>,
}

async fn list_unclaimed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnclaimedQuery>,
) -> Json<Vec<Order>> {
    Json(state.orders.find_unclaimed(query.kind))
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub courier_id: Uuid,
}

async fn claim_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<Order>, AppError> {
    let order = assignment::claim(&state, id, payload.courier_id).await?;
    Ok(Json(order))
}

async fn release_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = assignment::release(&state, id).await?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    pub actor: Actor,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = transitions::apply_transition(&state, id, payload.status, payload.actor).await?;
    Ok(Json(order))
}
