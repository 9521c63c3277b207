//! Admin HTTP surface: health, subscriber management and engine status.
//! Runs alongside the scheduler; every handler goes through the stores' own locking.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::{Engine, EngineStatus};
use crate::store::{SubscriberDirectory, SubscriberId, SubscriberRegistry};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub registry: Arc<SubscriberRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/subscribers", get(list_subscribers).post(add_subscriber))
        .route("/subscribers/{id}", delete(remove_subscriber))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct SubscribersResp {
    count: usize,
    subscribers: Vec<SubscriberId>,
}

#[derive(Deserialize)]
struct AddReq {
    id: String,
}

#[derive(Serialize)]
struct AddResp {
    id: SubscriberId,
    added: bool,
}

async fn list_subscribers(State(state): State<AppState>) -> Json<SubscribersResp> {
    let subscribers = state.registry.snapshot();
    Json(SubscribersResp {
        count: subscribers.len(),
        subscribers,
    })
}

async fn add_subscriber(State(state): State<AppState>, Json(body): Json<AddReq>) -> impl IntoResponse {
    let id = body.id.trim();
    if id.is_empty() {
        return (StatusCode::BAD_REQUEST, "subscriber id must not be empty").into_response();
    }
    let id = SubscriberId::new(id);
    let added = state.registry.add(id.clone());
    if added {
        if let Err(e) = state.registry.flush().await {
            tracing::error!(target: "store", error = %e, "subscriber registry flush failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "could not persist subscriber").into_response();
        }
        tracing::info!(target: "store", subscriber = %id, "subscriber added");
    }
    let code = if added { StatusCode::CREATED } else { StatusCode::OK };
    (code, Json(AddResp { id, added })).into_response()
}

async fn remove_subscriber(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.registry.remove(&SubscriberId::new(id)).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}
