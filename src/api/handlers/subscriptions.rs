use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::AppState;
use crate::api::models::SubscribeRequest;
use crate::error::{AppError, Result};
use crate::models::{EventKind, Subscription};

fn parse_event(name: &str) -> Result<EventKind> {
    EventKind::parse(name).ok_or_else(|| AppError::InvalidInput(format!("unknown event {}", name)))
}

/// POST /api/v1/devices/{domain}/subscriptions
pub async fn subscribe(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(request): Json<SubscribeRequest>,
) -> Result<StatusCode> {
    let event = parse_event(&request.event)?;
    if request.id.trim().is_empty() || request.endpoint.trim().is_empty() {
        return Err(AppError::InvalidInput("id and endpoint are required".into()));
    }

    let subscription = Subscription {
        id: request.id,
        domain,
        endpoint: request.endpoint,
        events: vec![event.as_str().to_string()],
    };
    state
        .registry
        .services()
        .subscriptions
        .subscribe(&subscription, event)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/subscriptions/{id}/{event}
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path((id, event)): Path<(String, String)>,
) -> Result<StatusCode> {
    let event = parse_event(&event)?;
    state
        .registry
        .services()
        .subscriptions
        .unsubscribe(&id, event)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
