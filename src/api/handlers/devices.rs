use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};

use super::AppState;
use crate::api::models::{DeviceResponse, MonitorStatusResponse, StatsQuery, StatsResponse};
use crate::error::{AppError, Result};
use crate::models::{DeviceUpdate, EventKind};

/// Brews smaller than this share of a batch are left out of the statistics.
const STATS_MIN_PROGRESS: f64 = 0.5;

/// GET /api/v1/devices/{domain}
pub async fn get_device(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<DeviceResponse>> {
    if let Some(monitor) = state.registry.get(&domain).await {
        let running = monitor.is_running();
        return Ok(Json(DeviceResponse::new(monitor.snapshot().await, running)));
    }

    let record = state
        .registry
        .services()
        .devices
        .find(&domain)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("device {}", domain)))?;

    Ok(Json(DeviceResponse::new(record, false)))
}

/// PUT /api/v1/devices/{domain}
/// Creates the device on first use.
pub async fn update_device(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(update): Json<DeviceUpdate>,
) -> Result<Json<DeviceResponse>> {
    let monitor = state.registry.get_or_create(&domain).await?;
    let record = monitor.configure(update).await?;

    Ok(Json(DeviceResponse::new(record, monitor.is_running())))
}

/// POST /api/v1/devices/{domain}/monitor/start
pub async fn start_monitor(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<MonitorStatusResponse>> {
    let monitor = state.registry.get_or_create(&domain).await?;
    let changed = monitor.start().await;
    let running = monitor.is_running();

    if !running {
        return Err(AppError::InvalidInput(format!(
            "no TP-Link token configured for {}",
            domain
        )));
    }

    Ok(Json(MonitorStatusResponse {
        domain,
        running,
        changed,
    }))
}

/// POST /api/v1/devices/{domain}/monitor/stop
pub async fn stop_monitor(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Json<MonitorStatusResponse> {
    let changed = state.registry.stop(&domain).await;

    Json(MonitorStatusResponse {
        domain,
        running: false,
        changed,
    })
}

/// GET /api/v1/devices/{domain}/stats?from=&to=
/// Finished brews in the range, oldest first.
pub async fn get_stats(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    let from = query.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let to = query.to.unwrap_or_else(Utc::now);
    if from > to {
        return Err(AppError::InvalidInput("from must not be after to".into()));
    }

    let events = state
        .registry
        .services()
        .event_log
        .query(&domain, EventKind::Finished, from, to, Some(STATS_MIN_PROGRESS))
        .await?;

    Ok(Json(StatsResponse { events }))
}
