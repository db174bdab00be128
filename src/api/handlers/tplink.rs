use axum::{
    extract::{Query, State},
    Json,
};
use tracing::warn;

use super::AppState;
use crate::api::models::{DeviceListQuery, LoginRequest, LoginResponse};
use crate::cloud::CloudDevice;
use crate::error::{AppError, Result};
use crate::models::CloudCredentials;

/// POST /api/v1/tplink/login
/// Any failure is reported as 403.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let credentials = CloudCredentials {
        email: Some(request.email),
        password: Some(request.password),
        app_server_url: request.app_server_url,
        ..Default::default()
    };

    let token = state
        .registry
        .services()
        .cloud
        .login(&credentials)
        .await
        .map_err(|e| {
            warn!(error = %e, "TP-Link login failed");
            AppError::Forbidden("TP-Link login failed".into())
        })?;

    Ok(Json(LoginResponse { token }))
}

/// GET /api/v1/tplink/devices?token=&app_server_url=
/// Any failure is reported as 503.
pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DeviceListQuery>,
) -> Result<Json<Vec<CloudDevice>>> {
    let credentials = CloudCredentials {
        token: Some(query.token),
        app_server_url: query.app_server_url,
        ..Default::default()
    };

    let devices = state
        .registry
        .services()
        .cloud
        .get_device_list(&credentials)
        .await
        .map_err(|e| {
            warn!(error = %e, "TP-Link device listing failed");
            AppError::Unavailable("TP-Link cloud unavailable".into())
        })?;

    Ok(Json(devices))
}
