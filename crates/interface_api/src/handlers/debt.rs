//! Debt handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::RoomId;
use domain_billing::{DebtRecord, DebtWarning};

use crate::auth::{permissions, require, Claims};
use crate::{error::ApiError, AppState};

pub async fn get_room_debt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<DebtRecord>, ApiError> {
    require(&claims, permissions::DEBT_READ)?;
    let record = state.service.get_room_debt(RoomId::from_uuid(room_id)).await?;
    Ok(Json(record))
}

/// Rooms with two or more consecutive months of debt, longest run first
pub async fn get_debt_warnings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<DebtWarning>>, ApiError> {
    require(&claims, permissions::DEBT_READ)?;
    let warnings = state.service.get_debt_warnings().await?;
    tracing::debug!(count = warnings.len(), "debt warnings computed");
    Ok(Json(warnings))
}
