//! Bill handlers
//!
//! Every mutation is attributed to the authenticated user; the response
//! reports whether its audit entry was recorded.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{BillId, FeeId, Money, RoomId};
use domain_billing::{BillHistory, NewBill};

use crate::auth::{permissions, require, Claims};
use crate::dto::bills::*;
use crate::{error::ApiError, AppState};

type BillMutation = Result<Json<MutationResponse<BillResponse>>, ApiError>;

/// Prices readings for a room without storing a bill
pub async fn preview_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PreviewBillRequest>,
) -> Result<Json<CalculationResponse>, ApiError> {
    require(&claims, permissions::BILL_READ)?;
    request.readings.validate_all()?;
    let fees = convert_fees(request.fees, state.currency())?;

    let calculation = state
        .service
        .preview_bill(RoomId::from_uuid(request.room_id), request.readings.into(), fees)
        .await?;
    Ok(Json(CalculationResponse::from(&calculation)))
}

/// Opens the bill of a room; the caller becomes its owner
pub async fn create_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateBillRequest>,
) -> Result<(StatusCode, Json<MutationResponse<BillResponse>>), ApiError> {
    require(&claims, permissions::BILL_WRITE)?;
    let actor = claims.actor()?;
    request.validate()?;
    request.readings.validate_all()?;

    let period = request.period(state.timezone)?;
    let new_bill = NewBill {
        room_id: RoomId::from_uuid(request.room_id),
        owner_id: actor.user_id,
        period,
        readings: request.readings.into(),
        fees: convert_fees(request.fees, state.currency())?,
    };

    let outcome = state.service.create_bill(new_bill, actor).await?;
    Ok((StatusCode::CREATED, Json(MutationResponse::bill(outcome))))
}

pub async fn get_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<BillResponse>, ApiError> {
    require(&claims, permissions::BILL_READ)?;
    let bill = state.service.get_bill(BillId::from_uuid(id)).await?;
    Ok(Json(BillResponse::from(&bill)))
}

pub async fn update_readings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReadingsDto>,
) -> BillMutation {
    require(&claims, permissions::BILL_WRITE)?;
    request.validate_all()?;
    let outcome = state
        .service
        .update_readings(BillId::from_uuid(id), request.into(), claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::bill(outcome)))
}

pub async fn add_fee(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<FeeDto>,
) -> BillMutation {
    require(&claims, permissions::BILL_WRITE)?;
    request.validate()?;
    let fee = request.into_fee(state.currency());
    let outcome = state
        .service
        .add_fee(BillId::from_uuid(id), fee, claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::bill(outcome)))
}

pub async fn remove_fee(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, fee_id)): Path<(Uuid, Uuid)>,
) -> BillMutation {
    require(&claims, permissions::BILL_WRITE)?;
    let outcome = state
        .service
        .remove_fee(BillId::from_uuid(id), FeeId::from_uuid(fee_id), claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::bill(outcome)))
}

/// Records the total amount paid so far
pub async fn apply_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentRequest>,
) -> BillMutation {
    require(&claims, permissions::BILL_WRITE)?;
    let amount = Money::new(request.amount, state.currency());
    let outcome = state
        .service
        .apply_payment(BillId::from_uuid(id), amount, claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::bill(outcome)))
}

pub async fn set_paid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetPaidRequest>,
) -> BillMutation {
    require(&claims, permissions::BILL_WRITE)?;
    let outcome = state
        .service
        .set_paid(BillId::from_uuid(id), request.is_paid, claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::bill(outcome)))
}

pub async fn recalculate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> BillMutation {
    require(&claims, permissions::BILL_WRITE)?;
    let outcome = state
        .service
        .recalculate(BillId::from_uuid(id), claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::bill(outcome)))
}

pub async fn delete_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<MutationResponse<DeletedBill>>, ApiError> {
    require(&claims, permissions::BILL_WRITE)?;
    let outcome = state
        .service
        .delete_bill(BillId::from_uuid(id), claims.actor()?)
        .await?;
    Ok(Json(MutationResponse::deleted(outcome)))
}

/// Audit trail of a bill, including deleted ones, as seen by the caller
pub async fn bill_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BillHistory>>, ApiError> {
    require(&claims, permissions::BILL_READ)?;
    let entries = state
        .service
        .bill_history(BillId::from_uuid(id), claims.user_id()?)
        .await?;
    Ok(Json(entries))
}
