use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{PageParams, Paginated, Payment, PaymentMethod, PaymentState};
use crate::services::{auth, payments};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub booking_id: String,
    pub amount_cents: i64,
    pub method: String,
}

// POST /api/payments
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let method = PaymentMethod::parse(&body.method)
        .ok_or_else(|| AppError::Validation(format!("invalid payment method: {}", body.method)))?;

    let now = Utc::now().naive_utc();
    let payment = {
        let mut db = state.db.lock().unwrap();
        payments::record(
            &mut db,
            &now,
            &actor,
            &body.booking_id,
            body.amount_cents,
            method,
        )?
    };
    Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Deserialize)]
pub struct CompletePaymentRequest {
    pub transaction_id: String,
}

// POST /api/payments/:id/complete
pub async fn complete_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CompletePaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let now = Utc::now().naive_utc();
    let payment = {
        let mut db = state.db.lock().unwrap();
        payments::mark_completed(&mut db, &now, &actor, &id, &body.transaction_id)?
    };
    Ok(Json(payment))
}

// POST /api/payments/:id/fail
pub async fn fail_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let now = Utc::now().naive_utc();
    let payment = {
        let mut db = state.db.lock().unwrap();
        payments::mark_failed(&mut db, &now, &actor, &id)?
    };
    Ok(Json(payment))
}

// POST /api/payments/:id/refund (admin)
pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    let now = Utc::now().naive_utc();
    let payment = {
        let mut db = state.db.lock().unwrap();
        payments::refund(&mut db, &now, &id)?
    };
    Ok(Json(payment))
}

// GET /api/payments/:id
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let payment = {
        let db = state.db.lock().unwrap();
        queries::get_payment(&db, &id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("payment {id}")))?;
    actor.can_act_on(&payment.user_id)?;
    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct PaymentsQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// GET /api/payments — payment history, own rows for users, all for admins.
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PaymentsQuery>,
) -> Result<Json<Paginated<Payment>>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;

    let page = PageParams::new(query.page, query.limit)?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            PaymentState::parse(s)
                .ok_or_else(|| AppError::InvalidFilter(format!("invalid payment status: {s}")))
        })
        .transpose()?;

    let scope = if actor.is_admin() {
        None
    } else {
        Some(actor.id.as_str())
    };

    let (items, total) = {
        let db = state.db.lock().unwrap();
        queries::list_payments(&db, scope, status, page)?
    };

    Ok(Json(Paginated {
        items,
        page: page.page,
        limit: page.limit,
        total,
    }))
}
