use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    pagination, Booking, BookingStatus, PageParams, Paginated, PaymentMethod, SortOrder,
    VehicleInfo,
};
use crate::services::{auth, bookings};
use crate::state::AppState;

use super::parse_datetime;

const BOOKING_SORT_FIELDS: &[&str] = &[
    "start_time",
    "end_time",
    "created_at",
    "total_cost_cents",
    "status",
];

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub spot_id: String,
    pub start_time: String,
    pub end_time: String,
    pub vehicle: VehicleInfo,
    pub payment_method: Option<String>,
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;

    let start_time = parse_datetime("start_time", &body.start_time)?;
    let end_time = parse_datetime("end_time", &body.end_time)?;
    let payment_method = body
        .payment_method
        .as_deref()
        .map(|m| {
            PaymentMethod::parse(m)
                .ok_or_else(|| AppError::Validation(format!("invalid payment method: {m}")))
        })
        .transpose()?;

    let req = bookings::NewBooking {
        spot_id: body.spot_id,
        start_time,
        end_time,
        vehicle: body.vehicle,
        payment_method,
    };

    let now = Utc::now().naive_utc();
    let booking = {
        let mut db = state.db.lock().unwrap();
        bookings::create(
            &mut db,
            &now,
            &actor.id,
            req,
            state.config.booking_grace_minutes,
        )?
    };
    Ok((StatusCode::CREATED, Json(booking)))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let now = Utc::now().naive_utc();
    let booking = {
        let mut db = state.db.lock().unwrap();
        bookings::cancel(&mut db, &now, &id, &actor)?
    };
    Ok(Json(booking))
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let now = Utc::now().naive_utc();
    let booking = {
        let mut db = state.db.lock().unwrap();
        bookings::complete(&mut db, &now, &id, &actor)?
    };
    Ok(Json(booking))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking(&db, &id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    actor.can_act_on(&booking.user_id)?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

// GET /api/bookings — users see their own rows, admins see everything.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Paginated<Booking>>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;

    let page = PageParams::new(query.page, query.limit)?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::InvalidFilter(format!("invalid booking status: {s}")))
        })
        .transpose()?;
    let sort_field = pagination::validate_sort_field(
        query.sort_by.as_deref(),
        BOOKING_SORT_FIELDS,
        "created_at",
    )?;
    let order = SortOrder::parse(query.sort_order.as_deref())?;

    let scope = if actor.is_admin() {
        None
    } else {
        Some(actor.id.as_str())
    };

    let (items, total) = {
        let db = state.db.lock().unwrap();
        queries::list_bookings(&db, scope, status, sort_field, order, page)?
    };

    Ok(Json(Paginated {
        items,
        page: page.page,
        limit: page.limit,
        total,
    }))
}
