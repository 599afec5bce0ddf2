use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Role;
use crate::services::auth;
use crate::state::AppState;

// GET /api/admin/stats
#[derive(Serialize)]
pub struct StatsResponse {
    total_spots: i64,
    available_spots: i64,
    occupied_spots: i64,
    reserved_spots: i64,
    maintenance_spots: i64,
    active_bookings: i64,
    pending_payments: i64,
    revenue_this_month_cents: i64,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    let now = Utc::now().naive_utc();
    let stats = {
        let db = state.db.lock().unwrap();
        queries::get_dashboard_stats(&db, &now)?
    };

    Ok(Json(StatsResponse {
        total_spots: stats.total_spots,
        available_spots: stats.available_spots,
        occupied_spots: stats.occupied_spots,
        reserved_spots: stats.reserved_spots,
        maintenance_spots: stats.maintenance_spots,
        active_bookings: stats.active_bookings,
        pending_payments: stats.pending_payments,
        revenue_this_month_cents: stats.revenue_this_month_cents,
    }))
}

// GET /api/admin/activity
#[derive(Deserialize)]
pub struct ActivityQuery {
    pub months: Option<usize>,
}

#[derive(Serialize)]
pub struct ActivityRow {
    month: String,
    bookings_created: i64,
    bookings_cancelled: i64,
    bookings_completed: i64,
    bookings_expired: i64,
    payments_completed: i64,
    revenue_cents: i64,
}

pub async fn get_activity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRow>>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    let months = query.months.unwrap_or(6).clamp(1, 12);
    let now = Utc::now().naive_utc();

    let rows = {
        let db = state.db.lock().unwrap();
        queries::get_recent_monthly_activity(&db, &now, months)?
    };

    let response = rows
        .into_iter()
        .map(|a| ActivityRow {
            month: a.month,
            bookings_created: a.bookings_created,
            bookings_cancelled: a.bookings_cancelled,
            bookings_completed: a.bookings_completed,
            bookings_expired: a.bookings_expired,
            payments_completed: a.payments_completed,
            revenue_cents: a.revenue_cents,
        })
        .collect();
    Ok(Json(response))
}

// POST /api/admin/users/:id/role
#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

pub async fn set_user_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    let role = Role::parse(&body.role)
        .ok_or_else(|| AppError::Validation(format!("invalid role: {}", body.role)))?;

    let updated = {
        let db = state.db.lock().unwrap();
        queries::update_user_role(&db, &id, role)?
    };
    if !updated {
        return Err(AppError::NotFound(format!("user {id}")));
    }
    Ok(Json(serde_json::json!({ "ok": true, "role": role.as_str() })))
}
