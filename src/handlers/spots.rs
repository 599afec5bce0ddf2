use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{PageParams, Paginated, ParkingSpot, SpotStatus, SpotType};
use crate::services::{auth, availability};
use crate::state::AppState;

use super::parse_datetime;

#[derive(Deserialize)]
pub struct CreateSpotRequest {
    pub spot_number: String,
    pub location: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub spot_type: Option<String>,
    pub hourly_rate_cents: i64,
    pub features: Option<Vec<String>>,
    pub description: Option<String>,
}

// POST /api/spots (admin)
pub async fn create_spot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSpotRequest>,
) -> Result<(StatusCode, Json<ParkingSpot>), AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    if body.spot_number.trim().is_empty() {
        return Err(AppError::Validation("spot number is required".to_string()));
    }
    if body.hourly_rate_cents <= 0 {
        return Err(AppError::Validation(
            "hourly rate must be positive".to_string(),
        ));
    }
    let spot_type = match body.spot_type.as_deref() {
        None => SpotType::Standard,
        Some(t) => SpotType::parse(t)
            .ok_or_else(|| AppError::Validation(format!("invalid spot type: {t}")))?,
    };

    let now = Utc::now().naive_utc();
    let spot = ParkingSpot {
        id: uuid::Uuid::new_v4().to_string(),
        spot_number: body.spot_number.trim().to_string(),
        location: body.location,
        address: body.address,
        latitude: body.latitude,
        longitude: body.longitude,
        spot_type,
        hourly_rate_cents: body.hourly_rate_cents,
        features: body.features.unwrap_or_default(),
        description: body.description,
        maintenance: false,
        status: SpotStatus::Available,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        if let Err(e) = queries::insert_spot(&db, &spot) {
            if queries::is_unique_violation(&e) {
                return Err(AppError::Conflict(format!(
                    "spot number {} already exists",
                    spot.spot_number
                )));
            }
            return Err(e.into());
        }
    }

    Ok((StatusCode::CREATED, Json(spot)))
}

#[derive(Deserialize)]
pub struct UpdateSpotRequest {
    pub spot_number: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub spot_type: Option<String>,
    pub hourly_rate_cents: Option<i64>,
    pub features: Option<Vec<String>>,
    pub description: Option<String>,
}

// PATCH /api/spots/:id (admin). Rate edits never touch already-created
// bookings, whose cost is frozen.
pub async fn update_spot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateSpotRequest>,
) -> Result<Json<ParkingSpot>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    let now = Utc::now().naive_utc();
    let db = state.db.lock().unwrap();

    let mut spot = queries::get_spot(&db, &id, &now)?
        .ok_or_else(|| AppError::NotFound(format!("spot {id}")))?;

    if let Some(number) = body.spot_number {
        if number.trim().is_empty() {
            return Err(AppError::Validation("spot number is required".to_string()));
        }
        spot.spot_number = number.trim().to_string();
    }
    if let Some(location) = body.location {
        spot.location = location;
    }
    if let Some(address) = body.address {
        spot.address = Some(address);
    }
    if let Some(latitude) = body.latitude {
        spot.latitude = Some(latitude);
    }
    if let Some(longitude) = body.longitude {
        spot.longitude = Some(longitude);
    }
    if let Some(spot_type) = body.spot_type.as_deref() {
        spot.spot_type = SpotType::parse(spot_type)
            .ok_or_else(|| AppError::Validation(format!("invalid spot type: {spot_type}")))?;
    }
    if let Some(rate) = body.hourly_rate_cents {
        if rate <= 0 {
            return Err(AppError::Validation(
                "hourly rate must be positive".to_string(),
            ));
        }
        spot.hourly_rate_cents = rate;
    }
    if let Some(features) = body.features {
        spot.features = features;
    }
    if let Some(description) = body.description {
        spot.description = Some(description);
    }

    if let Err(e) = queries::update_spot(&db, &spot) {
        if queries::is_unique_violation(&e) {
            return Err(AppError::Conflict(format!(
                "spot number {} already exists",
                spot.spot_number
            )));
        }
        return Err(e.into());
    }

    let refreshed = queries::get_spot(&db, &id, &now)?
        .ok_or_else(|| AppError::NotFound(format!("spot {id}")))?;
    Ok(Json(refreshed))
}

#[derive(Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

// POST /api/spots/:id/maintenance (admin) — set or clear the override that
// supersedes the derived status.
pub async fn set_maintenance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MaintenanceRequest>,
) -> Result<Json<ParkingSpot>, AppError> {
    let actor = auth::authenticate(&headers, &state.config)?;
    auth::require_admin(&actor)?;

    let now = Utc::now().naive_utc();
    let db = state.db.lock().unwrap();

    if !queries::set_spot_maintenance(&db, &id, body.enabled)? {
        return Err(AppError::NotFound(format!("spot {id}")));
    }
    let spot = queries::get_spot(&db, &id, &now)?
        .ok_or_else(|| AppError::NotFound(format!("spot {id}")))?;
    Ok(Json(spot))
}

// GET /api/spots/:id
pub async fn get_spot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ParkingSpot>, AppError> {
    auth::authenticate(&headers, &state.config)?;
    let now = Utc::now().naive_utc();
    let spot = {
        let db = state.db.lock().unwrap();
        queries::get_spot(&db, &id, &now)?
    }
    .ok_or_else(|| AppError::NotFound(format!("spot {id}")))?;
    Ok(Json(spot))
}

#[derive(Deserialize)]
pub struct SpotsQuery {
    #[serde(rename = "type")]
    pub spot_type: Option<String>,
    pub status: Option<String>,
    pub min_rate: Option<i64>,
    pub max_rate: Option<i64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// GET /api/spots
pub async fn list_spots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SpotsQuery>,
) -> Result<Json<Paginated<ParkingSpot>>, AppError> {
    auth::authenticate(&headers, &state.config)?;

    let page = PageParams::new(query.page, query.limit)?;
    let filter = queries::SpotFilter {
        spot_type: query
            .spot_type
            .as_deref()
            .map(|t| {
                SpotType::parse(t)
                    .ok_or_else(|| AppError::InvalidFilter(format!("invalid spot type: {t}")))
            })
            .transpose()?,
        status: query
            .status
            .as_deref()
            .map(|s| {
                SpotStatus::parse(s)
                    .ok_or_else(|| AppError::InvalidFilter(format!("invalid spot status: {s}")))
            })
            .transpose()?,
        min_rate_cents: query.min_rate,
        max_rate_cents: query.max_rate,
    };

    let now = Utc::now().naive_utc();
    let (items, total) = {
        let db = state.db.lock().unwrap();
        queries::list_spots(&db, &filter, page, &now)?
    };

    Ok(Json(Paginated {
        items,
        page: page.page,
        limit: page.limit,
        total,
    }))
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub start: String,
    pub end: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

// GET /api/spots/:id/availability?start=&end=
pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    auth::authenticate(&headers, &state.config)?;

    let start = parse_datetime("start", &query.start)?;
    let end = parse_datetime("end", &query.end)?;
    let now = Utc::now().naive_utc();

    let available = {
        let db = state.db.lock().unwrap();
        availability::is_available(&db, &id, &start, &end, &now)?
    };
    Ok(Json(AvailabilityResponse { available }))
}
