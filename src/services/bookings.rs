use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, PaymentMethod, PaymentStatus, VehicleInfo};
use crate::services::auth::AuthUser;
use crate::services::availability;

#[derive(Debug)]
pub struct NewBooking {
    pub spot_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub vehicle: VehicleInfo,
    pub payment_method: Option<PaymentMethod>,
}

/// Rounded-to-nearest-cent cost for `minutes` at `rate_cents` per hour.
fn cost_cents(rate_cents: i64, minutes: i64) -> i64 {
    (rate_cents * minutes + 30) / 60
}

/// Creates a booking. The availability check and the insert run inside one
/// transaction on the single write connection, so two concurrent requests
/// for the same spot and overlapping window cannot both pass the check.
pub fn create(
    conn: &mut Connection,
    now: &NaiveDateTime,
    user_id: &str,
    req: NewBooking,
    grace_minutes: i64,
) -> Result<Booking, AppError> {
    if req.start_time >= req.end_time {
        return Err(AppError::InvalidWindow(
            "start time must be before end time".to_string(),
        ));
    }
    if req.start_time < *now - Duration::minutes(grace_minutes) {
        return Err(AppError::InvalidWindow(
            "start time is in the past".to_string(),
        ));
    }
    if req.vehicle.license_plate.trim().is_empty() {
        return Err(AppError::Validation("license plate is required".to_string()));
    }

    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let spot = queries::get_spot(&tx, &req.spot_id, now)?
        .ok_or_else(|| AppError::NotFound(format!("spot {}", req.spot_id)))?;

    if !availability::window_is_free(&tx, &spot, &req.start_time, &req.end_time)? {
        return Err(AppError::SpotUnavailable);
    }

    let duration_minutes = (req.end_time - req.start_time).num_minutes();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        spot_id: spot.id.clone(),
        start_time: req.start_time,
        end_time: req.end_time,
        duration_minutes,
        total_cost_cents: cost_cents(spot.hourly_rate_cents, duration_minutes),
        status: BookingStatus::Active,
        payment_status: PaymentStatus::Pending,
        payment_method: req.payment_method.map(|m| m.as_str().to_string()),
        vehicle: req.vehicle,
        created_at: *now,
        updated_at: *now,
    };

    queries::insert_booking(&tx, &booking)?;
    queries::increment_monthly_created(&tx, now)?;
    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(booking_id = %booking.id, spot = %spot.spot_number, "booking created");
    Ok(booking)
}

pub fn cancel(
    conn: &mut Connection,
    now: &NaiveDateTime,
    booking_id: &str,
    actor: &AuthUser,
) -> Result<Booking, AppError> {
    transition(conn, now, booking_id, actor, BookingStatus::Cancelled)
}

/// Completion is allowed at any point while active, which covers early
/// checkout.
pub fn complete(
    conn: &mut Connection,
    now: &NaiveDateTime,
    booking_id: &str,
    actor: &AuthUser,
) -> Result<Booking, AppError> {
    transition(conn, now, booking_id, actor, BookingStatus::Completed)
}

fn transition(
    conn: &mut Connection,
    now: &NaiveDateTime,
    booking_id: &str,
    actor: &AuthUser,
    to: BookingStatus,
) -> Result<Booking, AppError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    actor.can_act_on(&booking.user_id)?;

    // The conditional update is the real guard; this check only produces a
    // better message for the common case.
    if booking.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "cannot move a {} booking to {}",
            booking.status.as_str(),
            to.as_str()
        )));
    }

    if !queries::transition_booking_if_active(&tx, booking_id, to, now)? {
        return Err(AppError::InvalidTransition(
            "booking is no longer active".to_string(),
        ));
    }

    match to {
        BookingStatus::Cancelled => queries::increment_monthly_cancelled(&tx, now)?,
        BookingStatus::Completed => queries::increment_monthly_completed(&tx, now)?,
        _ => {}
    }

    let updated = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(booking_id, status = to.as_str(), "booking transitioned");
    Ok(updated)
}

/// Sweeps every active booking whose end time has passed into `expired`.
/// The update is conditional on `status = 'active'`, so repeated or
/// overlapping runs are idempotent.
pub fn expire_due(conn: &mut Connection, now: &NaiveDateTime) -> Result<usize, AppError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;
    let count = queries::expire_due_bookings(&tx, now)?;
    queries::increment_monthly_expired(&tx, now, count as i64)?;
    tx.commit().map_err(anyhow::Error::from)?;
    Ok(count)
}

#[cfg(test)]
pub mod test_support {
    use chrono::Utc;
    use rusqlite::Connection;

    use crate::db::queries;
    use crate::models::{ParkingSpot, SpotStatus, SpotType, VehicleInfo};

    use super::*;

    pub fn make_spot(conn: &Connection, number: &str, rate_cents: i64) -> String {
        let now = Utc::now().naive_utc();
        let spot = ParkingSpot {
            id: uuid::Uuid::new_v4().to_string(),
            spot_number: number.to_string(),
            location: "Level 1".to_string(),
            address: None,
            latitude: None,
            longitude: None,
            spot_type: SpotType::Standard,
            hourly_rate_cents: rate_cents,
            features: vec![],
            description: None,
            maintenance: false,
            status: SpotStatus::Available,
            created_at: now,
            updated_at: now,
        };
        queries::insert_spot(conn, &spot).unwrap();
        spot.id
    }

    #[allow(clippy::too_many_arguments)]
    pub fn make_booking(
        conn: &mut Connection,
        user_id: &str,
        spot_id: &str,
        now: &NaiveDateTime,
        start: &str,
        end: &str,
        vehicle: VehicleInfo,
    ) -> String {
        let req = NewBooking {
            spot_id: spot_id.to_string(),
            start_time: NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap(),
            end_time: NaiveDateTime::parse_from_str(end, "%Y-%m-%d %H:%M").unwrap(),
            vehicle,
            payment_method: None,
        };
        create(conn, now, user_id, req, 5).unwrap().id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Role;
    use crate::services::auth;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn vehicle() -> VehicleInfo {
        VehicleInfo {
            license_plate: "BA-2-1234".to_string(),
            make: Some("Toyota".to_string()),
            model: Some("Yaris".to_string()),
            color: Some("blue".to_string()),
        }
    }

    fn new_booking(spot_id: &str, start: &str, end: &str) -> NewBooking {
        NewBooking {
            spot_id: spot_id.to_string(),
            start_time: dt(start),
            end_time: dt(end),
            vehicle: vehicle(),
            payment_method: Some(PaymentMethod::Cash),
        }
    }

    fn setup() -> (Connection, String, String) {
        let conn = db::init_db(":memory:").unwrap();
        let user = auth::register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();
        let spot = test_support::make_spot(&conn, "A1", 750);
        (conn, user.id, spot)
    }

    fn user_actor(id: &str) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn test_create_computes_frozen_cost() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");

        // $7.50/hr for two hours
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();

        assert_eq!(booking.total_cost_cents, 1500);
        assert_eq!(booking.duration_minutes, 120);
        assert_eq!(booking.status, BookingStatus::Active);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_cost_survives_rate_change() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();

        let mut spot = queries::get_spot(&conn, &spot_id, &now).unwrap().unwrap();
        spot.hourly_rate_cents = 2000;
        queries::update_spot(&conn, &spot).unwrap();

        let fetched = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(fetched.total_cost_cents, 1500);
    }

    #[test]
    fn test_overlapping_create_rejected() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();

        let err = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 10:00", "2025-06-16 12:00"),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::SpotUnavailable));
    }

    #[test]
    fn test_boundary_adjacent_create_accepted() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();

        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 11:00", "2025-06-16 13:00"),
            5,
        )
        .unwrap();
        assert_eq!(booking.status, BookingStatus::Active);
    }

    #[test]
    fn test_invalid_window() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");

        let err = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 11:00", "2025-06-16 09:00"),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidWindow(_)));

        // Start further in the past than the grace period
        let err = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 07:00", "2025-06-16 09:00"),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidWindow(_)));
    }

    #[test]
    fn test_grace_period_allows_just_started_window() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 09:03");

        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();
        assert_eq!(booking.status, BookingStatus::Active);
    }

    #[test]
    fn test_unknown_spot() {
        let (mut conn, user_id, _) = setup();
        let now = dt("2025-06-16 08:00");
        let err = create(
            &mut conn,
            &now,
            &user_id,
            new_booking("missing", "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_maintenance_spot_rejected() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        queries::set_spot_maintenance(&conn, &spot_id, true).unwrap();

        let err = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::SpotUnavailable));
    }

    #[test]
    fn test_cancel_is_terminal() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();
        let actor = user_actor(&user_id);

        let cancelled = cancel(&mut conn, &now, &booking.id, &actor).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let err = cancel(&mut conn, &now, &booking.id, &actor).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let err = complete(&mut conn, &now, &booking.id, &actor).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn test_early_checkout() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 09:30");
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:30", "2025-06-16 11:00"),
            5,
        )
        .unwrap();
        let actor = user_actor(&user_id);

        // Completed well before end_time
        let completed = complete(&mut conn, &dt("2025-06-16 10:00"), &booking.id, &actor).unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
    }

    #[test]
    fn test_cancel_requires_ownership() {
        let (mut conn, user_id, spot_id) = setup();
        let other = auth::register(&conn, "Bibek", "bibek@example.com", "password123", None).unwrap();
        let now = dt("2025-06-16 08:00");
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();

        let err = cancel(&mut conn, &now, &booking.id, &user_actor(&other.id)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // An admin can act on anyone's booking
        let admin = AuthUser {
            id: other.id,
            role: Role::Admin,
        };
        assert!(cancel(&mut conn, &now, &booking.id, &admin).is_ok());
    }

    #[test]
    fn test_cancel_does_not_touch_payment_status() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();
        queries::set_booking_payment_status(&conn, &booking.id, PaymentStatus::Paid, &now).unwrap();

        let cancelled = cancel(&mut conn, &now, &booking.id, &user_actor(&user_id)).unwrap();
        // No auto-refund on cancellation
        assert_eq!(cancelled.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_expire_due_is_idempotent() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let booking = create(
            &mut conn,
            &now,
            &user_id,
            new_booking(&spot_id, "2025-06-16 09:00", "2025-06-16 11:00"),
            5,
        )
        .unwrap();

        // Before end_time nothing expires
        assert_eq!(expire_due(&mut conn, &dt("2025-06-16 10:59")).unwrap(), 0);

        let late = dt("2025-06-16 11:01");
        assert_eq!(expire_due(&mut conn, &late).unwrap(), 1);
        assert_eq!(expire_due(&mut conn, &late).unwrap(), 0);

        let fetched = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(fetched.status, BookingStatus::Expired);

        // Expired is terminal
        let err = cancel(&mut conn, &late, &booking.id, &user_actor(&user_id)).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn test_cost_rounding() {
        // 90 minutes at $7.50/hr = $11.25 exactly
        assert_eq!(cost_cents(750, 90), 1125);
        // 50 minutes at $9.99/hr = 832.5 cents, rounds up
        assert_eq!(cost_cents(999, 50), 833);
        // 10 minutes at $1.00/hr = 16.67 cents, rounds to 17
        assert_eq!(cost_cents(100, 10), 17);
    }
}
