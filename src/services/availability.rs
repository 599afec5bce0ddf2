use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::ParkingSpot;

/// Availability of an already-loaded spot for `[start, end)`. A spot under
/// maintenance is never available; otherwise any active booking overlapping
/// the window makes it unavailable.
pub fn window_is_free(
    conn: &Connection,
    spot: &ParkingSpot,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<bool> {
    if spot.maintenance {
        return Ok(false);
    }
    let overlapping = queries::count_overlapping_active(conn, &spot.id, start, end)?;
    Ok(overlapping == 0)
}

/// `is_available(spot_id, start, end)` as exposed on the read API. The
/// booking service does not go through this; it loads the spot itself and
/// calls [`window_is_free`] inside its own transaction.
pub fn is_available(
    conn: &Connection,
    spot_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    now: &NaiveDateTime,
) -> Result<bool, AppError> {
    if start >= end {
        return Err(AppError::InvalidWindow(
            "start time must be before end time".to_string(),
        ));
    }
    let spot = queries::get_spot(conn, spot_id, now)?
        .ok_or_else(|| AppError::NotFound(format!("spot {spot_id}")))?;
    Ok(window_is_free(conn, &spot, start, end)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::VehicleInfo;
    use crate::services::{auth, bookings};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup() -> (Connection, String, String) {
        let conn = db::init_db(":memory:").unwrap();
        let user = auth::register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();
        let spot = bookings::test_support::make_spot(&conn, "A1", 750);
        (conn, user.id, spot)
    }

    fn vehicle() -> VehicleInfo {
        VehicleInfo {
            license_plate: "BA-2-1234".to_string(),
            make: None,
            model: None,
            color: None,
        }
    }

    #[test]
    fn test_free_spot_is_available() {
        let (conn, _, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let available =
            is_available(&conn, &spot_id, &dt("2025-06-16 09:00"), &dt("2025-06-16 11:00"), &now)
                .unwrap();
        assert!(available);
    }

    #[test]
    fn test_overlap_blocks_window() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        bookings::test_support::make_booking(
            &mut conn,
            &user_id,
            &spot_id,
            &now,
            "2025-06-16 09:00",
            "2025-06-16 11:00",
            vehicle(),
        );

        // 10:00-12:00 overlaps 09:00-11:00
        let available =
            is_available(&conn, &spot_id, &dt("2025-06-16 10:00"), &dt("2025-06-16 12:00"), &now)
                .unwrap();
        assert!(!available);
    }

    #[test]
    fn test_boundary_adjacent_window_is_free() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        bookings::test_support::make_booking(
            &mut conn,
            &user_id,
            &spot_id,
            &now,
            "2025-06-16 09:00",
            "2025-06-16 11:00",
            vehicle(),
        );

        // 11:00-13:00 starts exactly when the existing booking ends
        let available =
            is_available(&conn, &spot_id, &dt("2025-06-16 11:00"), &dt("2025-06-16 13:00"), &now)
                .unwrap();
        assert!(available);
    }

    #[test]
    fn test_cancelled_booking_does_not_block() {
        let (mut conn, user_id, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let booking_id = bookings::test_support::make_booking(
            &mut conn,
            &user_id,
            &spot_id,
            &now,
            "2025-06-16 09:00",
            "2025-06-16 11:00",
            vehicle(),
        );
        let actor = auth::AuthUser {
            id: user_id,
            role: crate::models::Role::User,
        };
        bookings::cancel(&mut conn, &now, &booking_id, &actor).unwrap();

        let available =
            is_available(&conn, &spot_id, &dt("2025-06-16 10:00"), &dt("2025-06-16 12:00"), &now)
                .unwrap();
        assert!(available);
    }

    #[test]
    fn test_maintenance_blocks_everything() {
        let (conn, _, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        queries::set_spot_maintenance(&conn, &spot_id, true).unwrap();

        let available =
            is_available(&conn, &spot_id, &dt("2025-06-16 09:00"), &dt("2025-06-16 11:00"), &now)
                .unwrap();
        assert!(!available);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let (conn, _, spot_id) = setup();
        let now = dt("2025-06-16 08:00");
        let result =
            is_available(&conn, &spot_id, &dt("2025-06-16 11:00"), &dt("2025-06-16 09:00"), &now);
        assert!(matches!(result, Err(AppError::InvalidWindow(_))));
    }

    #[test]
    fn test_unknown_spot_not_found() {
        let (conn, _, _) = setup();
        let now = dt("2025-06-16 08:00");
        let result =
            is_available(&conn, "missing", &dt("2025-06-16 09:00"), &dt("2025-06-16 11:00"), &now);
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
