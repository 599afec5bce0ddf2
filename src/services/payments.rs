use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Payment, PaymentMethod, PaymentState, PaymentStatus};
use crate::services::auth::AuthUser;

/// Records a pending payment against a booking. The amount must match the
/// booking's frozen total exactly.
pub fn record(
    conn: &mut Connection,
    now: &NaiveDateTime,
    actor: &AuthUser,
    booking_id: &str,
    amount_cents: i64,
    method: PaymentMethod,
) -> Result<Payment, AppError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    actor.can_act_on(&booking.user_id)?;

    if amount_cents != booking.total_cost_cents {
        return Err(AppError::AmountMismatch {
            expected: booking.total_cost_cents,
            got: amount_cents,
        });
    }

    let payment = Payment {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: booking.user_id.clone(),
        booking_id: booking.id.clone(),
        amount_cents,
        method,
        status: PaymentState::Pending,
        transaction_id: None,
        details: None,
        created_at: *now,
        updated_at: *now,
    };
    queries::insert_payment(&tx, &payment)?;

    // A failed earlier attempt flips back to pending so the retry is visible
    // on the booking.
    if booking.payment_status == PaymentStatus::Failed {
        queries::set_booking_payment_status(&tx, &booking.id, PaymentStatus::Pending, now)?;
    }

    tx.commit().map_err(anyhow::Error::from)?;
    tracing::info!(payment_id = %payment.id, booking_id, "payment recorded");
    Ok(payment)
}

/// Finalizes a pending payment as completed and marks the booking paid, in
/// one transaction. A booking can only ever carry one completed payment.
pub fn mark_completed(
    conn: &mut Connection,
    now: &NaiveDateTime,
    actor: &AuthUser,
    payment_id: &str,
    transaction_id: &str,
) -> Result<Payment, AppError> {
    if transaction_id.trim().is_empty() {
        return Err(AppError::Validation("transaction id is required".to_string()));
    }

    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let payment = queries::get_payment(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
    actor.can_act_on(&payment.user_id)?;

    if payment.status.is_final() {
        return Err(AppError::AlreadyFinalized);
    }
    if queries::has_completed_payment(&tx, &payment.booking_id)? {
        return Err(AppError::Conflict(
            "booking already has a completed payment".to_string(),
        ));
    }

    match queries::finalize_payment_if_pending(
        &tx,
        payment_id,
        PaymentState::Completed,
        Some(transaction_id),
        now,
    ) {
        Ok(true) => {}
        Ok(false) => return Err(AppError::AlreadyFinalized),
        Err(e) if queries::is_unique_violation(&e) => {
            return Err(AppError::Conflict(format!(
                "transaction id {transaction_id} is already in use"
            )))
        }
        Err(e) => return Err(e.into()),
    }
    queries::set_booking_payment_status(&tx, &payment.booking_id, PaymentStatus::Paid, now)?;
    queries::record_monthly_payment(&tx, now, payment.amount_cents)?;

    let updated = queries::get_payment(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(payment_id, booking_id = %updated.booking_id, "payment completed");
    Ok(updated)
}

pub fn mark_failed(
    conn: &mut Connection,
    now: &NaiveDateTime,
    actor: &AuthUser,
    payment_id: &str,
) -> Result<Payment, AppError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let payment = queries::get_payment(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
    actor.can_act_on(&payment.user_id)?;

    if !queries::finalize_payment_if_pending(&tx, payment_id, PaymentState::Failed, None, now)? {
        return Err(AppError::AlreadyFinalized);
    }

    // Only downgrade the booking while it is still waiting on this payment;
    // a booking already paid through another attempt stays paid.
    let booking = queries::get_booking(&tx, &payment.booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {}", payment.booking_id)))?;
    if booking.payment_status == PaymentStatus::Pending {
        queries::set_booking_payment_status(&tx, &booking.id, PaymentStatus::Failed, now)?;
    }

    let updated = queries::get_payment(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
    tx.commit().map_err(anyhow::Error::from)?;
    Ok(updated)
}

/// Refund of a completed payment; only legal once the booking itself is
/// finished (cancelled or completed).
pub fn refund(
    conn: &mut Connection,
    now: &NaiveDateTime,
    payment_id: &str,
) -> Result<Payment, AppError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let payment = queries::get_payment(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;

    if payment.status != PaymentState::Completed {
        return Err(AppError::InvalidRefundState(format!(
            "only completed payments can be refunded, this one is {}",
            payment.status.as_str()
        )));
    }

    let booking = queries::get_booking(&tx, &payment.booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {}", payment.booking_id)))?;
    if !matches!(
        booking.status,
        crate::models::BookingStatus::Cancelled | crate::models::BookingStatus::Completed
    ) {
        return Err(AppError::InvalidRefundState(format!(
            "booking must be cancelled or completed before refund, it is {}",
            booking.status.as_str()
        )));
    }

    if !queries::refund_payment_if_completed(&tx, payment_id, now)? {
        return Err(AppError::InvalidRefundState(
            "payment is no longer refundable".to_string(),
        ));
    }
    queries::set_booking_payment_status(&tx, &booking.id, PaymentStatus::Refunded, now)?;

    let updated = queries::get_payment(&tx, payment_id)?
        .ok_or_else(|| AppError::NotFound(format!("payment {payment_id}")))?;
    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(payment_id, booking_id = %updated.booking_id, "payment refunded");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{BookingStatus, Role, VehicleInfo};
    use crate::services::{auth, bookings};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn vehicle() -> VehicleInfo {
        VehicleInfo {
            license_plate: "BA-2-1234".to_string(),
            make: None,
            model: None,
            color: None,
        }
    }

    // A user, a $7.50/hr spot, and a 2h active booking ($15.00 total).
    fn setup() -> (Connection, AuthUser, String) {
        let mut conn = db::init_db(":memory:").unwrap();
        let user = auth::register(&conn, "Asha", "asha@example.com", "password123", None).unwrap();
        let spot = bookings::test_support::make_spot(&conn, "A1", 750);
        let now = dt("2025-06-16 08:00");
        let booking_id = bookings::test_support::make_booking(
            &mut conn,
            &user.id,
            &spot,
            &now,
            "2025-06-16 09:00",
            "2025-06-16 11:00",
            vehicle(),
        );
        let actor = AuthUser {
            id: user.id,
            role: Role::User,
        };
        (conn, actor, booking_id)
    }

    #[test]
    fn test_record_matching_amount() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");

        let payment = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();
        assert_eq!(payment.status, PaymentState::Pending);
        assert_eq!(payment.amount_cents, 1500);
    }

    #[test]
    fn test_record_amount_mismatch() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");

        let err = record(&mut conn, &now, &actor, &booking_id, 1499, PaymentMethod::Khalti)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::AmountMismatch {
                expected: 1500,
                got: 1499
            }
        ));
    }

    #[test]
    fn test_complete_marks_booking_paid() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");
        let payment = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();

        let completed = mark_completed(&mut conn, &now, &actor, &payment.id, "txn-123").unwrap();
        assert_eq!(completed.status, PaymentState::Completed);
        assert_eq!(completed.transaction_id.as_deref(), Some("txn-123"));

        let booking = queries::get_booking(&conn, &booking_id).unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_complete_only_once() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");
        let payment = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();
        mark_completed(&mut conn, &now, &actor, &payment.id, "txn-123").unwrap();

        let err = mark_completed(&mut conn, &now, &actor, &payment.id, "txn-456").unwrap_err();
        assert!(matches!(err, AppError::AlreadyFinalized));
    }

    #[test]
    fn test_one_completed_payment_per_booking() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");
        let first = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();
        let second = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Cash)
            .unwrap();
        mark_completed(&mut conn, &now, &actor, &first.id, "txn-123").unwrap();

        let err = mark_completed(&mut conn, &now, &actor, &second.id, "txn-456").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_failed_payment_allows_retry() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");
        let payment = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();

        mark_failed(&mut conn, &now, &actor, &payment.id).unwrap();
        let booking = queries::get_booking(&conn, &booking_id).unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Failed);

        // A fresh attempt resets the booking to pending and can complete
        let retry = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Cash)
            .unwrap();
        let booking = queries::get_booking(&conn, &booking_id).unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Pending);

        mark_completed(&mut conn, &now, &actor, &retry.id, "txn-789").unwrap();
        let booking = queries::get_booking(&conn, &booking_id).unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_refund_requires_finished_booking() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");
        let payment = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();
        mark_completed(&mut conn, &now, &actor, &payment.id, "txn-123").unwrap();

        // Booking still active
        let err = refund(&mut conn, &now, &payment.id).unwrap_err();
        assert!(matches!(err, AppError::InvalidRefundState(_)));

        bookings::cancel(&mut conn, &now, &booking_id, &actor).unwrap();
        let refunded = refund(&mut conn, &now, &payment.id).unwrap();
        assert_eq!(refunded.status, PaymentState::Refunded);

        let booking = queries::get_booking(&conn, &booking_id).unwrap().unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_refund_rejects_pending_payment() {
        let (mut conn, actor, booking_id) = setup();
        let now = dt("2025-06-16 09:00");
        let payment = record(&mut conn, &now, &actor, &booking_id, 1500, PaymentMethod::Khalti)
            .unwrap();
        bookings::cancel(&mut conn, &now, &booking_id, &actor).unwrap();

        let err = refund(&mut conn, &now, &payment.id).unwrap_err();
        assert!(matches!(err, AppError::InvalidRefundState(_)));
    }

    #[test]
    fn test_record_requires_ownership() {
        let (mut conn, _, booking_id) = setup();
        let other = auth::register(&conn, "Bibek", "bibek@example.com", "password123", None).unwrap();
        let stranger = AuthUser {
            id: other.id,
            role: Role::User,
        };
        let now = dt("2025-06-16 09:00");

        let err = record(&mut conn, &now, &stranger, &booking_id, 1500, PaymentMethod::Cash)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
