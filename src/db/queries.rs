use chrono::{NaiveDateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection};

use crate::models::{
    Booking, BookingStatus, PageParams, ParkingSpot, Payment, PaymentMethod, PaymentState,
    PaymentStatus, Role, SortOrder, SpotStatus, SpotType, User, VehicleInfo,
};

pub const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// True when the underlying sqlite error is a UNIQUE/constraint violation,
/// which callers surface as a conflict rather than an internal error.
pub fn is_unique_violation(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Users ──

pub fn insert_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, phone, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id,
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.phone,
            fmt_dt(&user.created_at),
            fmt_dt(&user.updated_at),
        ],
    )?;
    Ok(())
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, phone, created_at, updated_at";

fn parse_user_row(row: &rusqlite::Row) -> anyhow::Result<User> {
    let role_str: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::parse(&role_str).unwrap_or(Role::User),
        phone: row.get(5)?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        |row| Ok(parse_user_row(row)),
    );

    match result {
        Ok(user) => Ok(Some(user?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        |row| Ok(parse_user_row(row)),
    );

    match result {
        Ok(user) => Ok(Some(user?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_user_role(conn: &Connection, id: &str, role: Role) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
        params![role.as_str(), now, id],
    )?;
    Ok(count > 0)
}

// ── Parking spots ──

// Spot status is never stored; it is derived from the maintenance flag and
// the spot's active bookings relative to `?1` (now).
const SPOT_STATUS_EXPR: &str = "CASE
    WHEN s.maintenance != 0 THEN 'maintenance'
    WHEN EXISTS (SELECT 1 FROM bookings b WHERE b.spot_id = s.id AND b.status = 'active'
                 AND b.start_time <= ?1 AND b.end_time > ?1) THEN 'occupied'
    WHEN EXISTS (SELECT 1 FROM bookings b WHERE b.spot_id = s.id AND b.status = 'active'
                 AND b.start_time > ?1) THEN 'reserved'
    ELSE 'available'
END";

const SPOT_COLUMNS: &str = "s.id, s.spot_number, s.location, s.address, s.latitude, s.longitude, \
     s.spot_type, s.hourly_rate_cents, s.features, s.description, s.maintenance, \
     s.created_at, s.updated_at";

fn parse_spot_row(row: &rusqlite::Row) -> anyhow::Result<ParkingSpot> {
    let spot_type_str: String = row.get(6)?;
    let features_json: String = row.get(8)?;
    let maintenance: i64 = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    let status_str: String = row.get(13)?;

    Ok(ParkingSpot {
        id: row.get(0)?,
        spot_number: row.get(1)?,
        location: row.get(2)?,
        address: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        spot_type: SpotType::parse(&spot_type_str).unwrap_or(SpotType::Standard),
        hourly_rate_cents: row.get(7)?,
        features: serde_json::from_str(&features_json).unwrap_or_default(),
        description: row.get(9)?,
        maintenance: maintenance != 0,
        status: SpotStatus::parse(&status_str).unwrap_or(SpotStatus::Available),
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

pub fn insert_spot(conn: &Connection, spot: &ParkingSpot) -> anyhow::Result<()> {
    let features = serde_json::to_string(&spot.features)?;
    conn.execute(
        "INSERT INTO parking_spots (id, spot_number, location, address, latitude, longitude,
             spot_type, hourly_rate_cents, features, description, maintenance, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            spot.id,
            spot.spot_number,
            spot.location,
            spot.address,
            spot.latitude,
            spot.longitude,
            spot.spot_type.as_str(),
            spot.hourly_rate_cents,
            features,
            spot.description,
            spot.maintenance as i32,
            fmt_dt(&spot.created_at),
            fmt_dt(&spot.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_spot(conn: &Connection, spot: &ParkingSpot) -> anyhow::Result<bool> {
    let features = serde_json::to_string(&spot.features)?;
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE parking_spots SET spot_number = ?1, location = ?2, address = ?3, latitude = ?4,
             longitude = ?5, spot_type = ?6, hourly_rate_cents = ?7, features = ?8,
             description = ?9, updated_at = ?10
         WHERE id = ?11",
        params![
            spot.spot_number,
            spot.location,
            spot.address,
            spot.latitude,
            spot.longitude,
            spot.spot_type.as_str(),
            spot.hourly_rate_cents,
            features,
            spot.description,
            now,
            spot.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn set_spot_maintenance(conn: &Connection, id: &str, enabled: bool) -> anyhow::Result<bool> {
    let now = fmt_dt(&Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE parking_spots SET maintenance = ?1, updated_at = ?2 WHERE id = ?3",
        params![enabled as i32, now, id],
    )?;
    Ok(count > 0)
}

pub fn get_spot(
    conn: &Connection,
    id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<ParkingSpot>> {
    let result = conn.query_row(
        &format!(
            "SELECT {SPOT_COLUMNS}, {SPOT_STATUS_EXPR} FROM parking_spots s WHERE s.id = ?2"
        ),
        params![fmt_dt(now), id],
        |row| Ok(parse_spot_row(row)),
    );

    match result {
        Ok(spot) => Ok(Some(spot?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Default)]
pub struct SpotFilter {
    pub spot_type: Option<SpotType>,
    pub status: Option<SpotStatus>,
    pub min_rate_cents: Option<i64>,
    pub max_rate_cents: Option<i64>,
}

pub fn list_spots(
    conn: &Connection,
    filter: &SpotFilter,
    page: PageParams,
    now: &NaiveDateTime,
) -> anyhow::Result<(Vec<ParkingSpot>, i64)> {
    let mut clauses: Vec<String> = vec![];
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(fmt_dt(now))];

    if let Some(spot_type) = filter.spot_type {
        args.push(Box::new(spot_type.as_str().to_string()));
        clauses.push(format!("s.spot_type = ?{}", args.len()));
    }
    if let Some(status) = filter.status {
        args.push(Box::new(status.as_str().to_string()));
        clauses.push(format!("({SPOT_STATUS_EXPR}) = ?{}", args.len()));
    }
    if let Some(min) = filter.min_rate_cents {
        args.push(Box::new(min));
        clauses.push(format!("s.hourly_rate_cents >= ?{}", args.len()));
    }
    if let Some(max) = filter.max_rate_cents {
        args.push(Box::new(max));
        clauses.push(format!("s.hourly_rate_cents <= ?{}", args.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let args_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    // Counted over a subquery so the `?1` (now) binding is always referenced.
    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM (SELECT s.id, {SPOT_STATUS_EXPR} FROM parking_spots s {where_sql})"
        ),
        args_refs.as_slice(),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {SPOT_COLUMNS}, {SPOT_STATUS_EXPR} FROM parking_spots s {where_sql}
         ORDER BY s.spot_number ASC LIMIT {} OFFSET {}",
        page.limit,
        page.offset()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args_refs.as_slice(), |row| Ok(parse_spot_row(row)))?;

    let mut spots = vec![];
    for row in rows {
        spots.push(row??);
    }
    Ok((spots, total))
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, user_id, spot_id, start_time, end_time, duration_minutes, \
     total_cost_cents, status, payment_status, payment_method, vehicle, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time: String = row.get(3)?;
    let end_time: String = row.get(4)?;
    let status_str: String = row.get(7)?;
    let payment_status_str: String = row.get(8)?;
    let vehicle_json: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    let vehicle: VehicleInfo = serde_json::from_str(&vehicle_json)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        spot_id: row.get(2)?,
        start_time: parse_dt(&start_time),
        end_time: parse_dt(&end_time),
        duration_minutes: row.get(5)?,
        total_cost_cents: row.get(6)?,
        status: BookingStatus::parse(&status_str).unwrap_or(BookingStatus::Active),
        payment_status: PaymentStatus::parse(&payment_status_str).unwrap_or(PaymentStatus::Pending),
        payment_method: row.get(9)?,
        vehicle,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let vehicle = serde_json::to_string(&booking.vehicle)?;
    conn.execute(
        "INSERT INTO bookings (id, user_id, spot_id, start_time, end_time, duration_minutes,
             total_cost_cents, status, payment_status, payment_method, vehicle, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            booking.id,
            booking.user_id,
            booking.spot_id,
            fmt_dt(&booking.start_time),
            fmt_dt(&booking.end_time),
            booking.duration_minutes,
            booking.total_cost_cents,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.payment_method,
            vehicle,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Interval overlap test against active bookings only: an existing booking
/// conflicts when it starts before the candidate ends and ends after the
/// candidate starts.
pub fn count_overlapping_active(
    conn: &Connection,
    spot_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE spot_id = ?1 AND status = 'active' AND start_time < ?2 AND end_time > ?3",
        params![spot_id, fmt_dt(end), fmt_dt(start)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Conditional transition out of `active`. Returns false when the booking is
/// no longer active (or does not exist), so concurrent callers cannot both
/// win.
pub fn transition_booking_if_active(
    conn: &Connection,
    id: &str,
    to: BookingStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'active'",
        params![to.as_str(), fmt_dt(now), id],
    )?;
    Ok(count > 0)
}

pub fn expire_due_bookings(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let now_str = fmt_dt(now);
    let count = conn.execute(
        "UPDATE bookings SET status = 'expired', updated_at = ?1
         WHERE status = 'active' AND end_time < ?1",
        params![now_str],
    )?;
    Ok(count)
}

pub fn set_booking_payment_status(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), fmt_dt(now), id],
    )?;
    Ok(count > 0)
}

pub fn list_bookings(
    conn: &Connection,
    user_id: Option<&str>,
    status: Option<BookingStatus>,
    sort_field: &str,
    order: SortOrder,
    page: PageParams,
) -> anyhow::Result<(Vec<Booking>, i64)> {
    let mut clauses: Vec<String> = vec![];
    let mut args: Vec<Box<dyn ToSql>> = vec![];

    if let Some(user_id) = user_id {
        args.push(Box::new(user_id.to_string()));
        clauses.push(format!("user_id = ?{}", args.len()));
    }
    if let Some(status) = status {
        args.push(Box::new(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", args.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let args_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM bookings {where_sql}"),
        args_refs.as_slice(),
        |row| row.get(0),
    )?;

    // sort_field comes from a whitelist, never raw caller input.
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_sql}
         ORDER BY {sort_field} {} LIMIT {} OFFSET {}",
        order.as_sql(),
        page.limit,
        page.offset()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok((bookings, total))
}

// ── Payments ──

const PAYMENT_COLUMNS: &str = "id, user_id, booking_id, amount_cents, method, status, \
     transaction_id, details, created_at, updated_at";

fn parse_payment_row(row: &rusqlite::Row) -> anyhow::Result<Payment> {
    let method_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let details_json: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    let details = match details_json {
        Some(s) => Some(serde_json::from_str(&s)?),
        None => None,
    };

    Ok(Payment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        booking_id: row.get(2)?,
        amount_cents: row.get(3)?,
        method: PaymentMethod::parse(&method_str).unwrap_or(PaymentMethod::Cash),
        status: PaymentState::parse(&status_str).unwrap_or(PaymentState::Pending),
        transaction_id: row.get(6)?,
        details,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

pub fn insert_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<()> {
    let details = match &payment.details {
        Some(v) => Some(serde_json::to_string(v)?),
        None => None,
    };
    conn.execute(
        "INSERT INTO payments (id, user_id, booking_id, amount_cents, method, status,
             transaction_id, details, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            payment.id,
            payment.user_id,
            payment.booking_id,
            payment.amount_cents,
            payment.method.as_str(),
            payment.status.as_str(),
            payment.transaction_id,
            details,
            fmt_dt(&payment.created_at),
            fmt_dt(&payment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_payment(conn: &Connection, id: &str) -> anyhow::Result<Option<Payment>> {
    let result = conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
        params![id],
        |row| Ok(parse_payment_row(row)),
    );

    match result {
        Ok(payment) => Ok(Some(payment?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn has_completed_payment(conn: &Connection, booking_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE booking_id = ?1 AND status = 'completed'",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Conditional finalization: only a pending payment can move to a final
/// state, which makes completion/failure idempotence races safe.
pub fn finalize_payment_if_pending(
    conn: &Connection,
    id: &str,
    to: PaymentState,
    transaction_id: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET status = ?1, transaction_id = COALESCE(?2, transaction_id),
             updated_at = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![to.as_str(), transaction_id, fmt_dt(now), id],
    )?;
    Ok(count > 0)
}

pub fn refund_payment_if_completed(
    conn: &Connection,
    id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET status = 'refunded', updated_at = ?1
         WHERE id = ?2 AND status = 'completed'",
        params![fmt_dt(now), id],
    )?;
    Ok(count > 0)
}

pub fn list_payments(
    conn: &Connection,
    user_id: Option<&str>,
    status: Option<PaymentState>,
    page: PageParams,
) -> anyhow::Result<(Vec<Payment>, i64)> {
    let mut clauses: Vec<String> = vec![];
    let mut args: Vec<Box<dyn ToSql>> = vec![];

    if let Some(user_id) = user_id {
        args.push(Box::new(user_id.to_string()));
        clauses.push(format!("user_id = ?{}", args.len()));
    }
    if let Some(status) = status {
        args.push(Box::new(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", args.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let args_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM payments {where_sql}"),
        args_refs.as_slice(),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments {where_sql}
         ORDER BY created_at DESC LIMIT {} OFFSET {}",
        page.limit,
        page.offset()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args_refs.as_slice(), |row| Ok(parse_payment_row(row)))?;

    let mut payments = vec![];
    for row in rows {
        payments.push(row??);
    }
    Ok((payments, total))
}

// ── Monthly activity ──

fn month_of(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m").to_string()
}

fn bump_monthly(
    conn: &Connection,
    now: &NaiveDateTime,
    column: &'static str,
    by: i64,
) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO monthly_activity (month, {column}) VALUES (?1, ?2)
             ON CONFLICT(month) DO UPDATE SET {column} = {column} + ?2"
        ),
        params![month_of(now), by],
    )?;
    Ok(())
}

pub fn increment_monthly_created(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<()> {
    bump_monthly(conn, now, "bookings_created", 1)
}

pub fn increment_monthly_cancelled(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<()> {
    bump_monthly(conn, now, "bookings_cancelled", 1)
}

pub fn increment_monthly_completed(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<()> {
    bump_monthly(conn, now, "bookings_completed", 1)
}

pub fn increment_monthly_expired(
    conn: &Connection,
    now: &NaiveDateTime,
    count: i64,
) -> anyhow::Result<()> {
    if count > 0 {
        bump_monthly(conn, now, "bookings_expired", count)?;
    }
    Ok(())
}

pub fn record_monthly_payment(
    conn: &Connection,
    now: &NaiveDateTime,
    amount_cents: i64,
) -> anyhow::Result<()> {
    bump_monthly(conn, now, "payments_completed", 1)?;
    bump_monthly(conn, now, "revenue_cents", amount_cents)
}

pub struct MonthlyActivity {
    pub month: String,
    pub bookings_created: i64,
    pub bookings_cancelled: i64,
    pub bookings_completed: i64,
    pub bookings_expired: i64,
    pub payments_completed: i64,
    pub revenue_cents: i64,
}

pub fn get_recent_monthly_activity(
    conn: &Connection,
    now: &NaiveDateTime,
    months: usize,
) -> anyhow::Result<Vec<MonthlyActivity>> {
    let mut result = Vec::with_capacity(months);

    for i in 0..months {
        let date = now
            .and_utc()
            .checked_sub_months(chrono::Months::new(i as u32))
            .map(|d| d.naive_utc())
            .unwrap_or(*now);
        let month = month_of(&date);

        let activity = conn.query_row(
            "SELECT month, bookings_created, bookings_cancelled, bookings_completed,
                    bookings_expired, payments_completed, revenue_cents
             FROM monthly_activity WHERE month = ?1",
            params![month],
            |row| {
                Ok(MonthlyActivity {
                    month: row.get(0)?,
                    bookings_created: row.get(1)?,
                    bookings_cancelled: row.get(2)?,
                    bookings_completed: row.get(3)?,
                    bookings_expired: row.get(4)?,
                    payments_completed: row.get(5)?,
                    revenue_cents: row.get(6)?,
                })
            },
        );

        result.push(match activity {
            Ok(a) => a,
            Err(rusqlite::Error::QueryReturnedNoRows) => MonthlyActivity {
                month,
                bookings_created: 0,
                bookings_cancelled: 0,
                bookings_completed: 0,
                bookings_expired: 0,
                payments_completed: 0,
                revenue_cents: 0,
            },
            Err(e) => return Err(e.into()),
        });
    }

    // Oldest first
    result.reverse();
    Ok(result)
}

// ── Dashboard ──

pub struct DashboardStats {
    pub total_spots: i64,
    pub available_spots: i64,
    pub occupied_spots: i64,
    pub reserved_spots: i64,
    pub maintenance_spots: i64,
    pub active_bookings: i64,
    pub pending_payments: i64,
    pub revenue_this_month_cents: i64,
}

pub fn get_dashboard_stats(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<DashboardStats> {
    let now_str = fmt_dt(now);

    let (total, available, occupied, reserved, maintenance) = conn.query_row(
        &format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(({SPOT_STATUS_EXPR}) = 'available'), 0),
                    COALESCE(SUM(({SPOT_STATUS_EXPR}) = 'occupied'), 0),
                    COALESCE(SUM(({SPOT_STATUS_EXPR}) = 'reserved'), 0),
                    COALESCE(SUM(s.maintenance != 0), 0)
             FROM parking_spots s"
        ),
        params![now_str],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        },
    )?;

    let active_bookings: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE status = 'active'",
        [],
        |row| row.get(0),
    )?;

    let pending_payments: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;

    let revenue_this_month_cents: i64 = conn
        .query_row(
            "SELECT revenue_cents FROM monthly_activity WHERE month = ?1",
            params![month_of(now)],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(DashboardStats {
        total_spots: total,
        available_spots: available,
        occupied_spots: occupied,
        reserved_spots: reserved,
        maintenance_spots: maintenance,
        active_bookings,
        pending_payments,
        revenue_this_month_cents,
    })
}
