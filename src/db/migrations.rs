use anyhow::Context;
use rusqlite::Connection;

/// Ordered list of embedded migrations. Applied once each, tracked in the
/// `_migrations` table by name.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        phone TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS parking_spots (
        id TEXT PRIMARY KEY,
        spot_number TEXT NOT NULL UNIQUE,
        location TEXT NOT NULL,
        address TEXT,
        latitude REAL,
        longitude REAL,
        spot_type TEXT NOT NULL DEFAULT 'standard',
        hourly_rate_cents INTEGER NOT NULL,
        features TEXT NOT NULL DEFAULT '[]',
        description TEXT,
        maintenance INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bookings (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        spot_id TEXT NOT NULL REFERENCES parking_spots(id),
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        duration_minutes INTEGER NOT NULL,
        total_cost_cents INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        payment_status TEXT NOT NULL DEFAULT 'pending',
        payment_method TEXT,
        vehicle TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_bookings_spot_status ON bookings(spot_id, status);
    CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id);

    CREATE TABLE IF NOT EXISTS payments (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        booking_id TEXT NOT NULL REFERENCES bookings(id),
        amount_cents INTEGER NOT NULL,
        method TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        transaction_id TEXT UNIQUE,
        details TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_payments_booking ON payments(booking_id);

    CREATE TABLE IF NOT EXISTS monthly_activity (
        month TEXT PRIMARY KEY,
        bookings_created INTEGER NOT NULL DEFAULT 0,
        bookings_cancelled INTEGER NOT NULL DEFAULT 0,
        bookings_completed INTEGER NOT NULL DEFAULT 0,
        bookings_expired INTEGER NOT NULL DEFAULT 0,
        payments_completed INTEGER NOT NULL DEFAULT 0,
        revenue_cents INTEGER NOT NULL DEFAULT 0
    );",
)];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
