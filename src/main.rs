use std::sync::{Arc, Mutex};

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use parkwise::config::AppConfig;
use parkwise::db;
use parkwise::handlers;
use parkwise::services::{auth, expiry};
use parkwise::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    auth::ensure_bootstrap_admin(&conn, &config)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
    });

    expiry::spawn_expiry_worker(Arc::clone(&state));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/spots", post(handlers::spots::create_spot))
        .route("/api/spots", get(handlers::spots::list_spots))
        .route("/api/spots/:id", get(handlers::spots::get_spot))
        .route("/api/spots/:id", patch(handlers::spots::update_spot))
        .route(
            "/api/spots/:id/maintenance",
            post(handlers::spots::set_maintenance),
        )
        .route(
            "/api/spots/:id/availability",
            get(handlers::spots::check_availability),
        )
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings", get(handlers::bookings::list_bookings))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/complete",
            post(handlers::bookings::complete_booking),
        )
        .route("/api/payments", post(handlers::payments::create_payment))
        .route("/api/payments", get(handlers::payments::list_payments))
        .route("/api/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/api/payments/:id/complete",
            post(handlers::payments::complete_payment),
        )
        .route(
            "/api/payments/:id/fail",
            post(handlers::payments::fail_payment),
        )
        .route(
            "/api/payments/:id/refund",
            post(handlers::payments::refund_payment),
        )
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        .route("/api/admin/activity", get(handlers::admin::get_activity))
        .route(
            "/api/admin/users/:id/role",
            post(handlers::admin::set_user_role),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
