use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use paytrace::config::Config;
use paytrace::db::{create_pool, init_audit_db, init_db, queries, AppState};
use paytrace::handlers;
use paytrace::models::{CreateClient, CreateJourney};
use paytrace::repos::{SqliteClientRepository, SqliteJourneyRepository};
use paytrace::verify::EventVerifier;

#[derive(Parser, Debug)]
#[command(name = "paytrace")]
#[command(about = "Payment-outcome correlation engine for client activation journeys")]
struct Cli {
    /// Seed the database with dev data (a demo client and an active journey)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with a demo client and active journey for exercising
/// the simulation endpoint. Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))
        .expect("Failed to count clients");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let client = queries::create_client(
        &conn,
        &CreateClient {
            reference: "client_demo_001".to_string(),
            display_name: Some("Demo Client".to_string()),
        },
    )
    .expect("Failed to create dev client");

    let journey_id = queries::create_journey(
        &conn,
        &CreateJourney {
            client_id: client.id.clone(),
            content_version_id: "cv_demo_1".to_string(),
            page_type: "agreement".to_string(),
            hypothesis: Some("Shorter agreement page converts faster".to_string()),
            started_at: queries::now(),
        },
    )
    .expect("Failed to create dev journey");

    tracing::info!("Client: {} (id: {})", client.reference, client.id);
    tracing::info!("Journey: {}", journey_id);
    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    // Copy-paste friendly output for driving the simulation endpoint
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  client_reference: {}", client.reference);
    println!("  client_id: {}", client.id);
    println!("--- END COPY ---");
    println!();
}

/// Spawns a background task that periodically purges processed-event ids
/// past the retention window. Providers stop redelivering after a few days,
/// so old ids only cost duplicate-lookup time. The audit store is never
/// touched.
fn spawn_retention_task(state: AppState, retention_days: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60 * 60); // hourly

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match queries::purge_old_processed_events(&conn, retention_days) {
                    Ok(count) => {
                        if count > 0 {
                            tracing::debug!("Purged {} expired processed-event ids", count);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to purge processed events: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for retention purge: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Retention task started (hourly, {}-day window)",
        retention_days
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paytrace=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        verifier: EventVerifier::new(&config.webhook_secret),
        clients: Arc::new(SqliteClientRepository),
        journeys: Arc::new(SqliteJourneyRepository),
        processing_deadline: config.processing_deadline,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set PAYTRACE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    if config.event_retention_days > 0 {
        spawn_retention_task(state.clone(), config.event_retention_days);
    }

    let mut app = Router::new().merge(handlers::router());

    // Dev-only endpoints (only in dev mode)
    if config.dev_mode {
        use axum::routing::post;
        app = app.route("/dev/simulate", post(handlers::dev::simulate_payment_event));
        tracing::info!("DEV endpoints enabled: POST /dev/simulate");
    }

    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("paytrace server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            // Also remove WAL and SHM files if they exist
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
