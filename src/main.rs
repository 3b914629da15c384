use axum::Router;
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use activator::config::Config;
use activator::db::{AppState, DbPool, create_pool, init_db, queries};
use activator::handlers;
use activator::models::NewActivationCode;
use activator::registry::{self, DEMO_CODES};
use activator::util::{SECONDS_PER_DAY, now};

#[derive(Parser, Debug)]
#[command(name = "activator")]
#[command(about = "Machine-bound activation code service")]
struct Cli {
    /// Seed the database with the demo activation codes (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the demo codes: one activation each, valid for a year, version "3.0".
/// Codes that already exist are left untouched.
fn seed_dev_codes(pool: &DbPool) {
    let conn = pool.get().expect("Failed to get db connection for seeding");
    let expire_date = now() + 365 * SECONDS_PER_DAY;

    tracing::info!("============================================");
    tracing::info!("SEEDING DEMO ACTIVATION CODES");
    tracing::info!("============================================");

    for code in DEMO_CODES {
        let existing =
            queries::get_activation_code(&conn, code).expect("Failed to look up demo code");
        if existing.is_some() {
            tracing::info!("Code {} already exists, skipping", code);
            continue;
        }

        let input = NewActivationCode {
            code: code.to_string(),
            max_activations: 1,
            expire_date,
            version: "3.0".to_string(),
            notes: Some("demo".to_string()),
        };
        let created =
            queries::create_activation_code(&conn, &input).expect("Failed to create demo code");
        tracing::info!("Code: {} (id: {})", created.code, created.id);
    }

    tracing::info!("============================================");
}

/// Spawns a background task that periodically moves unused codes past their
/// expiry to `expired`. Codes are never deleted.
fn spawn_expiry_sweep(pool: DbPool, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match pool.get() {
                Ok(conn) => match registry::expire_stale(&conn, now()) {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!("Expired {} stale activation codes", count);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to sweep expired activation codes: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for expiry sweep: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Background expiry sweep started (runs every {}s)",
        interval.as_secs()
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "activator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool =
        create_pool(&config.database_path, config.db).expect("Failed to create database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set ACTIVATOR_ENV=dev)");
        } else {
            seed_dev_codes(&db_pool);
        }
    }

    // Catch codes that expired while the server was down
    match db_pool.get() {
        Ok(conn) => match registry::expire_stale(&conn, now()) {
            Ok(count) if count > 0 => tracing::info!("Expired {} stale activation codes", count),
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to sweep expired activation codes: {}", e),
        },
        Err(e) => tracing::warn!("Failed to get db connection for expiry sweep: {}", e),
    }

    if let Some(interval) = config.expiry_sweep_interval {
        spawn_expiry_sweep(db_pool.clone(), interval);
    }

    let state = AppState::new(db_pool);

    let app = Router::new()
        .merge(handlers::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cli.ephemeral && !config.dev_mode {
        tracing::warn!("--ephemeral flag ignored: not in dev mode (set ACTIVATOR_ENV=dev)");
    }
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Activator server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
