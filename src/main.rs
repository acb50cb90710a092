use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yamdb_api::{
    AppState, InMemoryRepository, LogNotifier, NotifierState, PostgresRepository,
    RepositoryState, SmtpNotifier, accounts,
    config::{AppConfig, Env, StorageBackend},
    create_router,
};

/// main
///
/// Entry point: configuration, logging, persistence, mail, then the HTTP server.
/// Any startup failure is fatal.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for this crate and request summaries from tower-http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yamdb_api=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON lines for log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Persistence
    let repo: RepositoryState = match config.storage {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&config.db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("FATAL: Failed to apply database migrations.");
            tracing::info!("Database migrations applied.");

            Arc::new(PostgresRepository::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("STORAGE=memory: data lives only as long as this process.");
            Arc::new(InMemoryRepository::new())
        }
    };

    // 5. Mail delivery for confirmation codes
    let notifier: NotifierState = match &config.smtp {
        Some(smtp) => Arc::new(
            SmtpNotifier::new(smtp).unwrap_or_else(|e| panic!("FATAL: Invalid SMTP settings: {e}")),
        ),
        None => {
            tracing::warn!("SMTP_HOST not set: confirmation codes will only be logged.");
            Arc::new(LogNotifier)
        }
    };

    // 6. Optional bootstrap superuser
    if let Some((username, email)) = &config.bootstrap_admin {
        if let Err(e) = accounts::ensure_admin(&repo, username, email).await {
            panic!("FATAL: Could not ensure bootstrap admin {username}: {e}");
        }
    }

    // 7. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        notifier,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Cannot bind {bind_addr}: {e}"));

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
