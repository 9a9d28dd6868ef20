//! API Server Entry Point
//!
//! Wires the auth module, the job queue and the background tasks together.
//! Startup errors use `anyhow`; request errors are rendered by the auth
//! module through `kernel::error::AppError`.

mod config;

use std::sync::Arc;
use std::time::Duration;

use auth::domain::repository::TokenRepository;
use auth::{
    AuthAppState, EventBus, MemoryUserCache, PgAuthRepository, SendVerifyEmailHandler,
    StatsRecorder, TASK_SEND_VERIFY_EMAIL, VerifyEmailOutboxHook, auth_router,
};
use axum::{
    Router, http,
    http::{Method, header},
};
use jobs::{JobQueue, OutboxRelay, OutboxRepository, PgJobQueue, PgOutbox, TaskMux, WorkerPool};
use platform::mail::{HttpMailer, LogMailer, MailSender};
use platform::shutdown::{ShutdownCoordinator, ShutdownSignal};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ApiConfig;

/// Background tasks get this long to finish after shutdown fires
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared handles built once at startup
struct Services {
    config: ApiConfig,
    pool: sqlx::PgPool,
    repo: Arc<PgAuthRepository>,
    queue: Arc<PgJobQueue>,
    outbox: Arc<PgOutbox>,
    cache: Arc<MemoryUserCache>,
    events: EventBus,
    auth_config: Arc<auth::AuthConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,auth=info,jobs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    let services = Services {
        repo: Arc::new(PgAuthRepository::new(pool.clone())),
        queue: Arc::new(PgJobQueue::new(pool.clone())),
        outbox: Arc::new(PgOutbox::new(pool.clone())),
        cache: Arc::new(MemoryUserCache::new()),
        events: EventBus::new(),
        auth_config: Arc::new(config.auth.clone()),
        pool,
        config,
    };

    // Errors here should not prevent server startup
    cleanup(&services).await;

    match services.config.mail.clone() {
        Some(mail) => {
            tracing::info!(endpoint = %mail.endpoint, "Sending mail through the HTTP API");
            let mailer = HttpMailer::new(mail.endpoint, mail.api_key, mail.from);
            serve(services, Arc::new(mailer)).await
        }
        None => {
            tracing::warn!("MAIL_API_URL or MAIL_API_KEY not set, mails are only logged");
            serve(services, Arc::new(LogMailer)).await
        }
    }
}

async fn serve<M>(services: Services, mailer: Arc<M>) -> anyhow::Result<()>
where
    M: MailSender + Send + Sync + 'static,
{
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let services = Arc::new(services);
    let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    // Verification mails
    let mut mux = TaskMux::new();
    mux.handle(
        TASK_SEND_VERIFY_EMAIL,
        SendVerifyEmailHandler::new(
            services.repo.clone(),
            mailer,
            services.auth_config.clone(),
        ),
    );
    let workers = WorkerPool::new(services.queue.clone(), mux, services.config.worker.clone());
    tasks.push(("workers", tokio::spawn(workers.run(coordinator.subscribe()))));

    let relay = OutboxRelay::new(
        services.outbox.clone(),
        services.queue.clone(),
        services.config.relay.clone(),
    );
    tasks.push(("relay", tokio::spawn(relay.run(coordinator.subscribe()))));

    if let Some(recorder) = StatsRecorder::new(services.repo.clone(), &services.events) {
        tasks.push(("stats", tokio::spawn(recorder.run(coordinator.subscribe()))));
    }

    tasks.push((
        "maintenance",
        tokio::spawn(maintenance(services.clone(), coordinator.subscribe())),
    ));

    // CORS configuration
    let allowed_origins: Vec<http::HeaderValue> = services
        .config
        .frontend_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]));

    let auth_state = AuthAppState::new(
        services.repo.clone(),
        services.cache.clone(),
        Arc::new(VerifyEmailOutboxHook),
        services.events.clone(),
        services.auth_config.clone(),
    );

    // Build router
    let app = Router::new()
        .nest("/api/auth", auth_router(auth_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = services.config.http_addr;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    let signal = coordinator.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.wait_for_signal().await })
        .await;

    // Serve may also end on an I/O error; stop everything either way
    coordinator.shutdown();
    services.events.close();

    for (name, handle) in tasks {
        match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
            Ok(Ok(())) => tracing::debug!(task = name, "Background task stopped"),
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task panicked"),
            Err(_) => tracing::warn!(task = name, "Background task did not stop in time"),
        }
    }

    services.pool.close().await;
    tracing::info!("Shutdown complete");

    served?;
    Ok(())
}

/// Periodic cleanup until shutdown
async fn maintenance(services: Arc<Services>, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(services.config.maintenance_interval);
    // The first tick fires immediately and startup already cleaned
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => cleanup(&services).await,
        }
    }
}

/// Expired tokens, old completed jobs, relayed outbox rows and stale snapshots.
/// Failures are logged and left for the next run.
async fn cleanup(services: &Services) {
    match services.repo.delete_expired(chrono::Utc::now()).await {
        Ok(tokens) => {
            tracing::info!(tokens_deleted = tokens, "Auth token cleanup completed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Auth token cleanup failed, continuing anyway");
        }
    }

    if let Err(e) = services
        .queue
        .purge_completed(services.config.completed_job_retention)
        .await
    {
        tracing::warn!(error = %e, "Completed job purge failed, continuing anyway");
    }

    // Same retention as jobs; a relayed message is only kept for debugging
    match services
        .outbox
        .purge_dispatched(services.config.completed_job_retention)
        .await
    {
        Ok(0) => {}
        Ok(purged) => tracing::info!(outbox_purged = purged, "Dispatched outbox rows purged"),
        Err(e) => tracing::warn!(error = %e, "Outbox purge failed, continuing anyway"),
    }

    let evicted = services.cache.evict_expired().await;
    if evicted > 0 {
        tracing::debug!(evicted, "Evicted expired user snapshots");
    }
}
