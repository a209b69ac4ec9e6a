//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors; request-path errors stay inside the
//! gate crates and never stop the server.

use axum::{
    Router,
    http::{HeaderName, Method, header},
    middleware::from_fn_with_state,
    routing::get,
};
use guard::domain::repository::{GuardStore, PowStore};
use guard::presentation::handlers::{GuardAppState, check_status};
use guard::presentation::middleware::security_gate;
use guard::application::maintenance::DEFAULT_INTERVAL;
use guard::{
    BackgroundWriter, FeatureFlagsManager, GuardConfig, Maintenance, MemoryGuardRepository,
    NoCaptchaProvider, PgGuardRepository, SecurityMiddleware, SecurityTelemetry, StaticRiskScorer,
    challenge_router, security_router,
};
use pow::{MemoryPowRepository, PgPowRepository, PowConfig, ProofOfWork};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer, ExposeHeaders};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:31113";
/// Budget for one background write
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,guard=info,pow=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let guard_config = GuardConfig::from_env()?;
    let pow_config = PowConfig::from_env()?;

    let bind_addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()?;

    // Storage is chosen once; without a usable database everything runs in memory
    let pool = match env::var("DATABASE_URL") {
        Ok(database_url) => match connect(&database_url).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Database unavailable, falling back to in-memory stores"
                );
                None
            }
        },
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            None
        }
    };

    let app = match pool {
        Some(pool) => {
            build_app(
                Arc::new(PgGuardRepository::new(pool.clone())),
                Arc::new(PgPowRepository::new(pool)),
                guard_config,
                pow_config,
            )
            .await
        }
        None => {
            let retention = guard_config.max_window();
            build_app(
                Arc::new(MemoryGuardRepository::with_retention(retention)),
                Arc::new(MemoryPowRepository::new()),
                guard_config,
                pow_config,
            )
            .await
        }
    };

    let app = app.layer(TraceLayer::new_for_http()).layer(cors());

    // Start server
    tracing::info!("Listening on {}", bind_addr);

    let listener = TcpListener::bind(bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    Ok(pool)
}

async fn build_app<G, P>(
    store: Arc<G>,
    pow_store: Arc<P>,
    config: GuardConfig,
    pow_config: PowConfig,
) -> Router
where
    G: GuardStore,
    P: PowStore,
{
    let config = Arc::new(config);
    let (writer, _writer_task) = BackgroundWriter::spawn(store.clone(), config.writer_capacity, WRITE_TIMEOUT);

    let flags = Arc::new(FeatureFlagsManager::new(
        store.clone(),
        writer.clone(),
        config.flag_defaults,
        config.flag_cache_ttl,
        config.store_timeout,
    ));
    if let Err(e) = flags.initialize_flags().await {
        tracing::warn!(error = %e, "Feature flag initialization failed, using defaults");
    }

    let telemetry = Arc::new(SecurityTelemetry::new(writer, config.debug_headers));

    // The risk model and CAPTCHA provider are deployed separately; these
    // stand-ins allow everything and accept no CAPTCHA pass.
    let gate = Arc::new(SecurityMiddleware::new(
        config,
        store.clone(),
        pow_store.clone(),
        flags,
        telemetry,
        Arc::new(StaticRiskScorer::default()),
        Arc::new(NoCaptchaProvider),
    ));

    // First sweep runs immediately; failures are logged and never stop startup
    let _maintenance_task = Maintenance::new(gate.clone(), store, pow_store.clone()).spawn(DEFAULT_INTERVAL);

    let state = GuardAppState {
        gate: gate.clone(),
        pow_store,
        pow: Arc::new(ProofOfWork::new(Arc::new(pow_config))),
    };

    let protected = Router::new()
        .route("/api/security/check", get(check_status))
        .layer(from_fn_with_state(
            gate,
            security_gate::<G, P, StaticRiskScorer, NoCaptchaProvider>,
        ));

    Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .nest("/api/pow", challenge_router(state.clone()))
        .nest("/api/security", security_router(state))
}

async fn health() -> &'static str {
    "ok"
}

fn cors() -> CorsLayer {
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<axum::http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-work-token"),
            HeaderName::from_static("x-captcha-token"),
        ]))
        .expose_headers(ExposeHeaders::list([
            header::RETRY_AFTER,
            HeaderName::from_static("x-gate-required"),
            HeaderName::from_static("x-risk-score"),
        ]))
}
