//! Artfulfam Broker - private Shopify Admin API broker.
//!
//! This binary serves the broker on port 3001. It should not be reachable
//! from the public internet except for the Admin OAuth redirect.
//!
//! # Security
//!
//! This binary holds:
//! - Shopify Admin API tokens (per shop, from OAuth or `PRIVATE_ADMIN_API_TOKEN`)
//! - The shared secret the storefront signs requests with
//! - The secret signup tokens are signed with
//!
//! Customer writes happen only here; the storefront forwards them.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;

use artfulfam_broker::{app, config::BrokerConfig, state::AppState, store};
use secrecy::ExposeSecret;
use sentry::integrations::tracing as sentry_tracing;
use tower_sessions::MemoryStore;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &BrokerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn json_logs() -> bool {
    std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"))
        || std::env::var("FLY_APP_NAME").is_ok()
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "artfulfam_broker=info,tower_http=debug".into());

    let fmt_layer = if json_logs() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let config = BrokerConfig::from_env().expect("Failed to load configuration");

    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if !config.oauth.enabled {
        tracing::warn!("ADMIN_BROKER_ENABLED is off; OAuth and API routes answer 403");
    }
    if config.private_admin_token.is_some() {
        tracing::info!("Using PRIVATE_ADMIN_API_TOKEN for every shop");
    }

    let addr = config.socket_addr();
    let database_url = config.database_url.clone();

    let router = if let Some(database_url) = database_url {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url.expose_secret())
            .await
            .expect("Failed to create database pool");
        tracing::info!("Database pool created");

        store::MIGRATOR
            .run(&pool)
            .await
            .expect("Failed to run token migrations");

        let sessions = PostgresStore::new(pool.clone());
        sessions
            .migrate()
            .await
            .expect("Failed to migrate session store");

        app(AppState::new(config, Some(pool)), sessions)
    } else {
        tracing::warn!("No BROKER_DATABASE_URL; Admin tokens are kept in memory and lost on restart");
        app(AppState::new(config, None), MemoryStore::default())
    };

    let router = router
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    tracing::info!("broker listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
