//! Orchard shop - checkout and payment API.
//!
//! Serves the JSON API and runs the payment worker pool in the same
//! process. Orders are charged asynchronously: checkout answers as soon as
//! the order row exists and the charge is queued.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orchard_shop::config::ShopConfig;
use orchard_shop::db::{self, Stores};
use orchard_shop::gateway::{Gateway, StripeProvider};
use orchard_shop::payments::{self, PaymentWorker};
use orchard_shop::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ShopConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(std::borrow::Cow::Owned(config.sentry_environment.clone())),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ShopConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orchard_shop=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p orchard-cli -- migrate

    let stores = Stores::postgres(pool.clone());
    let provider =
        Arc::new(StripeProvider::new(&config.gateway).expect("Failed to build payment provider"));
    let gateway = Gateway::new(provider, stores.clone());

    let (events_tx, _) = payments::events::channel();
    let (charge_queue, charge_receiver) = payments::charge_queue();
    let worker = Arc::new(PaymentWorker::new(
        stores.clone(),
        gateway.clone(),
        events_tx.clone(),
        config.payments.retry_policy(),
    ));
    for _ in 0..config.payments.workers.max(1) {
        worker.clone().spawn(charge_receiver.clone());
    }
    worker.clone().spawn_sweeper(
        config.payments.sweep_interval,
        config.payments.pending_timeout,
    );
    tracing::info!(workers = config.payments.workers, "Payment workers started");

    let state = AppState::new(
        config.clone(),
        stores,
        gateway,
        charge_queue,
        events_tx,
        Some(pool),
    );
    payments::spawn_failure_logger(state.subscribe_failures());

    let addr = state.config().socket_addr();
    let app = orchard_shop::app(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    tracing::info!("shop listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
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
