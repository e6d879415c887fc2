//! # Structured Logging Module
//!
//! Environment-aware `tracing` subscriber setup plus helpers that emit the
//! cache's structured events with consistent field names.
//!
//! Libraries embedding this crate usually install their own subscriber; in
//! that case [`init_structured_logging`] leaves it in place.

use crate::connection::ConnectionState;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` overrides the level derived from the environment. Set
/// `CACHE_LOG_FORMAT=json` for JSON lines instead of human-readable output.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = std::env::var("CACHE_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CACHE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a connection state transition
pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
    tracing::info!(
        from = %from,
        to = %to,
        timestamp = %Utc::now().to_rfc3339(),
        "CACHE_STATE_TRANSITION"
    );
}
