//! # Structured Logging Module
//!
//! Environment-aware structured logging. Production emits JSON lines for log
//! shipping; every other environment gets human-readable console output.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ConfigManager;
use crate::models::{BookId, ChapterId, JobId, PublishFormat};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call repeatedly; `RUST_LOG` overrides the environment's level.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let result = if environment == "production" {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_current_span(false),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(true),
                )
                .try_init()
        };

        // A global subscriber may already be installed by the host process
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for chapter tree operations
pub fn log_tree_operation(
    operation: &str,
    book_id: BookId,
    chapter_id: Option<ChapterId>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        book_id = %book_id,
        chapter_id = ?chapter_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🌳 TREE_OPERATION"
    );
}

/// Log structured data for publish job operations
pub fn log_job_operation(
    operation: &str,
    job_id: JobId,
    book_id: BookId,
    format: PublishFormat,
    state: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = %job_id,
        book_id = %book_id,
        format = %format,
        state = %state,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 JOB_OPERATION"
    );
}
