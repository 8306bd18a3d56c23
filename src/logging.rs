//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing long-running provisioning
//! workflows across their asynchronous continuations.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(&environment)));

        let layer = if use_json_format() {
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
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // An embedding process may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Tracing subscriber already installed, keeping it");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = use_json_format(),
            "🔧 Admiral logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("ADMIRAL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn use_json_format() -> bool {
    std::env::var("ADMIRAL_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Filter used when `RUST_LOG` is unset: crate debug output outside production
fn default_directives(environment: &str) -> String {
    match environment {
        "production" => "warn,admiral_core=info".to_string(),
        "test" => "warn,admiral_core=debug".to_string(),
        _ => "info,admiral_core=debug".to_string(),
    }
}

/// Log structured data for task operations
pub fn log_task_operation(
    operation: &str,
    task_link: &str,
    stage: &str,
    sub_stage: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_link = %task_link,
        stage = %stage,
        sub_stage = %sub_stage,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for calls against external provisioning backends
pub fn log_adapter_operation(
    adapter: &str,
    operation: &str,
    endpoint_link: &str,
    attempt: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        adapter = %adapter,
        operation = %operation,
        endpoint_link = %endpoint_link,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔌 ADAPTER_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
