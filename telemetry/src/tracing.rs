use std::sync::Once;

use config::shared::LogLevel;
use thiserror::Error;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_log::log::SetLoggerError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;

/// Variable that enables log output in tests.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter directive: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to redirect `log` records into tracing: {0}")]
    LogBridge(#[from] SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Flushes buffered log lines when dropped.
///
/// Keep it alive for the whole lifetime of the process; dropping it early loses log output.
#[must_use = "dropping the flusher stops log output"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs a JSON subscriber writing to stdout through a non-blocking writer.
///
/// `RUST_LOG` takes precedence over `log_level` when it is set, so individual targets can be
/// tuned without touching the service configuration. Records emitted through the `log` crate
/// by dependencies are forwarded to the same subscriber.
pub fn init_tracing(app_name: &str, log_level: LogLevel) -> Result<LogFlusher, TracingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level.as_directive())?,
    };

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_writer(writer),
    );

    LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;

    info!(app = app_name, log_level = %log_level, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a human readable subscriber for tests, at most once per process.
///
/// Output is only produced when `ENABLE_TRACING` is set, which keeps test runs quiet by default.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var_os(ENABLE_TEST_TRACING_ENV_NAME).is_none() {
            return;
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
