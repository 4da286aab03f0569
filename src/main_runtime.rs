use orders_service::config::LoggingConfig;
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},orders_service=debug,sqlx=warn", logging.level))
    });

    // ORDERS_LOG_DIR wins over logging.dir; no directory means console only
    let log_dir = std::env::var("ORDERS_LOG_DIR")
        .ok()
        .or_else(|| logging.dir.clone());

    // `tracing_appender::rolling::daily` panics if it cannot create the initial
    // file, so writability is checked first.
    let file_layer = log_dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }

        let test_path = std::path::Path::new(log_dir).join(".orders_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(log_dir, "orders.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // The guard flushes on drop; the process keeps it for its whole life
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let json_layer = logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));

    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/orders.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Await a shutdown step, giving up after `timeout_secs`
pub async fn graceful_shutdown<F: Future>(shutdown_future: F, timeout_secs: u64, name: &str) {
    info!("Waiting for {} to stop...", name);

    match timeout(Duration::from_secs(timeout_secs), shutdown_future).await {
        Ok(_) => info!("{} stopped", name),
        Err(_) => warn!("{} did not stop within {}s, abandoning it", name, timeout_secs),
    }
}
