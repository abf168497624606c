use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Install the global subscriber. `RUST_LOG` overrides `default_directive`.
/// Setting `MURMUR_LOG_FILE` adds a DEBUG-level file layer.
pub fn init_tracing_with_default(default_directive: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    let Some(log_path) = std::env::var("MURMUR_LOG_FILE").ok() else {
        let _ = registry.try_init();
        return;
    };

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(LevelFilter::DEBUG);

            if registry.with(file_layer).try_init().is_ok() {
                eprintln!("File logging enabled: {}", log_path);
            }
        }
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path, e);
            let _ = registry.try_init();
        }
    }
}
