//! Subscriber setup for the operator binary
//!
//! Filter directives are built from `log_level` plus optional per-component
//! levels in `log_targets`, e.g.
//!
//! ```yaml
//! log_level: "info"
//! log_targets:
//!   graphene: "debug"
//!   rpc: "trace"
//! ```
//!
//! `RUST_LOG` replaces the whole filter when set.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `log_targets` keys and the module path each one covers. Node clients
/// share their backend's prefix (`backend::steem` covers `backend::steem_node`).
pub const LOG_TARGETS: &[(&str, &str)] = &[
    ("graphene", "ledger_bridge::backend::graphene"),
    ("steem", "ledger_bridge::backend::steem"),
    ("steem_engine", "ledger_bridge::backend::engine"),
    ("registry", "ledger_bridge::backend::registry"),
    ("rpc", "ledger_bridge::rpc"),
    ("transfer", "ledger_bridge::transfer"),
];

pub const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// HTTP stack crates held at warn when the base level is verbose
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

pub fn target_module(name: &str) -> Option<&'static str> {
    LOG_TARGETS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, module)| *module)
}

/// Directive string for [`EnvFilter`]. Unknown component names are skipped;
/// `AppConfig::validate` rejects them before this runs.
pub fn filter_directives(config: &AppConfig) -> String {
    let base = config.log_level.trim();
    let mut directives = vec![base.to_string()];

    if matches!(base, "trace" | "debug") {
        directives.extend(QUIET_DEPENDENCIES.iter().map(|dep| format!("{}=warn", dep)));
    }

    for (name, level) in &config.log_targets {
        if let Some(module) = target_module(name) {
            directives.push(format!("{}={}", module, level.trim()));
        }
    }

    directives.join(",")
}

/// Install the global subscriber. Keep the guard alive for the process
/// lifetime or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);

    // Targets stay in the file so per-backend output can be told apart.
    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        // stdout carries command results only
        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_ansi(true)
            .with_writer(std::io::stderr);
        registry.with(file_layer).with(stderr_layer).init();
    }

    guard
}
