#![doc = include_str!("../README.md")]

#[macro_use]
pub mod macros;

pub mod test_util;

pub mod adapters;
pub mod calendar_utils;
pub mod clock;
mod config;
pub mod events;
pub mod persist;
pub mod planner;
pub mod retrieval;
pub mod tasks;

pub use crate::config::Config;
pub use crate::planner::{PlanError, PlanOpts, PlanningEngine};

use std::sync::Once;
static INIT_LOGGER: Once = Once::new();
/// Initialize the logger with provided configuration
pub fn init_logger(config: &Config) {
    INIT_LOGGER.call_once(|| {
        let log_cfg: &str = config.log_config.as_str();
        if let Err(e) = log4rs::init_file(log_cfg, Default::default()) {
            panic!(
                "(logger) could not parse log config {} found in config {:?}: {}.",
                log_cfg, config, e
            );
        }
    });
}

/// Tokio signal handler that will wait for a user to press CTRL+C, or for a
/// shutdown signal sent over the provided channel. Used to stop the CLI and
/// any embedding process gracefully.
pub async fn shutdown_signal(
    server: &str,
    shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
) {
    match shutdown_rx {
        Some(receiver) => {
            if receiver.await.is_err() {
                log::warn!("(shutdown_signal) shutdown sender dropped.");
            }
        }
        None => {
            if tokio::signal::ctrl_c().await.is_err() {
                log::warn!("(shutdown_signal) could not install ctrl-c handler.");
            }
        }
    }

    log::warn!("(shutdown_signal) server shutdown for [{}]", server);
}
