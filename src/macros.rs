//! log macro's for scoped logging
//!
//! Each module area writes to its own named target so log4rs appenders can
//! be tuned per area.

/// Writes a debug! message to the app::planner logger
#[macro_export]
macro_rules! planner_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::planner", $($arg)+)
    };
}

/// Writes an info! message to the app::planner logger
#[macro_export]
macro_rules! planner_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::planner", $($arg)+)
    };
}

/// Writes a warn! message to the app::planner logger
#[macro_export]
macro_rules! planner_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::planner", $($arg)+)
    };
}

/// Writes an error! message to the app::planner logger
#[macro_export]
macro_rules! planner_error {
    ($($arg:tt)+) => {
        log::error!(target: "app::planner", $($arg)+)
    };
}

/// Writes a debug! message to the app::adapter logger
#[macro_export]
macro_rules! adapter_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::adapter", $($arg)+)
    };
}

/// Writes an info! message to the app::adapter logger
#[macro_export]
macro_rules! adapter_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::adapter", $($arg)+)
    };
}

/// Writes a warn! message to the app::adapter logger
#[macro_export]
macro_rules! adapter_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::adapter", $($arg)+)
    };
}

/// Writes an error! message to the app::adapter logger
#[macro_export]
macro_rules! adapter_error {
    ($($arg:tt)+) => {
        log::error!(target: "app::adapter", $($arg)+)
    };
}

/// Writes a debug! message to the app::retrieval logger
#[macro_export]
macro_rules! retrieval_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::retrieval", $($arg)+)
    };
}

/// Writes an info! message to the app::retrieval logger
#[macro_export]
macro_rules! retrieval_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::retrieval", $($arg)+)
    };
}

/// Writes a warn! message to the app::retrieval logger
#[macro_export]
macro_rules! retrieval_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::retrieval", $($arg)+)
    };
}

/// Writes an error! message to the app::retrieval logger
#[macro_export]
macro_rules! retrieval_error {
    ($($arg:tt)+) => {
        log::error!(target: "app::retrieval", $($arg)+)
    };
}

/// Writes a debug! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::tasks", $($arg)+)
    };
}

/// Writes an info! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_info {
    ($($arg:tt)+) => {
        log::info!(target: "app::tasks", $($arg)+)
    };
}

/// Writes a warn! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::tasks", $($arg)+)
    };
}

/// Writes an error! message to the app::tasks logger
#[macro_export]
macro_rules! tasks_error {
    ($($arg:tt)+) => {
        log::error!(target: "app::tasks", $($arg)+)
    };
}

/// Writes a debug! message to the app::events logger
#[macro_export]
macro_rules! events_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "app::events", $($arg)+)
    };
}

/// Writes a warn! message to the app::events logger
#[macro_export]
macro_rules! events_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "app::events", $($arg)+)
    };
}

/// Writes a debug! message to the test::ut logger
#[macro_export]
macro_rules! ut_debug {
    ($($arg:tt)+) => {
        log::debug!(target: "test::ut", $($arg)+)
    };
}

/// Writes an info! message to the test::ut logger
#[macro_export]
macro_rules! ut_info {
    ($($arg:tt)+) => {
        log::info!(target: "test::ut", $($arg)+)
    };
}

/// Writes a warn! message to the test::ut logger
#[macro_export]
macro_rules! ut_warn {
    ($($arg:tt)+) => {
        log::warn!(target: "test::ut", $($arg)+)
    };
}

/// Writes an error! message to the test::ut logger
#[macro_export]
macro_rules! ut_error {
    ($($arg:tt)+) => {
        log::error!(target: "test::ut", $($arg)+)
    };
}
