// SPDX-License-Identifier: MPL-2.0

//! Logging support.

use log::{Metadata, Record};

use crate::{config::DEFAULT_LOG_LEVEL, early_println};

const LOGGER: Logger = Logger {};

struct Logger {}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= DEFAULT_LOG_LEVEL
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            early_println!("[{}]: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Installs the scheduler's logger as the global `log` facade.
///
/// Idempotent: a second call is a no-op, matching `log::set_logger`'s own
/// "first caller wins" semantics.
pub fn init() {
    let _ = log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(DEFAULT_LOG_LEVEL.to_level_filter()));
}
