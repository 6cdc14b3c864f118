//! Kernel log sink.
//!
//! Routes the `log` facade to COM1. Nothing in the core writes the serial
//! port directly; modules log through `log::debug!`/`log::warn!` and the
//! boot path installs this sink once.

use core::fmt::Write;

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use uart_16550::SerialPort;

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(0x3F8) };
        port.init();
        Mutex::new(port)
    };
}

struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut port = SERIAL1.lock();
        let _ = writeln!(port, "[{:5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Install the serial sink. Safe to call once at boot; a second call is a
/// no-op because the facade rejects it.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}
