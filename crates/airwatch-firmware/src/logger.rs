//! RTT logger that also queues warnings and errors for the SD card

use airwatch_core::logging::FaultLog;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{LevelFilter, Log, Metadata, Record};

/// Warnings and errors waiting for the log writer task.
pub static FAULTS: FaultLog<CriticalSectionRawMutex, 16> = FaultLog::new();

struct RttLogger;

impl Log for RttLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        rtt_target::rprintln!("{} - {}", record.level(), record.args());
        FAULTS.capture(record);
    }

    fn flush(&self) {}
}

static LOGGER: RttLogger = RttLogger;

/// Set up the RTT channel and install the logger.
pub fn init(level: LevelFilter) {
    rtt_target::rtt_init_print!();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
