//! Warnings and errors kept on the SD card
//!
//! The platform logger hands every record to [`FaultLog::capture`]. Warnings
//! and errors are queued without blocking and a low-priority task appends
//! them to [`LOG_KEY`]. The file is deleted and started over once it would
//! grow past its size cap.

use core::cell::Cell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use log::{Level, Record, debug};

use crate::app_state::Monitor;
use crate::config::KeyValueStore;
use crate::error::StoreError;

pub const LOG_KEY: &str = "SYS.LOG";
pub const MAX_LOG_BYTES: usize = 100 * 1024;

pub type LogLine = heapless::String<128>;

/// Bounded queue between the logger and the log writer task.
pub struct FaultLog<M: RawMutex, const N: usize> {
    lines: Channel<M, LogLine, N>,
    dropped: Mutex<M, Cell<u32>>,
}

impl<M: RawMutex, const N: usize> FaultLog<M, N> {
    pub const fn new() -> Self {
        Self {
            lines: Channel::new(),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Queue `record` if it is a warning or an error. Never blocks; lines
    /// that do not fit in the queue are counted and dropped.
    pub fn capture(&self, record: &Record) {
        if record.level() > Level::Warn {
            return;
        }

        let mut line = LogLine::new();
        // Long messages are cut off at the line length.
        let _ = write!(line, "[{}] {}", record.level(), record.args());
        if self.lines.try_send(line).is_err() {
            self.dropped.lock(|d| d.set(d.get().saturating_add(1)));
        }
    }

    pub async fn next(&self) -> LogLine {
        self.lines.receive().await
    }

    pub fn try_next(&self) -> Option<LogLine> {
        self.lines.try_receive().ok()
    }

    /// Lines dropped since the last call.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.lock(|d| d.replace(0))
    }
}

impl<M: RawMutex, const N: usize> Default for FaultLog<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `line` and a newline to the log file, starting the file over
/// when it would exceed `max_bytes`.
pub fn append_capped<S: KeyValueStore>(store: &mut S, line: &str, max_bytes: usize) -> Result<(), StoreError> {
    let size = match store.size(LOG_KEY) {
        Ok(size) => size,
        Err(StoreError::NotFound) => 0,
        Err(e) => return Err(e),
    };
    if size + line.len() + 1 > max_bytes {
        match store.remove(LOG_KEY) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }
    store.append(LOG_KEY, line.as_bytes())?;
    store.append(LOG_KEY, b"\n")
}

/// Drain the queue into the log file.
///
/// Write failures are only logged at debug level, which is never captured,
/// so a missing card cannot feed back into the queue.
pub async fn run_log_writer<M, S, const N: usize>(
    monitor: &Monitor<M>,
    faults: &FaultLog<M, N>,
    mut store: S,
    max_bytes: usize,
) where
    M: RawMutex,
    S: KeyValueStore,
{
    while monitor.is_running() {
        let line = faults.next().await;

        let dropped = faults.take_dropped();
        if dropped > 0 {
            let mut note = LogLine::new();
            let _ = write!(note, "[WARN] {} log lines dropped", dropped);
            if let Err(e) = append_capped(&mut store, &note, max_bytes) {
                debug!(" Log: write failed: {}", e);
            }
        }
        if let Err(e) = append_capped(&mut store, &line, max_bytes) {
            debug!(" Log: write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use alloc::vec;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn capture(log: &FaultLog<NoopRawMutex, 2>, level: Level, text: &str) {
        log.capture(
            &Record::builder()
                .level(level)
                .args(format_args!("{}", text))
                .build(),
        );
    }

    #[test]
    fn test_only_warnings_and_errors_are_queued() {
        let log = FaultLog::<NoopRawMutex, 2>::new();
        capture(&log, Level::Info, "booted");
        capture(&log, Level::Debug, "tick");
        capture(&log, Level::Warn, "sensor timeout");

        assert_eq!(log.try_next().as_deref(), Some("[WARN] sensor timeout"));
        assert_eq!(log.try_next(), None);
    }

    #[test]
    fn test_full_queue_counts_drops() {
        let log = FaultLog::<NoopRawMutex, 2>::new();
        for _ in 0..5 {
            capture(&log, Level::Error, "bus fault");
        }
        assert_eq!(log.take_dropped(), 3);
        assert_eq!(log.take_dropped(), 0);
    }

    #[test]
    fn test_file_starts_over_at_the_cap() {
        let mut store = MemoryStore::new();
        append_capped(&mut store, "[WARN] first", 32).unwrap();
        append_capped(&mut store, "[WARN] second", 32).unwrap();
        assert_eq!(store.size(LOG_KEY), Ok(27));

        append_capped(&mut store, "[ERROR] third", 32).unwrap();
        let mut buf = vec![0u8; 64];
        let len = store.read(LOG_KEY, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"[ERROR] third\n");
    }

    #[test]
    fn test_write_errors_are_returned() {
        let mut store = MemoryStore::new();
        store.set_read_only(true);
        assert!(matches!(
            append_capped(&mut store, "[WARN] lost", 32),
            Err(StoreError::Io(_))
        ));
    }
}
