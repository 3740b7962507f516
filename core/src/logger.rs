// Global logging ring shared by the image tool and the boot loader

use spin::Mutex;

const MAX_LOG_ENTRIES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: &'static str,
}

struct LogRing {
    entries: [Option<LogEntry>; MAX_LOG_ENTRIES],
    count: usize, // Total logs written
}

impl LogRing {
    const fn new() -> Self {
        Self {
            entries: [None; MAX_LOG_ENTRIES],
            count: 0,
        }
    }
}

static LOG: Mutex<LogRing> = Mutex::new(LogRing::new());

pub fn log(level: Level, message: &'static str) {
    let mut ring = LOG.lock();
    let idx = ring.count % MAX_LOG_ENTRIES; // Ring buffer wrap-around
    ring.entries[idx] = Some(LogEntry { level, message });
    ring.count += 1;
}

/// Iterator over a snapshot of the ring, oldest entry first.
///
/// The snapshot is taken when the iterator is created, so logging while
/// iterating never deadlocks and never shows up in the current pass.
pub struct LogIterator {
    snapshot: [Option<LogEntry>; MAX_LOG_ENTRIES],
    start_idx: usize,
    current: usize,
    remaining: usize,
}

impl Iterator for LogIterator {
    type Item = LogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let idx = (self.start_idx + self.current) % MAX_LOG_ENTRIES;
        self.current += 1;
        self.remaining -= 1;

        self.snapshot[idx]
    }
}

pub fn get_logs_iter() -> LogIterator {
    get_last_n_logs(MAX_LOG_ENTRIES)
}

/// Get the last N log entries (up to MAX_LOG_ENTRIES)
pub fn get_last_n_logs(n: usize) -> LogIterator {
    let ring = LOG.lock();
    let available = ring.count.min(MAX_LOG_ENTRIES);
    let num_logs = n.min(available);

    // Oldest requested entry; works for both wrapped and unwrapped rings
    let start_idx = (ring.count - num_logs) % MAX_LOG_ENTRIES;

    LogIterator {
        snapshot: ring.entries,
        start_idx,
        current: 0,
        remaining: num_logs,
    }
}

pub fn log_count() -> usize {
    LOG.lock().count.min(MAX_LOG_ENTRIES)
}

pub fn total_log_count() -> usize {
    LOG.lock().count
}

#[macro_export]
macro_rules! log_info {
    ($msg:expr) => {
        $crate::logger::log($crate::logger::Level::Info, $msg)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($msg:expr) => {
        $crate::logger::log($crate::logger::Level::Warn, $msg)
    };
}

#[macro_export]
macro_rules! log_error {
    ($msg:expr) => {
        $crate::logger::log($crate::logger::Level::Error, $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_message_is_counted() {
        let before = total_log_count();
        crate::log_warn!("logger test: counted");
        assert!(total_log_count() > before);
        assert!(get_last_n_logs(MAX_LOG_ENTRIES).count() >= 1);
    }

    #[test]
    fn test_last_n_is_bounded() {
        crate::log_info!("logger test: bounded");
        assert!(get_last_n_logs(1).count() <= 1);
        assert!(log_count() <= MAX_LOG_ENTRIES);
        assert!(total_log_count() >= log_count());
    }

    #[test]
    fn test_ring_wraps() {
        for _ in 0..MAX_LOG_ENTRIES + 8 {
            crate::log_info!("logger test: wrap");
        }
        assert_eq!(log_count(), MAX_LOG_ENTRIES);
        assert_eq!(get_logs_iter().count(), MAX_LOG_ENTRIES);
    }

    #[test]
    fn test_level_tags() {
        assert_eq!(Level::Info.tag(), "INFO");
        assert_eq!(Level::Error.tag(), "ERROR");
    }
}
