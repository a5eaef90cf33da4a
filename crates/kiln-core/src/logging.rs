//! Logging setup for Kiln hosts.
//!
//! Output goes to a daily rolling file and to an in-memory [`LogBuffer`]
//! that a host can drain into whatever overlay or stream it shows users.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{Context as _, Result};
use kiln_config::LoggingConfig;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "kiln.log";

/// One captured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5} {}: {}", self.level, self.target, self.message)
    }
}

/// Bounded, shareable queue of recent log records.
///
/// When full, the oldest record is dropped to make room.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: Arc<Mutex<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, record: LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            if records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }

    /// Remove and return every buffered record, oldest first.
    pub fn drain(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|mut records| records.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve the log directory.
///
/// Precedence: `KILN_LOG_DIR` env var > configured directory > platform data
/// dir (`<data>/kiln/logs`) > `./logs`.
pub fn log_dir(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = std::env::var_os("KILN_LOG_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &config.directory {
        return dir.clone();
    }
    dirs::data_dir()
        .map(|data| data.join("kiln").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Delete rolled log files in `dir` last modified more than `max_age` ago.
///
/// Only files named with the Kiln log prefix are considered. Returns how
/// many files were removed.
fn prune_stale_logs(dir: &Path, max_age: Duration) -> usize {
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX))
        .filter(|entry| {
            entry
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified < cutoff)
        })
        .filter(|entry| std::fs::remove_file(entry.path()).is_ok())
        .count()
}

/// Mirrors every event that passes the filter into a [`LogBuffer`].
struct BufferLayer {
    buffer: LogBuffer,
}

impl<S: tracing::Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        self.buffer.push(LogRecord {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: fields.into_message(),
        });
    }
}

/// Flattens an event's fields into `message key=value key=value`.
#[derive(Default)]
struct FieldCollector {
    message: String,
    extra: String,
}

impl FieldCollector {
    fn into_message(self) -> String {
        match (self.message.is_empty(), self.extra.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.extra,
            (false, false) => format!("{} {}", self.message, self.extra),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if name == "message" {
            let _ = self.message.write_fmt(value);
            return;
        }
        if !self.extra.is_empty() {
            self.extra.push(' ');
        }
        let _ = write!(self.extra, "{name}={value}");
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.push_field(field.name(), format_args!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push_field(field.name(), format_args!("{value}"));
    }
}

const FILTER_ENV_VARS: [&str; 2] = ["KILN_LOG", "RUST_LOG"];

/// Pick the first usable filter from `KILN_LOG`, `RUST_LOG` and
/// `config.filter`, in that order.
///
/// Environment values that fail to parse are skipped and returned as
/// messages so they can be reported once the subscriber is installed.
fn resolve_filter(config: &LoggingConfig) -> Result<(EnvFilter, Vec<String>)> {
    let mut rejected = Vec::new();
    for var in FILTER_ENV_VARS {
        let Ok(raw) = std::env::var(var) else {
            continue;
        };
        if raw.trim().is_empty() {
            continue;
        }
        match EnvFilter::try_new(&raw) {
            Ok(filter) => return Ok((filter, rejected)),
            Err(err) => rejected.push(format!("{var}={raw:?}: {err}")),
        }
    }

    let filter = EnvFilter::try_new(&config.filter)
        .with_context(|| format!("invalid log filter {:?}", config.filter))?;
    Ok((filter, rejected))
}

/// Install the global subscriber and return the buffer hosts can drain.
///
/// Filter: `KILN_LOG` > `RUST_LOG` > `config.filter`; an unparsable
/// environment filter is skipped with a warning. Files roll daily under
/// [`log_dir`]; files older than `config.retention_days` are removed first.
pub fn init(config: &LoggingConfig) -> Result<LogBuffer> {
    let buffer = LogBuffer::new(config.console_lines);

    let (filter, rejected) = resolve_filter(config)?;

    let dir = log_dir(config);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let pruned = prune_stale_logs(&dir, Duration::from_secs(config.retention_days * 86_400));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(rolling::daily(&dir, LOG_FILE_PREFIX))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(BufferLayer {
            buffer: buffer.clone(),
        })
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    for reason in &rejected {
        tracing::warn!(%reason, "ignoring invalid log filter from environment");
    }
    tracing::debug!(dir = %dir.display(), pruned, "logging initialized");
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // Serialize env-mutating tests.
    static ENV_LOCK: StdMutex<()> = StdMutex::new(());

    fn record(msg: &str) -> LogRecord {
        LogRecord {
            level: Level::INFO,
            target: "test".into(),
            message: msg.into(),
        }
    }

    #[test]
    fn buffer_drops_oldest_when_full() {
        let buf = LogBuffer::new(3);
        for i in 0..5 {
            buf.push(record(&format!("msg {i}")));
        }
        let drained = buf.drain();
        let messages: Vec<_> = drained.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["msg 2", "msg 3", "msg 4"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn log_dir_env_override_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = std::env::var_os("KILN_LOG_DIR");

        std::env::set_var("KILN_LOG_DIR", "/tmp/kiln-env-logs");
        let config = LoggingConfig {
            directory: Some(PathBuf::from("/tmp/kiln-config-logs")),
            ..LoggingConfig::default()
        };
        assert_eq!(log_dir(&config), PathBuf::from("/tmp/kiln-env-logs"));

        std::env::remove_var("KILN_LOG_DIR");
        assert_eq!(log_dir(&config), PathBuf::from("/tmp/kiln-config-logs"));

        if let Some(v) = original {
            std::env::set_var("KILN_LOG_DIR", v);
        }
    }

    #[test]
    fn invalid_env_filter_falls_back_and_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        let saved: Vec<_> = FILTER_ENV_VARS
            .iter()
            .map(|var| (*var, std::env::var_os(var)))
            .collect();

        std::env::set_var("KILN_LOG", "kiln=loudest");
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            filter: "warn".into(),
            ..LoggingConfig::default()
        };
        let (filter, rejected) = resolve_filter(&config).unwrap();
        assert_eq!(filter.to_string(), EnvFilter::new("warn").to_string());
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].starts_with("KILN_LOG=\"kiln=loudest\""));

        std::env::set_var("RUST_LOG", "debug");
        let (filter, rejected) = resolve_filter(&config).unwrap();
        assert_eq!(filter.to_string(), EnvFilter::new("debug").to_string());
        assert_eq!(rejected.len(), 1);

        for (var, value) in saved {
            match value {
                Some(v) => std::env::set_var(var, v),
                None => std::env::remove_var(var),
            }
        }
    }

    #[test]
    fn record_display_is_single_line() {
        let line = record("hello").to_string();
        assert!(line.contains("INFO"));
        assert!(line.ends_with("test: hello"));
    }

    #[test]
    fn collector_joins_message_and_fields() {
        let mut c = FieldCollector::default();
        c.push_field("message", format_args!("shell started"));
        c.push_field("plugin", format_args!("media"));
        c.push_field("count", format_args!("{}", 2));
        assert_eq!(c.into_message(), "shell started plugin=media count=2");
    }

    #[test]
    fn collector_without_message_keeps_fields() {
        let mut c = FieldCollector::default();
        c.push_field("a", format_args!("1"));
        assert_eq!(c.into_message(), "a=1");
        assert_eq!(FieldCollector::default().into_message(), "");
    }

    #[test]
    fn buffer_layer_captures_events() {
        let buffer = LogBuffer::new(16);
        let subscriber = tracing_subscriber::registry().with(BufferLayer {
            buffer: buffer.clone(),
        });
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(plugin = "media", "registry type mismatch");
        });

        let records = buffer.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::WARN);
        assert_eq!(records[0].message, "registry type mismatch plugin=media");
    }

    #[test]
    fn prune_removes_only_stale_kiln_logs() {
        let tmp = std::env::temp_dir().join("kiln-test-prune");
        let _ = std::fs::create_dir_all(&tmp);

        let old_a = tmp.join("kiln.log.2025-01-01");
        let old_b = tmp.join("kiln.log.2025-01-02");
        let other = tmp.join("notes.txt");
        std::fs::write(&old_a, "a").unwrap();
        std::fs::write(&old_b, "b").unwrap();
        std::fs::write(&other, "c").unwrap();

        // A zero max age makes every existing file stale.
        let removed = prune_stale_logs(&tmp, Duration::ZERO);
        assert_eq!(removed, 2);
        assert!(!old_a.exists());
        assert!(!old_b.exists());
        assert!(other.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
