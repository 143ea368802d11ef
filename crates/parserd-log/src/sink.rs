//! Thread-safe, level-filtered, multi-destination log (§4.1).
//!
//! `write` never fails visibly: I/O errors on the file/console destinations,
//! and errors reported by the `syslog` crate, are swallowed after a single
//! best-effort notice on stderr (§7: "Logging failures are swallowed").

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::level::LogLevel;

enum Destination {
    Syslog(syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>),
    File(File),
    Console,
}

/// What to log to, as chosen by the `log` configuration key / `--log` flag.
pub enum DestinationSpec {
    Syslog,
    File(PathBuf),
    Console,
}

impl DestinationSpec {
    pub fn parse(value: &str) -> Self {
        match value {
            "syslog" => Self::Syslog,
            "console" | "stdout" | "stderr" => Self::Console,
            path => Self::File(PathBuf::from(path)),
        }
    }
}

pub struct LogSink {
    verbosity: LogLevel,
    dest: Mutex<Option<Destination>>,
}

impl LogSink {
    /// Opens the log destination. For the syslog destination, serialization
    /// of concurrent writes is provided by the syslog service itself; for
    /// file and console destinations, the internal mutex serializes writes
    /// so no message interleaves with another (§4.1).
    pub fn open(destination: DestinationSpec, verbosity: LogLevel) -> std::io::Result<Self> {
        let dest = match destination {
            DestinationSpec::Syslog => {
                let formatter = syslog::Formatter3164 {
                    facility: syslog::Facility::LOG_DAEMON,
                    hostname: None,
                    process: "rteval-parserd".into(),
                    pid: std::process::id(),
                };
                match syslog::unix(formatter) {
                    Ok(logger) => Destination::Syslog(logger),
                    Err(e) => {
                        eprintln!("rteval-parserd: could not connect to syslog: {e}, falling back to console");
                        Destination::Console
                    }
                }
            }
            DestinationSpec::File(path) => Destination::File(open_append(&path)?),
            DestinationSpec::Console => Destination::Console,
        };
        Ok(Self { verbosity, dest: Mutex::new(Some(dest)) })
    }

    /// Writes a single log message at `level`, unless it is closed or the
    /// level is less severe than the configured verbosity.
    pub fn write(&self, level: LogLevel, message: impl AsRef<str>) {
        if level > self.verbosity {
            return;
        }
        let Ok(mut guard) = self.dest.lock() else { return };
        let Some(dest) = guard.as_mut() else { return };
        let message = message.as_ref();
        match dest {
            Destination::Syslog(logger) => {
                let _ = match level {
                    LogLevel::Emerg => logger.emerg(message),
                    LogLevel::Alert => logger.alert(message),
                    LogLevel::Crit => logger.crit(message),
                    LogLevel::Err => logger.err(message),
                    LogLevel::Warning => logger.warning(message),
                    LogLevel::Notice => logger.notice(message),
                    LogLevel::Info => logger.info(message),
                    LogLevel::Debug => logger.debug(message),
                };
            }
            Destination::File(file) => {
                let _ = writeln!(file, "{} [{:?}] {}", chrono::Utc::now().to_rfc3339(), level, message);
            }
            Destination::Console => {
                println!("[{:?}] {}", level, message);
            }
        }
    }

    pub fn emerg(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Emerg, message)
    }
    pub fn err(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Err, message)
    }
    pub fn warning(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Warning, message)
    }
    pub fn info(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message)
    }
    pub fn debug(&self, message: impl AsRef<str>) {
        self.write(LogLevel::Debug, message)
    }

    /// Releases the destination handle. Writes after `close()` are no-ops.
    pub fn close(&self) {
        if let Ok(mut guard) = self.dest.lock() {
            *guard = None;
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_destination_appends_and_filters_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parserd.log");
        let sink = LogSink::open(DestinationSpec::File(path.clone()), LogLevel::Warning).unwrap();
        sink.info("should be dropped");
        sink.err("should appear");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("should be dropped"));
        assert!(contents.contains("should appear"));
    }

    #[test]
    fn close_makes_further_writes_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parserd.log");
        let sink = LogSink::open(DestinationSpec::File(path.clone()), LogLevel::Debug).unwrap();
        sink.close();
        sink.err("dropped after close");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.is_empty());
    }

    #[test]
    fn destination_spec_parses_known_names() {
        assert!(matches!(DestinationSpec::parse("syslog"), DestinationSpec::Syslog));
        assert!(matches!(DestinationSpec::parse("console"), DestinationSpec::Console));
        assert!(matches!(DestinationSpec::parse("/var/log/x.log"), DestinationSpec::File(_)));
    }
}
