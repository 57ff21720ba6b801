//! Session logging for deployment runs.
//!
//! Every record that goes through the `log` facade is echoed to stdout and
//! handed to a background writer thread that appends it to the session file.
//!
//! ```text
//! log::info!() / log::info!(target: "parsed", ...)
//!     |
//! [LogCollector] -- stdout echo
//!     | (crossbeam unbounded channel)
//! [writer thread]
//!     |-- <log_dir>/full/<ts>_full.log       (every record)
//!     `-- <log_dir>/parsed/<ts>_parsed.log   (stage transitions and milestones)
//! ```
//!
//! Records with target `parsed` are the high-level timeline of a run. Call
//! `wait_for_empty()` (or `flush_blocking()`) before exiting so the last lines
//! reach disk.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Target used for milestone records that also go to the parsed log.
pub const PARSED_TARGET: &str = "parsed";

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub message: String,
    /// Also written to the parsed log
    pub parsed: bool,
    /// Wall-clock time the line was produced
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(message)
        }
    }

    fn render(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

/// Paths of the files one session writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionFiles {
    pub full: PathBuf,
    pub parsed: PathBuf,
}

impl SessionFiles {
    fn for_session(log_dir: &Path, stamp: &str) -> Self {
        SessionFiles {
            full: log_dir.join("full").join(format!("{}_full.log", stamp)),
            parsed: log_dir.join("parsed").join(format!("{}_parsed.log", stamp)),
        }
    }
}

/// Process-wide logger: stdout echo plus on-disk session files.
#[derive(Clone)]
pub struct LogCollector {
    /// crossbeam unbounded so sends never block the workflow; `None` when echoing only
    tx: Option<Sender<LogMessage>>,
    files: Option<SessionFiles>,
    level: LevelFilter,
    echo: bool,
}

impl LogCollector {
    /// Create the log directories, open a fresh session and start the writer thread.
    pub fn new(log_dir: &Path, level: LevelFilter, echo: bool) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir.join("full"))
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(log_dir.join("parsed"))
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let files = SessionFiles::for_session(log_dir, &stamp);
        let mut full = open_append(&files.full)?;
        let mut parsed = open_append(&files.parsed)?;

        let (tx, rx) = unbounded::<LogMessage>();

        // Plain OS thread: independent of whichever tokio runtime is logging.
        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let rendered = line.render();
                        let _ = full.write_all(rendered.as_bytes());
                        if line.parsed {
                            let _ = parsed.write_all(rendered.as_bytes());
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = full.flush();
                        let _ = parsed.flush();
                        let _ = full.sync_data();
                        let _ = parsed.sync_data();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx: Some(tx),
            files: Some(files),
            level,
            echo,
        })
    }

    /// Logger that only echoes to stdout; nothing is written to disk.
    pub fn stdout_only(level: LevelFilter) -> Self {
        LogCollector {
            tx: None,
            files: None,
            level,
            echo: true,
        }
    }

    /// Open a file-backed session, or fall back to stdout only.
    ///
    /// The second value describes why file logging is unavailable.
    pub fn new_or_stdout(log_dir: &Path, level: LevelFilter) -> (Self, Option<String>) {
        match LogCollector::new(log_dir, level, true) {
            Ok(collector) => (collector, None),
            Err(e) => (LogCollector::stdout_only(level), Some(e)),
        }
    }

    /// Register as the global `log` backend.
    pub fn install(self) -> Result<Self, String> {
        let handle = self.clone();
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| format!("Failed to install logger: {}", e))?;
        log::set_max_level(handle.level);
        Ok(handle)
    }

    /// Files of this session; `None` for a stdout-only logger.
    pub fn session_files(&self) -> Option<&SessionFiles> {
        self.files.as_ref()
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(LogMessage::Line(line));
        }
    }

    /// Send a simple string log
    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    /// Send a parsed (high-level) log
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Block until every line sent before this call is on disk.
    pub fn flush_blocking(&self) -> Result<(), String> {
        let sender = match self.tx {
            Some(ref sender) => sender,
            None => return Ok(()),
        };
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        sender
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Async wrapper around `flush_blocking` that keeps the runtime's worker free.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let collector = self.clone();
        tokio::task::spawn_blocking(move || collector.flush_blocking())
            .await
            .map_err(|e| format!("Flush task failed: {}", e))?
    }
}

/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if self.echo {
            match record.level() {
                Level::Error | Level::Warn => println!("{}: {}", record.level(), record.args()),
                _ => println!("{}", record.args()),
            }
        }

        let message = format!("[{}] {}", record.level(), record.args());
        if record.target() == PARSED_TARGET {
            self.log_parsed(message);
        } else {
            self.log_str(message);
        }
    }

    fn flush(&self) {
        let _ = self.flush_blocking();
    }
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}
