//! Daemon log
//!
//! Timestamped log lines appended to `.typings/daemon.log`, rotated once the
//! file exceeds [`MAX_LOG_SIZE`]. Queue workers log from their own threads,
//! so a [`DaemonLog`] is cheap to clone and safe to share.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Maximum log file size before rotation (1MB)
pub const MAX_LOG_SIZE: u64 = 1024 * 1024;

/// Number of log files to keep
pub const LOG_ROTATION_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

impl Level {
    fn tag(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
        }
    }
}

enum Sink {
    File {
        path: PathBuf,
        echo: bool,
        lock: Mutex<()>,
    },
    Stderr,
    Memory(Mutex<Vec<String>>),
    Discard,
}

/// Shared handle to a log destination
#[derive(Clone)]
pub struct DaemonLog {
    sink: Arc<Sink>,
}

impl DaemonLog {
    /// Appends to `path`, also echoing to stderr when `echo` is set
    pub fn to_file(path: impl Into<PathBuf>, echo: bool) -> Self {
        Self::with_sink(Sink::File {
            path: path.into(),
            echo,
            lock: Mutex::new(()),
        })
    }

    /// Writes every line to stderr
    pub fn stderr() -> Self {
        Self::with_sink(Sink::Stderr)
    }

    /// Keeps lines in memory, see [`lines`](Self::lines)
    pub fn in_memory() -> Self {
        Self::with_sink(Sink::Memory(Mutex::new(Vec::new())))
    }

    pub fn discard() -> Self {
        Self::with_sink(Sink::Discard)
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(Level::Info, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(Level::Error, message.as_ref());
    }

    /// Lines captured by an in-memory log, without timestamps
    pub fn lines(&self) -> Vec<String> {
        match self.sink.as_ref() {
            Sink::Memory(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            _ => Vec::new(),
        }
    }

    fn write(&self, level: Level, message: &str) {
        match self.sink.as_ref() {
            Sink::File { path, echo, lock } => {
                let line = format_line(level, message);
                if *echo {
                    eprintln!("{}", line);
                }
                let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = append_line(path, &line) {
                    eprintln!("Failed to write log {}: {}", path.display(), e);
                }
            }
            Sink::Stderr => eprintln!("{}", format_line(level, message)),
            Sink::Memory(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format!("{} {}", level.tag(), message)),
            Sink::Discard => {}
        }
    }
}

fn format_line(level: Level, message: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] {} {}", timestamp, level.tag(), message)
}

fn append_line(log_path: &Path, line: &str) -> io::Result<()> {
    rotate_logs_if_needed(log_path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    writeln!(file, "{}", line)
}

/// Rotates log files if the current log exceeds MAX_LOG_SIZE
pub fn rotate_logs_if_needed(log_path: &Path) -> io::Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let metadata = fs::metadata(log_path)?;
    if metadata.len() < MAX_LOG_SIZE {
        return Ok(());
    }

    for i in (1..LOG_ROTATION_COUNT).rev() {
        let old_path = log_path.with_extension(format!("log.{}", i));
        let new_path = log_path.with_extension(format!("log.{}", i + 1));
        if old_path.exists() {
            if i + 1 >= LOG_ROTATION_COUNT {
                fs::remove_file(&old_path)?;
            } else {
                fs::rename(&old_path, &new_path)?;
            }
        }
    }

    fs::rename(log_path, log_path.with_extension("log.1"))
}

/// The last lines of a log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    pub lines: Vec<String>,
    /// Lines in the whole file
    pub total: usize,
}

/// Reads the last `count` lines of the log at `path`
pub fn tail_lines(path: &Path, count: usize) -> io::Result<LogTail> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(count);

    Ok(LogTail {
        lines: all[start..].iter().map(|line| line.to_string()).collect(),
        total: all.len(),
    })
}

/// Yields lines as they are appended to a log, like `tail -f`.
///
/// A partially written line is held back until its newline arrives. When
/// the file shrinks (rotation), reading restarts from the new file.
pub struct LogFollower {
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    pending: String,
    skip_first: bool,
}

impl LogFollower {
    /// Opens `path`, starting up to `backlog` bytes before its end
    pub fn open(path: impl Into<PathBuf>, backlog: u64) -> io::Result<Self> {
        let path = path.into();
        let mut file = File::open(&path)?;
        let start = file.metadata()?.len().saturating_sub(backlog);
        file.seek(SeekFrom::Start(start))?;

        Ok(Self {
            path,
            reader: BufReader::new(file),
            position: start,
            pending: String::new(),
            // Starting mid-file lands inside a line
            skip_first: start > 0,
        })
    }

    /// Complete lines written since the last poll
    pub fn poll(&mut self) -> io::Result<Vec<String>> {
        let shrunk = fs::metadata(&self.path)
            .map(|metadata| metadata.len() < self.position)
            .unwrap_or(false);
        if shrunk {
            self.reader = BufReader::new(File::open(&self.path)?);
            self.position = 0;
            self.pending.clear();
            self.skip_first = false;
        }

        let mut lines = Vec::new();
        loop {
            let read = self.reader.read_line(&mut self.pending)?;
            if read == 0 {
                break;
            }
            self.position += read as u64;
            if !self.pending.ends_with('\n') {
                break;
            }

            let line = self.pending.trim_end_matches(&['\n', '\r'][..]).to_string();
            self.pending.clear();
            if std::mem::take(&mut self.skip_first) {
                continue;
            }
            lines.push(line);
        }

        Ok(lines)
    }
}
