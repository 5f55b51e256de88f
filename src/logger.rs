// Console logger: every line the user sees is also appended to a log file
// created when the program starts. The file lives under the configured log
// directory and is named after the start timestamp.
//
// The `log` facade is routed into the same file (file only, never the
// terminal) through env_logger, so lower layers such as the HTTP client can
// use `log::debug!`.

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::style::{Color, SetForegroundColor};
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const FILE_STAMP: &str = "%Y%m%d_%H%M%S";
const LINE_STAMP: &str = "%Y-%m-%d %H:%M:%S";

type Sink = Box<dyn Write + Send>;

/// Append-only logger shared by the whole program.
///
/// Terminal output and the file append happen under one lock so lines from
/// the message listener never interleave with the prompt loop.
pub struct Logger {
    path: PathBuf,
    file: Mutex<Sink>,
    colored: bool,
    parked: Mutex<Option<anyhow::Error>>,
}

impl Logger {
    /// Create the log directory if needed and open
    /// `console_log_<yyyyMMdd_HHmmss>.txt` inside it.
    pub fn create(dir: &Path, colored: bool) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let path = dir.join(format!("console_log_{}.txt", Local::now().format(FILE_STAMP)));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self::with_sink(path, Box::new(file), colored))
    }

    /// Log into an already opened writer. `path` is only used in messages.
    pub fn with_sink(path: PathBuf, sink: Sink, colored: bool) -> Self {
        Logger {
            path,
            file: Mutex::new(sink),
            colored,
            parked: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log a line, terminal output ends with a newline.
    pub fn line(&self, message: impl Display) -> Result<()> {
        self.write(&message.to_string(), Echo::Line)
    }

    /// Log without a trailing newline on the terminal (prompts, prefixes).
    /// The file entry is still newline-terminated.
    pub fn inline(&self, message: impl Display) -> Result<()> {
        self.write(&message.to_string(), Echo::Inline)
    }

    /// Append to the file only.
    pub fn record(&self, message: impl Display) -> Result<()> {
        self.write(&message.to_string(), Echo::None)
    }

    /// Like [`Logger::line`] for callers that cannot propagate errors. The
    /// first failure is kept for [`Logger::take_failure`].
    pub fn line_detached(&self, message: impl Display) {
        if let Err(err) = self.write(&message.to_string(), Echo::Line) {
            self.park(err);
        }
    }

    /// Return the first failure seen by a detached write, if any.
    pub fn take_failure(&self) -> Result<()> {
        match self.parked.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(err) => Err(err.context("Writing the console log failed")),
            None => Ok(()),
        }
    }

    /// Switch the terminal foreground color. Cosmetic, errors are ignored.
    pub fn color(&self, color: Color) {
        if self.colored {
            let mut out = io::stdout();
            let _ = crossterm::execute!(out, SetForegroundColor(color));
        }
    }

    fn write(&self, message: &str, echo: Echo) -> Result<()> {
        let entry = format!("[{}] : {}", Local::now().format(LINE_STAMP), message);
        let mut file = self.lock_file();
        match echo {
            Echo::Line => {
                let mut out = io::stdout().lock();
                writeln!(out, "{entry}").context("Failed to write to the terminal")?;
            }
            Echo::Inline => {
                let mut out = io::stdout().lock();
                write!(out, "{entry}")
                    .and_then(|_| out.flush())
                    .context("Failed to write to the terminal")?;
            }
            Echo::None => {}
        }
        self.append(&mut *file, format!("{entry}\n").as_bytes())
    }

    fn append(&self, file: &mut impl Write, bytes: &[u8]) -> Result<()> {
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to append to {}", self.path.display()))
    }

    fn lock_file(&self) -> MutexGuard<'_, Sink> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, err: anyhow::Error) {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if parked.is_none() {
            *parked = Some(err);
        }
    }
}

#[derive(Clone, Copy)]
enum Echo {
    Line,
    Inline,
    None,
}

/// env_logger target that appends formatted records to the console log.
/// Failures are parked like any other detached write.
struct LogPipe(Arc<Logger>);

impl Write for LogPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.0.lock_file();
        if let Err(err) = self.0.append(&mut *file, buf) {
            drop(file);
            self.0.park(err);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install `logger` as the global `log` backend. `filters` takes env_logger
/// directives, e.g. `info` or `warn,admin_console::api=debug`.
pub fn install(logger: Arc<Logger>, filters: &str) -> Result<()> {
    env_logger::Builder::new()
        .parse_filters(filters)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] : {} {}: {}",
                Local::now().format(LINE_STAMP),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(LogPipe(logger))))
        .try_init()
        .context("A global logger is already installed")
}
