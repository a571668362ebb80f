use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LINE_TIME_FORMAT: &str = "[%H:%M:%S] :";

/// Appends to `<dir>/<YYYYMMDD>.txt`, picking the file by the current local date.
#[derive(Debug, Clone)]
pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DailyLog { dir: dir.into() }
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.txt", date.format("%Y%m%d")))
    }

    fn open_today(&self) -> io::Result<File> {
        fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(Local::now().date_naive()))
    }
}

pub enum LogSink {
    File(File),
    Discard,
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Discard => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Discard => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DailyLog {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        // A log line that can't be written must never take the run down with it.
        self.open_today().map(LogSink::File).unwrap_or(LogSink::Discard)
    }
}

/// Layer that writes only ERROR events as `[HH:MM:SS] : <message>` lines.
pub fn error_file_layer<S>(dir: &Path) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(DailyLog::new(dir))
        .with_ansi(false)
        .with_level(false)
        .with_target(false)
        .with_timer(ChronoLocal::new(LINE_TIME_FORMAT.to_string()))
        .with_filter(LevelFilter::ERROR)
}

/// Console output filtered by `RUST_LOG` (default `info`) plus the daily error file.
pub fn init(log_dir: &Path) {
    let console = fmt::layer().with_writer(io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(console)
        .with(error_file_layer(log_dir))
        .init();
}

// ── Tests ──
