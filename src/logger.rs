//! Optional append-only file sink for formatted messages (§4.7).
//!
//! Independent of the paused-display state: when enabled, every message
//! that passes the filter is written here regardless of whether the
//! interactive display is paused — grounded on
//! `mqtlib::output::file::FileOutput`'s `File::options().append(true).create(true)`
//! pattern.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::format::strip_ansi;

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("could not open log file \"{1}\"")]
    CouldNotOpen(#[source] std::io::Error, PathBuf),
    #[error("error writing to log file \"{1}\"")]
    WriteFailed(#[source] std::io::Error, PathBuf),
}

/// Line-buffered append-only sink. `None` when logging is disabled (the
/// `log stop` command drops the sink, closing the file on `Drop`).
pub struct LogSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogSinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogSinkError::CouldNotOpen(e, path.clone()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Writes `line`, ANSI-stripped, terminated with a newline.
    pub fn write_line(&mut self, line: &str) -> Result<(), LogSinkError> {
        let stripped = strip_ansi(line);
        writeln!(self.writer, "{stripped}").map_err(|e| LogSinkError::WriteFailed(e, self.path.clone()))?;
        self.writer
            .flush()
            .map_err(|e| LogSinkError::WriteFailed(e, self.path.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn writes_strip_ansi_and_append_newline() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("mqsh-logsink-test-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let mut sink = LogSink::open(&path).unwrap();
            sink.write_line("\u{1b}[32mhello\u{1b}[0m").unwrap();
            sink.write_line("world").unwrap();
        }

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello\nworld\n");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reopening_the_same_path_appends_rather_than_truncates() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("mqsh-logsink-append-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);

        LogSink::open(&path).unwrap().write_line("first").unwrap();
        LogSink::open(&path).unwrap().write_line("second").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");

        std::fs::remove_file(&path).unwrap();
    }
}
