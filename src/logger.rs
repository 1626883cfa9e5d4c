/// Verbosity-gated console logger passed explicitly to each check
use colored::Colorize;
use std::fmt::Display;
use tracing::info;

/// Default output verbosity
pub const DEFAULT_VERBOSITY: u8 = 2;

/// Logger carrying the verbosity threshold chosen at startup
#[derive(Debug, Clone, Copy)]
pub struct Logger {
    verbosity: u8,
}

impl Logger {
    /// Create a logger that emits every message at or below `verbosity`
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Writer for messages at `level`
    ///
    /// Returns a writer that drops everything when `level` exceeds the
    /// configured verbosity.
    pub fn v(&self, level: u8) -> Writer {
        Writer {
            enabled: level <= self.verbosity,
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(DEFAULT_VERBOSITY)
    }
}

/// Handle returned by [`Logger::v`]
#[derive(Debug, Clone, Copy)]
pub struct Writer {
    enabled: bool,
}

impl Writer {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Emit a status line
    pub fn info(&self, message: impl Display) {
        if self.enabled {
            info!("{}", highlight(&message.to_string()));
        }
    }
}

/// Colour the SUCCEEDED / FAILED status words
fn highlight(line: &str) -> String {
    line.replace("SUCCEEDED", &"SUCCEEDED".green().to_string())
        .replace("FAILED", &"FAILED".red().to_string())
}
