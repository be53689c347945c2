//! Console output for sync runs
//!
//! [`Logger`] is cloned into the resolver, planner, executor workers and
//! registry client. Progress goes to stdout, errors to stderr. In quiet mode
//! only errors are printed; in verbose mode per-request and per-operation
//! detail is added.

use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Normal,
    Verbose,
}

#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    started: Instant,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            started: Instant::now(),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            started: Instant::now(),
        }
    }

    fn enabled(&self, level: Level) -> bool {
        !self.quiet && (level == Level::Normal || self.verbose)
    }

    fn emit(&self, level: Level, marker: &str, message: &str) {
        if self.enabled(level) {
            println!("{}{}", marker, message);
        }
    }

    pub fn section(&self, title: &str) {
        self.emit(Level::Normal, "", &format!("\n=== {} ===", title));
    }

    pub fn subsection(&self, title: &str) {
        self.emit(Level::Normal, "", &format!("\n--- {} ---", title));
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::Normal, "ℹ️  ", message);
    }

    pub fn step(&self, message: &str) {
        self.emit(Level::Normal, "▶️  ", message);
    }

    pub fn success(&self, message: &str) {
        self.emit(Level::Normal, "✅ ", message);
    }

    pub fn warning(&self, message: &str) {
        self.emit(Level::Normal, "⚠️  WARNING: ", message);
    }

    /// Printed even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    /// An operation that a dry run would have performed
    pub fn dry_run(&self, message: &str) {
        self.emit(Level::Normal, "[DRY-RUN] ", message);
    }

    pub fn verbose(&self, message: &str) {
        self.emit(Level::Verbose, "📝 ", message);
    }

    pub fn detail(&self, message: &str) {
        self.emit(Level::Verbose, "   ", message);
    }

    pub fn debug(&self, message: &str) {
        self.emit(Level::Verbose, "🐛 ", message);
    }

    /// Multi-line text such as a rendered table
    pub fn block(&self, text: &str) {
        if self.enabled(Level::Normal) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", text);
            let _ = stdout.flush();
        }
    }

    /// Aligned `key : value` lines under a subsection heading
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.enabled(Level::Normal) {
            return;
        }
        self.subsection(title);
        let width = items.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in items {
            println!("  {:<width$} : {}", key, value);
        }
    }

    pub fn list(&self, title: &str, items: &[String]) {
        if !self.enabled(Level::Normal) {
            return;
        }
        self.subsection(title);
        if items.is_empty() {
            println!("  (none)");
        }
        for (n, item) in items.iter().enumerate() {
            println!("  {:>3}. {}", n + 1, item);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `1.50s`, `2m5s` or `1h2m5s`
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        match secs {
            0..60 => format!("{:.2}s", duration.as_secs_f64()),
            60..3600 => format!("{}m{}s", secs / 60, secs % 60),
            _ => format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60),
        }
    }
}
