//! Human-readable progress output.
//!
//! Compilers and executors take a `&dyn Reporter` instead of printing, so the
//! CLI decides where lines go and tests can assert on them.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Step,
    Detail,
    Warning,
}

pub trait Reporter: Send + Sync {
    fn report(&self, level: ReportLevel, message: &str);

    /// A top-level step, e.g. "Building image...".
    fn step(&self, message: &str) {
        self.report(ReportLevel::Step, message);
    }

    fn detail(&self, message: &str) {
        self.report(ReportLevel::Detail, message);
    }

    fn warn(&self, message: &str) {
        self.report(ReportLevel::Warning, message);
    }
}

/// Prints to stdout, warnings to stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Step => println!("{message}"),
            ReportLevel::Detail => println!("  {message}"),
            ReportLevel::Warning => eprintln!("Warning: {message}"),
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(ReportLevel, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(ReportLevel, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(level, _)| *level == ReportLevel::Warning)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push((level, message.to_owned()));
    }
}
