// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable progress output for a run.

use crate::output::StderrStyles;
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};
use zopkio_metadata::ResultKind;
use zopkio_runner::{outcome::UnitError, runner::RunEvent};

/// Writes one line per interesting [`RunEvent`] to a writer, usually stderr.
pub struct EventDisplayer<W> {
    styles: StderrStyles,
    writer: W,
}

impl<W: Write> EventDisplayer<W> {
    /// Creates a new displayer.
    pub fn new(styles: StderrStyles, writer: W) -> Self {
        Self { styles, writer }
    }

    /// Consumes the displayer, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Writes an event.
    pub fn write_event(&mut self, event: &RunEvent) -> io::Result<()> {
        match event {
            RunEvent::RunStarted {
                config_count,
                test_count,
            } => {
                writeln!(
                    self.writer,
                    "{:>12} {} {} across {} {}",
                    "Starting".style(self.styles.pass),
                    test_count.style(self.styles.count),
                    if *test_count == 1 { "test" } else { "tests" },
                    config_count.style(self.styles.count),
                    if *config_count == 1 {
                        "configuration"
                    } else {
                        "configurations"
                    },
                )?;
            }
            RunEvent::ConfigStarted { config_name } => {
                writeln!(
                    self.writer,
                    "{:>12} {}",
                    "CONFIG".style(self.styles.bold),
                    config_name.style(self.styles.bold),
                )?;
            }
            RunEvent::ConfigSkipped {
                config_name,
                reason,
                error,
            } => {
                writeln!(
                    self.writer,
                    "{:>12} {}: {reason}",
                    "SKIP".style(self.styles.skip),
                    config_name.style(self.styles.bold),
                )?;
                if let Some(error) = error {
                    self.write_error(error)?;
                }
            }
            RunEvent::TestStarted { .. } => {}
            RunEvent::IterationFinished {
                config_name,
                test_name,
                iteration,
                total,
                result,
            } => {
                // Single-iteration tests are reported once they finish.
                if *total > 1 {
                    let (status, style) = self.status(*result);
                    writeln!(
                        self.writer,
                        "{:>12} [{iteration:>3}/{total}] {config_name} {}",
                        status.style(style),
                        test_name.style(self.styles.bold),
                    )?;
                }
            }
            RunEvent::TestSkipped {
                config_name,
                test_name,
                reason,
            } => {
                writeln!(
                    self.writer,
                    "{:>12} {config_name} {}: {reason}",
                    "SKIP".style(self.styles.skip),
                    test_name.style(self.styles.bold),
                )?;
            }
            RunEvent::TestFinished {
                config_name,
                test_name,
                result,
                error,
                elapsed,
            } => {
                let (status, style) = self.status(*result);
                writeln!(
                    self.writer,
                    "{:>12} [{}] {config_name} {}",
                    status.style(style),
                    DisplayElapsed(*elapsed),
                    test_name.style(self.styles.bold),
                )?;
                if *result == ResultKind::Failed
                    && let Some(error) = error
                {
                    self.write_error(error)?;
                }
            }
            RunEvent::ConfigFinished {
                config_name,
                result,
                counts,
                elapsed,
            } => {
                let (status, style) = self.status(*result);
                writeln!(
                    self.writer,
                    "{:>12} [{}] {}: {} passed, {} failed, {} skipped",
                    status.style(style),
                    DisplayElapsed(*elapsed),
                    config_name.style(self.styles.bold),
                    counts.passed.style(self.styles.count),
                    counts.failed.style(self.styles.count),
                    counts.skipped.style(self.styles.count),
                )?;
            }
            RunEvent::RunFinished { run_stats, elapsed } => {
                let summary_style = if run_stats.is_success() {
                    self.styles.pass
                } else {
                    self.styles.fail
                };
                write!(
                    self.writer,
                    "{:>12} [{}] {} passed, {} failed, {} skipped",
                    "Summary".style(summary_style),
                    DisplayElapsed(*elapsed),
                    run_stats.passed.style(self.styles.count),
                    run_stats.failed.style(self.styles.count),
                    run_stats.skipped.style(self.styles.count),
                )?;
                if run_stats.configs_skipped > 0 {
                    write!(
                        self.writer,
                        "; {} {} skipped",
                        run_stats.configs_skipped.style(self.styles.count),
                        if run_stats.configs_skipped == 1 {
                            "configuration"
                        } else {
                            "configurations"
                        },
                    )?;
                }
                writeln!(self.writer)?;
            }
        }
        self.writer.flush()
    }

    fn status(&self, result: ResultKind) -> (&'static str, Style) {
        match result {
            ResultKind::Passed => ("PASS", self.styles.pass),
            ResultKind::Failed => ("FAIL", self.styles.fail),
            ResultKind::Skipped => ("SKIP", self.styles.skip),
            ResultKind::NotRun => ("NOT RUN", self.styles.skip),
        }
    }

    fn write_error(&mut self, error: &UnitError) -> io::Result<()> {
        for line in error.trace().lines() {
            writeln!(self.writer, "{:>12} {line}", "")?;
        }
        Ok(())
    }
}

struct DisplayElapsed(Duration);

impl std::fmt::Display for DisplayElapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>8.3}s", self.0.as_secs_f64())
    }
}
