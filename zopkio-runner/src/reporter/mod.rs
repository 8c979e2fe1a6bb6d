// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering of collected results.
//!
//! A [`ReportSink`] consumes the finished [`ResultsCollector`] and writes an artifact. Reports for
//! a run live together under `<output_dir>/reports/<report_name>_<YYYYmmdd_HHMMSS>/`, see
//! [`ReportDir`].

mod junit;
mod summary;

pub use junit::JunitReporter;
pub use summary::SummaryReporter;

use crate::{collector::ResultsCollector, errors::ReportError};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use tracing::info;

/// Consumes a finished results collector and produces a rendered artifact.
pub trait ReportSink {
    /// Renders the collector.
    fn generate(&mut self, collector: &ResultsCollector) -> Result<(), ReportError>;

    /// Returns where the rendered artifact was written, once it has been.
    fn report_location(&self) -> Option<&Utf8Path>;

    /// Points the user at the rendered artifact.
    fn display(&self) {
        if let Some(location) = self.report_location() {
            info!("report written to {location}");
        }
    }
}

/// The directory every report for one run is written to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReportDir {
    report_name: String,
    path: Utf8PathBuf,
}

impl ReportDir {
    /// Returns the report directory for a run named `report_name` started at `init_time`.
    pub fn new(reports_dir: &Utf8Path, report_name: &str, init_time: DateTime<FixedOffset>) -> Self {
        let report_name = format!("{report_name}_{}", init_time.format("%Y%m%d_%H%M%S"));
        let path = reports_dir.join(&report_name);
        Self { report_name, path }
    }

    /// Creates the directory and any missing parents.
    pub fn create(&self) -> Result<(), ReportError> {
        std::fs::create_dir_all(&self.path).map_err(|err| ReportError::Fs {
            path: self.path.clone(),
            err,
        })
    }

    /// Returns the report name, including its timestamp suffix.
    pub fn report_name(&self) -> &str {
        &self.report_name
    }

    /// Returns the path to the directory.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Creates the report directory and runs every sink against the collector.
///
/// Unless `no_display` is set, each sink is asked to display its report afterwards.
pub fn generate_reports(
    report_dir: &ReportDir,
    collector: &ResultsCollector,
    sinks: &mut [Box<dyn ReportSink>],
    no_display: bool,
) -> Result<(), ReportError> {
    report_dir.create()?;
    for sink in sinks.iter_mut() {
        sink.generate(collector)?;
    }
    if !no_display {
        for sink in sinks.iter() {
            sink.display();
        }
    }
    Ok(())
}
