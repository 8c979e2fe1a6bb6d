// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ReportDir, ReportSink};
use crate::{collector::ResultsCollector, errors::ReportError};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs::File, io::BufWriter};

/// Writes a machine-readable [`RunSummary`](zopkio_metadata::RunSummary) to `summary.json` in
/// the report directory.
#[derive(Clone, Debug)]
pub struct SummaryReporter {
    report_name: String,
    path: Utf8PathBuf,
    written: bool,
}

impl SummaryReporter {
    /// The file name written in the report directory.
    pub const FILE_NAME: &'static str = "summary.json";

    /// Creates a reporter writing into `report_dir`.
    pub fn new(report_dir: &ReportDir) -> Self {
        Self {
            report_name: report_dir.report_name().to_owned(),
            path: report_dir.path().join(Self::FILE_NAME),
            written: false,
        }
    }
}

impl ReportSink for SummaryReporter {
    fn generate(&mut self, collector: &ResultsCollector) -> Result<(), ReportError> {
        let summary = collector.to_summary(&self.report_name);
        let f = File::create(&self.path).map_err(|err| ReportError::Fs {
            path: self.path.clone(),
            err,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(f), &summary).map_err(|err| {
            ReportError::Json {
                path: self.path.clone(),
                err,
            }
        })?;
        self.written = true;
        Ok(())
    }

    fn report_location(&self) -> Option<&Utf8Path> {
        self.written.then_some(self.path.as_path())
    }
}
