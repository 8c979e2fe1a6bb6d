// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interface to performance capture and analysis.
//!
//! The engine signals the analyzer when a configuration or a test starts and stops, then asks it
//! to analyze the fetched logs. Everything an analyzer returns is opaque to the engine and only
//! carried through to reports.

use crate::outcome::BoxError;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identifies a single performance capture.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerfRunId(String);

impl PerfRunId {
    /// Creates a new identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PerfRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Statistics produced by an analyzer.
pub type PerfStats = serde_json::Value;

/// The result of checking one service-level agreement.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SlaResult {
    /// The metric the SLA applies to.
    pub metric: String,

    /// The SLA as written, e.g. `p99<100`.
    pub rule: String,

    /// Whether the SLA was met.
    pub passed: bool,
}

/// A performance capture and analysis backend.
pub trait PerfAnalyzer: Send + Sync {
    /// Starts a capture, returning its identifier.
    fn signal_start(&self, config: Option<&Utf8Path>) -> PerfRunId;

    /// Stops a capture.
    fn signal_stop(&self, id: &PerfRunId);

    /// Analyzes logs in `logs_dir`, writing output to `output_dir`.
    fn analyze(&self, logs_dir: &Utf8Path, output_dir: &Utf8Path) -> Result<(), BoxError>;

    /// Compares two captures.
    fn diff(&self, current: &PerfRunId, previous: &PerfRunId) -> Result<(), BoxError>;

    /// Returns statistics for a capture.
    fn stats(&self, id: &PerfRunId) -> Option<PerfStats>;

    /// Returns SLA results for a capture.
    fn sla_results(&self, id: &PerfRunId) -> Vec<SlaResult>;
}

/// An analyzer that hands out identifiers and does nothing else.
#[derive(Debug, Default)]
pub struct NoopPerfAnalyzer {
    next_id: AtomicU64,
}

impl NoopPerfAnalyzer {
    /// Creates a new analyzer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PerfAnalyzer for NoopPerfAnalyzer {
    fn signal_start(&self, _config: Option<&Utf8Path>) -> PerfRunId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        PerfRunId::new(format!("noop-{id}"))
    }

    fn signal_stop(&self, _id: &PerfRunId) {}

    fn analyze(&self, _logs_dir: &Utf8Path, _output_dir: &Utf8Path) -> Result<(), BoxError> {
        Ok(())
    }

    fn diff(&self, _current: &PerfRunId, _previous: &PerfRunId) -> Result<(), BoxError> {
        Ok(())
    }

    fn stats(&self, _id: &PerfRunId) -> Option<PerfStats> {
        None
    }

    fn sla_results(&self, _id: &PerfRunId) -> Vec<SlaResult> {
        Vec::new()
    }
}
