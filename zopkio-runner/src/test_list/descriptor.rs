// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    context::RunContext,
    outcome::{Outcome, UnitError, UnitFn, UnitKind, run_unit},
    perf::{PerfRunId, PerfStats, SlaResult},
};
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use debug_ignore::DebugIgnore;
use std::{collections::BTreeMap, fmt};
use swrite::{SWrite, swrite};
use zopkio_metadata::{ResultKind, TestSummary};

/// The phase a test runs in.
///
/// Default-phase tests run one at a time, in discovery order. Tests sharing a numbered phase run
/// concurrently as a group. Numbered phases run after every default-phase test, in ascending
/// order.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TestPhase {
    /// The sequential phase.
    #[default]
    Default,

    /// A numbered phase whose tests run concurrently.
    Numbered(u32),
}

impl TestPhase {
    /// Returns the phase number, or `None` for the default phase.
    pub fn number(self) -> Option<u32> {
        match self {
            TestPhase::Default => None,
            TestPhase::Numbered(n) => Some(n),
        }
    }
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestPhase::Default => write!(f, "default"),
            TestPhase::Numbered(n) => write!(f, "{n}"),
        }
    }
}

/// Performance-analysis data attached to a test. Opaque to the engine.
#[derive(Clone, Debug, Default)]
pub struct TestPerf {
    /// The analysis configuration used for this test.
    pub config: Option<Utf8PathBuf>,

    /// The capture started for this test.
    pub id: Option<PerfRunId>,

    /// Statistics produced by the analyzer.
    pub stats: Option<PerfStats>,

    /// SLA results produced by the analyzer.
    pub sla: Vec<SlaResult>,
}

/// A discovered test, along with its run-time state.
///
/// The identity of a test (name, phase, functions, iteration count) is fixed at discovery. Every
/// other field is written by the execution engine and cleared by [`reset`](Self::reset).
#[derive(Clone, Debug)]
pub struct Test {
    name: String,
    description: Option<String>,
    phase: TestPhase,
    function: DebugIgnore<UnitFn>,
    validation_function: Option<DebugIgnore<UnitFn>>,
    repeat_per_loop: u32,

    /// The total number of iterations for the current configuration: `repeat_per_loop` times the
    /// configuration's `loop_all_tests` factor.
    pub total_number_iterations: u32,

    /// The iteration currently executing, or the last one executed. Starts at 0.
    pub current_iteration: u32,

    /// Consecutive iterations that failed, reset to 0 on a pass.
    pub consecutive_failures: u32,

    /// The result of the last executed iteration, or `Skipped` if the test was skipped.
    pub result: ResultKind,

    /// The result of every iteration, keyed from 1. Iterations that never ran remain `Skipped`.
    pub iteration_results: BTreeMap<u32, ResultKind>,

    /// Start of the test including setup.
    pub start_time: Option<DateTime<FixedOffset>>,

    /// End of the test including teardown.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Start of the most recent test body invocation.
    pub func_start_time: Option<DateTime<FixedOffset>>,

    /// End of the most recent test body invocation.
    pub func_end_time: Option<DateTime<FixedOffset>>,

    /// The most recently captured failure.
    pub exception: Option<UnitError>,

    /// Abort messages and captured traces.
    pub message: String,

    /// Whether validation already ran inline during the iteration loop.
    pub validated_inline: bool,

    /// Performance-analysis data.
    pub perf: TestPerf,
}

impl Test {
    pub(crate) fn new(
        name: String,
        description: Option<String>,
        phase: TestPhase,
        function: UnitFn,
        validation_function: Option<UnitFn>,
        repeat_per_loop: u32,
    ) -> Self {
        let mut test = Self {
            name,
            description,
            phase,
            function: DebugIgnore(function),
            validation_function: validation_function.map(DebugIgnore),
            repeat_per_loop,
            total_number_iterations: repeat_per_loop,
            current_iteration: 0,
            consecutive_failures: 0,
            result: ResultKind::NotRun,
            iteration_results: BTreeMap::new(),
            start_time: None,
            end_time: None,
            func_start_time: None,
            func_end_time: None,
            exception: None,
            message: String::new(),
            validated_inline: false,
            perf: TestPerf::default(),
        };
        test.reset();
        test
    }

    /// Returns the name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description built from the test's and validator's documentation.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the phase of the test.
    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    /// Returns true if this test has a paired validation function.
    pub fn has_validation(&self) -> bool {
        self.validation_function.is_some()
    }

    /// Returns the number of times the body runs per lap of the suite.
    pub fn repeat_per_loop(&self) -> u32 {
        self.repeat_per_loop
    }

    /// Resets the test to its initial, unrun state.
    ///
    /// Only the identity of the test is kept. `total_number_iterations` returns to
    /// `repeat_per_loop`.
    pub fn reset(&mut self) {
        self.prepare(1);
        self.current_iteration = 0;
        self.consecutive_failures = 0;
        self.result = ResultKind::NotRun;
        self.start_time = None;
        self.end_time = None;
        self.func_start_time = None;
        self.func_end_time = None;
        self.exception = None;
        self.message.clear();
        self.validated_inline = false;
        self.perf = TestPerf::default();
    }

    /// Scales the iteration count by `loop_all_tests`, marking every iteration as skipped until
    /// it runs.
    pub fn prepare(&mut self, loop_all_tests: u32) {
        self.total_number_iterations = self.repeat_per_loop.saturating_mul(loop_all_tests.max(1));
        self.iteration_results = (1..=self.total_number_iterations)
            .map(|iteration| (iteration, ResultKind::Skipped))
            .collect();
    }

    /// Returns the result of the most recently executed iteration, if any ran.
    pub fn last_iteration_result(&self) -> Option<ResultKind> {
        if self.current_iteration == 0 {
            None
        } else {
            self.iteration_results.get(&self.current_iteration).copied()
        }
    }

    /// Marks the test skipped, appending a message.
    pub(crate) fn skip(&mut self, message: &str) {
        self.result = ResultKind::Skipped;
        self.message.push_str(message);
    }

    /// Records a failure that didn't come from the test body or validator, such as a setup or
    /// teardown trace.
    pub(crate) fn append_trace(&mut self, kind: UnitKind, error: &UnitError) {
        swrite!(self.message, "{}{}\n", kind.failure_header(), error.trace());
    }

    pub(crate) fn run_body(&self, ctx: &RunContext) -> Outcome {
        run_unit(UnitKind::Body, || (self.function.0)(ctx))
    }

    /// Runs the validation function, returning `None` if there isn't one.
    pub(crate) fn run_validation(&self, ctx: &RunContext) -> Option<Outcome> {
        self.validation_function
            .as_ref()
            .map(|validate| run_unit(UnitKind::Validation, || (validate.0)(ctx)))
    }

    /// Records a failed outcome against the current iteration and the test as a whole.
    ///
    /// The trace is appended to the message, so earlier setup or teardown traces are kept.
    pub(crate) fn record_failure(&mut self, error: UnitError) {
        self.result = ResultKind::Failed;
        if self.current_iteration > 0 {
            self.iteration_results
                .insert(self.current_iteration, ResultKind::Failed);
        }
        swrite!(self.message, "{}\n", error.trace());
        self.exception = Some(error);
    }

    /// Returns a serializable summary of this test.
    pub fn to_summary(&self) -> TestSummary {
        TestSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            phase: self.phase.number(),
            result: self.result,
            iteration_results: self.iteration_results.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            func_start_time: self.func_start_time,
            func_end_time: self.func_end_time,
            message: self.message.clone(),
            error: self.exception.as_ref().map(|error| error.trace().to_owned()),
        }
    }
}
