// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcomes of individual lifecycle steps.
//!
//! Every step that runs user code (suite setup and teardown, test setup and teardown, test bodies
//! and validators) goes through [`run_unit`], which converts both returned errors and panics into
//! a [`UnitError`]. Nothing a step does can unwind past its enclosing lifecycle boundary.

use crate::{context::RunContext, errors::DisplayErrorChain, helpers::panic_payload_to_string};
use std::{
    error::Error,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use zopkio_metadata::ResultKind;

/// An error returned by user code: a test body, a validator, or a deployment hook.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The result returned by user code.
pub type UnitResult = Result<(), BoxError>;

/// A shareable callable that runs user code against the run context.
pub type UnitFn = Arc<dyn Fn(&RunContext) -> UnitResult + Send + Sync>;

/// The lifecycle step a [`UnitError`] was produced by.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UnitKind {
    /// `setup_suite()`, run once per configuration.
    SuiteSetup,

    /// `teardown_suite()`, run once per configuration.
    SuiteTeardown,

    /// `setup()`, run once per test or parallel group.
    Setup,

    /// `teardown()`, run once per test or parallel group.
    Teardown,

    /// The test body.
    Body,

    /// The validation function paired with a test.
    Validation,
}

impl UnitKind {
    /// Returns the name of the callable this step runs, as it appears in messages.
    pub fn callable_name(self) -> &'static str {
        match self {
            UnitKind::SuiteSetup => "setup_suite()",
            UnitKind::SuiteTeardown => "teardown_suite()",
            UnitKind::Setup => "setup()",
            UnitKind::Teardown => "teardown()",
            UnitKind::Body => "test body",
            UnitKind::Validation => "validation",
        }
    }

    /// Returns the header prepended to a captured trace when this step fails outside a test body.
    pub fn failure_header(self) -> String {
        format!(
            "{} failed. See below for the trace.\n",
            self.callable_name()
        )
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.callable_name())
    }
}

/// A captured failure from user code.
///
/// The underlying error is rendered at capture time so that the captured form can be cloned into
/// the results collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitError {
    kind: UnitKind,
    message: String,
    trace: String,
    panicked: bool,
}

impl UnitError {
    /// Captures a returned error.
    pub fn from_error(kind: UnitKind, error: &(dyn Error + 'static)) -> Self {
        Self {
            kind,
            message: error.to_string(),
            trace: DisplayErrorChain::new(error).to_string(),
            panicked: false,
        }
    }

    /// Captures a panic message.
    pub fn from_panic(kind: UnitKind, message: String) -> Self {
        Self {
            kind,
            trace: format!("{} panicked: {message}", kind.callable_name()),
            message,
            panicked: true,
        }
    }

    /// Returns the lifecycle step that failed.
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Returns the top-level error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the full error, including its chain of causes.
    pub fn trace(&self) -> &str {
        &self.trace
    }

    /// Returns true if the failure was a panic rather than a returned error.
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.trace)
    }
}

/// Why a test or configuration was skipped.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SkipReason {
    /// Too many prior configurations failed suite setup or teardown.
    ConfigAbort,

    /// Too many prior tests in this configuration failed setup or teardown.
    TestAbort,

    /// Suite setup failed for this configuration.
    SuiteSetupFailed,

    /// Test setup failed for this test or its parallel group.
    SetupFailed,

    /// The test failed on a previous iteration and retries are exhausted.
    PreviousIterationFailed,
}

impl SkipReason {
    /// Returns the fixed explanatory message recorded against a skipped unit.
    pub fn message(self) -> &'static str {
        match self {
            SkipReason::ConfigAbort => {
                "Configuration skipped. Too many prior configurations failed \
                 setup_suite/teardown_suite consecutively.\n \
                 Change the \"max_suite_failures_before_abort\" field in your master configuration \
                 to allow for more failures.\n"
            }
            SkipReason::TestAbort => {
                "Test skipped. Too many prior tests failed setup/teardown consecutively.\n \
                 Change the \"max_failures_per_suite_before_abort\" field in your configuration \
                 to allow for more failures.\n"
            }
            SkipReason::SuiteSetupFailed => "setup_suite() failed. See below for the trace.\n",
            SkipReason::SetupFailed => "setup() failed. See below for the trace.\n",
            SkipReason::PreviousIterationFailed => {
                "Iteration skipped. The previous iteration failed.\n"
            }
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().trim_end())
    }
}

/// The outcome of a lifecycle step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The step ran and succeeded.
    Passed,

    /// The step ran and failed.
    Failed(UnitError),

    /// The step did not run.
    Skipped(SkipReason),
}

impl Outcome {
    /// Returns the result kind corresponding to this outcome.
    pub fn result_kind(&self) -> ResultKind {
        match self {
            Outcome::Passed => ResultKind::Passed,
            Outcome::Failed(_) => ResultKind::Failed,
            Outcome::Skipped(_) => ResultKind::Skipped,
        }
    }

    /// Returns true if the step passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    /// Returns the captured error, if the step failed.
    pub fn error(&self) -> Option<&UnitError> {
        match self {
            Outcome::Failed(error) => Some(error),
            Outcome::Passed | Outcome::Skipped(_) => None,
        }
    }
}

/// Runs a piece of user code, catching both returned errors and panics.
pub fn run_unit(kind: UnitKind, f: impl FnOnce() -> UnitResult) -> Outcome {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Outcome::Passed,
        Ok(Err(error)) => Outcome::Failed(UnitError::from_error(kind, error.as_ref())),
        Err(payload) => Outcome::Failed(UnitError::from_panic(
            kind,
            panic_payload_to_string(payload),
        )),
    }
}
