// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;
use zopkio_metadata::ZopkioExitCode;
use zopkio_runner::errors::{ConfigLoadError, DiscoveryError, ReportError, RunnerBuildError};

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with
// display_to_stderr, which adds the cause chain.

/// An expected failure of a zopkio invocation, as opposed to a test failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExpectedError {
    /// The current directory could not be determined.
    #[error("could not determine the current directory")]
    CurrentDir {
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The output directory could not be created.
    #[error("failed to create output directory")]
    OutputDirCreate {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The log file could not be created.
    #[error("failed to create log file")]
    LogFileCreate {
        /// The log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The value of `ZOPKIO_LOG` could not be parsed.
    #[error("failed to parse ZOPKIO_LOG")]
    LogDirectiveParse {
        /// The directive.
        directive: String,

        /// The underlying error.
        #[source]
        err: tracing_subscriber::filter::ParseError,
    },

    /// A `--machine-list` pair was malformed.
    #[error("invalid machine list")]
    MachineList {
        /// The underlying error.
        #[source]
        err: ConfigLoadError,
    },

    /// The configuration directory, or an override, could not be loaded.
    #[error("failed to load configuration")]
    ConfigLoad {
        /// The underlying error.
        #[from]
        err: ConfigLoadError,
    },

    /// The test list could not be built.
    #[error("failed to build the test list")]
    TestList {
        /// The underlying error.
        #[from]
        err: DiscoveryError,
    },

    /// There are no tests to run.
    #[error("no tests to run")]
    NoTestsRun,

    /// The test runner could not be built.
    #[error("failed to build the test runner")]
    RunnerBuild {
        /// The underlying error.
        #[from]
        err: RunnerBuildError,
    },

    /// Prompting for a password failed.
    #[error("error reading input prompt")]
    Dialoguer {
        /// The underlying error.
        #[source]
        err: dialoguer::Error,
    },

    /// A run event could not be written to the console.
    #[error("failed to write event to output")]
    WriteEvent {
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A report could not be written.
    #[error("failed to write reports")]
    ReportWrite {
        /// The underlying error.
        #[from]
        err: ReportError,
    },
}

impl ExpectedError {
    /// Returns the exit code the process should exit with.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDir { .. }
            | Self::OutputDirCreate { .. }
            | Self::LogFileCreate { .. }
            | Self::LogDirectiveParse { .. }
            | Self::MachineList { .. }
            | Self::RunnerBuild { .. }
            | Self::Dialoguer { .. } => ZopkioExitCode::SETUP_ERROR,
            Self::ConfigLoad { .. } => ZopkioExitCode::CONFIG_LOAD_FAILED,
            Self::TestList { .. } => ZopkioExitCode::TEST_LIST_CREATION_FAILED,
            Self::NoTestsRun => ZopkioExitCode::NO_TESTS_RUN,
            Self::WriteEvent { .. } | Self::ReportWrite { .. } => {
                ZopkioExitCode::REPORT_WRITE_FAILED
            }
        }
    }

    /// Displays this error, and its cause chain, through the logger.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDir { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::OutputDirCreate { path, err } => {
                error!(
                    "failed to create output directory `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::LogFileCreate { path, err } => {
                error!(
                    "failed to create log file `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::LogDirectiveParse { directive, err } => {
                error!(
                    "failed to parse ZOPKIO_LOG value `{}`",
                    directive.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::MachineList { err } => {
                error!("{err}");
                err.source()
            }
            Self::ConfigLoad { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestList { err } => {
                error!("{err}");
                err.source()
            }
            Self::NoTestsRun => {
                error!("no tests to run (check the test modules and --test-only)");
                None
            }
            Self::RunnerBuild { err } => {
                error!("failed to build the test runner");
                Some(err as &dyn Error)
            }
            Self::Dialoguer { err } => {
                error!("error reading input prompt");
                Some(err as &dyn Error)
            }
            Self::WriteEvent { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::ReportWrite { err } => {
                error!("{err}");
                err.source()
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
