// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by zopkio.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt, time::Duration};
use thiserror::Error;

/// An error that occurred while loading a configuration directory.
///
/// These errors are preconditions of a run: they fail the whole invocation before any
/// configuration executes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigLoadError {
    /// The configuration directory does not exist or is not a directory.
    #[error("configuration directory `{path}` is not a directory")]
    NotADirectory {
        /// The path that was provided.
        path: Utf8PathBuf,
    },

    /// Listing a directory failed.
    #[error("failed to read configuration directory `{path}`")]
    ReadDir {
        /// The directory being listed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// Reading a configuration file failed.
    #[error("failed to read configuration file `{path}`")]
    ReadFile {
        /// The file being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// A JSON configuration file was malformed.
    #[error("unable to parse config file `{path}` due to malformed JSON")]
    Json {
        /// The file being parsed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },

    /// A JSON configuration file did not contain an object at the top level.
    #[error("config file `{path}` must contain a JSON object at the top level")]
    JsonNotAnObject {
        /// The file being parsed.
        path: Utf8PathBuf,
    },

    /// A TOML configuration file was malformed.
    #[error("unable to parse config file `{path}` as TOML")]
    Toml {
        /// The file being parsed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: ConfigError,
    },

    /// A `key=value` pair was malformed.
    #[error(
        "{}: `{line}` must be two strings separated by a `{separator}`",
        .source_name,
    )]
    InvalidPair {
        /// Where the pair came from: a file path or a command-line flag.
        source_name: String,

        /// The malformed line.
        line: String,

        /// The expected separator.
        separator: char,
    },
}

/// An error that occurs while interpreting a recognized configuration key.
#[derive(Clone, Debug, Error)]
#[error("invalid value for `{key}` in configuration `{config_name}`: {value} (expected {expected})")]
pub struct ConfigValueError {
    config_name: String,
    key: String,
    value: String,
    expected: &'static str,
}

impl ConfigValueError {
    pub(crate) fn new(
        config_name: impl Into<String>,
        key: impl Into<String>,
        value: &serde_json::Value,
        expected: &'static str,
    ) -> Self {
        Self {
            config_name: config_name.into(),
            key: key.into(),
            value: value.to_string(),
            expected,
        }
    }

    /// Returns the key that had an invalid value.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// An error that occurs while parsing an [`AbortThreshold`](crate::config::AbortThreshold) value
/// from a string.
#[derive(Clone, Debug, Error)]
#[error("unrecognized abort threshold: {input} (expected a non-negative integer, -1 or \"never\")")]
pub struct AbortThresholdParseError {
    input: String,
}

impl AbortThresholdParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while building a test list out of test modules.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The same function name was registered twice in one module.
    #[error("function `{function}` registered more than once in module `{module}`")]
    DuplicateFunction {
        /// The module name.
        module: String,

        /// The duplicated function name.
        function: String,
    },

    /// A test asked to repeat zero times per loop.
    #[error("test `{test}` in module `{module}` must repeat at least once per loop")]
    ZeroIterations {
        /// The module name.
        module: String,

        /// The test name.
        test: String,
    },
}

/// An error returned by a [`Deployer`](crate::deployer::Deployer) implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeployError {
    /// The deployer does not implement the requested operation.
    #[error("operation `{operation}` is not supported by this deployer")]
    Unsupported {
        /// The operation name.
        operation: &'static str,
    },

    /// The deployer does not know about the process.
    #[error("unknown process `{unique_id}`")]
    UnknownProcess {
        /// The process id.
        unique_id: String,
    },

    /// A remote operation failed.
    #[error("{operation} failed for process `{unique_id}`")]
    Remote {
        /// The operation name.
        operation: &'static str,

        /// The process id.
        unique_id: String,

        /// The underlying error.
        #[source]
        err: Box<dyn Error + Send + Sync>,
    },
}

/// An error that occurs while writing a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// An error occurred while creating a directory or file.
    #[error("error writing to `{path}`")]
    Fs {
        /// The file or directory being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// An error occurred while serializing JUnit XML.
    #[error("error serializing JUnit report to `{path}`")]
    Junit {
        /// The output file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: quick_junit::SerializeError,
    },

    /// An error occurred while serializing the JSON summary.
    #[error("error serializing run summary to `{path}`")]
    Json {
        /// The output file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: serde_json::Error,
    },
}

/// An error produced by the kill-and-recover test recipes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecoveryError {
    /// No deployers were provided to choose from.
    #[error("no deployer was provided to kill a process from")]
    NoDeployers,

    /// The chosen deployer had no processes to kill.
    #[error("no process was provided for the chosen deployer")]
    NoProcesses,

    /// Stopping or restarting the process failed.
    #[error("failed to {operation} process `{unique_id}`")]
    Deploy {
        /// The operation that failed.
        operation: &'static str,

        /// The process id.
        unique_id: String,

        /// The underlying error.
        #[source]
        err: DeployError,
    },

    /// The process did not recover before the deadline.
    #[error("killed process `{unique_id}` did not recover within {timeout:?}")]
    Timeout {
        /// The process id.
        unique_id: String,

        /// The timeout that elapsed.
        timeout: Duration,
    },
}

/// An error that occurs while extracting the portion of a log belonging to a test.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogSliceError {
    /// The test was never started in the active run.
    #[error("test `{test_name}` has no recorded start and end times")]
    NoTimes {
        /// The test name.
        test_name: String,
    },

    /// Reading the log failed.
    #[error("failed to read log file `{path}`")]
    Read {
        /// The log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// An error that occurs while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerBuildError {
    /// A recognized configuration key had an invalid value.
    #[error("invalid engine option")]
    ConfigValue(#[from] ConfigValueError),

    /// The thread pool used for parallel test groups could not be built.
    #[error("failed to build the parallel test thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut current_error = self.error.source();
        if current_error.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(error) = current_error {
            write!(f, "\n  - {error}")?;
            current_error = error.source();
        }

        Ok(())
    }
}
