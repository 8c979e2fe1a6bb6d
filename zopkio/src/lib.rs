// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line harness for zopkio test suites.
//!
//! A suite is a Rust binary that describes its tests, deployment hooks, and configuration
//! directory with a [`SuiteDefinition`], parses [`ZopkioApp`] from its arguments, and calls
//! [`ZopkioApp::exec`]. See `demos/sample_suite.rs` for a complete example.

#![warn(missing_docs)]

mod app;
mod displayer;
mod errors;
mod output;

pub use app::{SuiteDefinition, ZopkioApp, exit_code_for};
pub use displayer::EventDisplayer;
pub use errors::ExpectedError;
pub use output::{Color, LogLevel, OutputContext, StderrStyles, ZOPKIO_LOG_ENV};
