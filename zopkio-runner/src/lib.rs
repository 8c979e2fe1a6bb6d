// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for zopkio, a distributed functional and performance test orchestrator.
//!
//! The basic flow of a run is:
//!
//! 1. A [`ConfigSet`](config::ConfigSet) is loaded from a configuration directory.
//! 2. A [`TestList`](test_list::TestList) is discovered from registered
//!    [`TestModule`](test_list::TestModule)s.
//! 3. A [`TestRunner`](runner::TestRunner) executes every test once per configuration, driving
//!    the suite's [`Deployment`](deployer::Deployment) hooks and recording outcomes.
//! 4. Finished configurations are collected into a
//!    [`ResultsCollector`](collector::ResultsCollector) which reporters render.

pub mod collector;
pub mod config;
pub mod context;
pub mod deployer;
pub mod errors;
pub mod failure_handler;
mod helpers;
pub mod log_source;
pub mod outcome;
pub mod perf;
pub mod recipes;
pub mod reporter;
pub mod runner;
mod stopwatch;
pub mod test_list;
pub mod test_utils;
