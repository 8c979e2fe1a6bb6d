// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine.
//!
//! For each configuration the runner runs suite setup, then every test unit once per lap, then
//! log retrieval, performance analysis, post-run validation and suite teardown. Finished
//! configurations are handed to the [`ResultsCollector`](crate::collector::ResultsCollector).
//!
//! The main structure in this module is [`TestRunner`].

mod events;
mod executor;
mod imp;
mod logs;

pub use events::*;
pub use imp::*;
