// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable output for zopkio runs.
//!
//! The types in this crate are written out by zopkio's summary reporter and are meant to be
//! consumed by dashboards and CI tooling without depending on the runner itself.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
