// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration sets for zopkio.
//!
//! A configuration directory holds a master configuration plus a set of variants. The suite is
//! executed once per variant; see [`ConfigSet::from_dir`] for how the directory is laid out.

mod abort_threshold;
mod config_set;
mod options;
mod properties;

pub use abort_threshold::*;
pub use config_set::*;
pub use options::*;
pub use properties::{CONFIG_SEPARATOR, parse_overrides, parse_pair};

/// A mapping of configuration keys to values.
pub type ConfigMap = indexmap::IndexMap<String, serde_json::Value>;
