// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{any::Any, time::Duration};

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "configuration" if `count` is 1, otherwise "configurations".
    pub(crate) fn configs_str(count: usize) -> &'static str {
        if count == 1 {
            "configuration"
        } else {
            "configurations"
        }
    }

    /// Returns "iteration" if `count` is 1, otherwise "iterations".
    pub(crate) fn iterations_str(count: u32) -> &'static str {
        if count == 1 {
            "iteration"
        } else {
            "iterations"
        }
    }
}

/// Converts a caught panic payload into a string.
pub(crate) fn panic_payload_to_string(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(unknown panic payload)".to_owned()
    }
}

/// Formats a duration as seconds with three decimal places, e.g. `1.250s`.
pub(crate) fn display_duration(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}
