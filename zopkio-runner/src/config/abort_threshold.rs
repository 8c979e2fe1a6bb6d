// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::AbortThresholdParseError;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// The number of consecutive setup or teardown failures tolerated before aborting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortThreshold {
    /// Abort once more than this many consecutive failures have been seen.
    Count(usize),

    /// Never abort.
    Never,
}

impl AbortThreshold {
    /// The threshold used when a configuration doesn't specify one.
    pub const DEFAULT: Self = Self::Count(2);

    /// Returns true if `failure_count` exceeds this threshold.
    pub fn is_exceeded(&self, failure_count: usize) -> bool {
        match self {
            Self::Count(n) => failure_count > *n,
            Self::Never => false,
        }
    }
}

impl Default for AbortThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for AbortThreshold {
    type Err = AbortThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") || s.eq_ignore_ascii_case("none") {
            return Ok(Self::Never);
        }

        match s.parse::<i64>() {
            Ok(-1) => Ok(Self::Never),
            Ok(n) if n >= 0 => Ok(Self::Count(n as usize)),
            Ok(_) | Err(_) => Err(AbortThresholdParseError::new(s)),
        }
    }
}

impl fmt::Display for AbortThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

impl<'de> Deserialize<'de> for AbortThreshold {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = AbortThreshold;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a non-negative integer, -1, or the string \"never\""
                )
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                AbortThreshold::from_str(v).map_err(serde::de::Error::custom)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(AbortThreshold::Count(v as usize))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    -1 => Ok(AbortThreshold::Never),
                    v if v >= 0 => Ok(AbortThreshold::Count(v as usize)),
                    v => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &"a non-negative integer or -1",
                    )),
                }
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(AbortThreshold::DEFAULT)
            }
        }

        deserializer.deserialize_any(V)
    }
}
