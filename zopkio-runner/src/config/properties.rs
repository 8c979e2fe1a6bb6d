// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for `key=value` pairs, used by properties files and command-line overrides.

use super::ConfigMap;
use crate::errors::ConfigLoadError;
use serde_json::Value;

/// The separator between keys and values.
pub const CONFIG_SEPARATOR: char = '=';

/// Parses a single `key=value` pair.
///
/// The pair must contain exactly one separator.
pub fn parse_pair<'a>(
    source_name: &str,
    pair: &'a str,
) -> Result<(&'a str, &'a str), ConfigLoadError> {
    let invalid = || ConfigLoadError::InvalidPair {
        source_name: source_name.to_owned(),
        line: pair.to_owned(),
        separator: CONFIG_SEPARATOR,
    };

    let (key, value) = pair.split_once(CONFIG_SEPARATOR).ok_or_else(invalid)?;
    if value.contains(CONFIG_SEPARATOR) {
        return Err(invalid());
    }
    Ok((key, value))
}

/// Parses a list of `key=value` pairs, such as those passed on the command line, into a mapping.
///
/// Values are always strings; typed interpretation happens when options are read.
pub fn parse_overrides<I, S>(pairs: I) -> Result<ConfigMap, ConfigLoadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mapping = ConfigMap::new();
    for pair in pairs {
        let (key, value) = parse_pair("--config-overrides", pair.as_ref())?;
        mapping.insert(key.to_owned(), Value::String(value.to_owned()));
    }
    Ok(mapping)
}

/// Parses the contents of a properties file.
///
/// Blank lines and lines starting with `#` are skipped. Trailing whitespace is trimmed from every
/// line.
pub(super) fn parse_properties(source_name: &str, contents: &str) -> Result<ConfigMap, ConfigLoadError> {
    let mut mapping = ConfigMap::new();
    for line in contents.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = parse_pair(source_name, line)?;
        mapping.insert(key.to_owned(), Value::String(value.to_owned()));
    }
    Ok(mapping)
}
