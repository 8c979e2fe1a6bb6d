// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ConfigMap, properties::parse_properties};
use crate::{errors::ConfigLoadError, perf::PerfRunId};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use config::{File, FileFormat};
use serde_json::Value;
use tracing::debug;
use zopkio_metadata::ResultKind;

/// The name given to the master configuration.
pub const MASTER_CONFIG_NAME: &str = "master";

/// The name given to the only configuration when the configuration directory has no
/// subdirectories.
pub const SINGLE_EXECUTION_NAME: &str = "single execution";

/// One named set of key-value parameters under which the full test suite is executed once.
///
/// The mapping is immutable once loaded. The remaining fields are written by the execution engine
/// while the configuration runs, and cleared by [`reset`](Self::reset).
#[derive(Clone, Debug)]
pub struct Configuration {
    name: String,
    mapping: ConfigMap,

    /// The configuration's result.
    pub result: ResultKind,

    /// When the configuration started executing.
    pub start_time: Option<DateTime<FixedOffset>>,

    /// When the configuration finished executing.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Abort messages and suite setup or teardown traces.
    pub message: String,

    /// The performance capture started for this configuration, if any.
    pub perf_id: Option<PerfRunId>,
}

impl Configuration {
    /// Creates a new configuration with the given name and mapping.
    pub fn new(name: impl Into<String>, mapping: ConfigMap) -> Self {
        Self {
            name: name.into(),
            mapping,
            result: ResultKind::NotRun,
            start_time: None,
            end_time: None,
            message: String::new(),
            perf_id: None,
        }
    }

    /// Returns the name of this configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mapping of keys to values.
    pub fn mapping(&self) -> &ConfigMap {
        &self.mapping
    }

    /// Returns the value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mapping.get(key)
    }

    /// Returns the value for a key as a string, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.mapping.get(key).and_then(Value::as_str)
    }

    /// Clears all run-time state so the configuration can be run again.
    pub fn reset(&mut self) {
        self.result = ResultKind::NotRun;
        self.start_time = None;
        self.end_time = None;
        self.message.clear();
        self.perf_id = None;
    }
}

/// A master configuration plus one configuration per named variant.
#[derive(Clone, Debug)]
pub struct ConfigSet {
    master: Configuration,
    configs: Vec<Configuration>,
}

impl ConfigSet {
    /// Creates a new configuration set from already-built configurations.
    ///
    /// If `configs` is empty, a single empty configuration named `single execution` is used.
    pub fn new(master: Configuration, mut configs: Vec<Configuration>) -> Self {
        if configs.is_empty() {
            configs.push(Configuration::new(SINGLE_EXECUTION_NAME, ConfigMap::new()));
        }
        Self { master, configs }
    }

    /// Loads a configuration set from a directory.
    ///
    /// * A top-level file whose name contains `master` becomes the master configuration.
    /// * Other top-level files are merged, in sorted order, into the defaults for every variant.
    /// * Each subdirectory is a variant: the defaults, overridden by the subdirectory's files in
    ///   sorted order, overridden by `overrides`.
    /// * With no subdirectories, a single variant named `single execution` is produced.
    pub fn from_dir(dir: &Utf8Path, overrides: &ConfigMap) -> Result<Self, ConfigLoadError> {
        if !dir.is_dir() {
            return Err(ConfigLoadError::NotADirectory {
                path: dir.to_owned(),
            });
        }

        let (files, subdirs) = list_dir(dir)?;

        let mut master = None;
        let mut defaults = ConfigMap::new();
        for file in &files {
            let Some(mapping) = parse_config_file(file)? else {
                continue;
            };
            let stem = file.file_stem().unwrap_or_default();
            if stem.contains(MASTER_CONFIG_NAME) {
                debug!(path = %file, "loaded master configuration");
                master = Some(Configuration::new(MASTER_CONFIG_NAME, mapping));
            } else {
                defaults.extend(mapping);
            }
        }
        let master =
            master.unwrap_or_else(|| Configuration::new(MASTER_CONFIG_NAME, ConfigMap::new()));

        let mut configs = Vec::with_capacity(subdirs.len().max(1));
        if subdirs.is_empty() {
            let mut mapping = defaults;
            mapping.extend(overrides.clone());
            configs.push(Configuration::new(SINGLE_EXECUTION_NAME, mapping));
        } else {
            for subdir in &subdirs {
                let (subdir_files, _) = list_dir(subdir)?;
                let mut mapping = defaults.clone();
                for file in &subdir_files {
                    if let Some(file_mapping) = parse_config_file(file)? {
                        mapping.extend(file_mapping);
                    }
                }
                mapping.extend(overrides.clone());

                let name = subdir.file_name().unwrap_or(subdir.as_str());
                debug!(config = %name, keys = mapping.len(), "loaded configuration");
                configs.push(Configuration::new(name, mapping));
            }
        }

        Ok(Self { master, configs })
    }

    /// Returns the master configuration.
    pub fn master(&self) -> &Configuration {
        &self.master
    }

    /// Returns the configurations, in execution order.
    pub fn configs(&self) -> &[Configuration] {
        &self.configs
    }

    /// Returns the configurations mutably, in execution order.
    pub fn configs_mut(&mut self) -> &mut [Configuration] {
        &mut self.configs
    }

    /// Returns the number of configurations.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Always false: a configuration set has at least one configuration.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Resets the run-time state of every configuration.
    pub fn reset(&mut self) {
        for config in &mut self.configs {
            config.reset();
        }
    }
}

/// Lists a directory, returning sorted files and sorted subdirectories.
fn list_dir(dir: &Utf8Path) -> Result<(Vec<Utf8PathBuf>, Vec<Utf8PathBuf>), ConfigLoadError> {
    let read_dir_err = |err| ConfigLoadError::ReadDir {
        path: dir.to_owned(),
        err,
    };

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in dir.read_dir_utf8().map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        let path = entry.path().to_owned();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    subdirs.sort();
    Ok((files, subdirs))
}

/// Parses a configuration file based on its extension.
///
/// Returns `Ok(None)` for files that are not configuration files.
fn parse_config_file(path: &Utf8Path) -> Result<Option<ConfigMap>, ConfigLoadError> {
    let extension = path.extension().unwrap_or_default();
    if matches!(extension, "py" | "pyc") {
        debug!(path = %path, "ignored as configuration due to file extension");
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path).map_err(|err| ConfigLoadError::ReadFile {
        path: path.to_owned(),
        err,
    })?;

    let mapping = match extension {
        "json" => {
            let value: Value =
                serde_json::from_str(&contents).map_err(|err| ConfigLoadError::Json {
                    path: path.to_owned(),
                    err,
                })?;
            match value {
                Value::Object(object) => object.into_iter().collect(),
                _ => {
                    return Err(ConfigLoadError::JsonNotAnObject {
                        path: path.to_owned(),
                    });
                }
            }
        }
        "toml" => config::Config::builder()
            .add_source(File::from_str(&contents, FileFormat::Toml))
            .build()
            .and_then(|config| config.try_deserialize::<ConfigMap>())
            .map_err(|err| ConfigLoadError::Toml {
                path: path.to_owned(),
                err,
            })?,
        _ => parse_properties(path.as_str(), &contents)?,
    };
    Ok(Some(mapping))
}
