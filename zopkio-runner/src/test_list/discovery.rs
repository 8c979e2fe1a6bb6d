// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Test, TestPhase};
use crate::{
    context::RunContext,
    errors::DiscoveryError,
    outcome::{UnitFn, UnitResult},
};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

/// A function registered with a [`TestModule`].
///
/// Whether the function is a test, a validator, or neither is decided by its name: names
/// containing `test` (case-insensitively) are tests, and names containing `validate` are paired
/// with the test whose name is the same with `validate` replaced by `test`.
#[derive(Clone, Debug)]
pub struct TestFunction {
    name: String,
    doc: Option<String>,
    phase: Option<TestPhase>,
    repeat_per_loop: u32,
    function: DebugIgnore<UnitFn>,
}

impl TestFunction {
    /// Creates a new function with the given name.
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&RunContext) -> UnitResult + Send + Sync + 'static,
    {
        let function: UnitFn = Arc::new(function);
        Self {
            name: name.into(),
            doc: None,
            phase: None,
            repeat_per_loop: 1,
            function: DebugIgnore(function),
        }
    }

    /// Sets the documentation used to build the test's description.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Overrides the module's phase for this test.
    pub fn phase(mut self, phase: u32) -> Self {
        self.phase = Some(TestPhase::Numbered(phase));
        self
    }

    /// Sets how many times the test body runs per lap of the suite. Defaults to 1.
    pub fn repeat_per_loop(mut self, repeat_per_loop: u32) -> Self {
        self.repeat_per_loop = repeat_per_loop;
        self
    }

    /// Returns the name of this function.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named collection of test and validation functions.
#[derive(Clone, Debug)]
pub struct TestModule {
    name: String,
    phase: TestPhase,
    functions: Vec<TestFunction>,
}

impl TestModule {
    /// Creates a new module whose tests run in the default phase.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: TestPhase::Default,
            functions: Vec::new(),
        }
    }

    /// Sets the phase for every test in this module.
    pub fn with_phase(mut self, phase: u32) -> Self {
        self.phase = TestPhase::Numbered(phase);
        self
    }

    /// Registers a function.
    pub fn function(mut self, function: TestFunction) -> Self {
        self.functions.push(function);
        self
    }

    /// Registers an undocumented function with the given name. Shorthand for
    /// `function(TestFunction::new(name, f))`.
    pub fn register<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RunContext) -> UnitResult + Send + Sync + 'static,
    {
        self.function(TestFunction::new(name, f))
    }

    /// Returns the name of this module.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Determines the tests in a single module, sorted by name.
pub(super) fn determine_tests(module: &TestModule) -> Result<Vec<Test>, DiscoveryError> {
    let mut seen = BTreeSet::new();
    for function in &module.functions {
        if !seen.insert(function.name.as_str()) {
            return Err(DiscoveryError::DuplicateFunction {
                module: module.name.clone(),
                function: function.name.clone(),
            });
        }
    }

    // Keyed by lowercased name, the way validators look tests up.
    let mut tests: IndexMap<String, &TestFunction> = IndexMap::new();
    for function in &module.functions {
        let lower = function.name.to_lowercase();
        if !lower.contains("test") {
            continue;
        }
        if function.repeat_per_loop == 0 {
            return Err(DiscoveryError::ZeroIterations {
                module: module.name.clone(),
                test: function.name.clone(),
            });
        }
        if tests.insert(lower, function).is_some() {
            return Err(DiscoveryError::DuplicateFunction {
                module: module.name.clone(),
                function: function.name.clone(),
            });
        }
    }

    let mut validators: IndexMap<&str, &TestFunction> = IndexMap::new();
    for function in &module.functions {
        let lower = function.name.to_lowercase();
        if !lower.contains("validate") {
            continue;
        }
        let test_name = lower.replace("validate", "test");
        match tests.get_key_value(&test_name) {
            Some((key, _)) => {
                validators.insert(key.as_str(), function);
            }
            None => {
                debug!(
                    module = %module.name,
                    validator = %function.name,
                    "ignoring validator without a matching test"
                );
            }
        }
    }

    let mut discovered: Vec<Test> = tests
        .iter()
        .map(|(key, function)| {
            let validator = validators.get(key.as_str()).copied();
            let description = match (&function.doc, validator.and_then(|v| v.doc.as_ref())) {
                (Some(test_doc), Some(validator_doc)) => Some(format!("{test_doc};\n{validator_doc}")),
                (Some(doc), None) | (None, Some(doc)) => Some(doc.clone()),
                (None, None) => None,
            };
            Test::new(
                function.name.clone(),
                description,
                function.phase.unwrap_or(module.phase),
                Arc::clone(&function.function.0),
                validator.map(|v| Arc::clone(&v.function.0)),
                function.repeat_per_loop,
            )
        })
        .collect();
    discovered.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(discovered)
}
