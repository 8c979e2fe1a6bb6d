// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovering tests and sequencing them into units of execution.

mod descriptor;
mod discovery;

pub use descriptor::*;
pub use discovery::{TestFunction, TestModule};

use crate::{errors::DiscoveryError, helpers::plural};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A unit of execution: either a single test, or a group of tests that share a numbered phase and
/// run concurrently.
///
/// A unit gets exactly one `setup()` and one `teardown()` call.
#[derive(Clone, Debug)]
pub struct TestUnit {
    phase: TestPhase,
    tests: Vec<Test>,
}

impl TestUnit {
    /// Returns the phase of this unit.
    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    /// Returns the tests in this unit.
    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    /// Returns the tests in this unit mutably.
    pub fn tests_mut(&mut self) -> &mut [Test] {
        &mut self.tests
    }

    /// Returns true if this unit runs more than one test concurrently.
    pub fn is_group(&self) -> bool {
        self.tests.len() > 1
    }
}

/// The ordered list of tests to run for every configuration.
///
/// Default-phase tests come first, one unit per test, in discovery order. Each numbered phase
/// follows as a single unit, in ascending phase order.
#[derive(Clone, Debug, Default)]
pub struct TestList {
    units: Vec<TestUnit>,
}

impl TestList {
    /// Discovers tests from `modules`.
    ///
    /// Within a module, tests are sorted by name. Modules contribute tests in the order given. If
    /// two modules define a test with the same name, the first one wins.
    ///
    /// If `tests_to_run` is provided, only tests whose names appear in it are kept.
    pub fn discover(
        modules: &[TestModule],
        tests_to_run: Option<&[String]>,
    ) -> Result<Self, DiscoveryError> {
        let mut tests: IndexMap<String, Test> = IndexMap::new();
        for module in modules {
            for test in discovery::determine_tests(module)? {
                if tests.contains_key(test.name()) {
                    debug!(
                        module = %module.name(),
                        test = %test.name(),
                        "test already discovered in an earlier module, ignoring"
                    );
                    continue;
                }
                tests.insert(test.name().to_owned(), test);
            }
        }

        if let Some(tests_to_run) = tests_to_run {
            let wanted: IndexSet<&str> = tests_to_run.iter().map(String::as_str).collect();
            for name in &wanted {
                if !tests.contains_key(*name) {
                    warn!(test = %name, "requested test was not found in any test module");
                }
            }
            tests.retain(|name, _| wanted.contains(name.as_str()));
        }

        let list = Self::from_tests(tests.into_values());
        debug!(
            "discovered {} {} in {} {}",
            list.test_count(),
            plural::tests_str(list.test_count()),
            list.units.len(),
            if list.units.len() == 1 { "unit" } else { "units" },
        );
        Ok(list)
    }

    /// Sequences already-built tests into units.
    pub fn from_tests(tests: impl IntoIterator<Item = Test>) -> Self {
        let mut serial = Vec::new();
        let mut phases: BTreeMap<u32, Vec<Test>> = BTreeMap::new();
        for test in tests {
            match test.phase() {
                TestPhase::Default => serial.push(test),
                TestPhase::Numbered(n) => phases.entry(n).or_default().push(test),
            }
        }

        let units = serial
            .into_iter()
            .map(|test| TestUnit {
                phase: TestPhase::Default,
                tests: vec![test],
            })
            .chain(phases.into_iter().map(|(n, tests)| TestUnit {
                phase: TestPhase::Numbered(n),
                tests,
            }))
            .collect();
        Self { units }
    }

    /// Returns the units, in execution order.
    pub fn units(&self) -> &[TestUnit] {
        &self.units
    }

    pub(crate) fn units_mut(&mut self) -> &mut [TestUnit] {
        &mut self.units
    }

    /// Iterates over every test, in execution order.
    pub fn iter_tests(&self) -> impl Iterator<Item = &Test> + '_ {
        self.units.iter().flat_map(|unit| unit.tests.iter())
    }

    /// Iterates mutably over every test, in execution order.
    pub fn iter_tests_mut(&mut self) -> impl Iterator<Item = &mut Test> + '_ {
        self.units.iter_mut().flat_map(|unit| unit.tests.iter_mut())
    }

    /// Returns the test with the given name.
    pub fn get(&self, name: &str) -> Option<&Test> {
        self.iter_tests().find(|test| test.name() == name)
    }

    /// Returns the total number of tests.
    pub fn test_count(&self) -> usize {
        self.units.iter().map(|unit| unit.tests.len()).sum()
    }

    /// Returns true if there are no tests.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns the size of the largest concurrent group.
    pub fn largest_group(&self) -> usize {
        self.units
            .iter()
            .map(|unit| unit.tests.len())
            .max()
            .unwrap_or(0)
    }

    /// Resets every test to its initial state.
    pub fn reset(&mut self) {
        for test in self.iter_tests_mut() {
            test.reset();
        }
    }
}
