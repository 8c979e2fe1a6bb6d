// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from collected results.

use super::{ReportDir, ReportSink};
use crate::{
    collector::{ConfigResults, ResultsCollector},
    errors::ReportError,
    stopwatch::elapsed_between,
    test_list::Test,
};
use camino::{Utf8Path, Utf8PathBuf};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::fs::File;
use zopkio_metadata::ResultKind;

/// Writes one `<testsuite>` per configuration to `junit.xml` in the report directory.
#[derive(Clone, Debug)]
pub struct JunitReporter {
    report_name: String,
    path: Utf8PathBuf,
    written: bool,
}

impl JunitReporter {
    /// The file name written in the report directory.
    pub const FILE_NAME: &'static str = "junit.xml";

    /// Creates a reporter writing into `report_dir`.
    pub fn new(report_dir: &ReportDir) -> Self {
        Self {
            report_name: report_dir.report_name().to_owned(),
            path: report_dir.path().join(Self::FILE_NAME),
            written: false,
        }
    }

    fn build_report(&self, collector: &ResultsCollector) -> Report {
        let mut report = Report::new(self.report_name.as_str());
        report.set_timestamp(collector.summary_start_time());
        if let Some(end_time) = collector.summary_end_time() {
            report.set_time(elapsed_between(
                Some(collector.summary_start_time()),
                Some(end_time),
            ));
        }
        report.add_test_suites(collector.iter().map(testsuite_for_config));
        report
    }
}

impl ReportSink for JunitReporter {
    fn generate(&mut self, collector: &ResultsCollector) -> Result<(), ReportError> {
        let report = self.build_report(collector);

        let f = File::create(&self.path).map_err(|err| ReportError::Fs {
            path: self.path.clone(),
            err,
        })?;
        report.serialize(f).map_err(|err| ReportError::Junit {
            path: self.path.clone(),
            err,
        })?;

        self.written = true;
        Ok(())
    }

    fn report_location(&self) -> Option<&Utf8Path> {
        self.written.then_some(self.path.as_path())
    }
}

fn testsuite_for_config(results: &ConfigResults) -> TestSuite {
    let config = results.config();
    let mut testsuite = TestSuite::new(config.name());
    if let Some(start_time) = config.start_time {
        testsuite.set_timestamp(start_time);
    }
    testsuite
        .set_time(elapsed_between(config.start_time, config.end_time))
        .add_property(("result", config.result.as_str()));
    if !config.message.is_empty() {
        testsuite.set_system_err(config.message.as_str());
    }

    for test in results.tests().values() {
        testsuite.add_test_case(testcase_for_test(config.name(), test));
    }

    // Configurations skipped before they ran keep only the names of their tests.
    for test_name in results.skipped_tests() {
        let mut status = TestCaseStatus::skipped();
        status.set_message("configuration skipped");
        let mut testcase = TestCase::new(test_name.as_str(), status);
        testcase.set_classname(config.name());
        testsuite.add_test_case(testcase);
    }

    testsuite
}

fn testcase_for_test(config_name: &str, test: &Test) -> TestCase {
    let status = match test.result {
        ResultKind::Passed => TestCaseStatus::success(),
        ResultKind::Failed => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            if let Some(err) = &test.exception {
                status
                    .set_message(err.message())
                    .set_type(err.kind().callable_name())
                    .set_description(err.trace());
            }
            status
        }
        ResultKind::Skipped | ResultKind::NotRun => {
            let mut status = TestCaseStatus::skipped();
            if !test.message.is_empty() {
                status.set_message(test.message.trim_end());
            }
            status
        }
    };

    let mut testcase = TestCase::new(test.name(), status);
    testcase
        .set_classname(config_name)
        .set_time(elapsed_between(test.start_time, test.end_time));
    if let Some(start_time) = test.start_time {
        testcase.set_timestamp(start_time);
    }
    // Teardown traces on passing tests would otherwise be lost.
    if test.result == ResultKind::Passed && !test.message.is_empty() {
        testcase.set_system_err(test.message.as_str());
    }
    testcase
}
