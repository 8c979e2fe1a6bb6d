// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use std::sync::Arc;
use zopkio_metadata::{ResultKind, RunSummary};
use zopkio_runner::{
    config::ConfigMap,
    reporter::{JunitReporter, ReportDir, ReportSink, SummaryReporter, generate_reports},
    test_list::TestModule,
};

#[test]
fn reports_cover_every_config() -> Result<()> {
    let module = TestModule::new("sample")
        .register("test_ok", |_| Ok(()))
        .register("test_broken", |_| Err("partition offline".into()));

    let log = CallLog::default();
    let mut configs = config_set(
        ConfigMap::new(),
        vec![("three_brokers", ConfigMap::new()), ("five_brokers", ConfigMap::new())],
    );
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log).fail_suite_setup_for("five_brokers")),
    )?;

    let report_dir = ReportDir::new(
        &output.ctx.reports_dir(),
        "kafka_suite",
        output.ctx.init_time(),
    );
    let mut sinks: Vec<Box<dyn ReportSink>> = vec![
        Box::new(JunitReporter::new(&report_dir)),
        Box::new(SummaryReporter::new(&report_dir)),
    ];
    generate_reports(&report_dir, &output.ctx.collector(), &mut sinks, true)?;

    let xml = std::fs::read_to_string(report_dir.path().join(JunitReporter::FILE_NAME))?;
    assert!(xml.contains(r#"<testsuite name="three_brokers""#), "{xml}");
    assert!(xml.contains(r#"<testsuite name="five_brokers""#), "{xml}");
    assert!(xml.contains("partition offline"), "{xml}");
    assert!(xml.contains("configuration skipped"), "{xml}");

    let json = std::fs::read_to_string(report_dir.path().join(SummaryReporter::FILE_NAME))?;
    let summary: RunSummary = serde_json::from_str(&json)?;
    assert_eq!(summary.report_name, report_dir.report_name());
    assert_eq!(summary.counts.passed, 1);
    assert_eq!(summary.counts.failed, 1);

    let three = &summary.configs["three_brokers"];
    assert_eq!(three.result, ResultKind::Failed);
    assert_eq!(three.tests["test_broken"].result, ResultKind::Failed);
    assert_eq!(summary.configs["five_brokers"].result, ResultKind::Skipped);
    assert!(summary.end_time.is_some());
    Ok(())
}
