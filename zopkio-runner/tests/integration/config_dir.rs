// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use zopkio_metadata::ResultKind;
use zopkio_runner::{
    config::{AbortThreshold, ConfigSet, parse_overrides},
    context::RunContext,
    errors::DisplayErrorChain,
    runner::TestRunnerBuilder,
    test_list::{TestList, TestModule},
};

fn write(dir: &Utf8Path, rel: &str, contents: &str) -> Result<()> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Lays out a master file, shared defaults, and two variants.
fn kafka_config_dir() -> Result<Utf8TempDir> {
    let dir = Utf8TempDir::new()?;
    write(
        dir.path(),
        "master.json",
        indoc! {r#"
            {
                "max_suite_failures_before_abort": "never",
                "no_perf": true,
                "should_fetch_logs": false
            }
        "#},
    )?;
    write(
        dir.path(),
        "defaults.properties",
        indoc! {"
            # shared by every variant
            num_messages=100
            acks=1
        "},
    )?;
    write(
        dir.path(),
        "acks_all/config.json",
        indoc! {r#"
            { "acks": "all", "loop_all_tests": 2 }
        "#},
    )?;
    write(
        dir.path(),
        "compressed/config.toml",
        indoc! {r#"
            compression = "lz4"
        "#},
    )?;
    Ok(dir)
}

#[test]
fn variants_run_in_directory_order() -> Result<()> {
    let dir = kafka_config_dir()?;
    let overrides = parse_overrides(["num_messages=500"])?;
    let mut configs = ConfigSet::from_dir(dir.path(), &overrides)?;

    let names: Vec<_> = configs.configs().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["acks_all", "compressed"]);

    let log = CallLog::default();
    let body_log = log.clone();
    let module = TestModule::new("sample").register("test_produce", move |ctx| {
        let get = |key: &str| {
            ctx.active_config(key)
                .and_then(|value| value.as_str().map(str::to_owned))
                .unwrap_or_else(|| "-".to_owned())
        };
        body_log.record(format!(
            "{} acks={} messages={} compression={}",
            ctx.active_config_name().unwrap_or_default(),
            get("acks"),
            get("num_messages"),
            get("compression"),
        ));
        Ok(())
    });

    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    let bodies: Vec<_> = log
        .calls()
        .into_iter()
        .filter(|call| !call.contains("setup") && !call.contains("teardown"))
        .collect();
    assert_eq!(
        bodies,
        vec![
            "acks_all acks=all messages=500 compression=-",
            "acks_all acks=all messages=500 compression=-",
            "compressed acks=1 messages=500 compression=lz4",
        ],
        "loop_all_tests only applies to the variant that sets it"
    );

    assert_eq!(output.stats.passed, 2);
    assert_eq!(
        output.collected_config("compressed").result,
        ResultKind::Passed
    );
    Ok(())
}

#[test]
fn engine_options_come_from_master() -> Result<()> {
    let dir = kafka_config_dir()?;
    let mut configs = ConfigSet::from_dir(dir.path(), &Default::default())?;
    let mut test_list = TestList::discover(&[], None)?;

    let output_dir = Utf8TempDir::new()?;
    let ctx = RunContext::new(output_dir.path());
    let runner = TestRunnerBuilder::new().build(&ctx, &mut test_list, &mut configs)?;

    let options = runner.engine_options();
    assert_eq!(options.max_suite_failures_before_abort, AbortThreshold::Never);
    assert!(options.no_perf);
    assert!(!options.should_fetch_logs);
    Ok(())
}

#[test]
fn invalid_option_fails_the_build() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    write(dir.path(), "variant/config.json", r#"{ "loop_all_tests": 0 }"#)?;
    let mut configs = ConfigSet::from_dir(dir.path(), &Default::default())?;
    let mut test_list = TestList::discover(&[], None)?;

    let ctx = RunContext::new(dir.path());
    let err = TestRunnerBuilder::new()
        .build(&ctx, &mut test_list, &mut configs)
        .err()
        .expect("loop_all_tests must be positive");
    let chain = DisplayErrorChain::new(&err).to_string();
    assert!(chain.contains("loop_all_tests"), "{chain}");
    Ok(())
}
