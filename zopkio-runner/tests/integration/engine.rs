// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::json;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use zopkio_metadata::ResultKind;
use zopkio_runner::{
    config::{ConfigMap, ConfigSet, SINGLE_EXECUTION_NAME},
    context::RunContext,
    log_source::StaticLogSource,
    outcome::{SkipReason, UnitKind, UnitResult},
    runner::{RunEvent, TestRunnerBuilder},
    test_list::{TestFunction, TestList, TestModule},
};

fn single_config() -> ConfigSet {
    config_set(ConfigMap::new(), vec![])
}

#[test]
fn passing_test_is_validated_after_the_run() -> Result<()> {
    let log = CallLog::default();
    let (body_log, validate_log) = (log.clone(), log.clone());
    let module = TestModule::new("sample")
        .register("test_basic", move |_| {
            body_log.record("body");
            Ok(())
        })
        .register("validate_basic", move |_| {
            validate_log.record("validate");
            Ok(())
        });

    let mut configs = single_config();
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(
        log.calls(),
        vec![
            "setup_suite:single execution",
            "setup",
            "body",
            "teardown",
            "validate",
            "teardown_suite:single execution",
        ],
        "validation runs after every test, before suite teardown"
    );

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_basic");
    assert_eq!(test.result, ResultKind::Passed);
    assert!(!test.validated_inline);
    assert!(test.start_time <= test.func_start_time);
    assert!(test.func_end_time <= test.end_time);

    let config = output.collected_config(SINGLE_EXECUTION_NAME);
    assert_eq!(config.result, ResultKind::Passed);
    assert!(config.message.is_empty(), "{}", config.message);

    assert!(output.stats.is_success());
    assert_eq!(output.stats.passed, 1);
    assert_eq!(output.stats.configs_run, 1);
    Ok(())
}

#[test]
fn failing_body_skips_validation() -> Result<()> {
    let log = CallLog::default();
    let validate_log = log.clone();
    let module = TestModule::new("sample")
        .register("test_broken", |_| Err("expected 100 messages, got 99".into()))
        .register("validate_broken", move |_| {
            validate_log.record("validate");
            Ok(())
        });

    let mut configs = single_config();
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(log.count("validate"), 0, "validator never called");

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_broken");
    assert_eq!(test.result, ResultKind::Failed);
    let err = test.exception.as_ref().expect("failure was captured");
    assert_eq!(err.kind(), UnitKind::Body);
    assert_eq!(err.message(), "expected 100 messages, got 99");
    assert!(!err.is_panic());

    let live = output.test_list.get("test_broken").expect("test was discovered");
    assert_eq!(live.exception, test.exception, "collected copy matches the live test");

    assert_eq!(
        output.collected_config(SINGLE_EXECUTION_NAME).result,
        ResultKind::Failed
    );
    assert!(!output.stats.is_success());
    assert_eq!(output.stats.failed, 1);
    Ok(())
}

#[test]
fn panicking_validation_fails_the_test() -> Result<()> {
    let module = TestModule::new("sample")
        .register("test_logs", |_| Ok(()))
        .register("validate_logs", |_| panic!("found ERROR in broker log"));

    let log = CallLog::default();
    let mut configs = single_config();
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_logs");
    assert_eq!(test.result, ResultKind::Failed);
    let err = test.exception.as_ref().expect("failure was captured");
    assert_eq!(err.kind(), UnitKind::Validation);
    assert!(err.is_panic());
    assert_eq!(err.message(), "found ERROR in broker log");
    Ok(())
}

#[test]
fn suite_setup_failure_aborts_later_configs() -> Result<()> {
    let log = CallLog::default();
    let body_log = log.clone();
    let module = TestModule::new("sample").register("test_basic", move |_| {
        body_log.record("body");
        Ok(())
    });

    let mut configs = config_set(
        mapping([("max_suite_failures_before_abort", json!(0))]),
        vec![("first", ConfigMap::new()), ("second", ConfigMap::new())],
    );
    let deployment = RecordingDeployment::new(&log).fail_suite_setup_for("first");
    let output = run_suite(&[module], &mut configs, Arc::new(deployment))?;

    assert_eq!(
        log.calls(),
        vec!["setup_suite:first", "teardown_suite:first"],
        "second configuration never reaches setup_suite"
    );

    let first = output.collected_config("first");
    assert_eq!(first.result, ResultKind::Skipped);
    assert!(
        first
            .message
            .starts_with(SkipReason::SuiteSetupFailed.message()),
        "{}",
        first.message
    );
    assert!(first.message.contains("cannot provision first"), "{}", first.message);

    let second = output.collected_config("second");
    assert_eq!(second.result, ResultKind::Skipped);
    assert_eq!(second.message, SkipReason::ConfigAbort.message());
    assert_eq!(second.start_time, None);

    let skipped: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match event {
            RunEvent::ConfigSkipped {
                config_name,
                reason,
                ..
            } => Some((config_name.as_str(), *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        skipped,
        vec![
            ("first", SkipReason::SuiteSetupFailed),
            ("second", SkipReason::ConfigAbort)
        ]
    );

    assert_eq!(output.stats.configs_run, 1);
    assert_eq!(output.stats.configs_skipped, 1);
    assert!(output.stats.is_success(), "nothing failed, everything skipped");
    Ok(())
}

#[test]
fn setup_failures_abort_remaining_tests() -> Result<()> {
    let log = CallLog::default();
    let module = TestModule::new("sample")
        .register("test_a", |_| Ok(()))
        .register("test_b", |_| Ok(()));

    let mut configs = config_set(
        ConfigMap::new(),
        vec![(
            "variant",
            mapping([("max_failures_per_suite_before_abort", json!(0))]),
        )],
    );
    let deployment = RecordingDeployment::new(&log).fail_setup();
    let output = run_suite(&[module], &mut configs, Arc::new(deployment))?;

    assert_eq!(
        log.calls(),
        vec![
            "setup_suite:variant",
            "setup",
            "teardown",
            "teardown_suite:variant"
        ]
    );

    let first = output.collected("variant", "test_a");
    assert_eq!(first.result, ResultKind::Skipped);
    assert!(
        first.message.starts_with(SkipReason::SetupFailed.message()),
        "{}",
        first.message
    );
    assert!(first.message.contains("broker did not come up"));
    assert_eq!(first.current_iteration, 0, "body never ran");

    let second = output.collected("variant", "test_b");
    assert_eq!(second.result, ResultKind::Skipped);
    assert_eq!(second.message, SkipReason::TestAbort.message());

    assert_eq!(output.collected_config("variant").result, ResultKind::Passed);
    assert_eq!(output.stats.skipped, 2);
    Ok(())
}

#[test]
fn teardown_failure_is_recorded_on_passing_test() -> Result<()> {
    let log = CallLog::default();
    let module = TestModule::new("sample").register("test_basic", |_| Ok(()));

    let mut configs = single_config();
    let deployment = RecordingDeployment::new(&log).fail_teardown();
    let output = run_suite(&[module], &mut configs, Arc::new(deployment))?;

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_basic");
    assert_eq!(test.result, ResultKind::Passed);
    assert!(
        test.message
            .starts_with(&UnitKind::Teardown.failure_header()),
        "{}",
        test.message
    );
    assert!(test.message.contains("broker refused to stop"));
    Ok(())
}

#[test]
fn failed_validation_keeps_teardown_trace() -> Result<()> {
    let log = CallLog::default();
    let module = TestModule::new("sample")
        .register("test_basic", |_| Ok(()))
        .register("validate_basic", |_| Err("bad side effect".into()));

    let mut configs = single_config();
    let deployment = RecordingDeployment::new(&log).fail_teardown();
    let output = run_suite(&[module], &mut configs, Arc::new(deployment))?;

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_basic");
    assert_eq!(test.result, ResultKind::Failed);
    assert_eq!(
        test.exception.as_ref().map(|err| err.kind()),
        Some(UnitKind::Validation)
    );
    assert!(
        test.message
            .starts_with(&UnitKind::Teardown.failure_header()),
        "{}",
        test.message
    );
    assert!(test.message.contains("broker refused to stop"), "{}", test.message);
    assert!(test.message.contains("bad side effect"), "{}", test.message);
    Ok(())
}

#[test]
fn validators_see_analysis_metrics() -> Result<()> {
    let log = CallLog::default();
    let validate_log = log.clone();
    let module = TestModule::new("sample")
        .register("test_latency", |_| Ok(()))
        .register("validate_latency", move |ctx| {
            let metrics = ctx
                .active_test_metrics("test_latency")
                .ok_or("no metrics for test_latency")?;
            validate_log.record(format!("metrics={metrics}"));
            Ok(())
        });

    let mut configs = config_set(
        ConfigMap::new(),
        vec![("first", ConfigMap::new()), ("second", ConfigMap::new())],
    );
    let output = run_suite_with(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
        |_, builder| {
            builder.set_perf_analyzer(Arc::new(StatsPerfAnalyzer::default()));
        },
    )?;

    // Each configuration captures once for itself and once for the test.
    let seen: Vec<_> = log
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("metrics="))
        .collect();
    assert_eq!(
        seen,
        vec![
            r#"metrics={"capture":"capture-1"}"#,
            r#"metrics={"capture":"capture-3"}"#,
        ],
        "each configuration's validator sees its own statistics"
    );

    for config_name in ["first", "second"] {
        let test = output.collected(config_name, "test_latency");
        assert_eq!(test.result, ResultKind::Passed, "{config_name}");
        assert!(test.perf.stats.is_some(), "{config_name}");
    }
    Ok(())
}

fn kafka_deployer(
    log: &CallLog,
    unique_ids: &'static [&'static str],
) -> impl FnOnce(&RunContext) {
    let log = log.clone();
    move |ctx: &RunContext| {
        ctx.deployers().set(
            "kafka",
            Arc::new(RecordingDeployer::new(&log, "kafka", unique_ids)),
        );
    }
}

#[test]
fn logs_are_fetched_before_processes_are_killed() -> Result<()> {
    let log = CallLog::default();
    let body_log = log.clone();
    let module = TestModule::new("sample").register("test_basic", move |_| {
        body_log.record("body");
        Ok(())
    });

    let log_source = StaticLogSource::new()
        .with_process_logs("kafka", ["/var/log/kafka/server.log"])
        .with_machine_logs("kafka-1", ["/var/log/syslog"])
        .with_naarad_logs("kafka-1", ["/var/log/kafka/gc.log"])
        .with_log_pattern("kafka-1", Regex::new(r"^.*\.out$")?);
    let register = kafka_deployer(&log, &["kafka-1", "kafka-2"]);

    let mut configs = single_config();
    run_suite_with(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
        |ctx, builder| {
            register(ctx);
            builder.set_log_source(Arc::new(log_source));
        },
    )?;

    assert_eq!(
        log.calls(),
        vec![
            "setup_suite:single execution",
            "setup",
            "body",
            "teardown",
            r"fetch_logs:kafka-1:/var/log/syslog,/var/log/kafka/gc.log,/var/log/kafka/server.log:^.*\.out$",
            "fetch_logs:kafka-2:/var/log/kafka/server.log:^$",
            "teardown_suite:single execution",
            "kill_all_process",
        ],
        "logs are fetched once per process, and processes are killed after suite teardown"
    );
    Ok(())
}

#[test]
fn log_fetching_can_be_disabled() -> Result<()> {
    let log = CallLog::default();
    let module = TestModule::new("sample")
        .register("test_basic", |_| Ok(()))
        .register("validate_basic", |_| Ok(()));
    let register = kafka_deployer(&log, &["kafka-1"]);

    let mut configs = config_set(mapping([("should_fetch_logs", json!(false))]), vec![]);
    run_suite_with(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
        |ctx, _| register(ctx),
    )?;

    let fetches = log
        .calls()
        .iter()
        .filter(|call| call.starts_with("fetch_logs:"))
        .count();
    assert_eq!(fetches, 0, "{:?}", log.calls());
    assert_eq!(log.count("kill_all_process"), 1);
    Ok(())
}

#[test]
fn verify_after_each_test_validates_inline() -> Result<()> {
    let log = CallLog::default();
    let (body_log, validate_log) = (log.clone(), log.clone());
    let module = TestModule::new("sample")
        .register("test_basic", move |_| {
            body_log.record("body");
            Ok(())
        })
        .register("validate_basic", move |_| {
            validate_log.record("validate");
            Ok(())
        });
    let register = kafka_deployer(&log, &["kafka-1"]);

    let mut configs = config_set(mapping([("verify_after_each_test", json!(true))]), vec![]);
    let output = run_suite_with(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
        |ctx, _| register(ctx),
    )?;

    assert_eq!(
        log.calls(),
        vec![
            "setup_suite:single execution",
            "setup",
            "body",
            "fetch_logs:kafka-1::^$",
            "validate",
            "teardown",
            "fetch_logs:kafka-1::^$",
            "teardown_suite:single execution",
            "kill_all_process",
        ],
        "validation runs right after the body, and not again after the run"
    );

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_basic");
    assert_eq!(test.result, ResultKind::Passed);
    assert_eq!(test.total_number_iterations, 1);
    assert!(test.validated_inline);
    Ok(())
}

#[test]
fn phase_groups_run_concurrently() -> Result<()> {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let concurrent_body = {
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        move |_: &RunContext| -> UnitResult {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    };

    let producers = TestModule::new("producers")
        .with_phase(1)
        .register("test_produce_a", concurrent_body.clone())
        .register("test_produce_b", concurrent_body);
    let consumers = TestModule::new("consumers")
        .with_phase(2)
        .register("test_consume", |_| Ok(()));
    let serial = TestModule::new("serial").register("test_serial", |_| Ok(()));

    let log = CallLog::default();
    let mut configs = single_config();
    let output = run_suite(
        &[consumers, producers, serial],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(log.count("setup"), 3, "one setup per unit");
    assert_eq!(log.count("teardown"), 3, "one teardown per unit");

    let started: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match event {
            RunEvent::TestStarted { test_name, .. } => Some(test_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![
            "test_serial",
            "test_produce_a",
            "test_produce_b",
            "test_consume"
        ],
        "default phase first, then numbered phases in order"
    );

    let consume = output.collected(SINGLE_EXECUTION_NAME, "test_consume");
    for name in ["test_produce_a", "test_produce_b"] {
        let produce = output.collected(SINGLE_EXECUTION_NAME, name);
        assert_eq!(produce.result, ResultKind::Passed);
        assert!(
            produce.func_end_time <= consume.func_start_time,
            "phase 2 starts after phase 1 finishes"
        );
    }
    Ok(())
}

#[test]
fn repeated_test_validates_every_iteration() -> Result<()> {
    let log = CallLog::default();
    let (body_log, validate_log) = (log.clone(), log.clone());
    let module = TestModule::new("sample")
        .function(
            TestFunction::new("test_repeated", move |_| {
                body_log.record("body");
                Ok(())
            })
            .repeat_per_loop(3),
        )
        .register("validate_repeated", move |_| {
            validate_log.record("validate");
            Ok(())
        });

    let mut configs = single_config();
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(log.count("body"), 3);
    assert_eq!(log.count("validate"), 3, "validated inline after each iteration");

    let test = output.collected(SINGLE_EXECUTION_NAME, "test_repeated");
    assert_eq!(test.current_iteration, 3);
    assert_eq!(
        test.iteration_results,
        btreemap! {
            1 => ResultKind::Passed,
            2 => ResultKind::Passed,
            3 => ResultKind::Passed,
        }
    );
    assert_eq!(test.result, test.iteration_results[&3]);
    assert!(test.validated_inline);

    let iterations = output
        .events
        .iter()
        .filter(|event| matches!(event, RunEvent::IterationFinished { total: 3, .. }))
        .count();
    assert_eq!(iterations, 3);
    Ok(())
}

/// Returns a test body that fails on its `failing_call`th call, counting from 1.
fn fail_on_call(
    log: &CallLog,
    failing_call: usize,
) -> impl Fn(&RunContext) -> UnitResult + Send + Sync + 'static {
    let log = log.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    move |_| {
        log.record("body");
        if calls.fetch_add(1, Ordering::SeqCst) + 1 == failing_call {
            return Err("lost leadership".into());
        }
        Ok(())
    }
}

#[test]
fn failed_iteration_stops_the_test() -> Result<()> {
    let log = CallLog::default();
    let module = TestModule::new("sample")
        .function(TestFunction::new("test_flaky", fail_on_call(&log, 2)).repeat_per_loop(3));

    let mut configs = single_config();
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(log.count("body"), 2);
    let test = output.collected(SINGLE_EXECUTION_NAME, "test_flaky");
    assert_eq!(
        test.iteration_results,
        btreemap! {
            1 => ResultKind::Passed,
            2 => ResultKind::Failed,
            3 => ResultKind::Skipped,
        }
    );
    assert_eq!(test.result, ResultKind::Failed);
    Ok(())
}

#[test]
fn consecutive_failures_allow_retries() -> Result<()> {
    let log = CallLog::default();
    let module = TestModule::new("sample")
        .function(TestFunction::new("test_flaky", fail_on_call(&log, 2)).repeat_per_loop(3));

    let mut configs = config_set(
        ConfigMap::new(),
        vec![(
            "retrying",
            mapping([("consecutive_failures_per_test", json!(2))]),
        )],
    );
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(log.count("body"), 3);
    let test = output.collected("retrying", "test_flaky");
    assert_eq!(test.iteration_results[&2], ResultKind::Failed);
    assert_eq!(test.iteration_results[&3], ResultKind::Passed);
    assert_eq!(test.result, ResultKind::Passed, "the last iteration decides");
    assert_eq!(test.consecutive_failures, 0);
    Ok(())
}

#[test]
fn loop_all_tests_repeats_every_unit() -> Result<()> {
    let log = CallLog::default();
    let body_log = log.clone();
    let module = TestModule::new("sample").function(
        TestFunction::new("test_looped", move |_| {
            body_log.record("body");
            Ok(())
        })
        .repeat_per_loop(2),
    );

    let mut configs = config_set(
        ConfigMap::new(),
        vec![("looped", mapping([("loop_all_tests", json!(2))]))],
    );
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(log.count("body"), 4);
    assert_eq!(log.count("setup"), 2, "one setup per lap");

    let test = output.collected("looped", "test_looped");
    assert_eq!(test.total_number_iterations, 4);
    assert_eq!(test.current_iteration, 4);
    assert!(
        test.iteration_results
            .values()
            .all(|result| *result == ResultKind::Passed)
    );
    Ok(())
}

#[test]
fn configs_see_their_own_values() -> Result<()> {
    let log = CallLog::default();
    let body_log = log.clone();
    let module = TestModule::new("sample").register("test_acks", move |ctx| {
        let acks = ctx.active_config_or("acks", json!("unset"));
        body_log.record(format!("acks={}", acks.as_str().unwrap_or("?")));
        Ok(())
    });

    let mut configs = config_set(
        ConfigMap::new(),
        vec![
            ("acks_all", mapping([("acks", json!("all"))])),
            ("acks_default", ConfigMap::new()),
        ],
    );
    let output = run_suite(
        &[module],
        &mut configs,
        Arc::new(RecordingDeployment::new(&log)),
    )?;

    assert_eq!(log.count("acks=all"), 1);
    assert_eq!(log.count("acks=unset"), 1);
    assert_eq!(output.ctx.collector().len(), 2);
    assert_eq!(output.stats.passed, 2);
    Ok(())
}

#[test]
fn callback_errors_are_returned() -> Result<()> {
    let output_dir = Utf8TempDir::new()?;
    let ctx = RunContext::new(output_dir.path());
    let module = TestModule::new("sample").register("test_basic", |_| Ok(()));
    let mut test_list = TestList::discover(&[module], None)?;
    let mut configs = config_set(
        ConfigMap::new(),
        vec![("first", ConfigMap::new()), ("second", ConfigMap::new())],
    );

    let mut runner = TestRunnerBuilder::new().build(&ctx, &mut test_list, &mut configs)?;
    let err = runner
        .try_execute(|event| match event {
            RunEvent::ConfigFinished { config_name, .. } if config_name == "first" => {
                Err("reporter went away")
            }
            _ => Ok(()),
        })
        .unwrap_err();
    assert_eq!(err, "reporter went away");
    drop(runner);

    // The run still completes, and both configurations are collected.
    assert_eq!(ctx.collector().len(), 2);
    Ok(())
}
