// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use indoc::indoc;
use pretty_assertions::assert_eq;
use zopkio::{ExpectedError, SuiteDefinition, ZopkioApp, exit_code_for};
use zopkio_metadata::ZopkioExitCode;
use zopkio_runner::{
    context::RunContext,
    outcome::UnitResult,
    test_list::TestModule,
};

fn write_config_dir(dir: &Utf8Path) -> Result<()> {
    std::fs::write(
        dir.join("master.json"),
        indoc! {r#"
            {
              "no_perf": true,
              "no-display": true,
              "should_fetch_logs": false
            }
        "#},
    )?;
    std::fs::write(
        dir.join("defaults.properties"),
        indoc! {"
            # read by test_values
            expected_partitions=3
        "},
    )?;
    Ok(())
}

fn sample_modules() -> Vec<TestModule> {
    vec![
        TestModule::new("sample")
            .register("test_values", |ctx: &RunContext| -> UnitResult {
                match ctx.active_config("partitions") {
                    Some(value) if value == "3" => Ok(()),
                    other => Err(format!("unexpected partitions {other:?}").into()),
                }
            })
            .register("test_always_fails", |_: &RunContext| -> UnitResult {
                Err("broker unreachable".into())
            }),
    ]
}

fn app(output_dir: &Utf8Path, extra: &[&str]) -> Result<ZopkioApp> {
    let mut args = vec!["zopkio", "--nopassword", "--user", "ci", "--color", "never", "-d"];
    args.push(output_dir.as_str());
    args.extend_from_slice(extra);
    Ok(ZopkioApp::try_parse_from(args)?)
}

#[test]
fn exec_runs_suite_and_writes_reports() -> Result<()> {
    let config_dir = Utf8TempDir::new()?;
    write_config_dir(config_dir.path())?;
    let output_dir = Utf8TempDir::new()?;

    let suite = sample_modules().into_iter().fold(
        SuiteDefinition::new("sample", config_dir.path()),
        SuiteDefinition::module,
    );
    let (passed, failed) = app(
        output_dir.path(),
        &["--config-overrides", "partitions=3"],
    )?
    .exec(suite)
    .map_err(|err| eyre!("exec failed: {err}"))?;

    assert_eq!((passed, failed), (1, 1));
    assert_eq!(exit_code_for(failed), ZopkioExitCode::TEST_RUN_FAILED);

    let log_file = output_dir.path().join("logs/zopkio_log/zopkio_log.log");
    assert!(log_file.is_file(), "{log_file} was created");

    let reports_dir = output_dir.path().join("reports");
    let report_dirs: Vec<_> = reports_dir.read_dir_utf8()?.collect::<Result<_, _>>()?;
    assert_eq!(report_dirs.len(), 1);
    let report_dir = report_dirs[0].path();
    assert!(report_dir.as_str().contains("sample_"), "{report_dir}");
    let junit = std::fs::read_to_string(report_dir.join("junit.xml"))?;
    assert!(junit.contains("test_always_fails"), "{junit}");
    assert!(junit.contains("broker unreachable"), "{junit}");
    assert!(report_dir.join("summary.json").is_file());
    Ok(())
}

#[test]
fn unknown_test_only_runs_nothing() -> Result<()> {
    let config_dir = Utf8TempDir::new()?;
    write_config_dir(config_dir.path())?;
    let output_dir = Utf8TempDir::new()?;

    let suite = sample_modules().into_iter().fold(
        SuiteDefinition::new("sample", config_dir.path()),
        SuiteDefinition::module,
    );
    let err = app(output_dir.path(), &["--test-only", "test_missing"])?
        .exec(suite)
        .expect_err("no tests match");
    assert!(matches!(err, ExpectedError::NoTestsRun), "{err:?}");
    assert_eq!(err.process_exit_code(), ZopkioExitCode::NO_TESTS_RUN);
    Ok(())
}

#[test]
fn missing_config_dir_is_a_config_error() -> Result<()> {
    let output_dir = Utf8TempDir::new()?;
    let suite = SuiteDefinition::new("sample", output_dir.path().join("does-not-exist"))
        .module(TestModule::new("sample").register("test_noop", |_: &RunContext| -> UnitResult {
            Ok(())
        }));
    let err = app(output_dir.path(), &[])?
        .exec(suite)
        .expect_err("config dir is missing");
    assert_eq!(err.process_exit_code(), ZopkioExitCode::CONFIG_LOAD_FAILED);
    Ok(())
}
