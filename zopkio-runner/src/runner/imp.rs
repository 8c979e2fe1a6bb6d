// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    RunEvent, RunStats,
    executor::Callback,
    logs::{LogDirs, fetch_all_logs, kill_all_processes},
};
use crate::{
    config::{ConfigOptions, ConfigSet, Configuration, EngineOptions},
    context::RunContext,
    deployer::{Deployment, DeploymentHooks},
    errors::{DisplayErrorChain, RunnerBuildError},
    failure_handler::FailureHandler,
    helpers::{display_duration, plural},
    log_source::{LogSource, StaticLogSource},
    outcome::{Outcome, SkipReason, UnitKind, run_unit},
    perf::{NoopPerfAnalyzer, PerfAnalyzer, PerfRunId},
    stopwatch::{elapsed_between, now, stopwatch},
    test_list::TestList,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{convert::Infallible, sync::Arc};
use swrite::{SWrite, swrite};
use tracing::{debug, error, info, warn};
use zopkio_metadata::ResultKind;

/// Test runner options.
#[derive(Clone, Default)]
pub struct TestRunnerBuilder {
    deployment: Option<Arc<dyn Deployment>>,
    log_source: Option<Arc<dyn LogSource>>,
    perf: Option<Arc<dyn PerfAnalyzer>>,
}

impl TestRunnerBuilder {
    /// Creates a new builder with no deployment hooks, no logs and no performance analysis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the suite's deployment hooks.
    pub fn set_deployment(&mut self, deployment: Arc<dyn Deployment>) -> &mut Self {
        self.deployment = Some(deployment);
        self
    }

    /// Sets where the suite's logs come from.
    pub fn set_log_source(&mut self, log_source: Arc<dyn LogSource>) -> &mut Self {
        self.log_source = Some(log_source);
        self
    }

    /// Sets the performance analyzer.
    pub fn set_perf_analyzer(&mut self, perf: Arc<dyn PerfAnalyzer>) -> &mut Self {
        self.perf = Some(perf);
        self
    }

    /// Creates a new test runner.
    ///
    /// Engine options are read from the master configuration, and per-configuration options from
    /// each configuration, so that invalid values are reported before anything runs.
    pub fn build<'a>(
        self,
        ctx: &'a RunContext,
        test_list: &'a mut TestList,
        config_set: &'a mut ConfigSet,
    ) -> Result<TestRunner<'a>, RunnerBuildError> {
        let engine_options = EngineOptions::from_master(config_set.master())?;
        let config_options = config_set
            .configs()
            .iter()
            .map(|config| ConfigOptions::resolve(config_set.master(), config))
            .collect::<Result<Vec<_>, _>>()?;

        let deployment = self
            .deployment
            .unwrap_or_else(|| Arc::new(DeploymentHooks::new()));
        let log_source = self
            .log_source
            .unwrap_or_else(|| Arc::new(StaticLogSource::new()));
        let perf = self.perf.unwrap_or_else(|| Arc::new(NoopPerfAnalyzer::new()));

        let largest_group = test_list.largest_group();
        let group_pool = if largest_group > 1 {
            Some(
                ThreadPoolBuilder::new()
                    // The controller needs its own thread on the pool, hence the + 1.
                    .num_threads(largest_group + 1)
                    .thread_name(|idx| format!("zopkio-run-{idx}"))
                    .build()?,
            )
        } else {
            None
        };

        let dirs = LogDirs::resolve(&engine_options, log_source.as_ref(), ctx);

        Ok(TestRunner {
            inner: TestRunnerInner {
                ctx,
                deployment,
                log_source,
                perf,
                engine_options,
                config_options,
                dirs,
                group_pool,
            },
            test_list,
            config_set,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
pub struct TestRunner<'a> {
    inner: TestRunnerInner<'a>,
    test_list: &'a mut TestList,
    config_set: &'a mut ConfigSet,
}

impl TestRunner<'_> {
    /// Returns the engine options read from the master configuration.
    pub fn engine_options(&self) -> &EngineOptions {
        &self.inner.engine_options
    }

    /// Executes the suite once per configuration, with each event being sent to the callback.
    ///
    /// The results of every configuration are handed to the run context's results collector.
    pub fn execute<F>(&mut self, mut callback: F) -> RunStats
    where
        F: FnMut(RunEvent) + Send,
    {
        let Ok(run_stats) = self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        });
        run_stats
    }

    /// Executes the suite once per configuration, with each event being sent to the callback.
    ///
    /// Returns the first error the callback returns. Configurations that already finished stay
    /// in the results collector.
    pub fn try_execute<E, F>(&mut self, mut callback: F) -> Result<RunStats, E>
    where
        E: Send,
        F: FnMut(RunEvent) -> Result<(), E> + Send,
    {
        let mut first_error = None;
        let run_stats = self.inner.execute(self.test_list, self.config_set, &mut |event| {
            if first_error.is_none()
                && let Err(err) = callback(event)
            {
                first_error = Some(err);
            }
        });

        match first_error {
            None => Ok(run_stats),
            Some(err) => Err(err),
        }
    }
}

pub(super) struct TestRunnerInner<'a> {
    pub(super) ctx: &'a RunContext,
    pub(super) deployment: Arc<dyn Deployment>,
    pub(super) log_source: Arc<dyn LogSource>,
    pub(super) perf: Arc<dyn PerfAnalyzer>,
    pub(super) engine_options: EngineOptions,
    config_options: Vec<ConfigOptions>,
    pub(super) dirs: LogDirs,
    pub(super) group_pool: Option<ThreadPool>,
}

impl TestRunnerInner<'_> {
    fn execute(
        &self,
        test_list: &mut TestList,
        config_set: &mut ConfigSet,
        callback: &mut Callback<'_>,
    ) -> RunStats {
        let run_start = stopwatch();
        let mut run_stats = RunStats::default();
        let mut suite_handler = FailureHandler::new(self.engine_options.max_suite_failures_before_abort);
        let mut previous_perf_id: Option<PerfRunId> = None;

        let config_count = config_set.len();
        let test_count = test_list.test_count();
        info!(
            "running {test_count} {} across {config_count} {}",
            plural::tests_str(test_count),
            plural::configs_str(config_count),
        );
        callback(RunEvent::RunStarted {
            config_count,
            test_count,
        });

        config_set.reset();
        for (config, options) in config_set.configs_mut().iter_mut().zip(&self.config_options) {
            self.run_config(
                config,
                options,
                test_list,
                &mut suite_handler,
                &mut previous_perf_id,
                callback,
            );

            if config.result == ResultKind::Skipped && config.start_time.is_none() {
                run_stats.configs_skipped += 1;
            } else {
                run_stats.configs_run += 1;
            }
            let collector = self.ctx.collector();
            if let Some(results) = collector.config_results(config.name()) {
                run_stats.add_counts(&results.counts());
            }
        }

        let snapshot = run_start.snapshot();
        self.ctx.collector().set_end_time(snapshot.end_time());
        info!(
            "run finished in {}: {} passed, {} failed",
            display_duration(snapshot.duration),
            run_stats.passed,
            run_stats.failed,
        );
        callback(RunEvent::RunFinished {
            run_stats,
            elapsed: snapshot.duration,
        });

        run_stats
    }

    fn run_config(
        &self,
        config: &mut Configuration,
        options: &ConfigOptions,
        test_list: &mut TestList,
        suite_handler: &mut FailureHandler,
        previous_perf_id: &mut Option<PerfRunId>,
        callback: &mut Callback<'_>,
    ) {
        test_list.reset();
        self.ctx.clear_active_tests();
        for test in test_list.iter_tests_mut() {
            test.prepare(options.loop_all_tests);
        }

        if suite_handler.is_aborted() {
            warn!("skipping configuration {}: too many suite failures", config.name());
            config.result = ResultKind::Skipped;
            config.message.push_str(SkipReason::ConfigAbort.message());
            for test in test_list.iter_tests_mut() {
                test.result = ResultKind::Skipped;
            }
            callback(RunEvent::ConfigSkipped {
                config_name: config.name().to_owned(),
                reason: SkipReason::ConfigAbort,
                error: None,
            });
            self.finish_config(config, test_list, callback);
            return;
        }

        info!("running configuration {}", config.name());
        self.ctx.set_active_config(config);
        if !self.engine_options.no_perf {
            let perf_config = self.log_source.perf_config(config, None);
            config.perf_id = Some(self.perf.signal_start(perf_config.as_deref()));
        }
        config.start_time = Some(now());
        callback(RunEvent::ConfigStarted {
            config_name: config.name().to_owned(),
        });

        let setup_ok = match run_unit(UnitKind::SuiteSetup, || {
            self.deployment.setup_suite(self.ctx)
        }) {
            Outcome::Failed(err) => {
                error!(
                    "{} failed for configuration {}:\n{}",
                    UnitKind::SuiteSetup,
                    config.name(),
                    err.trace()
                );
                config.result = ResultKind::Skipped;
                swrite!(
                    config.message,
                    "{}{}\n",
                    SkipReason::SuiteSetupFailed.message(),
                    err.trace()
                );
                for test in test_list.iter_tests_mut() {
                    test.result = ResultKind::Skipped;
                }
                suite_handler.notify_failure();
                callback(RunEvent::ConfigSkipped {
                    config_name: config.name().to_owned(),
                    reason: SkipReason::SuiteSetupFailed,
                    error: Some(err),
                });
                false
            }
            _ => {
                self.run_tests(config, options, test_list, callback);
                if self.engine_options.should_fetch_logs {
                    fetch_all_logs(self.ctx, self.log_source.as_ref(), &self.dirs.logs_dir);
                }
                if !self.engine_options.no_perf {
                    self.run_perf_analysis(config, test_list, previous_perf_id);
                }
                // Validators see the statistics from analysis.
                self.ctx.set_active_tests(test_list.iter_tests());
                self.run_verification(test_list.iter_tests_mut());
                true
            }
        };

        match run_unit(UnitKind::SuiteTeardown, || {
            self.deployment.teardown_suite(self.ctx)
        }) {
            Outcome::Failed(err) => {
                error!(
                    "{} failed for configuration {}:\n{}",
                    UnitKind::SuiteTeardown,
                    config.name(),
                    err.trace()
                );
                swrite!(
                    config.message,
                    "{}{}\n",
                    UnitKind::SuiteTeardown.failure_header(),
                    err.trace()
                );
                if setup_ok {
                    suite_handler.notify_failure();
                }
            }
            _ => {
                if setup_ok {
                    suite_handler.notify_success();
                }
            }
        }

        kill_all_processes(self.ctx);
        config.end_time = Some(now());
        if config.result != ResultKind::Skipped {
            config.result = if test_list
                .iter_tests()
                .any(|test| test.result == ResultKind::Failed)
            {
                ResultKind::Failed
            } else {
                ResultKind::Passed
            };
        }

        self.finish_config(config, test_list, callback);
    }

    fn run_tests(
        &self,
        config: &Configuration,
        options: &ConfigOptions,
        test_list: &mut TestList,
        callback: &mut Callback<'_>,
    ) {
        let mut handler = FailureHandler::new(options.max_failures_per_suite_before_abort);
        for lap in 1..=options.loop_all_tests {
            if options.loop_all_tests > 1 {
                debug!("starting lap {lap} of {}", options.loop_all_tests);
            }
            for unit in test_list.units_mut() {
                self.run_test_unit(unit, &mut handler, options, config, callback);
            }
        }
    }

    fn run_perf_analysis(
        &self,
        config: &Configuration,
        test_list: &mut TestList,
        previous_perf_id: &mut Option<PerfRunId>,
    ) {
        let Some(perf_id) = &config.perf_id else {
            return;
        };
        self.perf.signal_stop(perf_id);

        if let Err(err) = self
            .perf
            .analyze(&self.dirs.logs_dir, &self.dirs.output_dir)
        {
            warn!(
                "performance analysis failed for configuration {}: {}",
                config.name(),
                DisplayErrorChain::new(err.as_ref())
            );
        }
        if let Some(previous) = previous_perf_id.as_ref()
            && let Err(err) = self.perf.diff(perf_id, previous)
        {
            warn!(
                "performance diff failed for configuration {}: {}",
                config.name(),
                DisplayErrorChain::new(err.as_ref())
            );
        }
        *previous_perf_id = Some(perf_id.clone());

        for test in test_list.iter_tests_mut() {
            if let Some(id) = &test.perf.id {
                test.perf.stats = self.perf.stats(id);
                test.perf.sla = self.perf.sla_results(id);
            }
        }
    }

    fn finish_config(
        &self,
        config: &Configuration,
        test_list: &TestList,
        callback: &mut Callback<'_>,
    ) {
        let counts = {
            let mut collector = self.ctx.collector();
            collector.collect(config, test_list.iter_tests());
            collector
                .config_results(config.name())
                .map(|results| results.counts())
                .unwrap_or_default()
        };

        for test in test_list.iter_tests() {
            info!("{}----{}", test.name(), test.result);
            if test.result == ResultKind::Failed
                && let Some(err) = &test.exception
            {
                info!("{}", err.trace());
            }
        }

        callback(RunEvent::ConfigFinished {
            config_name: config.name().to_owned(),
            result: config.result,
            counts,
            elapsed: elapsed_between(config.start_time, config.end_time),
        });
    }
}
