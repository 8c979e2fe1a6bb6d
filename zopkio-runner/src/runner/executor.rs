// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution of a single test unit: setup, iterations and teardown.
//!
//! A unit is either one test or a group of tests sharing a numbered phase. Groups run their
//! iteration loops concurrently on the runner's thread pool, released together by a barrier, and
//! report back to the controller over a channel.

use super::{
    RunEvent,
    imp::TestRunnerInner,
    logs::fetch_all_logs,
};
use crate::{
    config::{ConfigOptions, Configuration},
    failure_handler::FailureHandler,
    helpers::plural,
    outcome::{Outcome, SkipReason, UnitKind, run_unit},
    stopwatch::{elapsed_between, now},
    test_list::{Test, TestUnit},
};
use itertools::Itertools;
use std::sync::Barrier;
use swrite::{SWrite, swrite};
use tracing::{debug, error};
use zopkio_metadata::ResultKind;

/// The callback events are delivered to. Invoked serially, never from test threads.
pub(super) type Callback<'cb> = dyn FnMut(RunEvent) + Send + 'cb;

impl TestRunnerInner<'_> {
    /// Runs one lap of a test unit.
    pub(super) fn run_test_unit(
        &self,
        unit: &mut TestUnit,
        handler: &mut FailureHandler,
        options: &ConfigOptions,
        config: &Configuration,
        callback: &mut Callback<'_>,
    ) {
        let config_name = config.name();

        if handler.is_aborted() {
            for test in unit.tests_mut() {
                test.skip(SkipReason::TestAbort.message());
                callback(RunEvent::TestSkipped {
                    config_name: config_name.to_owned(),
                    test_name: test.name().to_owned(),
                    reason: SkipReason::TestAbort,
                });
            }
            return;
        }

        let start_time = now();
        for test in unit.tests_mut() {
            if !self.engine_options.no_perf {
                let perf_config = self.log_source.perf_config(config, Some(test.name()));
                test.perf.id = Some(self.perf.signal_start(perf_config.as_deref()));
                test.perf.config = perf_config;
            }
            // Later laps keep the start of the first.
            test.start_time.get_or_insert(start_time);
            callback(RunEvent::TestStarted {
                config_name: config_name.to_owned(),
                test_name: test.name().to_owned(),
                phase: test.phase(),
            });
        }

        let setup_ok = match run_unit(UnitKind::Setup, || self.deployment.setup(self.ctx)) {
            Outcome::Failed(err) => {
                error!(
                    "{} failed for {}:\n{}",
                    UnitKind::Setup,
                    unit_label(unit),
                    err.trace()
                );
                for test in unit.tests_mut() {
                    test.skip(SkipReason::SetupFailed.message());
                    swrite!(test.message, "{}\n", err.trace());
                    callback(RunEvent::TestSkipped {
                        config_name: config_name.to_owned(),
                        test_name: test.name().to_owned(),
                        reason: SkipReason::SetupFailed,
                    });
                }
                handler.notify_failure();
                false
            }
            _ => {
                self.run_unit_iterations(unit, options, config_name, callback);
                true
            }
        };

        match run_unit(UnitKind::Teardown, || self.deployment.teardown(self.ctx)) {
            Outcome::Failed(err) => {
                error!(
                    "{} failed for {}:\n{}",
                    UnitKind::Teardown,
                    unit_label(unit),
                    err.trace()
                );
                for test in unit.tests_mut() {
                    test.append_trace(UnitKind::Teardown, &err);
                }
                if setup_ok {
                    handler.notify_failure();
                }
            }
            _ => {
                if setup_ok {
                    handler.notify_success();
                }
            }
        }

        let end_time = now();
        for test in unit.tests_mut() {
            test.end_time = Some(end_time);
            if let Some(id) = &test.perf.id {
                self.perf.signal_stop(id);
            }
        }
        self.ctx.set_active_tests(unit.tests());

        if setup_ok {
            for test in unit.tests() {
                callback(RunEvent::TestFinished {
                    config_name: config_name.to_owned(),
                    test_name: test.name().to_owned(),
                    result: test.result,
                    error: test.exception.clone(),
                    elapsed: elapsed_between(test.start_time, test.end_time),
                });
            }
        }
    }

    fn run_unit_iterations(
        &self,
        unit: &mut TestUnit,
        options: &ConfigOptions,
        config_name: &str,
        callback: &mut Callback<'_>,
    ) {
        match (&self.group_pool, unit.is_group()) {
            (Some(pool), true) => {
                let phase = unit.phase();
                let tests = unit.tests_mut();
                debug!(
                    "running {} tests concurrently in phase {phase}: {}",
                    tests.len(),
                    tests.iter().map(Test::name).join(", "),
                );

                let barrier = Barrier::new(tests.len());
                let barrier = &barrier;
                let (sender, receiver) = crossbeam_channel::unbounded();

                // The scope closure itself occupies one pool thread, which is why the pool has
                // one more thread than the largest group.
                pool.scope(move |run_scope| {
                    for test in tests {
                        let sender = sender.clone();
                        run_scope.spawn(move |_| {
                            barrier.wait();
                            self.run_iterations(test, options, config_name, &mut |event| {
                                // The receiver outlives every sender.
                                let _ = sender.send(event);
                            });
                        });
                    }

                    // Drop the original sender so that the receiver finishes once every task has
                    // completed.
                    drop(sender);

                    while let Ok(event) = receiver.recv() {
                        callback(event);
                    }
                });
            }
            _ => {
                for test in unit.tests_mut() {
                    self.run_iterations(test, options, config_name, &mut |event| callback(event));
                }
            }
        }
    }

    /// Runs this lap's iterations of a test body, validating inline where required.
    pub(super) fn run_iterations(
        &self,
        test: &mut Test,
        options: &ConfigOptions,
        config_name: &str,
        emit: &mut dyn FnMut(RunEvent),
    ) {
        let validate_inline =
            test.total_number_iterations > 1 || options.verify_after_each_test;

        for _ in 0..test.repeat_per_loop() {
            if test.current_iteration >= test.total_number_iterations {
                break;
            }
            if test.last_iteration_result() == Some(ResultKind::Failed) {
                let may_retry = options
                    .consecutive_failures_per_test
                    .is_some_and(|limit| test.consecutive_failures < limit);
                if !may_retry {
                    debug!(
                        test_name = test.name(),
                        "not retrying after {} consecutive failures",
                        test.consecutive_failures
                    );
                    break;
                }
            }

            test.current_iteration += 1;
            let iteration = test.current_iteration;

            test.func_start_time = Some(now());
            let outcome = test.run_body(self.ctx);
            test.func_end_time = Some(now());

            match outcome {
                Outcome::Failed(err) => {
                    debug!(test_name = test.name(), iteration, "body failed:\n{err}");
                    test.record_failure(err);
                }
                _ => {
                    test.result = ResultKind::Passed;
                    test.iteration_results.insert(iteration, ResultKind::Passed);
                    if validate_inline && test.has_validation() {
                        if self.engine_options.should_fetch_logs {
                            fetch_all_logs(self.ctx, self.log_source.as_ref(), &self.dirs.logs_dir);
                        }
                        test.validated_inline = true;
                        if let Some(Outcome::Failed(err)) = test.run_validation(self.ctx) {
                            debug!(test_name = test.name(), iteration, "validation failed:\n{err}");
                            test.record_failure(err);
                        }
                    }
                }
            }

            let result = test
                .iteration_results
                .get(&iteration)
                .copied()
                .unwrap_or(test.result);
            if result == ResultKind::Failed {
                test.consecutive_failures += 1;
            } else {
                test.consecutive_failures = 0;
            }

            emit(RunEvent::IterationFinished {
                config_name: config_name.to_owned(),
                test_name: test.name().to_owned(),
                iteration,
                total: test.total_number_iterations,
                result,
            });
        }

        debug!(
            test_name = test.name(),
            "{} of {} {} ran",
            test.current_iteration,
            test.total_number_iterations,
            plural::iterations_str(test.total_number_iterations),
        );
    }

    /// Runs validators that didn't already run inline, for every test that passed.
    pub(super) fn run_verification<'a>(&self, tests: impl IntoIterator<Item = &'a mut Test>) {
        for test in tests {
            if test.result != ResultKind::Passed || test.validated_inline {
                continue;
            }
            if let Some(Outcome::Failed(err)) = test.run_validation(self.ctx) {
                debug!(test_name = test.name(), "validation failed:\n{err}");
                test.record_failure(err);
            }
        }
    }
}

fn unit_label(unit: &TestUnit) -> String {
    match unit.tests() {
        [test] => test.name().to_owned(),
        tests => format!("phase {} ({} tests)", unit.phase(), tests.len()),
    }
}
