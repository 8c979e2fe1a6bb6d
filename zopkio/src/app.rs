// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line arguments and the top-level run.

use crate::{
    displayer::EventDisplayer,
    errors::{ExpectedError, Result},
    output::{Color, LogLevel, OutputContext, clap_styles, init_logging},
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use clap::Parser;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zopkio_metadata::ZopkioExitCode;
use zopkio_runner::{
    config::{ConfigSet, parse_overrides, parse_pair},
    context::RunContext,
    deployer::Deployment,
    log_source::LogSource,
    perf::PerfAnalyzer,
    reporter::{JunitReporter, ReportDir, ReportSink, SummaryReporter, generate_reports},
    runner::TestRunnerBuilder,
    test_list::{TestList, TestModule},
};

/// Runs a distributed functional and performance test suite.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = clap_styles::style(),
    max_term_width = 100,
)]
pub struct ZopkioApp {
    /// Run only the named tests, to help debug broken tests
    #[arg(long, value_name = "NAME", num_args = 1..)]
    test_only: Option<Vec<String>>,

    /// Map logical host names to physical ones, as LOGICAL=PHYSICAL pairs
    #[arg(long, value_name = "LOGICAL=PHYSICAL", num_args = 1..)]
    machine_list: Vec<String>,

    /// Override configuration values for every configuration, as KEY=VALUE pairs
    ///
    /// Overrides take priority over every configuration file.
    #[arg(long, value_name = "KEY=VALUE", num_args = 1..)]
    config_overrides: Vec<String>,

    /// Directory to write output files and logs to
    ///
    /// Defaults to a timestamped `zopkio_*` directory under the current directory.
    #[arg(short = 'd', long, value_name = "DIR")]
    output_dir: Option<Utf8PathBuf>,

    /// Log level for the log file
    #[arg(long, value_enum, default_value_t = LogLevel::Info, ignore_case = true)]
    log_level: LogLevel,

    /// Log level for the console
    #[arg(long, value_enum, default_value_t = LogLevel::Error, ignore_case = true)]
    console_log_level: LogLevel,

    /// Don't prompt for a password
    #[arg(long)]
    nopassword: bool,

    /// User to run the suite as [default: the current user]
    #[arg(long)]
    user: Option<String>,

    /// Produce color output
    #[arg(long, value_enum, default_value_t, value_name = "WHEN")]
    color: Color,
}

impl ZopkioApp {
    /// Returns the output context for this invocation.
    pub fn output(&self) -> OutputContext {
        OutputContext::new(self.color)
    }

    /// Runs `suite` and writes its reports.
    ///
    /// Returns the number of tests that passed and the number that failed, summed over every
    /// configuration.
    pub fn exec(self, suite: SuiteDefinition) -> Result<(usize, usize)> {
        let output = self.output();
        let init_time = Local::now().fixed_offset();

        let output_dir = match self.output_dir {
            Some(dir) => dir,
            None => {
                let cwd = current_dir()?;
                RunContext::default_output_dir(&cwd, init_time)
            }
        };
        std::fs::create_dir_all(&output_dir).map_err(|err| ExpectedError::OutputDirCreate {
            path: output_dir.clone(),
            err,
        })?;

        init_logging(
            output,
            self.console_log_level,
            self.log_level,
            &output_dir.join("logs/zopkio_log/zopkio_log.log"),
        )?;
        info!("starting zopkio");

        let machines = parse_machine_list(&self.machine_list)?;
        let overrides = parse_overrides(&self.config_overrides)?;

        let ctx = RunContext::with_init_time(output_dir.clone(), init_time);
        ctx.set_machines(machines);
        let user = match self.user {
            Some(user) => Some(user),
            None => current_user(),
        };
        let password = if self.nopassword {
            None
        } else {
            Some(prompt_password()?)
        };
        ctx.set_user(user, password);

        let mut config_set = ConfigSet::from_dir(&suite.config_dir, &overrides)?;
        let mut test_list = TestList::discover(&suite.modules, self.test_only.as_deref())?;
        if test_list.is_empty() {
            return Err(ExpectedError::NoTestsRun);
        }

        let mut builder = TestRunnerBuilder::new();
        if let Some(deployment) = suite.deployment {
            builder.set_deployment(deployment);
        }
        if let Some(log_source) = suite.log_source {
            builder.set_log_source(log_source);
        }
        if let Some(perf) = suite.perf {
            builder.set_perf_analyzer(perf);
        }
        let mut runner = builder.build(&ctx, &mut test_list, &mut config_set)?;
        let no_display = runner.engine_options().no_display;

        let mut displayer = EventDisplayer::new(output.stderr_styles(), std::io::stderr());
        let run_stats = runner
            .try_execute(|event| displayer.write_event(&event))
            .map_err(|err| ExpectedError::WriteEvent { err })?;

        let report_dir = ReportDir::new(&ctx.reports_dir(), &suite.name, init_time);
        let mut sinks: Vec<Box<dyn ReportSink>> = vec![
            Box::new(JunitReporter::new(&report_dir)),
            Box::new(SummaryReporter::new(&report_dir)),
        ];
        generate_reports(&report_dir, &ctx.collector(), &mut sinks, no_display)?;

        info!("exiting zopkio");
        Ok((run_stats.success_count(), run_stats.fail_count()))
    }
}

/// Returns the process exit code for a finished run with `fail_count` failed tests.
pub fn exit_code_for(fail_count: usize) -> i32 {
    if fail_count == 0 {
        ZopkioExitCode::OK
    } else {
        ZopkioExitCode::TEST_RUN_FAILED
    }
}

/// Everything zopkio needs to know about a test suite.
#[derive(Clone)]
pub struct SuiteDefinition {
    name: String,
    config_dir: Utf8PathBuf,
    modules: Vec<TestModule>,
    deployment: Option<Arc<dyn Deployment>>,
    log_source: Option<Arc<dyn LogSource>>,
    perf: Option<Arc<dyn PerfAnalyzer>>,
}

impl SuiteDefinition {
    /// Creates a suite named `name`, whose configurations are loaded from `config_dir`.
    ///
    /// The name is used for the report directory.
    pub fn new(name: impl Into<String>, config_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            config_dir: config_dir.into(),
            modules: Vec::new(),
            deployment: None,
            log_source: None,
            perf: None,
        }
    }

    /// Adds a test module. Modules are discovered in the order they are added.
    pub fn module(mut self, module: TestModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Sets the suite's deployment hooks.
    pub fn deployment(mut self, deployment: Arc<dyn Deployment>) -> Self {
        self.deployment = Some(deployment);
        self
    }

    /// Sets where the suite's logs come from.
    pub fn log_source(mut self, log_source: Arc<dyn LogSource>) -> Self {
        self.log_source = Some(log_source);
        self
    }

    /// Sets the performance analyzer.
    pub fn perf_analyzer(mut self, perf: Arc<dyn PerfAnalyzer>) -> Self {
        self.perf = Some(perf);
        self
    }

    /// Returns the suite name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration directory.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDir { err })?;
    Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::CurrentDir {
        err: err.into_io_error(),
    })
}

fn current_user() -> Option<String> {
    match whoami::username() {
        Ok(user) => Some(user),
        Err(err) => {
            warn!("could not determine the current user ({err}), pass --user to set one");
            None
        }
    }
}

fn prompt_password() -> Result<String> {
    dialoguer::Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()
        .map_err(|err| ExpectedError::Dialoguer { err })
}

fn parse_machine_list(pairs: &[String]) -> Result<IndexMap<String, String>> {
    let mut machines = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        let (logical, physical) = parse_pair("--machine-list", pair)
            .map_err(|err| ExpectedError::MachineList { err })?;
        debug!("machine {logical} maps to {physical}");
        machines.insert(logical.to_owned(), physical.to_owned());
    }
    Ok(machines)
}
