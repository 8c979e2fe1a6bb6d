// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{ExpectedError, Result};
use camino::Utf8Path;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Style, style};
use std::{fmt, fs::File, sync::Mutex};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Overrides the console log filter with a `tracing` targets directive, e.g.
/// `zopkio_runner=debug`.
pub const ZOPKIO_LOG_ENV: &str = "ZOPKIO_LOG";

/// The target of events printed without a level heading.
pub(crate) const NO_HEADING_TARGET: &str = "zopkio::no_heading";

pub(crate) mod clap_styles {
    use clap::builder::{
        Styles,
        styling::{AnsiColor, Effects, Style},
    };

    const HEADER: Style = AnsiColor::Green.on_default().effects(Effects::BOLD);
    const LITERAL: Style = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
    const PLACEHOLDER: Style = AnsiColor::Cyan.on_default();
    const ERROR: Style = AnsiColor::Red.on_default().effects(Effects::BOLD);

    pub(crate) const fn style() -> Styles {
        Styles::styled()
            .header(HEADER)
            .usage(HEADER)
            .literal(LITERAL)
            .placeholder(PLACEHOLDER)
            .error(ERROR)
    }
}

/// When to produce colored output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Color {
    /// Color if stderr is a terminal that supports it.
    #[default]
    Auto,

    /// Always color.
    Always,

    /// Never color.
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// A logging verbosity, as accepted by `--log-level` and `--console-log-level`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,

    /// Warnings and errors.
    Warn,

    /// Informational messages, including per-test results.
    Info,

    /// Engine internals.
    Debug,

    /// Everything.
    Trace,
}

impl LogLevel {
    fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output settings for one invocation.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) color: Color,
}

impl OutputContext {
    /// Creates a new output context.
    pub fn new(color: Color) -> Self {
        Self { color }
    }

    /// Returns styles for messages written to stderr.
    pub fn stderr_styles(&self) -> StderrStyles {
        let mut styles = StderrStyles::default();
        if self.color.should_colorize(supports_color::Stream::Stderr) {
            styles.colorize();
        }
        styles
    }
}

/// Styles for run progress and errors written to stderr.
#[derive(Clone, Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) skip: Style,
    pub(crate) count: Style,
}

impl StderrStyles {
    fn colorize(&mut self) {
        self.bold = style().bold();
        self.pass = style().green().bold();
        self.fail = style().red().bold();
        self.skip = style().yellow().bold();
        self.count = style().bold();
    }
}

/// Installs the global logger.
///
/// Events at `console_level` and above go to stderr, unless [`ZOPKIO_LOG_ENV`] provides a
/// directive. Every event at `file_level` and above is written to `log_file` without colors.
pub(crate) fn init_logging(
    output: OutputContext,
    console_level: LogLevel,
    file_level: LogLevel,
    log_file: &Utf8Path,
) -> Result<()> {
    let mut log_styles = LogStyles::default();
    if output.color.should_colorize(supports_color::Stream::Stderr) {
        log_styles.colorize();
    }

    let directive = std::env::var(ZOPKIO_LOG_ENV).unwrap_or_default();
    let console_targets = if directive.is_empty() {
        Targets::new().with_default(console_level.to_filter())
    } else {
        directive
            .parse()
            .map_err(|err| ExpectedError::LogDirectiveParse { directive, err })?
    };

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ExpectedError::LogFileCreate {
            path: log_file.to_owned(),
            err,
        })?;
    }
    let file = File::create(log_file).map_err(|err| ExpectedError::LogFileCreate {
        path: log_file.to_owned(),
        err,
    })?;

    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(SimpleFormatter { styles: log_styles })
        .with_writer(std::io::stderr)
        .with_filter(console_targets);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(Mutex::new(file))
        .with_filter(file_level.to_filter());

    if tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("a global logger was already installed, keeping it");
    }
    Ok(())
}

struct SimpleFormatter {
    styles: LogStyles,
}

impl<S, N> FormatEvent<S, N> for SimpleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if metadata.target() != NO_HEADING_TARGET {
            let (heading, style) = match *metadata.level() {
                Level::ERROR => ("error", self.styles.error),
                Level::WARN => ("warning", self.styles.warning),
                Level::INFO => ("info", self.styles.info),
                Level::DEBUG => ("debug", self.styles.debug),
                Level::TRACE => ("trace", self.styles.trace),
            };
            write!(writer, "{}: ", heading.style(style))?;
        }

        let mut visitor = MessageVisitor {
            writer: &mut writer,
            error: None,
        };
        event.record(&mut visitor);
        if let Some(error) = visitor.error {
            return Err(error);
        }

        writeln!(writer)
    }
}

const MESSAGE_FIELD: &str = "message";

struct MessageVisitor<'writer, 'a> {
    writer: &'a mut format::Writer<'writer>,
    error: Option<fmt::Error>,
}

impl Visit for MessageVisitor<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD
            && let Err(error) = write!(self.writer, "{value:?}")
        {
            self.error = Some(error);
        }
    }
}

#[derive(Debug, Default)]
struct LogStyles {
    error: Style,
    warning: Style,
    info: Style,
    debug: Style,
    trace: Style,
}

impl LogStyles {
    fn colorize(&mut self) {
        self.error = style().red().bold();
        self.warning = style().yellow().bold();
        self.info = style().bold();
        self.debug = style().bold();
        self.trace = style().dimmed();
    }
}
