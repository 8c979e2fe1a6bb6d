// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for test bodies and validators.

use crate::{context::RunContext, errors::LogSliceError};
use camino::Utf8Path;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Runs every command on its own thread and waits for all of them to finish.
///
/// Commands may borrow from the caller. If any command panics, the panic is propagated once every
/// thread has been joined.
pub fn start_threads_and_join<I, F>(commands: I)
where
    I: IntoIterator<Item = F>,
    F: FnOnce() + Send,
{
    std::thread::scope(|scope| {
        for command in commands {
            scope.spawn(command);
        }
    });
}

/// Returns the portion of a log file written while a test in the active run was executing.
///
/// Every log entry is assumed to start with a timestamp in `timestamp_format`, a
/// [`chrono` format string](chrono::format::strftime). Only as many leading words as the format
/// has are parsed, so the rest of the line may contain anything. Formats without a date are
/// matched against the date the test started on. Lines that don't start with a timestamp, such as
/// the continuation lines of a stack trace, belong to the entry before them.
///
/// The slice starts at the first entry stamped at or after the test's start time, and ends after
/// the last entry stamped at or before its end time.
pub fn log_for_test(
    ctx: &RunContext,
    test_name: &str,
    log_path: &Utf8Path,
    timestamp_format: &str,
) -> Result<String, LogSliceError> {
    let (Some(start_time), Some(end_time)) = (
        ctx.active_test_start_time(test_name),
        ctx.active_test_end_time(test_name),
    ) else {
        return Err(LogSliceError::NoTimes {
            test_name: test_name.to_owned(),
        });
    };

    let contents = std::fs::read_to_string(log_path).map_err(|err| LogSliceError::Read {
        path: log_path.to_path_buf(),
        err,
    })?;

    let parser = TimestampParser::new(timestamp_format, start_time.date_naive());
    // Timestamps in logs are written in local time, without an offset.
    let slice = slice_by_time(
        &contents,
        &parser,
        start_time.naive_local(),
        end_time.naive_local(),
    );
    Ok(slice.to_owned())
}

struct TimestampParser<'a> {
    format: &'a str,
    word_count: usize,
    date: NaiveDate,
}

impl<'a> TimestampParser<'a> {
    fn new(format: &'a str, date: NaiveDate) -> Self {
        Self {
            format,
            word_count: format.split_whitespace().count(),
            date,
        }
    }

    fn parse(&self, line: &str) -> Option<NaiveDateTime> {
        let words: Vec<_> = line.split_whitespace().take(self.word_count).collect();
        if words.len() < self.word_count {
            return None;
        }
        let timestr = words.join(" ");
        NaiveDateTime::parse_from_str(&timestr, self.format)
            .ok()
            .or_else(|| {
                NaiveTime::parse_from_str(&timestr, self.format)
                    .ok()
                    .map(|time| self.date.and_time(time))
            })
    }
}

fn slice_by_time<'a>(
    contents: &'a str,
    parser: &TimestampParser<'_>,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> &'a str {
    let mut start_pos = None;
    let mut end_pos = None;
    let mut entry_time = None;
    let mut offset = 0;

    for line in contents.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if let Some(time) = parser.parse(line) {
            entry_time = Some(time);
            if start_pos.is_none() && time >= start {
                start_pos = Some(line_start);
            }
        }

        match entry_time {
            Some(time) if start_pos.is_some() && time <= end => end_pos = Some(offset),
            Some(time) if time > end => break,
            _ => {}
        }
    }

    match (start_pos, end_pos) {
        (Some(start_pos), Some(end_pos)) => &contents[start_pos..end_pos],
        _ => "",
    }
}
