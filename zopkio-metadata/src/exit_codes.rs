// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for zopkio harness failures.
///
/// A zopkio run may fail for a variety of reasons. This structure documents the exit codes that
/// may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum ZopkioExitCode {}

impl ZopkioExitCode {
    /// No errors occurred and every test that ran passed.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The configuration directory or one of its files could not be loaded.
    pub const CONFIG_LOAD_FAILED: i32 = 101;

    /// The suite's test modules could not be turned into a test list.
    pub const TEST_LIST_CREATION_FAILED: i32 = 104;

    /// Writing a report produced an error.
    pub const REPORT_WRITE_FAILED: i32 = 110;

    /// A user issue happened while setting up a zopkio invocation, for example malformed
    /// command-line pairs.
    pub const SETUP_ERROR: i32 = 96;
}
