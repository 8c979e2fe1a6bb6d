// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod config_dir;
mod engine;
mod fixtures;
mod reports;
