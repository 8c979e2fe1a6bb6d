// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A self-contained suite against an in-process "message broker".
//!
//! Run it with `cargo run -p zopkio --example sample-suite -- --nopassword`.

use clap::Parser;
use color_eyre::Result;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use zopkio::{SuiteDefinition, ZopkioApp, exit_code_for};
use zopkio_runner::{
    context::RunContext,
    deployer::DeploymentHooks,
    outcome::UnitResult,
    test_list::{TestFunction, TestModule},
};

#[derive(Debug, Default)]
struct Broker {
    produced: AtomicU64,
    consumed: AtomicU64,
}

fn num_messages(ctx: &RunContext) -> u64 {
    ctx.active_config("num_messages")
        .and_then(|value| match value {
            serde_json::Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        })
        .unwrap_or(10)
}

fn modules(broker: &Arc<Broker>) -> Vec<TestModule> {
    let produce = {
        let broker = broker.clone();
        move |ctx: &RunContext| -> UnitResult {
            broker.produced.fetch_add(num_messages(ctx), Ordering::SeqCst);
            Ok(())
        }
    };
    let validate_produce = {
        let broker = broker.clone();
        move |_: &RunContext| -> UnitResult {
            if broker.produced.load(Ordering::SeqCst) == 0 {
                return Err("nothing was produced".into());
            }
            Ok(())
        }
    };
    let consume = {
        let broker = broker.clone();
        move |ctx: &RunContext| -> UnitResult {
            let wanted = num_messages(ctx);
            let available = broker.produced.load(Ordering::SeqCst);
            if available < wanted {
                return Err(format!("only {available} of {wanted} messages available").into());
            }
            broker.consumed.fetch_add(wanted, Ordering::SeqCst);
            Ok(())
        }
    };
    let lag_check = {
        let broker = broker.clone();
        move |_: &RunContext| -> UnitResult {
            let produced = broker.produced.load(Ordering::SeqCst);
            let consumed = broker.consumed.load(Ordering::SeqCst);
            tracing::info!("produced {produced}, consumed {consumed}");
            Ok(())
        }
    };

    vec![
        TestModule::new("produce")
            .function(
                TestFunction::new("test_produce", produce)
                    .doc("Produces num_messages messages.")
                    .repeat_per_loop(2),
            )
            .register("validate_produce", validate_produce),
        TestModule::new("consume").register("test_consume", consume),
        TestModule::new("monitoring")
            .with_phase(1)
            .register("test_lag_a", lag_check.clone())
            .register("test_lag_b", lag_check),
    ]
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let app = ZopkioApp::parse();
    let styles = app.output().stderr_styles();

    let broker = Arc::new(Broker::default());
    let hooks = {
        let broker = broker.clone();
        DeploymentHooks::new().setup_suite(move |_| {
            broker.produced.store(0, Ordering::SeqCst);
            broker.consumed.store(0, Ordering::SeqCst);
            Ok(())
        })
    };

    let suite = modules(&broker).into_iter().fold(
        SuiteDefinition::new(
            "sample_suite",
            concat!(env!("CARGO_MANIFEST_DIR"), "/demos/sample_config"),
        )
        .deployment(Arc::new(hooks)),
        SuiteDefinition::module,
    );

    match app.exec(suite) {
        Ok((_, fail_count)) => std::process::exit(exit_code_for(fail_count)),
        Err(error) => {
            error.display_to_stderr(&styles);
            std::process::exit(error.process_exit_code())
        }
    }
}
