//! Converge demo CLI.
//!
//! Reconciles a manifest against in-memory providers, printing the plan and
//! the run report. Exits non-zero if any operation failed.
//!
//! # Usage
//!
//! ```bash
//! converge-demo [manifest.json]
//! ```
//!
//! Without an argument the bundled EKS manifest is used. Engine settings come
//! from `CONVERGE_*` environment variables, optionally via a `.env` file.
//! `CONVERGE_LOG` sets the log filter and `CONVERGE_LOG_FORMAT` picks
//! `pretty`, `compact` or `json` output.

#![expect(clippy::print_stdout, reason = "the demo renders plans and reports to stdout")]
#![expect(clippy::print_stderr, reason = "the demo reports fatal errors to stderr")]

use converge_core::{EngineConfig, TracingFormat, TracingSetup};
use converge_demo::{load_manifest, registry_for};
use converge_executor::{CancellationToken, Reconciler};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let format = match std::env::var("CONVERGE_LOG_FORMAT") {
        Ok(value) => match value.parse::<TracingFormat>() {
            Ok(format) => format,
            Err(e) => {
                eprintln!("Error: CONVERGE_LOG_FORMAT: {e}");
                return ExitCode::FAILURE;
            }
        },
        Err(_) => TracingFormat::Pretty,
    };
    TracingSetup::new()
        .with_format(format)
        .with_env_filter(std::env::var("CONVERGE_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let source = match std::env::args().nth(1) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                eprintln!("Error: cannot read {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let manifest = match load_manifest(source.as_deref()) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match EngineConfig::default().with_env_overrides() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let reconciler = match Reconciler::from_config(registry_for(&manifest), config) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut graph = match manifest.into_graph() {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C stops dispatching; in-flight operations finish and are recorded.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight operations");
            on_signal.cancel();
        }
    });

    let printed = reconciler
        .reconcile_with(&mut graph, &cancel, |plan| println!("{plan}\n"))
        .await;
    let report = match printed {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("{report}");

    for node in graph.iter() {
        if let Some(current) = node.current() {
            let rendered = serde_json::to_string(current).unwrap_or_default();
            println!("{} = {rendered}", node.id());
        }
    }

    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
