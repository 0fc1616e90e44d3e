// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless neuron graph executor.
//!
//! Reads one `EXECUTE` request per line on stdin and answers each with one
//! `EXECUTE_RESULT` or `EXECUTE_FAILED` line on stdout. Logs go to stderr.
//! Settings are read from the RON file named by `NEUROGRAPH_SETTINGS`.

use neurograph_engine::{
    EngineSettings, ExecutorHandle, ProtocolError, WorkerError, WorkerRequest, WorkerResponse,
};
use std::io::{BufRead, Write};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Error that stops the serve loop
#[derive(Debug, thiserror::Error)]
enum ServeError {
    /// Reading requests or writing responses failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Executor thread unavailable
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Response could not be encoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

fn main() {
    let settings = EngineSettings::from_env();
    let filter = match &settings {
        Ok(settings) => settings.logging.filter.clone(),
        Err(_) => EngineSettings::default().logging.filter,
    };

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in filter.split(',').filter(|d| !d.is_empty()) {
        match directive.parse::<Directive>() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{directive}': {e}"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting neurograph worker v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = &settings {
        tracing::warn!("Using default settings: {e}");
    }

    let result = ExecutorHandle::spawn()
        .map_err(ServeError::from)
        .and_then(|mut handle| {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            serve(stdin.lock(), stdout.lock(), &mut handle)
        });

    if let Err(e) = result {
        tracing::error!("Worker stopped: {e}");
        std::process::exit(1);
    }
}

/// Answer every request line until the input ends
fn serve(
    input: impl BufRead,
    mut output: impl Write,
    handle: &mut ExecutorHandle,
) -> Result<(), ServeError> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match WorkerRequest::from_json(&line).and_then(WorkerRequest::into_snapshot) {
            Ok((snapshot, ids)) => {
                handle.submit(snapshot)?;
                let result = handle.recv_blocking()?;
                tracing::debug!(
                    "Request {} finished in {:?}",
                    result.ticket,
                    result.elapsed
                );
                WorkerResponse::from_report(&result.report, &ids)
            }
            Err(e) => {
                tracing::warn!("Rejected request: {e}");
                handle.record_failure();
                WorkerResponse::failed(&e)
            }
        };

        writeln!(output, "{}", response.to_json()?)?;
        output.flush()?;
    }

    tracing::info!("Input closed");
    Ok(())
}
