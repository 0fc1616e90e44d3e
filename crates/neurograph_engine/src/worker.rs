// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background executor thread.
//!
//! Snapshots are moved to a dedicated thread over an unbounded channel and
//! reports come back on a second one. The editing side polls without
//! blocking; headless callers can wait.

use crate::executor::{ExecutionReport, Executor, ExecutorState, Snapshot};
use crate::graph::Graph;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A snapshot queued for execution
#[derive(Debug)]
pub struct ExecutionRequest {
    /// Submission number
    pub ticket: u64,
    /// What to execute
    pub snapshot: Snapshot,
}

/// A finished execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Submission number of the request
    pub ticket: u64,
    /// Per-node results
    pub report: ExecutionReport,
    /// Wall time spent executing
    pub elapsed: Duration,
}

/// Counters shared with the worker thread
#[derive(Debug, Clone, Default)]
pub struct ExecutorStats {
    /// Requests submitted
    pub submitted: u64,
    /// Requests completed
    pub completed: u64,
    /// Requests that could not be executed
    pub failed: u64,
    /// Progress of the most recent request
    pub state: ExecutorState,
    /// Duration of the most recent pass
    pub last_elapsed: Duration,
}

/// Error talking to the worker thread
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Worker thread has stopped
    #[error("Executor worker is not running")]
    Closed,

    /// Worker thread could not be started
    #[error("Failed to start executor worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Handle to the executor thread
pub struct ExecutorHandle {
    /// Channel for sending snapshots
    request_tx: mpsc::UnboundedSender<ExecutionRequest>,
    /// Channel for receiving reports
    result_rx: mpsc::UnboundedReceiver<ExecutionResult>,
    /// Shared counters
    stats: Arc<RwLock<ExecutorStats>>,
    /// Next submission number
    next_ticket: u64,
}

impl ExecutorHandle {
    /// Start the worker thread
    pub fn spawn() -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(ExecutorStats::default()));

        let worker_stats = Arc::clone(&stats);
        std::thread::Builder::new()
            .name("neurograph-executor".to_string())
            .spawn(move || {
                executor_worker(request_rx, result_tx, worker_stats);
            })?;

        Ok(Self {
            request_tx,
            result_rx,
            stats,
            next_ticket: 0,
        })
    }

    /// Queue a snapshot; returns its ticket
    pub fn submit(&mut self, snapshot: Snapshot) -> Result<u64, WorkerError> {
        let ticket = self.next_ticket;
        self.request_tx
            .send(ExecutionRequest { ticket, snapshot })
            .map_err(|_| WorkerError::Closed)?;
        self.next_ticket += 1;
        self.stats.write().submitted += 1;
        Ok(ticket)
    }

    /// Snapshot a graph and queue it
    pub fn submit_graph(&mut self, graph: &Graph) -> Result<u64, WorkerError> {
        self.submit(Snapshot::from_graph(graph))
    }

    /// Take a finished result if one is ready
    pub fn poll(&mut self) -> Option<ExecutionResult> {
        self.result_rx.try_recv().ok()
    }

    /// Merge every ready result into a graph, oldest first
    ///
    /// Returns the number of results merged.
    pub fn poll_into(&mut self, graph: &mut Graph) -> usize {
        let mut merged = 0;
        while let Some(result) = self.poll() {
            graph.apply_report(&result.report);
            merged += 1;
        }
        merged
    }

    /// Wait for the next result
    ///
    /// Must not be called from inside an async runtime.
    pub fn recv_blocking(&mut self) -> Result<ExecutionResult, WorkerError> {
        self.result_rx.blocking_recv().ok_or(WorkerError::Closed)
    }

    /// Record a request that never reached the worker
    pub fn record_failure(&self) {
        let mut stats = self.stats.write();
        stats.failed += 1;
        stats.state = ExecutorState::Failed;
    }

    /// Current counters
    pub fn stats(&self) -> ExecutorStats {
        self.stats.read().clone()
    }
}

/// Worker thread that executes queued snapshots
fn executor_worker(
    mut request_rx: mpsc::UnboundedReceiver<ExecutionRequest>,
    result_tx: mpsc::UnboundedSender<ExecutionResult>,
    stats: Arc<RwLock<ExecutorStats>>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create executor runtime: {}", e);
            stats.write().state = ExecutorState::Failed;
            return;
        }
    };

    tracing::info!("Executor worker started");
    rt.block_on(async {
        while let Some(request) = request_rx.recv().await {
            stats.write().state = ExecutorState::Sorting;

            let started = Instant::now();
            let mut executor = Executor::new();
            let report = executor.run(&request.snapshot);
            let elapsed = started.elapsed();

            {
                let mut stats = stats.write();
                stats.completed += 1;
                stats.state = executor.state();
                stats.last_elapsed = elapsed;
            }

            let result = ExecutionResult {
                ticket: request.ticket,
                report,
                elapsed,
            };
            if result_tx.send(result).is_err() {
                break; // Handle dropped
            }
        }
    });
    tracing::info!("Executor worker stopped");
}
