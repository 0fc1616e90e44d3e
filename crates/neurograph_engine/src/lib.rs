// SPDX-License-Identifier: MIT OR Apache-2.0
//! Neuron graph execution and connectivity aggregation engine.
//!
//! This crate provides the model and runtime behind a visual neural network
//! builder:
//! - Typed nodes (inputs, threshold units, pixel grids, tensors, operators)
//! - Weighted wires addressing individual slots and elements
//! - Group containers with macro wiring and collapsed display
//! - A topological executor running on a background worker
//!
//! ## Architecture
//!
//! All edits go through [`Graph`], which enforces connection rules and bumps a
//! version counter. [`Aggregator`] watches that counter to collapse fully wired
//! group pairs. Execution takes a detached [`Snapshot`], so it can run on the
//! [`ExecutorHandle`] thread while editing continues.

pub mod aggregation;
pub mod commands;
pub mod evaluation;
pub mod executor;
pub mod graph;
pub mod history;
pub mod node;
pub mod ops;
pub mod protocol;
pub mod settings;
pub mod slot;
pub mod tensor;
pub mod wire;
pub mod worker;

pub use aggregation::{Aggregator, CollapsedConnection};
pub use commands::{CommandError, GraphCommand};
pub use executor::{execute, ExecutionReport, ExecutorState, Snapshot};
pub use graph::{ConnectionError, Graph, GraphError};
pub use history::{History, HistoryError};
pub use node::{Activation, Node, NodeId, NodeKind};
pub use ops::{OpFamily, TensorOperation};
pub use protocol::{ProtocolError, WorkerRequest, WorkerResponse};
pub use settings::{EngineSettings, SettingsError};
pub use slot::Slot;
pub use tensor::TensorError;
pub use wire::{Wire, WireId};
pub use worker::{ExecutorHandle, WorkerError};
