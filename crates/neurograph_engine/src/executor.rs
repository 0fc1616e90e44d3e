// SPDX-License-Identifier: MIT OR Apache-2.0
//! Forward pass over a graph snapshot.
//!
//! [`execute`] is pure: it takes a [`Snapshot`], orders the nodes with Kahn's
//! algorithm, evaluates each one in order against a private working copy and
//! returns an [`ExecutionReport`]. Nodes caught in a cycle are never evaluated
//! and keep their previous output.

use crate::evaluation::{self, EvaluationContext};
use crate::graph::Graph;
use crate::node::{Node, NodeId, NodeKind};
use crate::wire::Wire;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Detached copy of the nodes and wires to execute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Evaluable nodes, in graph order
    pub nodes: Vec<Node>,
    /// Wires between them, in connection order
    pub wires: Vec<Wire>,
}

impl Snapshot {
    /// Copy a graph, leaving out groups and group-level wires
    pub fn from_graph(graph: &Graph) -> Self {
        let nodes: Vec<Node> = graph
            .nodes()
            .filter(|n| !n.kind.is_group())
            .cloned()
            .collect();
        let wires = graph
            .wires()
            .filter(|w| !w.source_slot.is_group_slot() && !w.target_slot.is_group_slot())
            .cloned()
            .collect();
        Self { nodes, wires }
    }
}

/// Execution progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutorState {
    /// Nothing running
    #[default]
    Idle,
    /// Computing the evaluation order
    Sorting,
    /// Evaluating a node
    Evaluating(NodeId),
    /// Last pass completed
    Done,
    /// Last request could not be executed
    Failed,
}

/// Per-node results of a forward pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// New output of every evaluated node
    pub outputs: IndexMap<NodeId, Vec<f64>>,
    /// New shape of every evaluated tensor or tensor-op
    pub shapes: IndexMap<NodeId, Vec<usize>>,
    /// Raw weighted sum of every evaluated threshold unit
    pub net_inputs: IndexMap<NodeId, f64>,
    /// Threshold in effect for every evaluated threshold unit
    pub thresholds: IndexMap<NodeId, f64>,
    /// Nodes left out because they sit on or behind a cycle
    pub unevaluated: Vec<NodeId>,
}

/// Order nodes so every wire's source precedes its target
///
/// Returns the order and the nodes that could not be placed. Wires that
/// reference nodes outside `nodes` are ignored.
pub fn topological_order(nodes: &[Node], wires: &[Wire]) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut in_degree: IndexMap<NodeId, usize> = nodes.iter().map(|n| (n.id, 0)).collect();
    let mut successors: IndexMap<NodeId, Vec<NodeId>> =
        nodes.iter().map(|n| (n.id, Vec::new())).collect();

    for wire in wires {
        if !in_degree.contains_key(&wire.source) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(&wire.target) {
            *degree += 1;
            if let Some(next) = successors.get_mut(&wire.source) {
                next.push(wire.target);
            }
        }
    }

    let mut queue: VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for target in successors.get(&current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*target);
                }
            }
        }
    }

    let stuck = in_degree
        .iter()
        .filter(|(_, &degree)| degree > 0)
        .map(|(&id, _)| id)
        .collect();
    (order, stuck)
}

/// Runs forward passes and tracks progress
#[derive(Debug, Default)]
pub struct Executor {
    state: ExecutorState,
}

impl Executor {
    /// Create an idle executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Evaluate every reachable node of the snapshot
    pub fn run(&mut self, snapshot: &Snapshot) -> ExecutionReport {
        self.state = ExecutorState::Sorting;
        let (order, stuck) = topological_order(&snapshot.nodes, &snapshot.wires);
        if !stuck.is_empty() {
            tracing::warn!("{} node(s) on a cycle were not evaluated", stuck.len());
        }

        let mut working: IndexMap<NodeId, Node> =
            snapshot.nodes.iter().map(|n| (n.id, n.clone())).collect();
        let mut incoming: IndexMap<NodeId, Vec<&Wire>> = IndexMap::new();
        for wire in &snapshot.wires {
            incoming.entry(wire.target).or_default().push(wire);
        }

        let mut report = ExecutionReport {
            unevaluated: stuck,
            ..Default::default()
        };

        for id in order {
            self.state = ExecutorState::Evaluating(id);
            let wires = incoming.get(&id).map(Vec::as_slice).unwrap_or(&[]);

            let result = {
                let Some(node) = working.get(&id) else {
                    continue;
                };
                let ctx = EvaluationContext::new(&working);
                evaluation::evaluate(node, wires, &ctx)
            };

            let Some(node) = working.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(output) => {
                    node.output = output.values;
                    if let Some(shape) = output.shape {
                        match &mut node.kind {
                            NodeKind::Tensor { shape: current } => *current = shape,
                            NodeKind::TensorOp(op) => op.shape = shape,
                            _ => {}
                        }
                    }
                    if let Some(net) = output.net_input {
                        report.net_inputs.insert(id, net);
                    }
                    if let Some(threshold) = output.threshold {
                        report.thresholds.insert(id, threshold);
                    }
                }
                Err(e) => {
                    tracing::warn!("Tensor operation failed for node {}: {}", id, e);
                }
            }

            report.outputs.insert(id, node.output.clone());
            if node.kind.is_tensor_like() {
                report.shapes.insert(id, node.shape());
            }
        }

        tracing::debug!(
            "Executed {} nodes ({} unevaluated)",
            report.outputs.len(),
            report.unevaluated.len()
        );
        self.state = ExecutorState::Done;
        report
    }
}

/// Run one forward pass
pub fn execute(snapshot: &Snapshot) -> ExecutionReport {
    Executor::new().run(snapshot)
}
