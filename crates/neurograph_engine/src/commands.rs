// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph edit commands for undo/redo support.
//!
//! Each command applies itself to a [`Graph`] and keeps whatever it needs to
//! reverse the change. Commands are all-or-nothing: a failure part way through
//! rolls back what was already applied.

use crate::graph::{ConnectionError, Graph, GraphError, NodeRemoval};
use crate::node::{Node, NodeId};
use crate::wire::{Wire, WireId};

/// Trait for graph commands that can be undone/redone
pub trait GraphCommand: Send + Sync + std::fmt::Debug {
    /// Get a description of this command
    fn description(&self) -> &str;

    /// Apply the command
    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError>;

    /// Reverse a previous [`GraphCommand::execute`]
    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError>;
}

/// Error type for command execution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// Graph edit failed
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Wire rejected
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Wire not found
    #[error("Wire not found: {0}")]
    WireNotFound(WireId),
}

/// Command to add nodes
#[derive(Debug, Clone)]
pub struct AddNodesCommand {
    nodes: Vec<Node>,
    description: String,
}

impl AddNodesCommand {
    /// Create a new add command
    pub fn new(nodes: Vec<Node>) -> Self {
        let description = match nodes.as_slice() {
            [node] => format!("Add {}", node.label),
            _ => format!("Add {} nodes", nodes.len()),
        };
        Self { nodes, description }
    }

    /// IDs of the nodes this command adds
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }
}

impl GraphCommand for AddNodesCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Err(e) = graph.add_node(node.clone()) {
                for added in self.nodes[..i].iter().rev() {
                    graph.remove_node(added.id);
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for node in self.nodes.iter().rev() {
            graph
                .remove_node(node.id)
                .ok_or(CommandError::NodeNotFound(node.id))?;
        }
        Ok(())
    }
}

/// Command to delete nodes together with their wires
#[derive(Debug, Clone)]
pub struct DeleteNodesCommand {
    ids: Vec<NodeId>,
    removed: Vec<NodeRemoval>,
    description: String,
}

impl DeleteNodesCommand {
    /// Create a new delete command
    pub fn new(ids: Vec<NodeId>) -> Self {
        let description = match ids.len() {
            1 => "Delete node".to_string(),
            n => format!("Delete {n} nodes"),
        };
        Self {
            ids,
            removed: Vec::new(),
            description,
        }
    }
}

impl GraphCommand for DeleteNodesCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        self.removed.clear();
        for &id in &self.ids {
            match graph.remove_node(id) {
                Some(removal) => self.removed.push(removal),
                None => {
                    for removal in self.removed.drain(..).rev() {
                        graph.restore_node(removal);
                    }
                    return Err(CommandError::NodeNotFound(id));
                }
            }
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for removal in self.removed.drain(..).rev() {
            graph.restore_node(removal);
        }
        Ok(())
    }
}

/// Command to add wires
#[derive(Debug, Clone)]
pub struct AddWiresCommand {
    wires: Vec<Wire>,
    description: String,
}

impl AddWiresCommand {
    /// Create a new add command
    pub fn new(wires: Vec<Wire>, description: impl Into<String>) -> Self {
        Self {
            wires,
            description: description.into(),
        }
    }

    /// Wires this command adds
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }
}

impl GraphCommand for AddWiresCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for (i, wire) in self.wires.iter().enumerate() {
            if let Err(e) = graph.connect(wire.clone()) {
                for added in self.wires[..i].iter().rev() {
                    graph.disconnect(added.id);
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for wire in self.wires.iter().rev() {
            graph
                .disconnect(wire.id)
                .ok_or(CommandError::WireNotFound(wire.id))?;
        }
        Ok(())
    }
}

/// Command to delete wires
#[derive(Debug, Clone)]
pub struct DeleteWiresCommand {
    ids: Vec<WireId>,
    removed: Vec<Wire>,
}

impl DeleteWiresCommand {
    /// Create a new delete command
    pub fn new(ids: Vec<WireId>) -> Self {
        Self {
            ids,
            removed: Vec::new(),
        }
    }
}

impl GraphCommand for DeleteWiresCommand {
    fn description(&self) -> &str {
        "Delete wires"
    }

    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        self.removed.clear();
        for &id in &self.ids {
            match graph.disconnect(id) {
                Some(wire) => self.removed.push(wire),
                None => {
                    for wire in self.removed.drain(..).rev() {
                        graph.restore_wire(wire);
                    }
                    return Err(CommandError::WireNotFound(id));
                }
            }
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for wire in self.removed.drain(..).rev() {
            graph.restore_wire(wire);
        }
        Ok(())
    }
}

/// Command to change a wire's weight
#[derive(Debug, Clone)]
pub struct SetWeightCommand {
    wire: WireId,
    weight: f64,
    previous: Option<f64>,
}

impl SetWeightCommand {
    /// Create a new weight command
    pub fn new(wire: WireId, weight: f64) -> Self {
        Self {
            wire,
            weight,
            previous: None,
        }
    }
}

impl GraphCommand for SetWeightCommand {
    fn description(&self) -> &str {
        "Set weight"
    }

    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        self.previous = Some(graph.set_wire_weight(self.wire, self.weight)?);
        Ok(())
    }

    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        if let Some(previous) = self.previous.take() {
            graph.set_wire_weight(self.wire, previous)?;
        }
        Ok(())
    }
}

/// Several commands undone and redone as one
#[derive(Debug)]
pub struct CompositeCommand {
    commands: Vec<Box<dyn GraphCommand>>,
    description: String,
}

impl CompositeCommand {
    /// Create a new composite command
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            description: description.into(),
        }
    }

    /// Append a command
    pub fn with(mut self, command: impl GraphCommand + 'static) -> Self {
        self.commands.push(Box::new(command));
        self
    }

    /// Number of child commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether there are no child commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl GraphCommand for CompositeCommand {
    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for i in 0..self.commands.len() {
            if let Err(e) = self.commands[i].execute(graph) {
                for done in self.commands[..i].iter_mut().rev() {
                    if let Err(undo_err) = done.undo(graph) {
                        tracing::warn!("Rollback of '{}' failed: {}", done.description(), undo_err);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut Graph) -> Result<(), CommandError> {
        for command in self.commands.iter_mut().rev() {
            command.undo(graph)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_then_undo_restores_node_and_wires() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::input(1.0)).unwrap();
        let b = graph.add_node(Node::perceptron(0.0)).unwrap();
        let c = graph.add_node(Node::output()).unwrap();
        graph.connect(Wire::new(a, b)).unwrap();
        graph.connect(Wire::new(b, c)).unwrap();

        let mut command = DeleteNodesCommand::new(vec![b]);
        command.execute(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.wire_count(), 0);

        command.undo(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.wire_count(), 2);
    }

    #[test]
    fn test_add_wires_is_atomic() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::input(1.0)).unwrap();
        let out = graph.add_node(Node::output()).unwrap();

        let mut command = AddWiresCommand::new(
            vec![Wire::new(a, out), Wire::new(a, a)],
            "Connect",
        );
        assert_eq!(
            command.execute(&mut graph),
            Err(CommandError::Connection(ConnectionError::SelfLoop))
        );
        assert_eq!(graph.wire_count(), 0);
    }

    #[test]
    fn test_set_weight_round_trip() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::input(1.0)).unwrap();
        let b = graph.add_node(Node::perceptron(0.0)).unwrap();
        let wire = graph.connect(Wire::new(a, b).with_weight(0.5)).unwrap();

        let mut command = SetWeightCommand::new(wire, 3.0);
        command.execute(&mut graph).unwrap();
        assert_eq!(graph.wire(wire).unwrap().weight, 3.0);
        command.undo(&mut graph).unwrap();
        assert_eq!(graph.wire(wire).unwrap().weight, 0.5);
    }

    #[test]
    fn test_composite_rolls_back() {
        let mut graph = Graph::default();
        let input = Node::input(1.0);
        let input_id = input.id;

        let mut command = CompositeCommand::new("Add and delete")
            .with(AddNodesCommand::new(vec![input]))
            .with(DeleteNodesCommand::new(vec![NodeId::new()]));
        assert_eq!(command.len(), 2);
        assert!(command.execute(&mut graph).is_err());
        assert!(graph.node(input_id).is_none());
    }
}
