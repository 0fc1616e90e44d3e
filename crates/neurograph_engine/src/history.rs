// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded undo/redo history of graph commands.

use crate::commands::{CommandError, GraphCommand};
use crate::graph::Graph;
use std::collections::VecDeque;
use thiserror::Error;

/// Default undo history depth
pub const MAX_HISTORY: usize = 50;

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// Command failed
    #[error("Command failed: {0}")]
    Command(#[from] CommandError),
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// History statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    /// Commands in undo stack
    pub undo_count: usize,
    /// Commands in redo stack
    pub redo_count: usize,
    /// Maximum history depth
    pub max_depth: usize,
}

/// Undo/redo history manager
#[derive(Debug)]
pub struct History {
    /// Undo stack
    undo_stack: VecDeque<Box<dyn GraphCommand>>,
    /// Redo stack
    redo_stack: VecDeque<Box<dyn GraphCommand>>,
    /// Maximum history depth
    max_depth: usize,
}

impl History {
    /// Create a new history manager
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_depth,
        }
    }

    /// Execute a command and record it
    pub fn execute(&mut self, mut command: Box<dyn GraphCommand>, graph: &mut Graph) -> Result<()> {
        command.execute(graph)?;
        tracing::debug!("Executed: {}", command.description());

        self.redo_stack.clear();
        self.undo_stack.push_back(command);

        // Enforce history limit
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
        Ok(())
    }

    /// Undo the last command
    pub fn undo(&mut self, graph: &mut Graph) -> Result<String> {
        let mut command = self.undo_stack.pop_back().ok_or(HistoryError::NothingToUndo)?;

        if let Err(e) = command.undo(graph) {
            self.undo_stack.push_back(command);
            return Err(e.into());
        }

        let description = command.description().to_string();
        tracing::debug!("Undone: {}", description);
        self.redo_stack.push_back(command);
        Ok(description)
    }

    /// Redo the last undone command
    pub fn redo(&mut self, graph: &mut Graph) -> Result<String> {
        let mut command = self.redo_stack.pop_back().ok_or(HistoryError::NothingToRedo)?;

        if let Err(e) = command.execute(graph) {
            self.redo_stack.push_back(command);
            return Err(e.into());
        }

        let description = command.description().to_string();
        tracing::debug!("Redone: {}", description);
        self.undo_stack.push_back(command);
        Ok(description)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            max_depth: self.max_depth,
        }
    }

    /// Get description of next undo command
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|c| c.description())
    }

    /// Get description of next redo command
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|c| c.description())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{AddNodesCommand, SetWeightCommand};
    use crate::node::Node;
    use crate::wire::{Wire, WireId};

    #[test]
    fn test_undo_redo() {
        let mut graph = Graph::default();
        let mut history = History::new();
        let node = Node::input(1.0);
        let id = node.id;

        history
            .execute(Box::new(AddNodesCommand::new(vec![node])), &mut graph)
            .unwrap();
        assert_eq!(history.undo_description(), Some("Add Input"));

        assert_eq!(history.undo(&mut graph).unwrap(), "Add Input");
        assert!(graph.node(id).is_none());
        assert!(history.can_redo());

        history.redo(&mut graph).unwrap();
        assert!(graph.node(id).is_some());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_empty_history() {
        let mut graph = Graph::default();
        let mut history = History::new();
        assert!(matches!(history.undo(&mut graph), Err(HistoryError::NothingToUndo)));
        assert!(matches!(history.redo(&mut graph), Err(HistoryError::NothingToRedo)));
    }

    #[test]
    fn test_depth_limit() {
        let mut graph = Graph::default();
        let mut history = History::with_max_depth(3);
        for _ in 0..5 {
            history
                .execute(Box::new(AddNodesCommand::new(vec![Node::bias()])), &mut graph)
                .unwrap();
        }
        assert_eq!(history.stats().undo_count, 3);
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn test_failed_command_not_recorded() {
        let mut graph = Graph::default();
        let mut history = History::new();
        let result = history.execute(Box::new(SetWeightCommand::new(WireId::new(), 1.0)), &mut graph);
        assert!(result.is_err());
        assert!(!history.can_undo());
    }

    #[test]
    fn test_new_command_clears_redo() {
        let mut graph = Graph::default();
        let a = graph.add_node(Node::input(1.0)).unwrap();
        let b = graph.add_node(Node::perceptron(0.0)).unwrap();
        let wire = graph.connect(Wire::new(a, b)).unwrap();

        let mut history = History::new();
        history
            .execute(Box::new(SetWeightCommand::new(wire, 2.0)), &mut graph)
            .unwrap();
        history.undo(&mut graph).unwrap();
        history
            .execute(Box::new(SetWeightCommand::new(wire, 4.0)), &mut graph)
            .unwrap();
        assert!(!history.can_redo());
        assert_eq!(graph.wire(wire).unwrap().weight, 4.0);
    }
}
