// SPDX-License-Identifier: MIT OR Apache-2.0
//! Group-to-group macro wiring.
//!
//! Expanding a macro connection and detecting a fully wired group pair share
//! one pairing plan, so a pair expanded by [`expand`] is always recognised by
//! [`Aggregator::refresh`].
//!
//! Pairing rules, over the members of each group in vertical order:
//! - a pixel grid contributes one connection point per cell, any other node
//!   contributes one point;
//! - input and bias points are never targets;
//! - output and pixel-grid points map one-to-one, taking the source point at
//!   the same ordinal among such strict targets;
//! - every other target point takes a wire from every source point.

use crate::commands::AddWiresCommand;
use crate::graph::{Graph, GraphError};
use crate::node::{Node, NodeId, NodeKind};
use crate::slot::Slot;
use crate::wire::{WireId, WireRoute};
use indexmap::IndexSet;

struct ConnectionPoint<'a> {
    node: &'a Node,
    cell: Option<usize>,
}

impl ConnectionPoint<'_> {
    fn is_strict(&self) -> bool {
        matches!(self.node.kind, NodeKind::Output | NodeKind::PixelGrid { .. })
    }

    fn never_target(&self) -> bool {
        matches!(self.node.kind, NodeKind::Input | NodeKind::Bias)
    }
}

fn connection_points(graph: &Graph, group: NodeId) -> Vec<ConnectionPoint<'_>> {
    let mut points = Vec::new();
    for node in graph.members(group) {
        match node.kind {
            NodeKind::PixelGrid { width, height } => {
                points.extend((0..width * height).map(|cell| ConnectionPoint {
                    node,
                    cell: Some(cell),
                }));
            }
            _ => points.push(ConnectionPoint { node, cell: None }),
        }
    }
    points
}

/// Wires that fully connect `source` to `target`
///
/// Routes that break a connection rule are left out. Existing wires are not
/// consulted, so the plan is the same before and after expansion.
pub fn plan(graph: &Graph, source: NodeId, target: NodeId) -> Vec<WireRoute> {
    if source == target {
        return Vec::new();
    }

    let sources = connection_points(graph, source);
    let targets = connection_points(graph, target);

    let mut routes = Vec::new();
    let mut strict_ordinal = 0;
    for point in targets.iter().filter(|p| !p.never_target()) {
        let candidates: &[ConnectionPoint<'_>] = if point.is_strict() {
            let ordinal = strict_ordinal;
            strict_ordinal += 1;
            match sources.get(ordinal) {
                Some(_) => &sources[ordinal..=ordinal],
                None => &[],
            }
        } else {
            &sources
        };

        for from in candidates {
            let target_slot = match point.cell {
                Some(cell) => Slot::Cell(cell),
                None if matches!(from.node.kind, NodeKind::Bias) => Slot::Bias,
                None => Slot::Plain,
            };
            let route = WireRoute {
                source: from.node.id,
                source_slot: from.cell.map(Slot::Cell).unwrap_or_default(),
                target: point.node.id,
                target_slot,
            };
            if graph.check_endpoints(&route.to_wire(1.0)).is_ok() {
                routes.push(route);
            }
        }
    }
    routes
}

fn require_group(graph: &Graph, id: NodeId) -> Result<(), GraphError> {
    match graph.node(id) {
        Some(node) if node.kind.is_group() => Ok(()),
        Some(_) => Err(GraphError::NotAGroup(id)),
        None => Err(GraphError::NodeNotFound(id)),
    }
}

/// Build the command that fully connects `source` to `target`
///
/// Wires that already exist or would be rejected are skipped, so expanding
/// twice yields an empty second command.
pub fn expand(
    graph: &Graph,
    source: NodeId,
    target: NodeId,
    weight: f64,
) -> Result<AddWiresCommand, GraphError> {
    require_group(graph, source)?;
    require_group(graph, target)?;

    let mut wires = Vec::new();
    let mut skipped = 0;
    for route in plan(graph, source, target) {
        if graph.find_route(&route).is_some() {
            continue;
        }
        let wire = route.to_wire(weight);
        match graph.check_wire(&wire) {
            Ok(()) => wires.push(wire),
            Err(e) => {
                tracing::debug!("Skipping macro wire {} -> {}: {}", route.source, route.target, e);
                skipped += 1;
            }
        }
    }

    tracing::debug!(
        "Macro connection {} -> {}: {} new wires, {} skipped",
        source,
        target,
        wires.len(),
        skipped
    );
    Ok(AddWiresCommand::new(wires, "Connect layers"))
}

/// One logical connection standing for a fully wired group pair
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedConnection {
    /// Source group
    pub source: NodeId,
    /// Target group
    pub target: NodeId,
    /// Wires the connection stands for
    pub wires: Vec<WireId>,
}

impl CollapsedConnection {
    /// Group-level route drawn in place of the wires
    pub fn route(&self) -> WireRoute {
        WireRoute {
            source: self.source,
            source_slot: Slot::GroupOut,
            target: self.target,
            target_slot: Slot::GroupIn,
        }
    }
}

/// Collapses fully wired group pairs for display
///
/// Results are cached against the graph version and the raw-connection flag.
#[derive(Debug, Default)]
pub struct Aggregator {
    show_raw: bool,
    selected: IndexSet<WireId>,
    computed_for: Option<(u64, bool)>,
    collapsed: Vec<CollapsedConnection>,
    suppressed: IndexSet<WireId>,
}

impl Aggregator {
    /// Create an aggregator that collapses connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Show every wire instead of collapsing
    pub fn set_show_raw(&mut self, show_raw: bool) {
        self.show_raw = show_raw;
    }

    /// Whether raw wires are shown
    pub fn show_raw(&self) -> bool {
        self.show_raw
    }

    /// Replace the selected wires; selected wires are never hidden
    ///
    /// The next [`Aggregator::refresh`] recomputes the collapsed set.
    pub fn set_selection(&mut self, selected: impl IntoIterator<Item = WireId>) {
        self.selected = selected.into_iter().collect();
        self.computed_for = None;
    }

    /// Recompute if the graph or display mode changed
    ///
    /// Returns whether anything was recomputed.
    pub fn refresh(&mut self, graph: &Graph) -> bool {
        let key = (graph.version(), self.show_raw);
        if self.computed_for == Some(key) {
            return false;
        }

        self.collapsed.clear();
        self.suppressed.clear();
        if !self.show_raw {
            self.detect(graph);
        }
        self.computed_for = Some(key);
        tracing::debug!(
            "Aggregated {} group connections hiding {} wires",
            self.collapsed.len(),
            self.suppressed.len()
        );
        true
    }

    fn detect(&mut self, graph: &Graph) {
        let groups: Vec<NodeId> = graph.groups().map(|g| g.id).collect();
        for &source in &groups {
            for &target in &groups {
                if source == target {
                    continue;
                }

                let routes = plan(graph, source, target);
                if routes.is_empty() {
                    continue;
                }
                let wires: Option<Vec<WireId>> = routes
                    .iter()
                    .map(|route| graph.find_route(route).map(|w| w.id))
                    .collect();
                let Some(wires) = wires else {
                    continue;
                };

                let hidden: Vec<WireId> = wires
                    .iter()
                    .copied()
                    .filter(|id| !self.selected.contains(id))
                    .collect();
                // Nothing left to collapse when the whole pair is selected.
                if hidden.is_empty() {
                    continue;
                }

                self.suppressed.extend(hidden);
                self.collapsed.push(CollapsedConnection { source, target, wires });
            }
        }
    }

    /// Collapsed connections from the last refresh
    pub fn collapsed(&self) -> &[CollapsedConnection] {
        &self.collapsed
    }

    /// Wires hidden behind collapsed connections
    pub fn suppressed(&self) -> &IndexSet<WireId> {
        &self.suppressed
    }

    /// Whether a wire is currently hidden
    pub fn is_hidden(&self, wire: WireId) -> bool {
        self.suppressed.contains(&wire) && !self.selected.contains(&wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::GraphCommand;
    use crate::wire::Wire;

    fn layer(graph: &mut Graph, label: &str, nodes: Vec<Node>) -> (NodeId, Vec<NodeId>) {
        let group = graph.add_node(Node::group(label)).unwrap();
        let ids = nodes
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                graph
                    .add_node(n.in_group(group).with_position(0.0, i as f32 * 50.0))
                    .unwrap()
            })
            .collect();
        (group, ids)
    }

    #[test]
    fn test_dense_expansion() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0), Node::bias()]);
        let (b, units) = layer(&mut graph, "B", vec![Node::perceptron(0.0), Node::perceptron(0.0)]);

        let mut command = expand(&graph, a, b, 1.0).unwrap();
        assert_eq!(command.wires().len(), 6);
        let bias_wires = command
            .wires()
            .iter()
            .filter(|w| w.target_slot == Slot::Bias)
            .count();
        assert_eq!(bias_wires, 2);

        command.execute(&mut graph).unwrap();
        assert_eq!(graph.wires_into(units[0]).count(), 3);
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
        let (b, _) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);

        expand(&graph, a, b, 1.0).unwrap().execute(&mut graph).unwrap();
        let count = graph.wire_count();
        let second = expand(&graph, a, b, 1.0).unwrap();
        assert!(second.wires().is_empty());
        assert_eq!(graph.wire_count(), count);
    }

    #[test]
    fn test_strict_ordinal_mapping() {
        let mut graph = Graph::default();
        let (a, sources) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
        let (b, outputs) = layer(&mut graph, "B", vec![Node::output(), Node::output(), Node::output()]);

        let command = expand(&graph, a, b, 1.0).unwrap();
        let pairs: Vec<_> = command.wires().iter().map(|w| (w.source, w.target)).collect();
        assert_eq!(pairs, vec![(sources[0], outputs[0]), (sources[1], outputs[1])]);
    }

    #[test]
    fn test_pixel_grid_cells_map_one_to_one() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::pixel_grid(2, 2)]);
        let (b, grid) = layer(&mut graph, "B", vec![Node::pixel_grid(2, 2)]);

        let command = expand(&graph, a, b, 1.0).unwrap();
        assert_eq!(command.wires().len(), 4);
        for (i, wire) in command.wires().iter().enumerate() {
            assert_eq!(wire.target, grid[0]);
            assert_eq!(wire.source_slot, Slot::Cell(i));
            assert_eq!(wire.target_slot, Slot::Cell(i));
        }
    }

    #[test]
    fn test_output_refuses_second_wire() {
        let mut graph = Graph::default();
        let stray = graph.add_node(Node::input(0.0)).unwrap();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0)]);
        let (b, outputs) = layer(&mut graph, "B", vec![Node::output()]);
        graph.connect(Wire::new(stray, outputs[0])).unwrap();

        let command = expand(&graph, a, b, 1.0).unwrap();
        assert!(command.wires().is_empty());
    }

    #[test]
    fn test_inputs_are_never_targets() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0)]);
        let (b, _) = layer(&mut graph, "B", vec![Node::input(0.0), Node::bias()]);
        assert!(plan(&graph, a, b).is_empty());
    }

    #[test]
    fn test_empty_group_is_noop() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![]);
        let (b, _) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);
        assert!(expand(&graph, a, b, 1.0).unwrap().wires().is_empty());

        let mut aggregator = Aggregator::new();
        aggregator.refresh(&graph);
        assert!(aggregator.collapsed().is_empty());
    }

    #[test]
    fn test_detect_after_expand() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
        let (b, _) = layer(&mut graph, "B", vec![Node::perceptron(0.0), Node::output()]);

        let mut command = expand(&graph, a, b, 1.0).unwrap();
        command.execute(&mut graph).unwrap();
        let created: IndexSet<WireId> = command.wires().iter().map(|w| w.id).collect();

        let mut aggregator = Aggregator::new();
        assert!(aggregator.refresh(&graph));
        assert_eq!(aggregator.collapsed().len(), 1);
        let collapsed = &aggregator.collapsed()[0];
        assert_eq!((collapsed.source, collapsed.target), (a, b));
        assert_eq!(collapsed.route().source_slot, Slot::GroupOut);
        let covered: IndexSet<WireId> = collapsed.wires.iter().copied().collect();
        assert_eq!(covered, created);
        assert_eq!(aggregator.suppressed(), &created);
    }

    #[test]
    fn test_partial_wiring_not_collapsed() {
        let mut graph = Graph::default();
        let (a, sources) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
        let (b, units) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);
        graph.connect(Wire::new(sources[0], units[0])).unwrap();

        let mut aggregator = Aggregator::new();
        aggregator.refresh(&graph);
        assert!(aggregator.collapsed().is_empty());

        graph.connect(Wire::new(sources[1], units[0])).unwrap();
        aggregator.refresh(&graph);
        assert_eq!(aggregator.collapsed().len(), 1);
        assert!(plan(&graph, b, a).is_empty());
    }

    #[test]
    fn test_refresh_is_memoised() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0)]);
        let (b, _) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);
        expand(&graph, a, b, 1.0).unwrap().execute(&mut graph).unwrap();

        let mut aggregator = Aggregator::new();
        assert!(aggregator.refresh(&graph));
        assert!(!aggregator.refresh(&graph));

        aggregator.set_show_raw(true);
        assert!(aggregator.refresh(&graph));
        assert!(aggregator.collapsed().is_empty());
        assert!(aggregator.suppressed().is_empty());
    }

    #[test]
    fn test_selected_wire_never_hidden() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0)]);
        let (b, _) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);
        let mut command = expand(&graph, a, b, 1.0).unwrap();
        command.execute(&mut graph).unwrap();
        let wire = command.wires()[0].id;

        let mut aggregator = Aggregator::new();
        aggregator.refresh(&graph);
        assert!(aggregator.is_hidden(wire));

        aggregator.set_selection([wire]);
        assert!(!aggregator.is_hidden(wire));
    }

    #[test]
    fn test_fully_selected_pair_stays_expanded() {
        let mut graph = Graph::default();
        let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
        let (b, _) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);
        let mut command = expand(&graph, a, b, 1.0).unwrap();
        command.execute(&mut graph).unwrap();
        let wires: Vec<WireId> = command.wires().iter().map(|w| w.id).collect();

        let mut aggregator = Aggregator::new();
        aggregator.set_selection([wires[0]]);
        aggregator.refresh(&graph);
        assert_eq!(aggregator.collapsed().len(), 1);
        assert!(aggregator.is_hidden(wires[1]));

        aggregator.set_selection(wires.clone());
        assert!(aggregator.refresh(&graph));
        assert!(aggregator.collapsed().is_empty());
        assert!(aggregator.suppressed().is_empty());
    }
}
