// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-module behaviour of editing, aggregation and execution.

use neurograph_engine::aggregation::{expand, plan};
use neurograph_engine::commands::{DeleteNodesCommand, GraphCommand};
use neurograph_engine::executor::topological_order;
use neurograph_engine::ops::{ElementWiseOp, ReductionOp};
use neurograph_engine::{
    execute, Aggregator, ConnectionError, Graph, History, Node, NodeId, Slot, Snapshot,
    TensorOperation, Wire,
};

fn layer(graph: &mut Graph, label: &str, nodes: Vec<Node>) -> (NodeId, Vec<NodeId>) {
    let group = graph.add_node(Node::group(label)).unwrap();
    let members = nodes
        .into_iter()
        .enumerate()
        .map(|(i, node)| {
            graph
                .add_node(node.in_group(group).with_position(0.0, i as f32 * 40.0))
                .unwrap()
        })
        .collect();
    (group, members)
}

#[test]
fn topological_order_is_a_linearisation() {
    let mut graph = Graph::default();
    let (a, _) = layer(&mut graph, "In", vec![Node::input(1.0), Node::input(0.0), Node::bias()]);
    let (b, _) = layer(&mut graph, "Hidden", vec![Node::perceptron(0.5), Node::perceptron(1.5)]);
    let (c, _) = layer(&mut graph, "Out", vec![Node::output(), Node::output()]);
    expand(&graph, a, b, 1.0).unwrap().execute(&mut graph).unwrap();
    expand(&graph, b, c, 1.0).unwrap().execute(&mut graph).unwrap();

    let snapshot = Snapshot::from_graph(&graph);
    let (order, stuck) = topological_order(&snapshot.nodes, &snapshot.wires);
    assert!(stuck.is_empty());
    assert_eq!(order.len(), snapshot.nodes.len());
    for wire in &snapshot.wires {
        let source = order.iter().position(|&n| n == wire.source).unwrap();
        let target = order.iter().position(|&n| n == wire.target).unwrap();
        assert!(source < target);
    }
}

#[test]
fn threshold_unit_fires_on_weighted_sum() {
    for (value, expected) in [(1.0, 1.0), (0.0, 0.0)] {
        let mut graph = Graph::default();
        let input = graph.add_node(Node::input(value)).unwrap();
        let unit = graph.add_node(Node::perceptron(1.0)).unwrap();
        graph.connect(Wire::new(input, unit).with_weight(2.0)).unwrap();

        let report = execute(&Snapshot::from_graph(&graph));
        graph.apply_report(&report);
        assert_eq!(graph.node(unit).unwrap().output, vec![expected]);
    }
}

#[test]
fn expansion_is_idempotent_and_detected() {
    let mut graph = Graph::default();
    let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0), Node::bias()]);
    let (b, _) = layer(
        &mut graph,
        "B",
        vec![Node::perceptron(0.0), Node::mcculloch_pitts(1.0), Node::output()],
    );

    let mut first = expand(&graph, a, b, 1.0).unwrap();
    first.execute(&mut graph).unwrap();
    let wire_count = graph.wire_count();
    assert!(expand(&graph, a, b, 1.0).unwrap().wires().is_empty());
    assert_eq!(graph.wire_count(), wire_count);

    let mut aggregator = Aggregator::new();
    aggregator.refresh(&graph);
    assert_eq!(aggregator.collapsed().len(), 1);

    let mut covered = aggregator.collapsed()[0].wires.clone();
    let mut created: Vec<_> = first.wires().iter().map(|w| w.id).collect();
    covered.sort();
    created.sort();
    assert_eq!(covered, created);
}

#[test]
fn pixel_grid_receives_one_wire_per_cell() {
    let mut graph = Graph::default();
    let sources: Vec<Node> = (0..4).map(|_| Node::input(1.0)).collect();
    let (a, _) = layer(&mut graph, "A", sources);
    let (b, grids) = layer(&mut graph, "B", vec![Node::pixel_grid(2, 2)]);

    let mut command = expand(&graph, a, b, 1.0).unwrap();
    command.execute(&mut graph).unwrap();

    let mut cells: Vec<usize> = graph
        .wires_into(grids[0])
        .map(|w| match w.target_slot {
            Slot::Cell(i) => i,
            other => panic!("unexpected slot {other}"),
        })
        .collect();
    cells.sort_unstable();
    assert_eq!(cells, vec![0, 1, 2, 3]);

    let report = execute(&Snapshot::from_graph(&graph));
    assert_eq!(report.outputs[&grids[0]], vec![1.0; 4]);
}

#[test]
fn output_never_accepts_second_wire() {
    let mut graph = Graph::default();
    let (a, sources) = layer(&mut graph, "A", vec![Node::input(0.0)]);
    let (b, outputs) = layer(&mut graph, "B", vec![Node::output()]);
    expand(&graph, a, b, 1.0).unwrap().execute(&mut graph).unwrap();
    assert_eq!(graph.wires_into(outputs[0]).count(), 1);

    let extra = graph.add_node(Node::input(1.0)).unwrap();
    assert_eq!(
        graph.connect(Wire::new(extra, outputs[0])),
        Err(ConnectionError::OutputAlreadyConnected(outputs[0]))
    );
    assert_eq!(plan(&graph, a, b).len(), 1);
    assert_eq!(graph.wires_into(outputs[0]).next().unwrap().source, sources[0]);
}

#[test]
fn reductions_over_three_inputs() {
    let mut graph = Graph::default();
    let inputs: Vec<NodeId> = [2.0, 3.0, 4.0]
        .into_iter()
        .map(|v| graph.add_node(Node::input(v)).unwrap())
        .collect();

    let ops: Vec<(ReductionOp, f64)> = vec![
        (ReductionOp::Sum, 9.0),
        (ReductionOp::Mean, 3.0),
        (ReductionOp::Max, 4.0),
    ];
    let mut op_ids = Vec::new();
    for (op, _) in &ops {
        let id = graph
            .add_node(Node::tensor_op(TensorOperation::Reduction(*op)))
            .unwrap();
        for &input in &inputs {
            graph.connect(Wire::new(input, id)).unwrap();
        }
        op_ids.push(id);
    }

    let report = execute(&Snapshot::from_graph(&graph));
    for ((_, expected), id) in ops.iter().zip(&op_ids) {
        assert_eq!(report.outputs[id], vec![*expected]);
        assert_eq!(report.shapes[id], vec![1]);
    }
}

#[test]
fn deleting_a_node_removes_its_wires_and_undo_restores_them() {
    let mut graph = Graph::default();
    let mut history = History::new();
    let (a, _) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
    let (b, units) = layer(&mut graph, "B", vec![Node::perceptron(0.0), Node::perceptron(0.0)]);
    history
        .execute(Box::new(expand(&graph, a, b, 1.0).unwrap()), &mut graph)
        .unwrap();
    assert_eq!(graph.wire_count(), 4);

    history
        .execute(Box::new(DeleteNodesCommand::new(vec![units[0]])), &mut graph)
        .unwrap();
    assert_eq!(graph.wire_count(), 2);
    assert!(graph.wires().all(|w| !w.involves_node(units[0])));

    history.undo(&mut graph).unwrap();
    assert!(graph.node(units[0]).is_some());
    assert_eq!(graph.wire_count(), 4);
}

#[test]
fn undo_of_macro_expansion_removes_exactly_its_wires() {
    let mut graph = Graph::default();
    let mut history = History::new();
    let (a, sources) = layer(&mut graph, "A", vec![Node::input(0.0), Node::input(0.0)]);
    let (b, units) = layer(&mut graph, "B", vec![Node::perceptron(0.0)]);
    let manual = graph.connect(Wire::new(sources[0], units[0])).unwrap();

    history
        .execute(Box::new(expand(&graph, a, b, 1.0).unwrap()), &mut graph)
        .unwrap();
    assert_eq!(graph.wire_count(), 2);

    history.undo(&mut graph).unwrap();
    assert_eq!(graph.wire_count(), 1);
    assert!(graph.wire(manual).is_some());

    history.redo(&mut graph).unwrap();
    assert_eq!(graph.wire_count(), 2);

    let mut aggregator = Aggregator::new();
    aggregator.refresh(&graph);
    assert_eq!(aggregator.collapsed()[0].wires.len(), 2);
}

#[test]
fn cycle_nodes_keep_stale_output() {
    let mut graph = Graph::default();
    let a = graph.add_node(Node::perceptron(0.0)).unwrap();
    let b = graph.add_node(Node::perceptron(0.0)).unwrap();
    graph.connect(Wire::new(a, b)).unwrap();
    graph.connect(Wire::new(b, a)).unwrap();

    let report = execute(&Snapshot::from_graph(&graph));
    assert!(report.outputs.is_empty());
    assert_eq!(report.unevaluated, vec![a, b]);

    graph.apply_report(&report);
    assert_eq!(graph.node(a).unwrap().output, vec![0.0]);
}

#[test]
fn unaddressed_element_wise_inputs_sum_before_the_op() {
    let mut graph = Graph::default();
    let a = graph.add_node(Node::input(6.0)).unwrap();
    let b = graph.add_node(Node::input(2.0)).unwrap();
    let sub = graph
        .add_node(Node::tensor_op(TensorOperation::ElementWise(ElementWiseOp::Sub)))
        .unwrap();
    graph.connect(Wire::new(a, sub)).unwrap();
    graph.connect(Wire::new(b, sub)).unwrap();

    let report = execute(&Snapshot::from_graph(&graph));
    assert_eq!(report.outputs[&sub], vec![8.0]);
    assert_eq!(report.shapes[&sub], vec![1]);
}
