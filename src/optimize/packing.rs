use rustc_hash::FxHashSet;

use super::diagnostics::Diagnostics;
use super::PeepholePass;
use crate::graph::{Graph, NodeId, NodeKind, Use, ValueId};

/// Move each `PackPadded` whose packed output feeds exactly one recurrent
/// node to just after that node, so the recurrent node consumes the padded
/// data directly.
///
/// The new `PackPadded` packs the recurrent node's first output. Consumers of
/// that output, and of the old pack's lengths, are redirected to the new
/// pack. Stacked layers are handled in a single traversal because the new
/// pack is visited after the node it follows.
pub struct PushPackingPastRnn;

impl PeepholePass for PushPackingPastRnn {
    fn name(&self) -> &'static str {
        "push_packing_past_rnn"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let pack = graph.node(id);
            if pack.kind() != NodeKind::PackPadded {
                continue;
            }
            let (&[data_in, lengths_in], &[packed, lengths]) = (pack.inputs(), pack.outputs())
            else {
                continue;
            };

            let &[Use { user: rnn, .. }] = graph.uses(packed) else {
                if graph.uses(packed).len() > 1 {
                    diag.warn(
                        graph,
                        id,
                        format_args!("packed output has multiple consumers"),
                    );
                }
                continue;
            };
            let rnn_node = graph.node(rnn);
            if !rnn_node.kind().is_rnn() {
                continue;
            }
            let Some(&rnn_out) = rnn_node.outputs().first() else {
                continue;
            };
            if !lengths_follow_rnn(graph, lengths, rnn) {
                diag.warn(
                    graph,
                    id,
                    format_args!("lengths are consumed before {} {}", rnn_node.kind(), rnn),
                );
                continue;
            }

            graph.replace_all_uses_with(packed, data_in);
            if graph.has_uses(lengths) {
                graph.replace_first_use_with(lengths, lengths_in);
            }

            let new_pack = graph.create(NodeKind::PackPadded, 2);
            graph.insert_after(new_pack, rnn);
            let outputs = graph.node(new_pack).outputs();
            let (new_packed, new_lengths) = (outputs[0], outputs[1]);
            graph.replace_all_uses_with(rnn_out, new_packed);
            graph.replace_all_uses_with(lengths, new_lengths);
            graph.push_input(new_pack, rnn_out);
            graph.push_input(new_pack, lengths_in);

            diag.info(
                graph,
                rnn,
                format_args!("moved PackPadded {} after this node as {}", id, new_pack),
            );
            cursor.destroy_current(graph);
        }
    }
}

/// Return true if the lengths output of a pack can move behind `rnn`.
///
/// The first use of `lengths` is redirected to the pack's input and every
/// other use to the new pack after `rnn`. That requires the first use to be
/// `rnn` itself and every other user to come after `rnn` in the node list.
/// A second use by `rnn` would read the new pack, so it also fails.
/// Use-list order is registration order, so the node list is walked.
fn lengths_follow_rnn(graph: &Graph, lengths: ValueId, rnn: NodeId) -> bool {
    let (first, rest) = match graph.uses(lengths) {
        [] => return true,
        [first, rest @ ..] => (first, rest),
    };
    if first.user != rnn {
        return false;
    }
    if rest.is_empty() {
        return true;
    }

    let later: FxHashSet<NodeId> =
        std::iter::successors(graph.next_node(rnn), |&id| graph.next_node(id)).collect();
    rest.iter()
        .all(|u| u.user == graph.return_node() || later.contains(&u.user))
}

/// Cancel `PadPacked(PackPadded(x, lengths))` pairs, redirecting uses of the
/// unpacked outputs to the pack's inputs.
///
/// The `PackPadded` is also removed once neither of its outputs has uses.
pub struct RemoveNopPacking;

impl PeepholePass for RemoveNopPacking {
    fn name(&self) -> &'static str {
        "remove_nop_packing"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let unpack = graph.node(id);
            if unpack.kind() != NodeKind::PadPacked {
                continue;
            }
            let (&[packed, lengths], &[padded, unpacked_lengths]) =
                (unpack.inputs(), unpack.outputs())
            else {
                continue;
            };

            let (pack_id, pack) = graph.source_node(packed);
            if pack.kind() != NodeKind::PackPadded {
                continue;
            }
            let (&[data_in, lengths_in], &[pack_data, pack_lengths]) =
                (pack.inputs(), pack.outputs())
            else {
                continue;
            };
            if pack_data != packed || pack_lengths != lengths {
                continue;
            }

            graph.replace_all_uses_with(padded, data_in);
            graph.replace_all_uses_with(unpacked_lengths, lengths_in);
            graph.remove_all_inputs(id);
            diag.info(
                graph,
                id,
                format_args!("cancelled with PackPadded {}", pack_id),
            );

            let pack_used = graph
                .node(pack_id)
                .outputs()
                .iter()
                .any(|&output| graph.has_uses(output));
            if !pack_used {
                graph.destroy(pack_id);
            }
            cursor.destroy_current(graph);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PushPackingPastRnn, RemoveNopPacking};
    use crate::graph::builder::GraphBuilder;
    use crate::graph::{Graph, NodeId, NodeKind, ValueId};
    use crate::optimize::diagnostics::{DiagnosticLevel, Diagnostics};
    use crate::optimize::PeepholePass;

    fn run_pass(pass: &dyn PeepholePass, graph: &mut Graph) {
        pass.run(graph, &Diagnostics::default());
        graph.check().unwrap();
    }

    fn node_kinds(graph: &Graph) -> Vec<NodeKind> {
        graph.iter().map(|(_, node)| node.kind()).collect()
    }

    fn output(graph: &Graph, node: NodeId, index: usize) -> ValueId {
        graph.node(node).outputs()[index]
    }

    /// Build `PadPacked(RNN(PackPadded(x, lengths)))` and return
    /// `(x, lengths, rnn, padded)`.
    fn packed_rnn(graph: &mut Graph, kind: NodeKind) -> (ValueId, ValueId, NodeId, ValueId) {
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, packed_lengths) = graph.pack_padded(x, lengths);
        let rnn = graph.recurrent(kind, &[packed, packed_lengths], 4, None);
        let rnn_out = output(graph, rnn, 0);
        let (padded, _) = graph.pad_packed(rnn_out, packed_lengths);
        graph.register_output(padded);
        (x, lengths, rnn, padded)
    }

    #[test]
    fn test_push_packing_past_rnn() {
        let mut graph = Graph::new();
        let (x, lengths, rnn, padded) = packed_rnn(&mut graph, NodeKind::Lstm);

        run_pass(&PushPackingPastRnn, &mut graph);

        assert_eq!(
            node_kinds(&graph),
            [NodeKind::Lstm, NodeKind::PackPadded, NodeKind::PadPacked]
        );
        assert_eq!(graph.node(rnn).inputs(), &[x, lengths]);

        let new_pack = graph.next_node(rnn).unwrap();
        let rnn_out = output(&graph, rnn, 0);
        assert_eq!(graph.node(new_pack).inputs(), &[rnn_out, lengths]);
        assert_eq!(
            graph.source_node(padded).1.inputs(),
            graph.node(new_pack).outputs()
        );
    }

    #[test]
    fn test_push_then_cancel_packing() {
        for kind in [NodeKind::Rnn, NodeKind::Gru, NodeKind::Lstm] {
            let mut graph = Graph::new();
            let (x, lengths, rnn, padded) = packed_rnn(&mut graph, kind);

            run_pass(&PushPackingPastRnn, &mut graph);
            run_pass(&RemoveNopPacking, &mut graph);

            assert_eq!(node_kinds(&graph), [kind]);
            assert_eq!(graph.node(rnn).inputs(), &[x, lengths]);
            assert_eq!(graph.output_ids(), &[output(&graph, rnn, 0)]);
            assert!(graph.get_value(padded).is_none());
        }
    }

    #[test]
    fn test_push_packing_past_stacked_rnns() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, packed_lengths) = graph.pack_padded(x, lengths);
        let layer1 = graph.recurrent(NodeKind::Gru, &[packed, packed_lengths], 4, None);
        let layer1_out = output(&graph, layer1, 0);
        let layer2 = graph.recurrent(NodeKind::Gru, &[layer1_out, packed_lengths], 4, None);
        let layer2_out = output(&graph, layer2, 0);
        let (padded, _) = graph.pad_packed(layer2_out, packed_lengths);
        graph.register_output(padded);

        run_pass(&PushPackingPastRnn, &mut graph);
        run_pass(&RemoveNopPacking, &mut graph);

        assert_eq!(node_kinds(&graph), [NodeKind::Gru, NodeKind::Gru]);
        assert_eq!(graph.node(layer1).inputs(), &[x, lengths]);
        assert_eq!(graph.node(layer2).inputs(), &[layer1_out, lengths]);
        assert_eq!(graph.output_ids(), &[layer2_out]);
    }

    #[test]
    fn test_push_requires_single_rnn_consumer() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, packed_lengths) = graph.pack_padded(x, lengths);
        let rnn = graph.recurrent(NodeKind::Rnn, &[packed, packed_lengths], 4, None);
        let relu = graph.op(NodeKind::Relu, &[packed], []);
        graph.register_outputs(&[output(&graph, rnn, 0), relu]);

        run_pass(&PushPackingPastRnn, &mut graph);

        assert_eq!(
            node_kinds(&graph),
            [NodeKind::PackPadded, NodeKind::Rnn, NodeKind::Relu]
        );
        assert_eq!(graph.node(rnn).inputs(), &[packed, packed_lengths]);
    }

    #[test]
    fn test_push_requires_rnn_consumer() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, _) = graph.pack_padded(x, lengths);
        let tanh = graph.op(NodeKind::Tanh, &[packed], []);
        graph.register_output(tanh);

        run_pass(&PushPackingPastRnn, &mut graph);

        assert_eq!(node_kinds(&graph), [NodeKind::PackPadded, NodeKind::Tanh]);
        assert_eq!(graph.source_node(tanh).1.inputs(), &[packed]);
    }

    #[test]
    fn test_push_requires_rnn_to_consume_lengths_first() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, packed_lengths) = graph.pack_padded(x, lengths);
        let relu = graph.op(NodeKind::Relu, &[packed_lengths], []);
        let rnn = graph.recurrent(NodeKind::Rnn, &[packed, packed_lengths], 4, None);
        graph.register_outputs(&[output(&graph, rnn, 0), relu]);

        let diag = Diagnostics::new(DiagnosticLevel::Warn);
        PushPackingPastRnn.run(&mut graph, &diag);

        assert_eq!(
            node_kinds(&graph),
            [NodeKind::PackPadded, NodeKind::Relu, NodeKind::Rnn]
        );
        assert_eq!(graph.node(rnn).inputs(), &[packed, packed_lengths]);
        assert_eq!(diag.warned_count(), 1);
    }

    #[test]
    fn test_push_requires_earlier_lengths_users_to_stay() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, packed_lengths) = graph.pack_padded(x, lengths);
        let rnn = graph.recurrent(NodeKind::Rnn, &[packed, packed_lengths], 4, None);

        // The Relu registers its use after the recurrent node but sits before
        // it in the node list.
        let relu = graph.create(NodeKind::Relu, 1);
        graph.push_input(relu, packed_lengths);
        graph.insert_before(relu, rnn);
        let relu_out = graph.node(relu).output();
        graph.register_outputs(&[output(&graph, rnn, 0), relu_out]);
        graph.check().unwrap();

        let diag = Diagnostics::new(DiagnosticLevel::Warn);
        PushPackingPastRnn.run(&mut graph, &diag);
        graph.check().unwrap();

        assert_eq!(
            node_kinds(&graph),
            [NodeKind::PackPadded, NodeKind::Relu, NodeKind::Rnn]
        );
        assert_eq!(graph.node(rnn).inputs(), &[packed, packed_lengths]);
        assert_eq!(graph.node(relu).inputs(), &[packed_lengths]);
        assert_eq!(diag.warned_count(), 1);
    }

    #[test]
    fn test_cancel_keeps_used_pack() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let (packed, packed_lengths) = graph.pack_padded(x, lengths);
        let (padded, padded_lengths) = graph.pad_packed(packed, packed_lengths);
        let relu = graph.op(NodeKind::Relu, &[packed], []);
        graph.register_outputs(&[padded, padded_lengths, relu]);

        run_pass(&RemoveNopPacking, &mut graph);

        assert_eq!(node_kinds(&graph), [NodeKind::PackPadded, NodeKind::Relu]);
        assert_eq!(graph.output_ids()[..2], [x, lengths]);
    }

    #[test]
    fn test_cancel_requires_matching_lengths() {
        let mut graph = Graph::new();
        let x = graph.add_input([7, 2, 3]);
        let lengths = graph.add_input([2]);
        let other_lengths = graph.add_input([2]);
        let (packed, _) = graph.pack_padded(x, lengths);
        let (padded, _) = graph.pad_packed(packed, other_lengths);
        graph.register_output(padded);

        run_pass(&RemoveNopPacking, &mut graph);

        assert_eq!(
            node_kinds(&graph),
            [NodeKind::PackPadded, NodeKind::PadPacked]
        );
        assert_eq!(graph.output_ids(), &[padded]);
    }
}
