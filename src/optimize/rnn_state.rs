use super::diagnostics::Diagnostics;
use super::PeepholePass;
use crate::graph::{AttrName, AttrValue, Graph, NodeId, NodeKind, Tensor, ValueId};

/// Input index of the initial hidden state of `RNN`, `GRU` and `LSTM`.
const HIDDEN_STATE_INPUT: usize = 5;

/// Input index of the initial cell state of `LSTM`.
const CELL_STATE_INPUT: usize = 6;

/// Replace a constant default initial hidden state of a recurrent node with a
/// zero fill whose shape is computed from the node's input at runtime.
///
/// Tracing records the default state as a constant of the batch size seen
/// while tracing, which would fix the exported model to that batch size.
pub struct FixDefaultHiddenState;

impl PeepholePass for FixDefaultHiddenState {
    fn name(&self) -> &'static str {
        "fix_default_rnn_hidden_state"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let node = graph.node(id);
            if !node.kind().is_rnn() || node.inputs().len() <= HIDDEN_STATE_INPUT {
                continue;
            }
            fix_default_state(graph, diag, id, HIDDEN_STATE_INPUT);
        }
    }
}

/// Like [`FixDefaultHiddenState`], for the initial cell state of `LSTM`.
pub struct FixDefaultCellState;

impl PeepholePass for FixDefaultCellState {
    fn name(&self) -> &'static str {
        "fix_default_lstm_cell_state"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let node = graph.node(id);
            if node.kind() != NodeKind::Lstm || node.inputs().len() <= CELL_STATE_INPUT {
                continue;
            }
            fix_default_state(graph, diag, id, CELL_STATE_INPUT);
        }
    }
}

/// Return true if `value` is a traced default state, ie. a constant or a
/// slice of a constant.
fn is_default_state(graph: &Graph, value: ValueId) -> bool {
    let (_, source) = graph.source_node(value);
    match source.kind() {
        NodeKind::Constant => true,
        NodeKind::Slice => source
            .inputs()
            .first()
            .is_some_and(|&input| graph.source_kind(input) == NodeKind::Constant),
        _ => false,
    }
}

/// Insert a single-output node before `anchor` and return its output.
fn insert_op<A>(
    graph: &mut Graph,
    anchor: NodeId,
    kind: NodeKind,
    inputs: &[ValueId],
    attrs: A,
) -> ValueId
where
    A: IntoIterator<Item = (AttrName, AttrValue)>,
{
    let id = graph.create(kind, 1);
    graph.insert_before(id, anchor);
    for &input in inputs {
        graph.push_input(id, input);
    }
    let node = graph.node_mut(id);
    for (name, value) in attrs {
        node.set_attr(name, value);
    }
    node.output()
}

/// Replace input `input_index` of recurrent node `rnn` with a computed zero
/// state of shape `[num_directions, batch_size, hidden_size]`, if the current
/// input is a traced default state.
///
/// `batch_size` is read from dimension 1 of the shape of the node's first
/// input. The replaced state's producer is removed if it has no other uses.
///
/// Panics if the node has no `hidden_size` attribute.
fn fix_default_state(graph: &mut Graph, diag: &Diagnostics, rnn: NodeId, input_index: usize) {
    let node = graph.node(rnn);
    let initial_state = node.inputs()[input_index];
    if !is_default_state(graph, initial_state) {
        return;
    }
    let x = node.inputs()[0];
    let hidden_size = *node.attrs().i(AttrName::HiddenSize);
    let num_directions = match node.attrs().get_s(AttrName::Direction) {
        Some(direction) if direction == "bidirectional" => 2,
        _ => 1,
    };

    let axes_0 = || [(AttrName::Axes, AttrValue::Ints(vec![0]))];
    let constant = |value: Tensor| [(AttrName::Value, AttrValue::Tensor(value))];

    let shape = insert_op(graph, rnn, NodeKind::Shape, &[x], []);
    let batch_index = insert_op(
        graph,
        rnn,
        NodeKind::Constant,
        &[],
        constant(Tensor::scalar_i64(1)),
    );
    let batch_size = insert_op(graph, rnn, NodeKind::Gather, &[shape, batch_index], []);
    let batch_size = insert_op(graph, rnn, NodeKind::Unsqueeze, &[batch_size], axes_0());
    let hidden = insert_op(
        graph,
        rnn,
        NodeKind::Constant,
        &[],
        constant(Tensor::vector_i64(&[hidden_size])),
    );
    let directions = insert_op(
        graph,
        rnn,
        NodeKind::Constant,
        &[],
        constant(Tensor::scalar_i64(num_directions)),
    );
    let directions = insert_op(graph, rnn, NodeKind::Unsqueeze, &[directions], axes_0());
    let state_shape = insert_op(
        graph,
        rnn,
        NodeKind::Concat,
        &[directions, batch_size, hidden],
        [(AttrName::Axis, AttrValue::Int(0))],
    );
    graph.set_shape(state_shape, [3]);
    let zeros = insert_op(
        graph,
        rnn,
        NodeKind::ConstantFill,
        &[state_shape],
        [(AttrName::InputAsShape, AttrValue::Int(1))],
    );
    if let Some(&[_, batch, _]) = graph.value(x).shape().dims() {
        graph.set_shape(zeros, [num_directions as usize, batch, hidden_size as usize]);
    }

    graph.replace_input(rnn, input_index, zeros);
    diag.info(
        graph,
        rnn,
        format_args!("replaced constant initial state at input {}", input_index),
    );

    if !graph.has_uses(initial_state) {
        let source = graph.source_node(initial_state).0;
        graph.destroy(source);
    }
}
