//! Tools to simplify building graphs in tests.

use super::{AttrName, AttrValue, Graph, NodeId, NodeKind, Tensor, TensorShape, ValueId};

/// Extends [`Graph`] with methods that append common operators and return
/// their outputs.
///
/// For example `graph.transpose(x, &[1, 0])` appends a `Transpose` node with
/// input `x` and returns the node's output.
pub trait GraphBuilder {
    /// Append a single-output operator with the given inputs and attributes.
    fn op<A>(&mut self, kind: NodeKind, inputs: &[ValueId], attrs: A) -> ValueId
    where
        A: IntoIterator<Item = (AttrName, AttrValue)>;

    fn constant(&mut self, value: Tensor) -> ValueId;

    fn transpose(&mut self, input: ValueId, perm: &[i64]) -> ValueId;

    /// Append an `Expand` node whose output has the shape `to`.
    fn expand(&mut self, input: ValueId, to: &[usize]) -> ValueId;

    /// Append a `PackPadded` node, returning its (data, lengths) outputs.
    fn pack_padded(&mut self, data: ValueId, lengths: ValueId) -> (ValueId, ValueId);

    /// Append a `PadPacked` node, returning its (padded, lengths) outputs.
    fn pad_packed(&mut self, packed: ValueId, lengths: ValueId) -> (ValueId, ValueId);

    /// Append a recurrent node with the standard number of outputs for its
    /// kind and return the node ID.
    fn recurrent(
        &mut self,
        kind: NodeKind,
        inputs: &[ValueId],
        hidden_size: i64,
        direction: Option<&str>,
    ) -> NodeId;

    /// Mark each value as a graph output.
    fn register_outputs(&mut self, values: &[ValueId]);
}

impl GraphBuilder for Graph {
    fn op<A>(&mut self, kind: NodeKind, inputs: &[ValueId], attrs: A) -> ValueId
    where
        A: IntoIterator<Item = (AttrName, AttrValue)>,
    {
        let id = self.append_node(kind, inputs, 1);
        let node = self.node_mut(id);
        for (name, value) in attrs {
            node.set_attr(name, value);
        }
        node.output()
    }

    fn constant(&mut self, value: Tensor) -> ValueId {
        let shape = TensorShape::from(value.shape());
        let output = self.op(
            NodeKind::Constant,
            &[],
            [(AttrName::Value, AttrValue::Tensor(value))],
        );
        self.set_shape(output, shape);
        output
    }

    fn transpose(&mut self, input: ValueId, perm: &[i64]) -> ValueId {
        self.op(
            NodeKind::Transpose,
            &[input],
            [(AttrName::Perm, AttrValue::Ints(perm.to_vec()))],
        )
    }

    fn expand(&mut self, input: ValueId, to: &[usize]) -> ValueId {
        let size = to.iter().map(|&d| d as i64).collect();
        let output = self.op(
            NodeKind::Expand,
            &[input],
            [(AttrName::Size, AttrValue::Ints(size))],
        );
        self.set_shape(output, to);
        output
    }

    fn pack_padded(&mut self, data: ValueId, lengths: ValueId) -> (ValueId, ValueId) {
        let id = self.append_node(NodeKind::PackPadded, &[data, lengths], 2);
        let outputs = self.node(id).outputs();
        (outputs[0], outputs[1])
    }

    fn pad_packed(&mut self, packed: ValueId, lengths: ValueId) -> (ValueId, ValueId) {
        let id = self.append_node(NodeKind::PadPacked, &[packed, lengths], 2);
        let outputs = self.node(id).outputs();
        (outputs[0], outputs[1])
    }

    fn recurrent(
        &mut self,
        kind: NodeKind,
        inputs: &[ValueId],
        hidden_size: i64,
        direction: Option<&str>,
    ) -> NodeId {
        assert!(kind.is_rnn(), "{} is not a recurrent operator", kind);
        let num_outputs = if kind == NodeKind::Lstm { 3 } else { 2 };
        let id = self.append_node(kind, inputs, num_outputs);
        let node = self.node_mut(id);
        node.set_attr(AttrName::HiddenSize, AttrValue::Int(hidden_size));
        if let Some(direction) = direction {
            node.set_attr(AttrName::Direction, AttrValue::String(direction.into()));
        }
        id
    }

    fn register_outputs(&mut self, values: &[ValueId]) {
        for &value in values {
            self.register_output(value);
        }
    }
}
