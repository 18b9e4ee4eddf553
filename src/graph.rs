//! Graph IR for traced computations.
//!
//! A [`Graph`] owns arenas of [`Node`]s and [`Value`]s addressed by
//! [`NodeId`] and [`ValueId`]. Each value is produced by exactly one node and
//! keeps a list of its [`Use`]s, which every mutation method updates. Nodes
//! that are part of the computation are kept in a linked list whose order is a
//! valid topological order.
//!
//! Graph inputs are the outputs of a hidden `Param` node and graph outputs are
//! the inputs of a hidden `Return` node. Neither is part of the node list.
//! This means a value that is a graph output always has a use, so it is never
//! considered dead.

use std::error::Error;
use std::fmt;

use rustc_hash::FxHashMap;

mod attrs;
#[cfg(test)]
pub mod builder;
mod node;
mod node_id;

#[cfg(test)]
mod tests;

pub use attrs::{AttrName, AttrValue, Attributes, Tensor, TensorData};
pub use node::{Node, NodeKind, TensorShape, Use, Value};
pub use node_id::{NodeId, ValueId};

/// Errors reported by [`Graph::check`].
#[derive(Clone, Debug, PartialEq)]
pub enum GraphError {
    /// A node refers to a value which does not exist.
    InvalidValue { node: NodeId, value: ValueId },

    /// A value's use list does not mirror the node inputs that refer to it.
    UseListMismatch { value: ValueId },

    /// A value's recorded producer does not list it as an output.
    ProducerMismatch { value: ValueId },

    /// A node uses a value which is produced after it in the node list, or
    /// by a node which is not in the list.
    NotTopological { node: NodeId, value: ValueId },

    /// The links of the node list are inconsistent.
    BrokenNodeList { node: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GraphError::InvalidValue { node, value } => {
                write!(f, "node {} refers to missing value {}", node, value)
            }
            GraphError::UseListMismatch { value } => {
                write!(f, "use list of value {} does not match node inputs", value)
            }
            GraphError::ProducerMismatch { value } => {
                write!(f, "value {} is not an output of its producer", value)
            }
            GraphError::NotTopological { node, value } => {
                write!(f, "node {} uses value {} before it is produced", node, value)
            }
            GraphError::BrokenNodeList { node } => {
                write!(f, "node list is broken at node {}", node)
            }
        }
    }
}

impl Error for GraphError {}

/// Dataflow graph of operator nodes.
pub struct Graph {
    nodes: Vec<Option<Node>>,
    values: Vec<Option<Value>>,

    /// Head and tail of the node list.
    first: Option<NodeId>,
    last: Option<NodeId>,

    /// Number of nodes in the node list.
    len: usize,

    param_node: NodeId,
    return_node: NodeId,
}

impl Graph {
    /// Create an empty graph with no inputs or outputs.
    pub fn new() -> Graph {
        let mut graph = Graph {
            nodes: Vec::new(),
            values: Vec::new(),
            first: None,
            last: None,
            len: 0,
            param_node: NodeId::from_u32(0),
            return_node: NodeId::from_u32(1),
        };
        graph.param_node = graph.alloc_node(NodeKind::Param);
        graph.return_node = graph.alloc_node(NodeKind::Return);
        graph
    }

    fn alloc_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Some(Node::new(kind)));
        id
    }

    fn add_output(&mut self, node_id: NodeId, shape: TensorShape) -> ValueId {
        let value_id = ValueId::from_index(self.values.len());
        let node = self.node_entry_mut(node_id);
        let offset = node.outputs.len();
        node.outputs.push(value_id);
        self.values.push(Some(Value {
            shape,
            node: node_id,
            offset,
            uses: Vec::new(),
        }));
        value_id
    }

    /// Add a graph input and return its value.
    pub fn add_input(&mut self, shape: impl Into<TensorShape>) -> ValueId {
        self.add_output(self.param_node, shape.into())
    }

    /// Mark a value as a graph output.
    pub fn register_output(&mut self, value: ValueId) {
        self.push_input(self.return_node, value);
    }

    /// Return the values that are inputs to the graph.
    pub fn input_ids(&self) -> &[ValueId] {
        self.node(self.param_node).outputs()
    }

    /// Return the values that are outputs of the graph.
    pub fn output_ids(&self) -> &[ValueId] {
        self.node(self.return_node).inputs()
    }

    /// Return the ID of the pseudo-node which produces the graph inputs.
    pub fn param_node(&self) -> NodeId {
        self.param_node
    }

    /// Return the ID of the pseudo-node which consumes the graph outputs.
    pub fn return_node(&self) -> NodeId {
        self.return_node
    }

    /// Create a node with `num_outputs` fresh outputs.
    ///
    /// The node is not part of the node list until it is inserted with
    /// [`append`](Graph::append), [`insert_before`](Graph::insert_before) or
    /// [`insert_after`](Graph::insert_after).
    pub fn create(&mut self, kind: NodeKind, num_outputs: usize) -> NodeId {
        assert!(
            !matches!(kind, NodeKind::Param | NodeKind::Return),
            "cannot create {} nodes",
            kind
        );
        let id = self.alloc_node(kind);
        for _ in 0..num_outputs {
            self.add_output(id, TensorShape::Unknown);
        }
        id
    }

    /// Create a node, connect its inputs and append it to the node list.
    pub fn append_node(
        &mut self,
        kind: NodeKind,
        inputs: &[ValueId],
        num_outputs: usize,
    ) -> NodeId {
        let id = self.create(kind, num_outputs);
        for &input in inputs {
            self.push_input(id, input);
        }
        self.append(id);
        id
    }

    /// Add `node` to the end of the node list.
    pub fn append(&mut self, node: NodeId) {
        self.link(node, self.last, None);
    }

    /// Add `node` to the node list immediately before `anchor`.
    pub fn insert_before(&mut self, node: NodeId, anchor: NodeId) {
        let prev = self.linked_node(anchor).prev;
        self.link(node, prev, Some(anchor));
    }

    /// Add `node` to the node list immediately after `anchor`.
    pub fn insert_after(&mut self, node: NodeId, anchor: NodeId) {
        let next = self.linked_node(anchor).next;
        self.link(node, Some(anchor), next);
    }

    fn link(&mut self, id: NodeId, prev: Option<NodeId>, next: Option<NodeId>) {
        let node = self.node_entry_mut(id);
        assert!(
            !matches!(node.kind, NodeKind::Param | NodeKind::Return),
            "cannot insert {} node into the node list",
            node.kind
        );
        assert!(!node.linked, "node {} is already in the node list", id);
        node.prev = prev;
        node.next = next;
        node.linked = true;

        match prev {
            Some(prev) => self.node_entry_mut(prev).next = Some(id),
            None => self.first = Some(id),
        }
        match next {
            Some(next) => self.node_entry_mut(next).prev = Some(id),
            None => self.last = Some(id),
        }
        self.len += 1;
    }

    fn unlink(&mut self, id: NodeId) {
        let node = self.node_entry_mut(id);
        if !node.linked {
            return;
        }
        let prev = node.prev.take();
        let next = node.next.take();
        node.linked = false;

        match prev {
            Some(prev) => self.node_entry_mut(prev).next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.node_entry_mut(next).prev = prev,
            None => self.last = prev,
        }
        self.len -= 1;
    }

    /// Return the node with a given ID, or `None` if it has been destroyed.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_usize()).and_then(|n| n.as_ref())
    }

    /// Return the node with a given ID.
    ///
    /// Panics if the node does not exist.
    pub fn node(&self, id: NodeId) -> &Node {
        self.get_node(id)
            .unwrap_or_else(|| panic!("node {} does not exist", id))
    }

    /// Return a mutable reference to a node, for updating its attributes.
    ///
    /// Panics if the node does not exist.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.node_entry_mut(id)
    }

    fn node_entry_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id.as_usize())
            .and_then(|n| n.as_mut())
            .unwrap_or_else(|| panic!("node {} does not exist", id))
    }

    fn linked_node(&self, id: NodeId) -> &Node {
        let node = self.node(id);
        assert!(node.linked, "node {} is not in the node list", id);
        node
    }

    /// Return the value with a given ID, or `None` if it has been destroyed.
    pub fn get_value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.as_usize()).and_then(|v| v.as_ref())
    }

    /// Return the value with a given ID.
    ///
    /// Panics if the value does not exist.
    pub fn value(&self, id: ValueId) -> &Value {
        self.get_value(id)
            .unwrap_or_else(|| panic!("value {} does not exist", id))
    }

    fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values
            .get_mut(id.as_usize())
            .and_then(|v| v.as_mut())
            .unwrap_or_else(|| panic!("value {} does not exist", id))
    }

    /// Set the shape metadata of a value.
    pub fn set_shape(&mut self, value: ValueId, shape: impl Into<TensorShape>) {
        self.value_mut(value).shape = shape.into();
    }

    /// Return the node which produces `value`, and its ID.
    pub fn source_node(&self, value: ValueId) -> (NodeId, &Node) {
        let node_id = self.value(value).node;
        (node_id, self.node(node_id))
    }

    /// Return the kind of the node which produces `value`.
    pub fn source_kind(&self, value: ValueId) -> NodeKind {
        self.source_node(value).1.kind()
    }

    pub fn uses(&self, value: ValueId) -> &[Use] {
        self.value(value).uses()
    }

    /// Return true if `value` is used by any node, including the graph's
    /// `Return` node.
    pub fn has_uses(&self, value: ValueId) -> bool {
        !self.uses(value).is_empty()
    }

    /// Append `value` to the inputs of `node` and return the input slot.
    pub fn push_input(&mut self, node: NodeId, value: ValueId) -> usize {
        self.value(value);
        let node_entry = self.node_entry_mut(node);
        let offset = node_entry.inputs.len();
        node_entry.inputs.push(value);
        self.value_mut(value).uses.push(Use { user: node, offset });
        offset
    }

    /// Replace input `offset` of `node` with `new_value`, returning the
    /// value it previously used.
    pub fn replace_input(&mut self, node: NodeId, offset: usize, new_value: ValueId) -> ValueId {
        self.value(new_value);
        let old_value = *self
            .node(node)
            .inputs()
            .get(offset)
            .unwrap_or_else(|| panic!("node {} has no input {}", node, offset));
        self.remove_use(old_value, node, offset);
        self.node_entry_mut(node).inputs[offset] = new_value;
        self.value_mut(new_value)
            .uses
            .push(Use { user: node, offset });
        old_value
    }

    fn remove_use(&mut self, value: ValueId, user: NodeId, offset: usize) {
        let uses = &mut self.value_mut(value).uses;
        let pos = uses
            .iter()
            .position(|u| *u == Use { user, offset })
            .unwrap_or_else(|| {
                panic!(
                    "use list of {} is missing input {} of node {}",
                    value, offset, user
                )
            });
        uses.remove(pos);
    }

    /// Make every user of `old_value` use `new_value` instead.
    pub fn replace_all_uses_with(&mut self, old_value: ValueId, new_value: ValueId) {
        if old_value == new_value {
            return;
        }
        self.value(new_value);
        let uses = std::mem::take(&mut self.value_mut(old_value).uses);
        for u in &uses {
            self.node_entry_mut(u.user).inputs[u.offset] = new_value;
        }
        self.value_mut(new_value).uses.extend(uses);
    }

    /// Make the first user of `old_value` use `new_value` instead.
    ///
    /// Panics if `old_value` has no uses.
    pub fn replace_first_use_with(&mut self, old_value: ValueId, new_value: ValueId) {
        self.value(new_value);
        let uses = &mut self.value_mut(old_value).uses;
        assert!(!uses.is_empty(), "value {} has no uses", old_value);
        let first = uses.remove(0);
        self.node_entry_mut(first.user).inputs[first.offset] = new_value;
        self.value_mut(new_value).uses.push(first);
    }

    /// Disconnect all inputs of `node`.
    pub fn remove_all_inputs(&mut self, node: NodeId) {
        let inputs = std::mem::take(&mut self.node_entry_mut(node).inputs);
        for (offset, &value) in inputs.iter().enumerate().rev() {
            self.remove_use(value, node, offset);
        }
    }

    /// Remove a node from the graph, along with its outputs.
    ///
    /// Panics if any of the node's outputs still has uses.
    pub fn destroy(&mut self, id: NodeId) {
        let node = self.node(id);
        assert!(
            !matches!(node.kind, NodeKind::Param | NodeKind::Return),
            "cannot destroy the graph's {} node",
            node.kind
        );
        for &output in node.outputs() {
            assert!(
                !self.has_uses(output),
                "cannot destroy {} node {}: output {} still has uses",
                node.kind,
                id,
                output
            );
        }

        self.remove_all_inputs(id);
        self.unlink(id);
        if let Some(node) = self.nodes[id.as_usize()].take() {
            for output in node.outputs {
                self.values[output.as_usize()] = None;
            }
        }
    }

    /// Return the number of nodes in the node list.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first_node(&self) -> Option<NodeId> {
        self.first
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.last
    }

    /// Return the node after `id` in the node list.
    pub fn next_node(&self, id: NodeId) -> Option<NodeId> {
        self.linked_node(id).next
    }

    /// Return the node before `id` in the node list.
    pub fn prev_node(&self, id: NodeId) -> Option<NodeId> {
        self.linked_node(id).prev
    }

    /// Iterate over nodes in the node list, in topological order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        let mut next = self.first;
        std::iter::from_fn(move || {
            let id = next?;
            let node = self.node(id);
            next = node.next;
            Some((id, node))
        })
    }

    /// Return a cursor positioned before the first node in the list.
    pub fn cursor(&self) -> NodeCursor {
        NodeCursor {
            pos: CursorPos::Start,
        }
    }

    /// Verify the graph's structural invariants.
    ///
    /// This checks that use lists exactly mirror node inputs, that each value
    /// is an output of its recorded producer and that every node only uses
    /// values produced by the `Param` node or an earlier node in the list.
    pub fn check(&self) -> Result<(), GraphError> {
        // Position of each node in the list. The `Param` node comes first.
        let mut positions = FxHashMap::default();
        positions.insert(self.param_node, 0);

        let mut prev = None;
        let mut cursor = self.first;
        while let Some(id) = cursor {
            let node = self
                .get_node(id)
                .ok_or(GraphError::BrokenNodeList { node: id })?;
            if !node.linked || node.prev != prev || positions.contains_key(&id) {
                return Err(GraphError::BrokenNodeList { node: id });
            }
            positions.insert(id, positions.len());
            prev = Some(id);
            cursor = node.next;
        }
        if self.last != prev || positions.len() != self.len + 1 {
            return Err(GraphError::BrokenNodeList {
                node: prev.unwrap_or(self.param_node),
            });
        }

        let mut expected_uses: FxHashMap<ValueId, usize> = FxHashMap::default();
        let users = std::iter::once(self.param_node)
            .chain(self.iter().map(|(id, _)| id))
            .chain(std::iter::once(self.return_node));

        for node_id in users {
            let node = self.node(node_id);
            let node_pos = positions.get(&node_id).copied().unwrap_or(usize::MAX);

            for (offset, &value_id) in node.inputs().iter().enumerate() {
                let value = self.get_value(value_id).ok_or(GraphError::InvalidValue {
                    node: node_id,
                    value: value_id,
                })?;
                let produced_before = positions
                    .get(&value.node)
                    .is_some_and(|&pos| pos < node_pos);
                if !produced_before {
                    return Err(GraphError::NotTopological {
                        node: node_id,
                        value: value_id,
                    });
                }
                if !value.uses.contains(&Use {
                    user: node_id,
                    offset,
                }) {
                    return Err(GraphError::UseListMismatch { value: value_id });
                }
                *expected_uses.entry(value_id).or_default() += 1;
            }

            for (offset, &value_id) in node.outputs().iter().enumerate() {
                let value = self.get_value(value_id).ok_or(GraphError::InvalidValue {
                    node: node_id,
                    value: value_id,
                })?;
                if value.node != node_id || value.offset != offset {
                    return Err(GraphError::ProducerMismatch { value: value_id });
                }
            }
        }

        for (index, value) in self.values.iter().enumerate() {
            let Some(value) = value else {
                continue;
            };
            let value_id = ValueId::from_index(index);
            let expected = expected_uses.get(&value_id).copied().unwrap_or(0);
            if value.uses.len() != expected {
                return Err(GraphError::UseListMismatch { value: value_id });
            }
        }

        Ok(())
    }

    fn fmt_value(&self, f: &mut fmt::Formatter, id: ValueId) -> fmt::Result {
        write!(f, "{}", id)?;
        match self.get_value(id).map(|v| v.shape()) {
            Some(TensorShape::Known(dims)) => write!(f, " : {:?}", dims),
            _ => Ok(()),
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter, node: &Node) -> fmt::Result {
        for (i, &output) in node.outputs().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            self.fmt_value(f, output)?;
        }
        if !node.outputs().is_empty() {
            write!(f, " = ")?;
        }
        write!(f, "{}", node.kind())?;
        if !node.attrs().is_empty() {
            write!(f, "[")?;
            for (i, (name, value)) in node.attrs().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}={}", name, value)?;
            }
            write!(f, "]")?;
        }
        write!(f, "(")?;
        for (i, input) in node.inputs().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", input)?;
        }
        write!(f, ")")
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints the graph with one node per line, in list order.
impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "graph(")?;
        for (i, &input) in self.input_ids().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            self.fmt_value(f, input)?;
        }
        writeln!(f, ") {{")?;
        for (_, node) in self.iter() {
            write!(f, "  ")?;
            self.fmt_node(f, node)?;
            writeln!(f)?;
        }
        write!(f, "  return (")?;
        for (i, output) in self.output_ids().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", output)?;
        }
        writeln!(f, ")")?;
        write!(f, "}}")
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum CursorPos {
    Start,
    At(NodeId),
    End,
}

/// Cursor over a graph's node list.
///
/// Unlike [`Graph::iter`], a cursor does not borrow the graph, so the graph
/// can be mutated between steps. The next node is looked up when the cursor
/// advances, so nodes inserted after the current node are visited. The
/// current node can be removed with
/// [`destroy_current`](NodeCursor::destroy_current). Removing any other node
/// is fine as long as it is not the current one.
///
/// ```
/// use onnx_peephole::graph::{Graph, NodeKind};
///
/// let mut graph = Graph::new();
/// let x = graph.add_input([2, 3]);
/// let relu = graph.append_node(NodeKind::Relu, &[x], 1);
/// let relu_out = graph.node(relu).output();
/// graph.append_node(NodeKind::Tanh, &[relu_out], 1);
///
/// let mut cursor = graph.cursor();
/// while let Some(id) = cursor.advance(&graph) {
///     if graph.node(id).kind() == NodeKind::Tanh {
///         cursor.destroy_current(&mut graph);
///     }
/// }
/// assert_eq!(graph.len(), 1);
/// ```
pub struct NodeCursor {
    pos: CursorPos,
}

impl NodeCursor {
    /// Move to the next node and return its ID, or `None` at the end of the
    /// list.
    pub fn advance(&mut self, graph: &Graph) -> Option<NodeId> {
        let next = match self.pos {
            CursorPos::Start => graph.first_node(),
            CursorPos::At(id) => graph.next_node(id),
            CursorPos::End => None,
        };
        self.pos = next.map_or(CursorPos::End, CursorPos::At);
        next
    }

    /// Return the node the cursor is positioned at.
    pub fn current(&self) -> Option<NodeId> {
        match self.pos {
            CursorPos::At(id) => Some(id),
            CursorPos::Start | CursorPos::End => None,
        }
    }

    /// Destroy the current node and step back to the previous one, so that
    /// the next call to [`advance`](NodeCursor::advance) returns the node
    /// that followed the destroyed node.
    ///
    /// Panics if the cursor is not positioned at a node or if the node's
    /// outputs still have uses.
    pub fn destroy_current(&mut self, graph: &mut Graph) {
        let CursorPos::At(id) = self.pos else {
            panic!("cursor is not positioned at a node");
        };
        let prev = graph.prev_node(id);
        graph.destroy(id);
        self.pos = prev.map_or(CursorPos::Start, CursorPos::At);
    }
}
