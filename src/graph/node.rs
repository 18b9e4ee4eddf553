use std::fmt;

use smallvec::SmallVec;

use super::attrs::{AttrName, AttrValue, Attributes};
use super::{NodeId, ValueId};

/// Operator kinds that can appear in a graph.
///
/// Most kinds are ONNX operators. `Expand`, `PackPadded` and `PadPacked` come
/// from the source framework and must be rewritten away before export. `Param`
/// and `Return` are the graph's input and output pseudo-nodes.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum NodeKind {
    Param,
    Return,

    Add,
    Concat,
    Constant,
    ConstantFill,
    Div,
    Expand,
    Gather,
    Gemm,
    Gru,
    Lstm,
    Mul,
    PackPadded,
    PadPacked,
    Pow,
    Relu,
    Rnn,
    Shape,
    Sigmoid,
    Slice,
    Sub,
    Tanh,
    Transpose,
    Unsqueeze,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Param => "Param",
            NodeKind::Return => "Return",
            NodeKind::Add => "Add",
            NodeKind::Concat => "Concat",
            NodeKind::Constant => "Constant",
            NodeKind::ConstantFill => "ConstantFill",
            NodeKind::Div => "Div",
            NodeKind::Expand => "Expand",
            NodeKind::Gather => "Gather",
            NodeKind::Gemm => "Gemm",
            NodeKind::Gru => "GRU",
            NodeKind::Lstm => "LSTM",
            NodeKind::Mul => "Mul",
            NodeKind::PackPadded => "PackPadded",
            NodeKind::PadPacked => "PadPacked",
            NodeKind::Pow => "Pow",
            NodeKind::Relu => "Relu",
            NodeKind::Rnn => "RNN",
            NodeKind::Shape => "Shape",
            NodeKind::Sigmoid => "Sigmoid",
            NodeKind::Slice => "Slice",
            NodeKind::Sub => "Sub",
            NodeKind::Tanh => "Tanh",
            NodeKind::Transpose => "Transpose",
            NodeKind::Unsqueeze => "Unsqueeze",
        }
    }

    /// Return true for the recurrent network operators.
    pub fn is_rnn(self) -> bool {
        matches!(self, NodeKind::Rnn | NodeKind::Lstm | NodeKind::Gru)
    }

    /// Return true if this operator supports the legacy ONNX `broadcast`
    /// flag, which enables broadcasting of its last input.
    ///
    /// This is Caffe2-style broadcasting of a suffix (or, with `axis`, a
    /// prefix) of the other operand's dimensions, not numpy broadcasting.
    pub fn supports_broadcast(self) -> bool {
        match self {
            NodeKind::Add
            | NodeKind::Div
            | NodeKind::Gemm
            | NodeKind::Mul
            | NodeKind::Pow
            | NodeKind::Sub => true,

            NodeKind::Param
            | NodeKind::Return
            | NodeKind::Concat
            | NodeKind::Constant
            | NodeKind::ConstantFill
            | NodeKind::Expand
            | NodeKind::Gather
            | NodeKind::Gru
            | NodeKind::Lstm
            | NodeKind::PackPadded
            | NodeKind::PadPacked
            | NodeKind::Relu
            | NodeKind::Rnn
            | NodeKind::Shape
            | NodeKind::Sigmoid
            | NodeKind::Slice
            | NodeKind::Tanh
            | NodeKind::Transpose
            | NodeKind::Unsqueeze => false,
        }
    }

    /// Return true if nodes of this kind may carry the attribute `name`.
    pub fn accepts_attr(self, name: AttrName) -> bool {
        use AttrName as A;

        match self {
            NodeKind::Add | NodeKind::Div | NodeKind::Mul | NodeKind::Pow | NodeKind::Sub => {
                matches!(name, A::Broadcast | A::Axis)
            }
            NodeKind::Gemm => matches!(
                name,
                A::Alpha | A::Beta | A::TransA | A::TransB | A::Broadcast | A::Axis
            ),
            NodeKind::Rnn | NodeKind::Lstm | NodeKind::Gru => {
                matches!(name, A::HiddenSize | A::Direction)
            }
            NodeKind::Concat | NodeKind::Gather => name == A::Axis,
            NodeKind::Constant => name == A::Value,
            NodeKind::ConstantFill => matches!(name, A::InputAsShape | A::Value),
            NodeKind::Expand => name == A::Size,
            NodeKind::Slice => matches!(name, A::Axes | A::Starts | A::Ends),
            NodeKind::Transpose => name == A::Perm,
            NodeKind::Unsqueeze => name == A::Axes,

            NodeKind::Param
            | NodeKind::Return
            | NodeKind::PackPadded
            | NodeKind::PadPacked
            | NodeKind::Relu
            | NodeKind::Shape
            | NodeKind::Sigmoid
            | NodeKind::Tanh => false,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape metadata attached to a value.
///
/// Shapes are resolved by earlier pipeline stages. Values whose shape was not
/// resolved are `Unknown`, and rewrites that depend on the shape skip them.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TensorShape {
    Known(Vec<usize>),
    #[default]
    Unknown,
}

impl TensorShape {
    pub fn dims(&self) -> Option<&[usize]> {
        match self {
            TensorShape::Known(dims) => Some(dims),
            TensorShape::Unknown => None,
        }
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> TensorShape {
        TensorShape::Known(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> TensorShape {
        TensorShape::Known(dims.into())
    }
}

/// A use of a value as the `offset`'th input of node `user`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Use {
    pub user: NodeId,
    pub offset: usize,
}

/// A value in the graph, produced by exactly one node.
#[derive(Debug)]
pub struct Value {
    pub(super) shape: TensorShape,
    pub(super) node: NodeId,
    pub(super) offset: usize,

    /// Uses of this value, in the order they were added.
    pub(super) uses: Vec<Use>,
}

impl Value {
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Return the node that produces this value.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Return the index of this value in its producer's outputs.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

/// An operator instance in a graph.
///
/// Inputs and outputs can only be changed through [`Graph`](super::Graph)
/// methods, which keep use lists consistent. Attributes can be changed
/// directly.
#[derive(Debug)]
pub struct Node {
    pub(super) kind: NodeKind,
    pub(super) inputs: SmallVec<[ValueId; 4]>,
    pub(super) outputs: SmallVec<[ValueId; 2]>,
    pub(super) attrs: Attributes,

    // Links in the graph's node list. Only meaningful if `linked` is set.
    pub(super) prev: Option<NodeId>,
    pub(super) next: Option<NodeId>,
    pub(super) linked: bool,
}

impl Node {
    pub(super) fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            attrs: Attributes::new(),
            prev: None,
            next: None,
            linked: false,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Return the node's only input.
    ///
    /// Panics if the node does not have exactly one input.
    pub fn input(&self) -> ValueId {
        match self.inputs.as_slice() {
            [input] => *input,
            inputs => panic!(
                "expected {} node to have one input, found {}",
                self.kind,
                inputs.len()
            ),
        }
    }

    /// Return the node's only output.
    ///
    /// Panics if the node does not have exactly one output.
    pub fn output(&self) -> ValueId {
        match self.outputs.as_slice() {
            [output] => *output,
            outputs => panic!(
                "expected {} node to have one output, found {}",
                self.kind,
                outputs.len()
            ),
        }
    }

    /// Return true if this node is part of the graph's node list.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Set an attribute on this node.
    ///
    /// Panics if the node's kind does not accept the attribute, or if the
    /// attribute is already set with a different type.
    pub fn set_attr(&mut self, name: AttrName, value: AttrValue) {
        assert!(
            self.kind.accepts_attr(name),
            "{} nodes do not have a \"{}\" attribute",
            self.kind,
            name
        );
        self.attrs.set(name, value);
    }

    /// Builder-style variant of [`set_attr`](Node::set_attr).
    pub fn with_attr(&mut self, name: AttrName, value: AttrValue) -> &mut Node {
        self.set_attr(name, value);
        self
    }
}
