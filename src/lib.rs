//! ONNX-specific peephole optimizations for traced computation graphs.
//!
//! A graph traced from a framework such as PyTorch contains fragments that are
//! legal in the framework but have no direct equivalent in the fixed ONNX
//! operator set. This crate rewrites those fragments into equivalent ones
//! that do, immediately before the graph is serialized.
//!
//! # Usage
//!
//! Build or obtain a [`Graph`](graph::Graph), then run the optimizer over it:
//!
//! ```
//! use onnx_peephole::graph::{AttrName, AttrValue, Graph, NodeKind};
//! use onnx_peephole::{GraphOptimizer, OptimizeOptions};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_input([2, 3]);
//! let transpose = graph.append_node(NodeKind::Transpose, &[x], 1);
//! graph
//!     .node_mut(transpose)
//!     .set_attr(AttrName::Perm, AttrValue::Ints(vec![0, 1]));
//! graph.register_output(graph.node(transpose).output());
//!
//! GraphOptimizer::new().optimize(&mut graph, OptimizeOptions::default());
//!
//! // The identity transpose has been removed.
//! assert!(graph.is_empty());
//! assert_eq!(graph.output_ids(), &[x]);
//! ```
//!
//! # Optimizations
//!
//! The optimizer runs these rewrites once each, in order:
//!
//! 1. Push `PackPadded` past recurrent operators
//! 2. Cancel matched `PackPadded` / `PadPacked` pairs
//! 3. Replace constant default hidden states of `RNN`, `LSTM` and `GRU` with
//!    a fill whose shape is computed from the input
//! 4. Likewise for the default cell state of `LSTM`
//! 5. Fuse `Expand` into the `broadcast` flag of arithmetic operators and
//!    `Gemm`
//! 6. Fuse consecutive transposes
//! 7. Remove transposes with an identity permutation
//! 8. Fuse 2D transposes into the `transA` / `transB` flags of `Gemm`
//!
//! The passes do not iterate to a fixed point. A rewrite that only becomes
//! possible because of a later pass is not applied.
//!
//! # Diagnostics
//!
//! Applied and declined rewrites are reported through the [`log`] crate when
//! enabled via [`OptimizeOptions::diagnostics`] or the `ONNX_PEEPHOLE_DEBUG`
//! environment variable.

mod env;

pub mod graph;
pub mod optimize;

pub use optimize::{DiagnosticLevel, GraphOptimizer, OptimizeOptions};
