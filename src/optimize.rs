use crate::env::env_flag;
use crate::graph::Graph;

mod algebra;
mod broadcast;
mod diagnostics;
mod packing;
mod rnn_state;
mod transpose;


use broadcast::FuseBroadcast;
use diagnostics::Diagnostics;
use packing::{PushPackingPastRnn, RemoveNopPacking};
use rnn_state::{FixDefaultCellState, FixDefaultHiddenState};
use transpose::{EliminateNopTranspose, FuseConsecutiveTransposes, FuseTransposeIntoGemm};

pub use diagnostics::DiagnosticLevel;

/// Environment variable which enables diagnostics for all rewrites when
/// [`OptimizeOptions`] are created with [`Default`].
pub const DEBUG_ENV_VAR: &str = "ONNX_PEEPHOLE_DEBUG";

/// A single rewrite over the whole graph.
///
/// Passes visit nodes in list order using a [`NodeCursor`](crate::graph::NodeCursor),
/// so nodes inserted after the current node are visited in the same
/// traversal and nodes inserted before it are not.
trait PeepholePass {
    /// Name used in log messages.
    fn name(&self) -> &'static str;

    /// Apply the rewrite everywhere it matches.
    fn run(&self, graph: &mut Graph, diag: &Diagnostics);
}

/// The passes run by [`GraphOptimizer::optimize`], in order.
///
/// Packing rewrites come first so the recurrent nodes they expose are seen by
/// the state fixes. Transpose fusion runs before identity removal because
/// fusing may produce an identity.
const PASSES: [&dyn PeepholePass; 8] = [
    &PushPackingPastRnn,
    &RemoveNopPacking,
    &FixDefaultHiddenState,
    &FixDefaultCellState,
    &FuseBroadcast,
    &FuseConsecutiveTransposes,
    &EliminateNopTranspose,
    &FuseTransposeIntoGemm,
];

/// Configuration for [`GraphOptimizer::optimize`].
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizeOptions {
    /// Which rewrites to report through the [`log`] crate.
    pub diagnostics: DiagnosticLevel,

    /// Check the graph's invariants after each pass and panic if one is
    /// broken. This is enabled by default in debug builds.
    pub verify: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        OptimizeOptions {
            diagnostics: if env_flag(DEBUG_ENV_VAR, false) {
                DiagnosticLevel::Info
            } else {
                DiagnosticLevel::Off
            },
            verify: cfg!(debug_assertions),
        }
    }
}

/// Applies ONNX-specific peephole rewrites to a [`Graph`].
pub struct GraphOptimizer {}

impl GraphOptimizer {
    /// Create a new optimizer with the default set of rewrites enabled.
    pub fn new() -> Self {
        GraphOptimizer {}
    }

    /// Apply the rewrites to a graph in place.
    ///
    /// Each pass runs exactly once. The graph's inputs are preserved and its
    /// outputs are kept equivalent, although an output may be replaced by
    /// another value that computes the same result.
    ///
    /// Panics if a pass encounters a node that violates an operator's
    /// contract, eg. a recurrent node without `hidden_size`, or if
    /// [`verify`](OptimizeOptions::verify) is enabled and a pass leaves the
    /// graph malformed.
    pub fn optimize(&self, graph: &mut Graph, options: OptimizeOptions) {
        let diag = Diagnostics::new(options.diagnostics);

        for pass in PASSES {
            let len_before = graph.len();
            pass.run(graph, &diag);
            log::debug!(
                "{}: {} nodes before, {} after",
                pass.name(),
                len_before,
                graph.len()
            );

            if options.verify {
                if let Err(err) = graph.check() {
                    panic!("graph is malformed after {}: {}", pass.name(), err);
                }
            }
        }

        if diag.warned_count() > 0 {
            log::debug!("{} nodes could not be rewritten", diag.warned_count());
        }
    }
}

impl Default for GraphOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
