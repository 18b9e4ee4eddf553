use std::cell::RefCell;
use std::fmt;

use rustc_hash::FxHashSet;

use crate::graph::{Graph, NodeId};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    /// Don't show any diagnostics.
    #[default]
    Off,
    /// Report only rewrites which matched part of a pattern but could not be
    /// applied.
    Warn,
    /// Report all rewrites.
    Info,
}

/// Diagnostic reporter for peephole passes.
///
/// Messages are emitted through the [`log`] crate, so a logger must also be
/// installed and configured to show them.
#[derive(Default)]
pub struct Diagnostics {
    /// Nodes against which diagnostics have been reported at the `Warn` level
    /// or higher.
    warned_nodes: RefCell<FxHashSet<NodeId>>,
    level: DiagnosticLevel,
}

impl Diagnostics {
    pub fn new(level: DiagnosticLevel) -> Self {
        Self {
            warned_nodes: RefCell::new(FxHashSet::default()),
            level,
        }
    }

    /// Return true if diagnostic messages are enabled at a given level.
    pub fn enabled(&self, level: DiagnosticLevel) -> bool {
        self.level >= level
    }

    /// Log a diagnostic message for a given node at the [`Info`](DiagnosticLevel::Info) level.
    pub fn info(&self, graph: &Graph, node: NodeId, message: fmt::Arguments<'_>) {
        if !self.enabled(DiagnosticLevel::Info) {
            return;
        }
        log::info!("{}: {}", NodeLabel { graph, node }, message);
    }

    /// Log a diagnostic message for a given node at the [`Warn`](DiagnosticLevel::Warn) level.
    ///
    /// Only the first warning for each node is reported.
    pub fn warn(&self, graph: &Graph, node: NodeId, message: fmt::Arguments<'_>) {
        if !self.enabled(DiagnosticLevel::Warn) || !self.warned_nodes.borrow_mut().insert(node) {
            return;
        }
        log::warn!("{}: {}", NodeLabel { graph, node }, message);
    }

    /// Return the number of distinct nodes that have been warned about.
    pub fn warned_count(&self) -> usize {
        self.warned_nodes.borrow().len()
    }
}

/// Formats a node as `{kind} {id}`, eg. `Transpose n4`.
struct NodeLabel<'a> {
    graph: &'a Graph,
    node: NodeId,
}

impl fmt::Display for NodeLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.graph.get_node(self.node) {
            Some(node) => write!(f, "{} {}", node.kind(), self.node),
            None => write!(f, "{}", self.node),
        }
    }
}
