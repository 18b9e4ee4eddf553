use super::algebra::{fusible_broadcast_axis, ExpandFusion};
use super::diagnostics::Diagnostics;
use super::PeepholePass;
use crate::graph::{AttrName, AttrValue, Graph, NodeKind};

/// Replace an `Expand` feeding the last input of a broadcasting operator with
/// the operator's legacy `broadcast` and `axis` attributes.
///
/// The rewrite requires the shapes of both the unexpanded and expanded values
/// to be known. The `Expand` node is removed if nothing else uses it.
pub struct FuseBroadcast;

impl PeepholePass for FuseBroadcast {
    fn name(&self) -> &'static str {
        "fuse_broadcast"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let node = graph.node(id);
            if !node.kind().supports_broadcast() {
                continue;
            }

            let attrs = node.attrs();
            if attrs.get_i(AttrName::Broadcast).is_some_and(|&b| b != 0) {
                continue;
            }
            // Without `broadcast`, an `axis` has no meaning.
            assert!(
                !attrs.has(AttrName::Axis),
                "{} node {} has an axis attribute but does not broadcast",
                node.kind(),
                id
            );

            let Some(&expanded) = node.inputs().last() else {
                continue;
            };
            let offset = node.inputs().len() - 1;
            let (expand_id, expand) = graph.source_node(expanded);
            if expand.kind() != NodeKind::Expand {
                continue;
            }
            let Some(&unexpanded) = expand.inputs().first() else {
                continue;
            };

            let from = graph.value(unexpanded).shape().dims();
            let to = graph.value(expanded).shape().dims();
            let (Some(from), Some(to)) = (from, to) else {
                diag.warn(
                    graph,
                    id,
                    format_args!("cannot fuse Expand {} with unknown shapes", expand_id),
                );
                continue;
            };

            let axis = match fusible_broadcast_axis(from, to) {
                ExpandFusion::NotFusible => {
                    diag.warn(
                        graph,
                        id,
                        format_args!(
                            "cannot fuse Expand {} from {:?} to {:?}",
                            expand_id, from, to
                        ),
                    );
                    continue;
                }
                ExpandFusion::Trailing => None,
                ExpandFusion::Leading { axis } => Some(axis),
            };

            graph.replace_input(id, offset, unexpanded);
            let node = graph.node_mut(id);
            node.set_attr(AttrName::Broadcast, AttrValue::Int(1));
            if let Some(axis) = axis {
                node.set_attr(AttrName::Axis, AttrValue::Int(axis));
            }
            diag.info(graph, id, format_args!("fused Expand {}", expand_id));

            if !graph.has_uses(expanded) {
                graph.destroy(expand_id);
            }
        }
    }
}
