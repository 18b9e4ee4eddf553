use super::algebra::{compose_permutations, is_identity_permutation};
use super::diagnostics::Diagnostics;
use super::PeepholePass;
use crate::graph::{AttrName, AttrValue, Graph, Node, NodeKind};

/// Return the permutation of a `Transpose` node, or `None` if the node is not
/// a transpose or its permutation is implicit.
fn transpose_perm(node: &Node) -> Option<&[i64]> {
    if node.kind() != NodeKind::Transpose {
        return None;
    }
    node.attrs().get_is(AttrName::Perm).map(|perm| perm.as_slice())
}

/// Replace `Transpose(Transpose(x, p1), p2)` with a single transpose of `x`
/// by the composed permutation.
///
/// The inner transpose is removed if nothing else uses it.
pub struct FuseConsecutiveTransposes;

impl PeepholePass for FuseConsecutiveTransposes {
    fn name(&self) -> &'static str {
        "fuse_consecutive_transposes"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let outer = graph.node(id);
            let Some(outer_perm) = transpose_perm(outer) else {
                continue;
            };
            let &[inner_out] = outer.inputs() else {
                continue;
            };
            let (inner_id, inner) = graph.source_node(inner_out);
            let Some(inner_perm) = transpose_perm(inner) else {
                continue;
            };
            let &[inner_in] = inner.inputs() else {
                continue;
            };

            let perm = compose_permutations(inner_perm, outer_perm);
            graph.node_mut(id).set_attr(AttrName::Perm, AttrValue::Ints(perm));
            graph.replace_input(id, 0, inner_in);
            diag.info(graph, id, format_args!("fused with Transpose {}", inner_id));

            if !graph.has_uses(inner_out) {
                graph.destroy(inner_id);
            }
        }
    }
}

/// Remove transposes whose permutation is the identity, redirecting their
/// uses to the transpose's input.
pub struct EliminateNopTranspose;

impl PeepholePass for EliminateNopTranspose {
    fn name(&self) -> &'static str {
        "eliminate_nop_transpose"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            let node = graph.node(id);
            if !transpose_perm(node).is_some_and(is_identity_permutation) {
                continue;
            }
            let (&[input], &[output]) = (node.inputs(), node.outputs()) else {
                continue;
            };

            graph.replace_all_uses_with(output, input);
            diag.info(graph, id, format_args!("removed identity transpose"));
            cursor.destroy_current(graph);
        }
    }
}

/// Fold 2D transposes feeding the `A` or `B` input of `Gemm` into the
/// `transA` or `transB` attribute.
///
/// The flag is toggled rather than set, so a `Gemm` which already transposed
/// the input ends up with the flag cleared.
pub struct FuseTransposeIntoGemm;

const SIMPLE_TRANSPOSE: [i64; 2] = [1, 0];

impl PeepholePass for FuseTransposeIntoGemm {
    fn name(&self) -> &'static str {
        "fuse_transpose_into_gemm"
    }

    fn run(&self, graph: &mut Graph, diag: &Diagnostics) {
        let mut cursor = graph.cursor();
        while let Some(id) = cursor.advance(graph) {
            if graph.node(id).kind() != NodeKind::Gemm {
                continue;
            }

            for (offset, flag) in [(0, AttrName::TransA), (1, AttrName::TransB)] {
                let Some(&input) = graph.node(id).inputs().get(offset) else {
                    continue;
                };
                let (transpose_id, transpose) = graph.source_node(input);
                if transpose_perm(transpose) != Some(&SIMPLE_TRANSPOSE[..]) {
                    continue;
                }
                let &[transpose_in] = transpose.inputs() else {
                    continue;
                };

                graph.replace_input(id, offset, transpose_in);
                let gemm = graph.node_mut(id);
                let transposed = gemm.attrs().get_i(flag).map_or(true, |&t| t == 0);
                gemm.set_attr(flag, AttrValue::Int(transposed as i64));
                diag.info(
                    graph,
                    id,
                    format_args!("fused Transpose {} into {}", transpose_id, flag),
                );

                if !graph.has_uses(input) {
                    graph.destroy(transpose_id);
                }
            }
        }
    }
}
