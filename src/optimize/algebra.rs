//! Permutation and broadcast-shape reasoning used by the rewrite passes.

/// Return true if `perm` maps every axis to itself.
///
/// An empty permutation is the identity.
pub fn is_identity_permutation(perm: &[i64]) -> bool {
    perm.iter().enumerate().all(|(i, &axis)| axis == i as i64)
}

/// Return the permutation equivalent to transposing by `first` and then by
/// `second`.
///
/// Output axis `i` of a transpose by `perm` is input axis `perm[i]`, so the
/// composed permutation is `first[second[i]]`.
///
/// Do not swap the indices to `second[first[i]]`. That order does not match
/// applying the two transposes in sequence, eg. `[1, 0, 2]` then `[0, 2, 1]`
/// must give `[1, 2, 0]`, not `[2, 0, 1]`.
/// `test_compose_matches_sequential_transposes` pins the order.
///
/// Panics if the permutations have different lengths or contain an axis that
/// is out of range.
pub fn compose_permutations(first: &[i64], second: &[i64]) -> Vec<i64> {
    assert_eq!(
        first.len(),
        second.len(),
        "cannot compose permutations of length {} and {}",
        first.len(),
        second.len()
    );
    let rank = first.len();
    let check_axis = |axis: i64| -> usize {
        match usize::try_from(axis) {
            Ok(index) if index < rank => index,
            _ => panic!("axis {} is out of range for a permutation of length {}", axis, rank),
        }
    };
    second
        .iter()
        .map(|&axis| {
            let composed = first[check_axis(axis)];
            check_axis(composed);
            composed
        })
        .collect()
}

/// How an `Expand` feeding an operator can be replaced by the operator's
/// legacy `broadcast` attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExpandFusion {
    /// The unexpanded shape cannot be broadcast to the expanded one using the
    /// legacy attributes.
    NotFusible,

    /// The significant dimensions line up with the trailing dimensions of the
    /// target, which is the default alignment for `broadcast=1`.
    Trailing,

    /// The significant dimensions line up with the target starting at `axis`.
    Leading { axis: i64 },
}

/// Decide whether broadcasting from shape `from` to shape `to` can be
/// expressed with the legacy `broadcast` and `axis` attributes.
///
/// Leading and trailing size-1 dimensions of `from` are ignored. The remaining
/// dimensions must equal a suffix of `to` ([`ExpandFusion::Trailing`]) or a
/// prefix of `to` ([`ExpandFusion::Leading`]). A shape with no significant
/// dimensions is trailing-fusible.
pub fn fusible_broadcast_axis(from: &[usize], to: &[usize]) -> ExpandFusion {
    if from.len() > to.len() {
        return ExpandFusion::NotFusible;
    }

    let start = from.iter().position(|&d| d != 1).unwrap_or(from.len());
    let end = from.iter().rposition(|&d| d != 1).map_or(start, |last| last + 1);
    let significant = &from[start..end];

    if significant.iter().rev().zip(to.iter().rev()).all(|(f, t)| f == t) {
        ExpandFusion::Trailing
    } else if significant.iter().zip(to).all(|(f, t)| f == t) {
        ExpandFusion::Leading { axis: 0 }
    } else {
        ExpandFusion::NotFusible
    }
}
