//! Internal testing utilities for the onnx-peephole crates.

use std::fmt::Debug;
use std::panic::RefUnwindSafe;

/// Runs table-driven tests.
///
/// Describe each case with a `Debug` struct, conventionally named `Case`,
/// collect the cases into an array or `Vec` and call `test_each` with the
/// test body:
///
/// ```
/// use onnx_peephole_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     perm: Vec<i64>,
///     rank: usize,
/// }
///
/// let cases = [
///     Case { perm: vec![1, 0], rank: 2 },
///     Case { perm: vec![0, 2, 1], rank: 3 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.perm.len(), case.rank);
/// });
/// ```
///
/// Every case is run, even if earlier ones fail. Once all have run,
/// `test_each` panics with the count and debug representation of the failing
/// cases, if there were any.
///
/// Cases, and anything the test closure captures, must be
/// [unwind safe](https://doc.rust-lang.org/std/panic/fn.catch_unwind.html).
/// Graphs built inside the closure are fine; graphs captured from outside it
/// need to be rebuilt per case instead.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .map(|case| format!("{:?}", case))
            .collect();
        assert_eq!(
            failures.len(),
            0,
            "{} test cases failed: {:?}",
            failures.len(),
            failures
        );
    }
}

/// Apply a transpose permutation to a list of axis labels.
///
/// Output axis `i` is input axis `perm[i]`, matching the ONNX `Transpose`
/// operator. Tests use this to check that a rewritten chain of transposes
/// moves axes the same way as the chain it replaces.
pub fn permute_axes<T: Clone>(axes: &[T], perm: &[i64]) -> Vec<T> {
    assert_eq!(axes.len(), perm.len(), "permutation rank mismatch");
    perm.iter().map(|&p| axes[p as usize].clone()).collect()
}
