use std::num::NonZero;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(NonZero<u32>);

        impl $name {
            /// Return the underlying u32 value of the ID.
            pub fn as_u32(self) -> u32 {
                self.0.get() - 1
            }

            /// Return the underlying ID value as a usize, for slice indexing.
            pub fn as_usize(self) -> usize {
                self.as_u32() as usize
            }

            /// Construct an ID from a u32 value.
            ///
            /// Panics if the value is `u32::MAX`.
            pub fn from_u32(value: u32) -> $name {
                // IDs are stored offset by one so that zero is available as a
                // niche, making `Option<Id>` the same size as `Id`.
                let stored = value.checked_add(1).expect("ID out of range");
                $name(NonZero::new(stored).expect("stored ID is non-zero"))
            }

            pub(crate) fn from_index(index: usize) -> $name {
                let value = u32::try_from(index).expect("graph arena exceeds u32::MAX entries");
                $name::from_u32(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.as_u32())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.as_u32())
            }
        }
    };
}

arena_id!(
    /// ID of a node in a [`Graph`](super::Graph).
    ///
    /// IDs are never reused within a graph, so an ID that refers to a
    /// destroyed node stays invalid.
    NodeId,
    "n"
);

arena_id!(
    /// ID of a value in a [`Graph`](super::Graph).
    ///
    /// Every value is produced by exactly one node.
    ValueId,
    "%"
);
