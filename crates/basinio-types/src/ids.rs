//! Index handles into arenas owned by a project.
//!
//! Back-references between graph nodes (a map's owning formation, a
//! formation's bounding surfaces) are stored as these handles and resolved
//! through the owner. A handle is only meaningful for the project that
//! issued it.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! index_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(usize);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(index)
            }

            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

index_handle!(
    /// Position of a formation in its project.
    FormationId
);

index_handle!(
    /// Position of a reservoir in its project.
    ReservoirId
);

index_handle!(
    /// Position of a geometry in the project's deduplicated geometry table.
    GeometryId
);
