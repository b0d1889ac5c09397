use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! dense_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

dense_id!(
    /// Position of a species in the registry's species table.
    SpeciesId,
    "species#"
);
dense_id!(
    /// Position of a contaminant in the registry's contaminant table.
    ContaminantId,
    "contaminant#"
);
dense_id!(
    /// Spatial box of the horizontal grid.
    CellId,
    "cell#"
);
dense_id!(
    /// Slot in the generic tracer and rate-of-change arrays.
    TracerId,
    "tracer#"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_prefix_and_index() {
        assert_eq!(SpeciesId(3).to_string(), "species#3");
        assert_eq!(CellId(0).to_string(), "cell#0");
    }

    #[test]
    fn ids_deserialize_from_plain_integers() {
        let id: TracerId = toml::from_str::<std::collections::HashMap<String, TracerId>>("t = 7")
            .unwrap()["t"];
        assert_eq!(id, TracerId(7));
        assert_eq!(id.index(), 7);
    }
}
