use serde::{Deserialize, Serialize};
use std::fmt;

/// Compartment a species can occupy and a contaminant's free pool can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Habitat {
    WaterColumn,
    Sediment,
    Epibenthic,
    Ice,
}

impl Habitat {
    pub const ALL: [Habitat; 4] = [
        Habitat::WaterColumn,
        Habitat::Sediment,
        Habitat::Epibenthic,
        Habitat::Ice,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Habitat::WaterColumn => 0,
            Habitat::Sediment => 1,
            Habitat::Epibenthic => 2,
            Habitat::Ice => 3,
        }
    }

    /// Whether the habitat exists in `layer` of a cell with `num_layers` water layers.
    ///
    /// Layer 0 is the surface layer and `num_layers - 1` the bottom layer. The water column
    /// spans every layer, the benthic compartments sit under the bottom layer and ice on top
    /// of the surface layer.
    pub fn is_present(self, layer: usize, num_layers: usize) -> bool {
        if layer >= num_layers {
            return false;
        }
        match self {
            Habitat::WaterColumn => true,
            Habitat::Sediment | Habitat::Epibenthic => layer + 1 == num_layers,
            Habitat::Ice => layer == 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Habitat::WaterColumn => "water-column",
            Habitat::Sediment => "sediment",
            Habitat::Epibenthic => "epibenthic",
            Habitat::Ice => "ice",
        }
    }
}

impl fmt::Display for Habitat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-size map keyed by [`Habitat`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerHabitat<T>(pub [T; Habitat::COUNT]);

impl<T: Copy + Default> PerHabitat<T> {
    pub fn splat(value: T) -> Self {
        Self([value; Habitat::COUNT])
    }
}

impl<T> std::ops::Index<Habitat> for PerHabitat<T> {
    type Output = T;

    fn index(&self, habitat: Habitat) -> &T {
        &self.0[habitat.index()]
    }
}

impl<T> std::ops::IndexMut<Habitat> for PerHabitat<T> {
    fn index_mut(&mut self, habitat: Habitat) -> &mut T {
        &mut self.0[habitat.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_position_in_all() {
        for (i, habitat) in Habitat::ALL.iter().enumerate() {
            assert_eq!(habitat.index(), i);
        }
    }

    #[test]
    fn water_column_is_present_in_every_layer() {
        assert!((0..3).all(|layer| Habitat::WaterColumn.is_present(layer, 3)));
        assert!(!Habitat::WaterColumn.is_present(3, 3));
    }

    #[test]
    fn benthic_habitats_sit_at_the_bottom_layer_only() {
        assert!(Habitat::Sediment.is_present(2, 3));
        assert!(!Habitat::Sediment.is_present(1, 3));
        assert!(Habitat::Epibenthic.is_present(0, 1));
    }

    #[test]
    fn ice_sits_at_the_surface_layer_only() {
        assert!(Habitat::Ice.is_present(0, 3));
        assert!(!Habitat::Ice.is_present(1, 3));
    }

    #[test]
    fn per_habitat_indexing_reads_and_writes_the_right_slot() {
        let mut map = PerHabitat::splat(0.0);
        map[Habitat::Sediment] = 2.5;
        assert_eq!(map[Habitat::Sediment], 2.5);
        assert_eq!(map[Habitat::WaterColumn], 0.0);
    }

    #[test]
    fn habitat_deserializes_from_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            h: Habitat,
        }
        let w: Wrapper = toml::from_str("h = \"water-column\"").unwrap();
        assert_eq!(w.h, Habitat::WaterColumn);
    }
}
