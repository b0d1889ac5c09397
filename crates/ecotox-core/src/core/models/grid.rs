use super::habitat::Habitat;
use super::ids::CellId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Grid has no cells")]
    Empty,
    #[error("Invalid geometry for {cell}: {reason}")]
    InvalidGeometry { cell: CellId, reason: String },
    #[error("{cell} lists unknown neighbour {neighbor}")]
    UnknownNeighbor { cell: CellId, neighbor: CellId },
}

/// Geometry of one box of the horizontal grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CellGeometry {
    pub area: f64,
    /// Thickness of each water layer, surface first.
    pub layer_thickness: Vec<f64>,
    #[serde(default)]
    pub sediment_thickness: f64,
    /// Neighbouring cells, nearest first.
    #[serde(default)]
    pub neighbors: Vec<CellId>,
}

/// The box-and-layer spatial representation the engine sweeps over.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGrid {
    cells: Vec<CellGeometry>,
    max_layers: usize,
}

impl SpatialGrid {
    pub fn new(cells: Vec<CellGeometry>) -> Result<Self, GridError> {
        if cells.is_empty() {
            return Err(GridError::Empty);
        }
        for (i, geometry) in cells.iter().enumerate() {
            let cell = CellId(i);
            let invalid = |reason: &str| GridError::InvalidGeometry {
                cell,
                reason: reason.to_string(),
            };
            if !(geometry.area.is_finite() && geometry.area > 0.0) {
                return Err(invalid("area must be positive and finite"));
            }
            if geometry.layer_thickness.is_empty() {
                return Err(invalid("at least one water layer is required"));
            }
            if geometry
                .layer_thickness
                .iter()
                .any(|&dz| !(dz.is_finite() && dz > 0.0))
            {
                return Err(invalid("layer thickness must be positive and finite"));
            }
            if !(geometry.sediment_thickness.is_finite() && geometry.sediment_thickness >= 0.0) {
                return Err(invalid("sediment thickness must be non-negative"));
            }
            for &neighbor in &geometry.neighbors {
                if neighbor.index() >= cells.len() || neighbor == cell {
                    return Err(GridError::UnknownNeighbor { cell, neighbor });
                }
            }
        }
        let max_layers = cells
            .iter()
            .map(|c| c.layer_thickness.len())
            .max()
            .unwrap_or(0);
        Ok(Self { cells, max_layers })
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Layer count of the deepest cell; fields are dimensioned with it.
    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    pub fn num_layers(&self, cell: CellId) -> usize {
        self.cells
            .get(cell.index())
            .map_or(0, |c| c.layer_thickness.len())
    }

    pub fn cell(&self, cell: CellId) -> Option<&CellGeometry> {
        self.cells.get(cell.index())
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.cells.len()).map(CellId)
    }

    pub fn neighbors(&self, cell: CellId) -> &[CellId] {
        self.cells
            .get(cell.index())
            .map_or(&[], |c| c.neighbors.as_slice())
    }

    /// Habitats that exist in `layer` of `cell`, in fixed visitation order.
    pub fn habitats_at(&self, cell: CellId, layer: usize) -> impl Iterator<Item = Habitat> + '_ {
        let num_layers = self.num_layers(cell);
        Habitat::ALL
            .into_iter()
            .filter(move |h| h.is_present(layer, num_layers))
    }

    /// Volume (or area, for surface-like compartments) that normalizes a concentration to mass.
    pub fn measure(&self, cell: CellId, layer: usize, habitat: Habitat) -> f64 {
        let Some(geometry) = self.cells.get(cell.index()) else {
            return 0.0;
        };
        match habitat {
            Habitat::WaterColumn => geometry
                .layer_thickness
                .get(layer)
                .map_or(0.0, |dz| geometry.area * dz),
            Habitat::Sediment => geometry.area * geometry.sediment_thickness,
            Habitat::Epibenthic | Habitat::Ice => geometry.area,
        }
    }
}
