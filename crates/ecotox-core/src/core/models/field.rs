//! Flattened, bounds-checked containers for the engine's multi-dimensional state.
//!
//! Species and cohorts are flattened into "slots" by a [`CohortLayout`]; a [`CohortField`]
//! then stores one value per (slot, cell, layer), a [`TracerField`] one value per
//! (cell, layer, tracer) and a [`LayerField`] one value per (cell, layer). Indexing with the
//! `Index` impls panics on out-of-range keys the same way a `Vec` does; the `get` methods
//! return `None` instead.

use super::ids::{CellId, SpeciesId, TracerId};
use std::ops::{Index, IndexMut};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Field shape mismatch: expected {expected:?}, found {found:?}")]
pub struct ShapeMismatch {
    pub expected: (usize, usize, usize),
    pub found: (usize, usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CohortLayout {
    offsets: Vec<usize>,
    cohorts: Vec<usize>,
    total: usize,
}

impl CohortLayout {
    pub fn new(cohorts_per_species: impl IntoIterator<Item = usize>) -> Self {
        let cohorts: Vec<usize> = cohorts_per_species.into_iter().collect();
        let mut offsets = Vec::with_capacity(cohorts.len());
        let mut total = 0;
        for &n in &cohorts {
            offsets.push(total);
            total += n;
        }
        Self {
            offsets,
            cohorts,
            total,
        }
    }

    #[inline]
    pub fn slot(&self, species: SpeciesId, cohort: usize) -> Option<usize> {
        let n = *self.cohorts.get(species.index())?;
        (cohort < n).then(|| self.offsets[species.index()] + cohort)
    }

    pub fn num_slots(&self) -> usize {
        self.total
    }

    pub fn num_species(&self) -> usize {
        self.cohorts.len()
    }

    pub fn cohorts(&self, species: SpeciesId) -> usize {
        self.cohorts.get(species.index()).copied().unwrap_or(0)
    }

    /// Every (species, cohort) pair in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SpeciesId, usize)> + '_ {
        self.cohorts
            .iter()
            .enumerate()
            .flat_map(|(s, &n)| (0..n).map(move |c| (SpeciesId(s), c)))
    }
}

/// One value per (species, cohort, cell, layer).
#[derive(Debug, Clone, PartialEq)]
pub struct CohortField<T> {
    layout: CohortLayout,
    num_cells: usize,
    num_layers: usize,
    data: Vec<T>,
}

impl<T: Clone> CohortField<T> {
    pub fn new(layout: CohortLayout, num_cells: usize, num_layers: usize, value: T) -> Self {
        let len = layout.num_slots() * num_cells * num_layers;
        Self {
            layout,
            num_cells,
            num_layers,
            data: vec![value; len],
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> CohortField<T> {
    #[inline]
    fn offset(&self, species: SpeciesId, cohort: usize, cell: CellId, layer: usize) -> Option<usize> {
        if cell.index() >= self.num_cells || layer >= self.num_layers {
            return None;
        }
        let slot = self.layout.slot(species, cohort)?;
        Some((slot * self.num_cells + cell.index()) * self.num_layers + layer)
    }

    pub fn get(&self, species: SpeciesId, cohort: usize, cell: CellId, layer: usize) -> Option<&T> {
        self.offset(species, cohort, cell, layer)
            .map(|i| &self.data[i])
    }

    pub fn get_mut(
        &mut self,
        species: SpeciesId,
        cohort: usize,
        cell: CellId,
        layer: usize,
    ) -> Option<&mut T> {
        self.offset(species, cohort, cell, layer)
            .map(|i| &mut self.data[i])
    }

    pub fn layout(&self) -> &CohortLayout {
        &self.layout
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn values(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(SpeciesId, usize, CellId, usize)> for CohortField<T> {
    type Output = T;

    fn index(&self, (species, cohort, cell, layer): (SpeciesId, usize, CellId, usize)) -> &T {
        match self.offset(species, cohort, cell, layer) {
            Some(i) => &self.data[i],
            None => panic!(
                "cohort field index out of range: {species} cohort {cohort} {cell} layer {layer}"
            ),
        }
    }
}

impl<T> IndexMut<(SpeciesId, usize, CellId, usize)> for CohortField<T> {
    fn index_mut(
        &mut self,
        (species, cohort, cell, layer): (SpeciesId, usize, CellId, usize),
    ) -> &mut T {
        match self.offset(species, cohort, cell, layer) {
            Some(i) => &mut self.data[i],
            None => panic!(
                "cohort field index out of range: {species} cohort {cohort} {cell} layer {layer}"
            ),
        }
    }
}

/// One value per (cell, layer, tracer); used for tracer levels and their rates of change.
#[derive(Debug, Clone, PartialEq)]
pub struct TracerField {
    num_cells: usize,
    num_layers: usize,
    num_tracers: usize,
    data: Vec<f64>,
}

impl TracerField {
    pub fn zeros(num_cells: usize, num_layers: usize, num_tracers: usize) -> Self {
        Self {
            num_cells,
            num_layers,
            num_tracers,
            data: vec![0.0; num_cells * num_layers * num_tracers],
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_cells, self.num_layers, self.num_tracers)
    }

    #[inline]
    fn offset(&self, cell: CellId, layer: usize, tracer: TracerId) -> Option<usize> {
        (cell.index() < self.num_cells && layer < self.num_layers && tracer.index() < self.num_tracers)
            .then(|| (cell.index() * self.num_layers + layer) * self.num_tracers + tracer.index())
    }

    pub fn get(&self, cell: CellId, layer: usize, tracer: TracerId) -> Option<f64> {
        self.offset(cell, layer, tracer).map(|i| self.data[i])
    }

    /// Adds `value` into the slot; out-of-range keys are ignored and reported as `false`.
    #[inline]
    pub fn add(&mut self, cell: CellId, layer: usize, tracer: TracerId, value: f64) -> bool {
        match self.offset(cell, layer, tracer) {
            Some(i) => {
                self.data[i] += value;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// `self += rate * dt`, element-wise.
    pub fn add_scaled(&mut self, rate: &TracerField, dt: f64) -> Result<(), ShapeMismatch> {
        if rate.shape() != self.shape() {
            return Err(ShapeMismatch {
                expected: self.shape(),
                found: rate.shape(),
            });
        }
        for (value, r) in self.data.iter_mut().zip(&rate.data) {
            *value += r * dt;
        }
        Ok(())
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

impl Index<(CellId, usize, TracerId)> for TracerField {
    type Output = f64;

    fn index(&self, (cell, layer, tracer): (CellId, usize, TracerId)) -> &f64 {
        match self.offset(cell, layer, tracer) {
            Some(i) => &self.data[i],
            None => panic!("tracer field index out of range: {cell} layer {layer} {tracer}"),
        }
    }
}

impl IndexMut<(CellId, usize, TracerId)> for TracerField {
    fn index_mut(&mut self, (cell, layer, tracer): (CellId, usize, TracerId)) -> &mut f64 {
        match self.offset(cell, layer, tracer) {
            Some(i) => &mut self.data[i],
            None => panic!("tracer field index out of range: {cell} layer {layer} {tracer}"),
        }
    }
}

/// One value per (cell, layer); used for forcing fields such as temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerField {
    num_cells: usize,
    num_layers: usize,
    data: Vec<f64>,
}

impl LayerField {
    pub fn filled(num_cells: usize, num_layers: usize, value: f64) -> Self {
        Self {
            num_cells,
            num_layers,
            data: vec![value; num_cells * num_layers],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_cells, self.num_layers)
    }

    pub fn get(&self, cell: CellId, layer: usize) -> Option<f64> {
        (cell.index() < self.num_cells && layer < self.num_layers)
            .then(|| self.data[cell.index() * self.num_layers + layer])
    }

    pub fn set(&mut self, cell: CellId, layer: usize, value: f64) -> bool {
        if cell.index() < self.num_cells && layer < self.num_layers {
            self.data[cell.index() * self.num_layers + layer] = value;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_field_is_bounds_checked() {
        let mut field = LayerField::filled(2, 3, 10.0);
        assert!(field.set(CellId(1), 2, 4.0));
        assert!(!field.set(CellId(2), 0, 4.0));
        assert_eq!(field.get(CellId(1), 2), Some(4.0));
        assert_eq!(field.get(CellId(0), 2), Some(10.0));
        assert_eq!(field.get(CellId(0), 3), None);
        assert_eq!(field.shape(), (2, 3));
    }

    #[test]
    fn layout_assigns_contiguous_slots_per_species() {
        let layout = CohortLayout::new([2, 3]);
        assert_eq!(layout.num_slots(), 5);
        assert_eq!(layout.slot(SpeciesId(0), 1), Some(1));
        assert_eq!(layout.slot(SpeciesId(1), 0), Some(2));
        assert_eq!(layout.slot(SpeciesId(1), 3), None);
        assert_eq!(layout.slot(SpeciesId(2), 0), None);
    }

    #[test]
    fn layout_iter_visits_every_cohort_in_slot_order() {
        let layout = CohortLayout::new([1, 2]);
        let pairs: Vec<_> = layout.iter().collect();
        assert_eq!(
            pairs,
            vec![(SpeciesId(0), 0), (SpeciesId(1), 0), (SpeciesId(1), 1)]
        );
    }

    #[test]
    fn cohort_field_keeps_entries_independent() {
        let mut field = CohortField::new(CohortLayout::new([2, 1]), 3, 2, 0.0);
        field[(SpeciesId(0), 1, CellId(2), 1)] = 4.0;
        field[(SpeciesId(1), 0, CellId(0), 0)] = 1.0;
        assert_eq!(field[(SpeciesId(0), 1, CellId(2), 1)], 4.0);
        assert_eq!(field[(SpeciesId(0), 0, CellId(2), 1)], 0.0);
        assert_eq!(field.values().iter().sum::<f64>(), 5.0);
    }

    #[test]
    fn cohort_field_get_is_bounds_checked() {
        let field = CohortField::new(CohortLayout::new([1]), 1, 1, 0u8);
        assert!(field.get(SpeciesId(0), 0, CellId(0), 0).is_some());
        assert!(field.get(SpeciesId(0), 0, CellId(1), 0).is_none());
        assert!(field.get(SpeciesId(0), 0, CellId(0), 1).is_none());
        assert!(field.get(SpeciesId(0), 1, CellId(0), 0).is_none());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn cohort_field_index_panics_out_of_range() {
        let field = CohortField::new(CohortLayout::new([1]), 1, 1, 0.0);
        let _ = field[(SpeciesId(0), 0, CellId(4), 0)];
    }

    #[test]
    fn tracer_field_add_ignores_out_of_range_keys() {
        let mut field = TracerField::zeros(2, 2, 3);
        assert!(field.add(CellId(1), 1, TracerId(2), 1.5));
        assert!(!field.add(CellId(2), 0, TracerId(0), 1.0));
        assert_eq!(field.get(CellId(1), 1, TracerId(2)), Some(1.5));
        assert_eq!(field.get(CellId(2), 0, TracerId(0)), None);
    }

    #[test]
    fn add_scaled_requires_matching_shape() {
        let mut levels = TracerField::zeros(1, 1, 2);
        let mut rate = TracerField::zeros(1, 1, 2);
        rate[(CellId(0), 0, TracerId(1))] = 2.0;
        levels.add_scaled(&rate, 0.5).unwrap();
        assert_eq!(levels[(CellId(0), 0, TracerId(1))], 1.0);

        let wrong = TracerField::zeros(1, 2, 2);
        assert!(levels.add_scaled(&wrong, 1.0).is_err());
    }
}
