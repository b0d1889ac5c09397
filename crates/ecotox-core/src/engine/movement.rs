use super::context::{EngineState, SimulationContext};
use super::error::EngineError;
use crate::core::kinetics::SMALL;
use crate::core::models::field::CohortField;
use crate::core::models::grid::SpatialGrid;
use crate::core::models::ids::{CellId, SpeciesId};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Headcount that moved between two (cell, layer) positions of one cohort.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Flow {
    from: (CellId, usize),
    to: (CellId, usize),
    amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementSummary {
    pub moved: f64,
    /// Departures no gaining destination could absorb; their proportion is dropped.
    pub unmatched: f64,
}

/// Carries contaminated proportions along with cohort movement.
///
/// `before` and `after` are cohort headcounts around the external transport step. Departing
/// individuals fill other gaining layers of the same cell first, then the gaining layers of
/// neighbouring cells, nearest first.
#[instrument(skip_all, name = "movement_coupling")]
pub fn couple_movement(
    context: &SimulationContext,
    state: &mut EngineState,
    before: &CohortField<f64>,
    after: &CohortField<f64>,
) -> Result<MovementSummary, EngineError> {
    context.check_cohort_field("headcount before movement", before)?;
    context.check_cohort_field("headcount after movement", after)?;
    let mut summary = MovementSummary::default();
    if !context.config.track_proportion {
        return Ok(summary);
    }

    let grid = context.grid;
    for (species, cohort) in context.registry.layout().iter() {
        let (flows, unmatched) = route_departures(grid, species, cohort, before, after);
        summary.moved += flows.iter().map(|f| f.amount).sum::<f64>();
        summary.unmatched += unmatched;
        if flows.is_empty() {
            continue;
        }
        for exposure in state.exposure.iter_mut() {
            let mut arrivals: BTreeMap<(CellId, usize), f64> = BTreeMap::new();
            for flow in &flows {
                let p_src = exposure[(species, cohort, flow.from.0, flow.from.1)].proportion;
                *arrivals.entry(flow.to).or_insert(0.0) += flow.amount * p_src;
            }
            for ((cell, layer), contaminated) in arrivals {
                // Destinations gained, so `before` is their resident headcount.
                let residents = before[(species, cohort, cell, layer)];
                let total = after[(species, cohort, cell, layer)].max(SMALL);
                let entry = &mut exposure[(species, cohort, cell, layer)];
                entry.proportion =
                    ((entry.proportion * residents + contaminated) / total).clamp(0.0, 1.0);
            }
        }
    }
    if summary.unmatched > 0.0 {
        debug!(
            moved = summary.moved,
            unmatched = summary.unmatched,
            "Dropped proportion of unmatched departures"
        );
    }
    Ok(summary)
}

fn route_departures(
    grid: &SpatialGrid,
    species: SpeciesId,
    cohort: usize,
    before: &CohortField<f64>,
    after: &CohortField<f64>,
) -> (Vec<Flow>, f64) {
    let max_layers = grid.max_layers();
    let index = |cell: CellId, layer: usize| cell.index() * max_layers + layer;
    let mut capacity = vec![0.0; grid.num_cells() * max_layers];
    for cell in grid.cell_ids() {
        for layer in 0..grid.num_layers(cell) {
            let gain = after[(species, cohort, cell, layer)] - before[(species, cohort, cell, layer)];
            capacity[index(cell, layer)] = gain.max(0.0);
        }
    }

    let mut flows = Vec::new();
    let mut unmatched = 0.0;
    for cell in grid.cell_ids() {
        let layers = grid.num_layers(cell);
        for layer in 0..layers {
            let mut left =
                before[(species, cohort, cell, layer)] - after[(species, cohort, cell, layer)];
            if left <= 0.0 {
                continue;
            }
            let same_cell = (0..layers).filter(|&l| l != layer).map(|l| (cell, l));
            let neighbours = grid
                .neighbors(cell)
                .iter()
                .flat_map(|&n| (0..grid.num_layers(n)).map(move |l| (n, l)));
            for (to_cell, to_layer) in same_cell.chain(neighbours) {
                if left <= 0.0 {
                    break;
                }
                let slot = &mut capacity[index(to_cell, to_layer)];
                let take = left.min(*slot);
                if take > 0.0 {
                    *slot -= take;
                    left -= take;
                    flows.push(Flow {
                        from: (cell, layer),
                        to: (to_cell, to_layer),
                        amount: take,
                    });
                }
            }
            if left > SMALL {
                debug!(%species, cohort, %cell, layer, residual = left, "Unmatched departures");
                unmatched += left;
            }
        }
    }
    (flows, unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contaminant::registry::ContaminantRegistry;
    use crate::core::kinetics::uptake::UptakeKinetics;
    use crate::core::models::habitat::Habitat;
    use crate::core::models::ids::ContaminantId;
    use crate::engine::config::{EngineConfig, MortalityModel};
    use crate::engine::fixtures;
    use crate::engine::progress::ProgressReporter;

    fn registry() -> ContaminantRegistry {
        fixtures::registry(
            vec![fixtures::species("Herring", 1, vec![Habitat::WaterColumn])],
            vec![fixtures::contaminant(
                "Oil",
                fixtures::water_pool(0),
                &[(
                    "Herring",
                    fixtures::coefficients(UptakeKinetics::LinearSaturating, 0.1),
                )],
            )],
        )
    }

    fn config(track: bool) -> EngineConfig {
        fixtures::config(MortalityModel::InVitro)
            .track_proportion(track)
            .build()
            .unwrap()
    }

    fn headcounts(
        registry: &ContaminantRegistry,
        cells: usize,
        layers: usize,
        values: &[f64],
    ) -> CohortField<f64> {
        let mut field = CohortField::new(registry.layout().clone(), cells, layers, 0.0);
        for (i, &v) in values.iter().enumerate() {
            field[(SpeciesId(0), 0, CellId(i / layers), i % layers)] = v;
        }
        field
    }

    fn set_proportion(state: &mut EngineState, cell: usize, layer: usize, p: f64) {
        state
            .exposure_mut(ContaminantId(0), SpeciesId(0), 0, CellId(cell), layer)
            .unwrap()
            .proportion = p;
    }

    fn proportion(state: &EngineState, cell: usize, layer: usize) -> f64 {
        state
            .exposure(ContaminantId(0), SpeciesId(0), 0, CellId(cell), layer)
            .unwrap()
            .proportion
    }

    #[test]
    fn arrivals_mix_with_residents() {
        let (registry, grid, config) = (registry(), fixtures::row_grid(2, 1), config(true));
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&registry, &grid, &config, &reporter);
        let mut state = EngineState::new(&context);
        set_proportion(&mut state, 0, 0, 1.0);

        let before = headcounts(&registry, 2, 1, &[10.0, 5.0]);
        let after = headcounts(&registry, 2, 1, &[5.0, 10.0]);
        let summary = couple_movement(&context, &mut state, &before, &after).unwrap();

        assert_eq!(summary.moved, 5.0);
        assert_eq!(summary.unmatched, 0.0);
        assert!((proportion(&state, 1, 0) - 0.5).abs() < 1e-12);
        assert_eq!(proportion(&state, 0, 0), 1.0);
    }

    #[test]
    fn same_cell_layers_are_filled_before_neighbours() {
        let (registry, grid, config) = (registry(), fixtures::row_grid(2, 2), config(true));
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&registry, &grid, &config, &reporter);
        let mut state = EngineState::new(&context);
        set_proportion(&mut state, 0, 0, 0.8);

        // Cell 0 layer 0 loses 4; its own bottom layer and cell 1 layer 0 both gain 4.
        let before = headcounts(&registry, 2, 2, &[8.0, 4.0, 4.0, 0.0]);
        let after = headcounts(&registry, 2, 2, &[4.0, 8.0, 8.0, 0.0]);
        let summary = couple_movement(&context, &mut state, &before, &after).unwrap();

        assert_eq!(summary.moved, 4.0);
        assert!((proportion(&state, 0, 1) - 0.4).abs() < 1e-12);
        assert_eq!(proportion(&state, 1, 0), 0.0);
    }

    #[test]
    fn unmatched_departures_are_reported() {
        let (registry, grid, config) = (registry(), fixtures::row_grid(2, 1), config(true));
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&registry, &grid, &config, &reporter);
        let mut state = EngineState::new(&context);
        set_proportion(&mut state, 0, 0, 1.0);

        let before = headcounts(&registry, 2, 1, &[10.0, 0.0]);
        let after = headcounts(&registry, 2, 1, &[2.0, 3.0]);
        let summary = couple_movement(&context, &mut state, &before, &after).unwrap();

        assert_eq!(summary.moved, 3.0);
        assert_eq!(summary.unmatched, 5.0);
        assert_eq!(proportion(&state, 1, 0), 1.0);
    }

    #[test]
    fn proportions_stay_bounded_under_arbitrary_moves() {
        let (registry, grid, config) = (registry(), fixtures::row_grid(3, 2), config(true));
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&registry, &grid, &config, &reporter);
        let mut state = EngineState::new(&context);
        for (i, p) in [0.9, 0.1, 1.0, 0.5, 0.0, 0.7].into_iter().enumerate() {
            set_proportion(&mut state, i / 2, i % 2, p);
        }
        let before = headcounts(&registry, 3, 2, &[5.0, 1.0, 9.0, 0.5, 2.0, 7.0]);
        let after = headcounts(&registry, 3, 2, &[0.1, 6.0, 2.0, 4.0, 9.0, 0.0]);
        couple_movement(&context, &mut state, &before, &after).unwrap();
        for cell in 0..3 {
            for layer in 0..2 {
                assert!((0.0..=1.0).contains(&proportion(&state, cell, layer)));
            }
        }
    }

    #[test]
    fn untracked_proportions_make_coupling_a_no_op() {
        let (registry, grid, config) = (registry(), fixtures::row_grid(2, 1), config(false));
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&registry, &grid, &config, &reporter);
        let mut state = EngineState::new(&context);
        let before = headcounts(&registry, 2, 1, &[10.0, 5.0]);
        let after = headcounts(&registry, 2, 1, &[5.0, 10.0]);
        let summary = couple_movement(&context, &mut state, &before, &after).unwrap();
        assert_eq!(summary, MovementSummary::default());
    }

    #[test]
    fn misshapen_headcounts_are_rejected() {
        let (registry, grid, config) = (registry(), fixtures::row_grid(2, 1), config(true));
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&registry, &grid, &config, &reporter);
        let mut state = EngineState::new(&context);
        let before = headcounts(&registry, 1, 1, &[10.0]);
        let after = headcounts(&registry, 2, 1, &[5.0, 10.0]);
        assert!(matches!(
            couple_movement(&context, &mut state, &before, &after),
            Err(EngineError::Dimension { .. })
        ));
    }
}
