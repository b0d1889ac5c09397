//! Transient per-unit flux bookkeeping and the reconciliation of uptake demand against the
//! mass a free pool actually holds.

use crate::core::models::habitat::{Habitat, PerHabitat};
use crate::core::models::ids::ContaminantId;

/// What happened to one cohort's body burden during the sub-step, in body-burden units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CohortFlux {
    pub uptake: f64,
    pub transfer: f64,
    /// `transfer` split by the habitat the predation or loss event happened in.
    pub transfer_by_habitat: PerHabitat<f64>,
    pub decayed: f64,
}

impl CohortFlux {
    pub fn add_transfer(&mut self, habitat: Habitat, amount: f64) {
        self.transfer += amount;
        self.transfer_by_habitat[habitat] += amount;
    }

    /// Rate of change contributed to the body-burden tracer.
    #[inline]
    pub fn net(&self) -> f64 {
        self.uptake + self.transfer - self.decayed
    }
}

/// Flux accumulators for every (contaminant, cohort slot) of one cell and layer.
#[derive(Debug, Clone)]
pub struct FluxLedger {
    num_slots: usize,
    cohorts: Vec<CohortFlux>,
    pool_gain: Vec<PerHabitat<f64>>,
}

impl FluxLedger {
    pub fn new(num_contaminants: usize, num_slots: usize) -> Self {
        Self {
            num_slots,
            cohorts: vec![CohortFlux::default(); num_contaminants * num_slots],
            pool_gain: vec![PerHabitat::splat(0.0); num_contaminants],
        }
    }

    pub fn reset(&mut self) {
        self.cohorts.fill(CohortFlux::default());
        self.pool_gain.fill(PerHabitat::splat(0.0));
    }

    #[inline]
    pub fn cohort(&self, contaminant: ContaminantId, slot: usize) -> &CohortFlux {
        &self.cohorts[contaminant.index() * self.num_slots + slot]
    }

    #[inline]
    pub fn cohort_mut(&mut self, contaminant: ContaminantId, slot: usize) -> &mut CohortFlux {
        &mut self.cohorts[contaminant.index() * self.num_slots + slot]
    }

    pub fn add_pool_gain(&mut self, contaminant: ContaminantId, habitat: Habitat, amount: f64) {
        self.pool_gain[contaminant.index()][habitat] += amount;
    }

    pub fn pool_gain(&self, contaminant: ContaminantId, habitat: Habitat) -> f64 {
        self.pool_gain[contaminant.index()][habitat]
    }
}

/// Scales `uptakes` down so the pool cannot hand out more than it holds over `dt`.
///
/// Demands and `decayed` are rates in pool units. When `(Σ uptake + decayed) * dt` exceeds
/// `env`, the residual `env / dt - decayed` is shared pro rata. Returns the reconciled
/// total uptake.
pub fn reconcile(env: f64, decayed: f64, uptakes: &mut [f64], dt: f64) -> f64 {
    let total: f64 = uptakes.iter().sum();
    if dt <= 0.0 || (total + decayed) * dt <= env {
        return total;
    }
    if env <= 0.0 || total <= 0.0 {
        uptakes.fill(0.0);
        return 0.0;
    }
    let residual = (env / dt - decayed).max(0.0);
    let scale = residual / total;
    for u in uptakes.iter_mut() {
        *u *= scale;
    }
    residual
}

/// Net rate of change of a free pool.
#[inline]
pub fn pool_net_flux(gain: f64, decayed: f64, reconciled_uptake: f64) -> f64 {
    gain - (decayed + reconciled_uptake)
}
