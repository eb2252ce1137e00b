use crate::physics::integrators::{Integrator, RungeKuttaFourthOrder};
use crate::physics::session::StepReport;
use crate::prelude::*;
use rand_chacha::{ChaCha8Rng, rand_core::SeedableRng};

#[derive(Resource, Deref, DerefMut, Debug, Clone, PartialEq)]
pub struct SharedRng(pub ChaCha8Rng);

impl SharedRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::default(),
        }
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self(ChaCha8Rng::from_rng(&mut rand::rng()))
    }
}

/// Resource holding the integrator every frame's session is stepped with
#[derive(Resource)]
pub struct ActiveIntegrator(pub Box<dyn Integrator>);

impl Default for ActiveIntegrator {
    fn default() -> Self {
        Self(Box::new(RungeKuttaFourthOrder))
    }
}

/// Running totals and diagnostics of the most recent frame
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub frame: usize,
    pub time: Scalar,
    pub kinetic_energy: Scalar,
    pub potential_energy: Scalar,
    /// Largest `|C|` over all constraints after the frame
    pub max_violation: Scalar,
    pub constraints: usize,
    pub contacts: usize,
    pub report: StepReport,
}

impl SimulationStats {
    pub fn total_energy(&self) -> Scalar {
        self.kinetic_energy + self.potential_energy
    }
}
