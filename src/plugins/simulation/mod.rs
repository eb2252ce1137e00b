//! Simulation plugin
//!
//! Owns the scene: spawns the bodies at startup, then every frame rebuilds
//! a constrained particle session from the ECS state, steps it and writes
//! the result back. Progress is logged and the app exits after the
//! configured number of frames.

use crate::prelude::*;

pub mod components;
pub mod physics;

use crate::physics::integrators::{Integrator, IntegratorRegistry, RungeKuttaFourthOrder};
use physics::{PhysicsSet, exit_after_steps, report_progress, spawn_scene, step_simulation};

pub struct SimulationPlugin {
    config: Option<SimulationConfig>,
}

impl SimulationPlugin {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn with_config(config: SimulationConfig) -> Self {
        Self {
            config: Some(config),
        }
    }
}

impl Default for SimulationPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        let config = self
            .config
            .clone()
            .unwrap_or_else(SimulationConfig::load_from_user_config);

        match toml::to_string_pretty(&config) {
            Ok(toml_string) => {
                debug!("=== Current Configuration (TOML) ===\n{}", toml_string);
                debug!("=== End Configuration ===");
            }
            Err(e) => {
                error!("Failed to serialize configuration to TOML: {}", e);
            }
        }

        let registry = IntegratorRegistry::default();
        let integrator = match registry.create(&config.physics.integrator) {
            Ok(integrator) => integrator,
            Err(e) => {
                warn!(
                    "Failed to create integrator '{}': {}. Falling back to {}",
                    config.physics.integrator,
                    e,
                    RungeKuttaFourthOrder.name()
                );
                Box::new(RungeKuttaFourthOrder)
            }
        };
        info!("Integrating with {}", integrator.name());

        app.insert_resource(SharedRng::from_optional_seed(config.scene.seed));
        app.insert_resource(ActiveIntegrator(integrator));
        app.init_resource::<SimulationStats>();
        app.insert_resource(config);

        app.configure_sets(
            Update,
            (PhysicsSet::Step, PhysicsSet::Report, PhysicsSet::Exit).chain(),
        );

        app.add_systems(Startup, spawn_scene);
        app.add_systems(
            Update,
            (
                step_simulation.in_set(PhysicsSet::Step),
                report_progress.in_set(PhysicsSet::Report),
                exit_after_steps.in_set(PhysicsSet::Exit),
            ),
        );
    }
}
