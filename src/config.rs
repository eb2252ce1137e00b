use crate::physics::integrators::IntegratorRegistry;
use crate::physics::math::Scalar;
use crate::physics::session::{SessionSettings, Stabilization};
use crate::physics::solver::SolverSettings;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Resource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub physics: PhysicsConfig,
    pub scene: SceneConfig,
    pub run: RunConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Simulated seconds per frame
    pub timestep: Scalar,
    /// Session steps per frame; each advances `timestep / substeps`
    pub substeps: usize,
    pub integrator: String,
    pub stabilization: Stabilization,
    pub solver: SolverSettings,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            substeps: 1,
            integrator: "rk4".to_string(),
            stabilization: Stabilization::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl PhysicsConfig {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            stabilization: self.stabilization,
            solver: self.solver,
        }
    }

    /// Step size handed to the session for each substep
    pub fn substep(&self) -> Scalar {
        self.timestep / self.substeps.max(1) as Scalar
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Balls in the hanging chain, including the anchored first ball
    pub chain_length: usize,
    pub ball_radius: Scalar,
    pub ball_spacing: Scalar,
    pub ball_mass: Scalar,
    /// Downward acceleration along -y
    pub gravity: Scalar,
    pub ground_height: Scalar,
    /// Drop a free ball onto the chain
    pub falling_ball: bool,
    /// Additional free balls scattered above the ground
    pub extra_balls: usize,
    /// Horizontal radius of the area extra balls are scattered over
    pub spawn_radius: Scalar,
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            chain_length: 3,
            ball_radius: 0.2,
            ball_spacing: 1.0,
            ball_mass: 10.0,
            gravity: 9.81,
            ground_height: 0.0,
            falling_ball: true,
            extra_balls: 0,
            spawn_radius: 2.0,
            seed: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Frames to simulate before exiting; 0 runs until interrupted
    pub steps: usize,
    /// Frames between progress reports; 0 disables reporting
    pub report_interval: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: 600,
            report_interval: 60,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a file, falling back to defaults if the file doesn't exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                info!("Config file {} not found. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    /// Load `config.toml` from the platform configuration directory
    pub fn load_from_user_config() -> Self {
        match Self::user_config_path() {
            Some(path) => Self::load_or_default(path),
            None => {
                info!("No configuration directory available. Using defaults.");
                Self::default()
            }
        }
    }

    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tether")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values the simulation cannot run with
    pub fn validate(&self, registry: &IntegratorRegistry) -> Result<(), String> {
        let physics = &self.physics;
        let scene = &self.scene;

        if !(physics.timestep > 0.0 && physics.timestep.is_finite()) {
            return Err(format!(
                "physics.timestep must be positive, got {}",
                physics.timestep
            ));
        }
        if physics.substeps == 0 {
            return Err("physics.substeps must be at least 1".to_string());
        }
        registry.create(&physics.integrator)?;
        if !(scene.ball_mass > 0.0 && scene.ball_mass.is_finite()) {
            return Err(format!(
                "scene.ball_mass must be positive, got {}",
                scene.ball_mass
            ));
        }
        if scene.ball_radius <= 0.0 {
            return Err(format!(
                "scene.ball_radius must be positive, got {}",
                scene.ball_radius
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = SimulationConfig::default();
        config.physics.integrator = "heun".to_string();
        config.physics.solver.max_iterations = Some(50);
        config.scene.seed = Some(7);

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SimulationConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: SimulationConfig = toml::from_str(
            r#"
            [physics]
            substeps = 4

            [physics.stabilization]
            stiffness = 50.0

            [scene]
            extra_balls = 5
            "#,
        )
        .unwrap();

        assert_eq!(parsed.physics.substeps, 4);
        assert_eq!(parsed.physics.stabilization.stiffness, 50.0);
        assert_eq!(parsed.physics.stabilization.damping, 10.0);
        assert_eq!(parsed.physics.integrator, "rk4");
        assert_eq!(parsed.scene.extra_balls, 5);
        assert_eq!(parsed.scene.chain_length, 3);
        assert_eq!(parsed.run, RunConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = SimulationConfig::load_or_default("/nonexistent/tether/config.toml");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("tether-config-{}", std::process::id()))
            .join(CONFIG_FILE_NAME);
        let mut config = SimulationConfig::default();
        config.run.steps = 42;

        config.save(&path).unwrap();
        assert_eq!(SimulationConfig::load_or_default(&path), config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_validation() {
        let registry = IntegratorRegistry::default();
        assert!(SimulationConfig::default().validate(&registry).is_ok());

        let mut config = SimulationConfig::default();
        config.physics.integrator = "verlet".to_string();
        assert!(config.validate(&registry).is_err());

        let mut config = SimulationConfig::default();
        config.physics.substeps = 0;
        assert!(config.validate(&registry).is_err());

        let mut config = SimulationConfig::default();
        config.physics.timestep = -0.1;
        assert!(config.validate(&registry).is_err());
    }

    #[test]
    fn test_substep() {
        let mut physics = PhysicsConfig::default();
        physics.timestep = 0.02;
        physics.substeps = 4;
        assert_eq!(physics.substep(), 0.005);
        assert_eq!(physics.session_settings().stabilization.stiffness, 100.0);
    }
}
