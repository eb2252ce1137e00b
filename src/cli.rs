//! Command line interface for tether

use clap::Parser;
use std::fmt;

use crate::config::SimulationConfig;
use crate::physics::integrators::IntegratorRegistry;

/// CLI-specific errors
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is unusable
    ConfigLoad(String),
    /// Invalid integrator name provided
    InvalidIntegrator(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::ConfigLoad(msg) => write!(f, "Failed to load configuration: {msg}"),
            CliError::InvalidIntegrator(msg) => write!(f, "Invalid integrator: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

/// tether - headless constrained particle simulation
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Number of frames to simulate (overrides config file)
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub steps: Option<usize>,

    /// Simulated seconds per frame
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timestep: Option<f64>,

    /// Session steps per frame
    #[arg(long, value_name = "COUNT")]
    pub substeps: Option<usize>,

    /// Integrator type (e.g., rk4, heun, explicit_euler)
    #[arg(short = 'i', long, value_name = "TYPE")]
    pub integrator: Option<String>,

    /// Random seed for scattering extra balls
    #[arg(short = 's', long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Number of extra free balls to scatter
    #[arg(short = 'b', long, value_name = "COUNT")]
    pub extra_balls: Option<usize>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List available integrators and exit
    #[arg(long)]
    pub list_integrators: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Handles the --list-integrators flag by printing available integrators
pub fn handle_list_integrators() {
    let registry = IntegratorRegistry::default();
    println!("Available integrators:");
    for line in registry.describe().lines() {
        println!("  - {line}");
    }
}

/// Handles the --print-config flag
pub fn handle_print_config(config: &SimulationConfig) -> Result<(), CliError> {
    let text =
        toml::to_string_pretty(config).map_err(|err| CliError::ConfigLoad(err.to_string()))?;
    print!("{text}");
    Ok(())
}

/// Loads configuration from file or defaults, then applies command-line overrides
pub fn load_and_apply_config(args: &Args) -> Result<SimulationConfig, CliError> {
    let mut config = if let Some(config_path) = &args.config {
        println!("Loading configuration from: {config_path}");
        SimulationConfig::load_or_default(config_path)
    } else {
        SimulationConfig::load_from_user_config()
    };

    apply_overrides(&mut config, args)?;

    let registry = IntegratorRegistry::default();
    config
        .validate(&registry)
        .map_err(CliError::ConfigLoad)?;

    Ok(config)
}

/// Apply command-line overrides on top of a loaded configuration
pub fn apply_overrides(config: &mut SimulationConfig, args: &Args) -> Result<(), CliError> {
    if let Some(steps) = args.steps {
        println!("Overriding step count to: {steps}");
        config.run.steps = steps;
    }

    if let Some(timestep) = args.timestep {
        println!("Overriding timestep to: {timestep}");
        config.physics.timestep = timestep;
    }

    if let Some(substeps) = args.substeps {
        println!("Overriding substeps to: {substeps}");
        config.physics.substeps = substeps;
    }

    if let Some(integrator_type) = &args.integrator {
        // Validate integrator name against registry
        let registry = IntegratorRegistry::default();
        registry
            .create(integrator_type)
            .map_err(CliError::InvalidIntegrator)?;

        println!("Using integrator: {integrator_type}");
        config.physics.integrator = integrator_type.clone();
    }

    if let Some(seed) = args.seed {
        println!("Using random seed: {seed}");
        config.scene.seed = Some(seed);
    }

    if let Some(extra_balls) = args.extra_balls {
        println!("Scattering {extra_balls} extra balls");
        config.scene.extra_balls = extra_balls;
    }

    Ok(())
}
