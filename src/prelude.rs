//! tether prelude module
//!
//! Re-exports the types the driver's plugins use most, to reduce import
//! boilerplate.

// External crate re-exports
pub use bevy::prelude::*;
pub use rand::Rng;

// Internal re-exports - Physics
pub use crate::physics::math::{Scalar, Vector};

// Internal re-exports - Config
pub use crate::config::SimulationConfig;

// Internal re-exports - Resources
pub use crate::resources::{ActiveIntegrator, SharedRng, SimulationStats};
