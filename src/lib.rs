//! tether library
//!
//! A constraint-based particle dynamics kernel: symbolic constraint and
//! force definitions, a sparse conjugate gradient solver for the
//! Lagrange multipliers, pluggable integrators, and a headless bevy driver
//! that builds a session from scene entities every frame.

pub mod cli;
pub mod config;
pub mod physics;
pub mod plugins;
pub mod prelude;
pub mod resources;

pub use physics::{
    ConstraintDefinition, ForceDefinition, PhysicsError, PhysicsSession, SessionSettings,
    StepReport,
};
