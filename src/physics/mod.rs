//! Constraint-based particle dynamics kernel
//!
//! Everything in here is plain Rust over `f64` DOF vectors; bevy is only used
//! for its logging macros.

pub mod constraint;
pub mod definition;
pub mod expr;
pub mod force;
pub mod integrators;
pub mod math;
pub mod session;
pub mod solver;
pub mod sparse;

pub use constraint::{CONTACT_EPSILON, ConstraintDefinition};
pub use definition::{Definition, DefinitionId};
pub use expr::{ExprArena, ExprId, Predicate, Scope, Variable};
pub use force::ForceDefinition;
pub use session::{PhysicsError, PhysicsSession, SessionSettings, Stabilization, StepReport};
pub use solver::{Solution, SolverSettings, solve, solve_with};
pub use sparse::SparseMatrix;
