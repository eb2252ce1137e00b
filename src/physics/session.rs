//! The physics session: global state, registrations and the step pipeline
//!
//! A session owns the concatenated `[positions, velocities]` state of `N`
//! scalar degrees of freedom together with a mass per DOF. Forces and
//! constraints are registered by binding a shared compiled definition to a
//! slice of DOF indices and a slice of parameters. Every integrator stage
//! evaluates the derivative by
//!
//! 1. accumulating the generalized force `Q` from every force registration,
//! 2. assembling `C`, `dC/dt` and the sparse Jacobians `J`, `J_dt` from every
//!    constraint registration,
//! 3. solving `J W Jᵀ λ = -J_dt v - J W Q - ks C - kd dC/dt` matrix-free with
//!    conjugate gradient, and
//! 4. returning `[v, (Q + Jᵀ λ) W]`, where `W` holds the inverse masses.

use crate::physics::constraint::ConstraintDefinition;
use crate::physics::definition::{Definition, DefinitionId};
use crate::physics::expr::Scope;
use crate::physics::force::ForceDefinition;
use crate::physics::integrators::{Integrator, RungeKuttaFourthOrder};
use crate::physics::math::{Scalar, VecN};
use crate::physics::solver::{SolverSettings, solve_with};
use crate::physics::sparse::SparseMatrix;
use bevy::log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Precondition violations reported by session construction and registration
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// Position and velocity vectors differ in length
    LengthMismatch { positions: usize, velocities: usize },
    MassCountMismatch { expected: usize, actual: usize },
    NonPositiveMass { index: usize, mass: Scalar },
    ComponentCountMismatch {
        definition: String,
        expected: usize,
        actual: usize,
    },
    ParameterCountMismatch {
        definition: String,
        expected: usize,
        actual: usize,
    },
    ComponentOutOfRange {
        definition: String,
        index: usize,
        dofs: usize,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::LengthMismatch {
                positions,
                velocities,
            } => write!(
                f,
                "{} positions but {} velocities; both must describe the same DOFs",
                positions, velocities
            ),
            PhysicsError::MassCountMismatch { expected, actual } => {
                write!(f, "Expected {} masses, got {}", expected, actual)
            }
            PhysicsError::NonPositiveMass { index, mass } => {
                write!(
                    f,
                    "Mass of DOF {} must be positive and finite, got {}",
                    index, mass
                )
            }
            PhysicsError::ComponentCountMismatch {
                definition,
                expected,
                actual,
            } => write!(
                f,
                "'{}' expects {} component indices, got {}",
                definition, expected, actual
            ),
            PhysicsError::ParameterCountMismatch {
                definition,
                expected,
                actual,
            } => write!(
                f,
                "'{}' expects {} parameters, got {}",
                definition, expected, actual
            ),
            PhysicsError::ComponentOutOfRange {
                definition,
                index,
                dofs,
            } => write!(
                f,
                "'{}' references DOF {} but the session has {} DOFs",
                definition, index, dofs
            ),
        }
    }
}

impl std::error::Error for PhysicsError {}

/// Baumgarte gains pulling drifted constraints back to `C = 0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stabilization {
    pub stiffness: Scalar,
    pub damping: Scalar,
}

impl Default for Stabilization {
    fn default() -> Self {
        Self {
            stiffness: 100.0,
            damping: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub stabilization: Stabilization,
    pub solver: SolverSettings,
}

/// Summary of the most recent step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Derivative evaluations performed
    pub substages: usize,
    /// Conjugate gradient iterations summed over all substages
    pub solver_iterations: usize,
    /// Largest iteration count of a single solve
    pub max_solver_iterations: usize,
    /// Whether any solve stopped at the iteration cap
    pub hit_iteration_cap: bool,
}

/// Slice of the shared pools bound to one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    component_offset: usize,
    component_count: usize,
    parameter_offset: usize,
    parameter_count: usize,
}

impl Mapping {
    fn components(&self) -> Range<usize> {
        self.component_offset..self.component_offset + self.component_count
    }

    fn parameters(&self) -> Range<usize> {
        self.parameter_offset..self.parameter_offset + self.parameter_count
    }
}

#[derive(Debug)]
struct Group<D> {
    definition: Arc<D>,
    mappings: Vec<Mapping>,
}

/// Registrations grouped by definition, in first-registration order
#[derive(Debug)]
struct Registry<D> {
    groups: Vec<Group<D>>,
    lookup: HashMap<DefinitionId, usize>,
    /// `(group, slot)` of each registration as it arrived
    order: Vec<(usize, usize)>,
    instances: usize,
}

impl<D: Definition> Registry<D> {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            lookup: HashMap::new(),
            order: Vec::new(),
            instances: 0,
        }
    }

    fn insert(&mut self, definition: Arc<D>, mapping: Mapping) {
        let index = *self.lookup.entry(definition.id()).or_insert_with(|| {
            self.groups.push(Group {
                definition,
                mappings: Vec::new(),
            });
            self.groups.len() - 1
        });
        let mappings = &mut self.groups[index].mappings;
        self.order.push((index, mappings.len()));
        mappings.push(mapping);
        self.instances += 1;
    }

    fn iter(&self) -> impl Iterator<Item = (&D, &Mapping)> {
        self.groups.iter().flat_map(|group| {
            group
                .mappings
                .iter()
                .map(move |mapping| (group.definition.as_ref(), mapping))
        })
    }

    fn iter_registered(&self) -> impl Iterator<Item = (&D, &Mapping)> {
        self.order.iter().map(|&(group, slot)| {
            let group = &self.groups[group];
            (group.definition.as_ref(), &group.mappings[slot])
        })
    }
}

/// Fixed part of the model seen by every derivative evaluation
#[derive(Debug)]
struct Model {
    dofs: usize,
    masses: VecN,
    inverse_masses: VecN,
    forces: Registry<ForceDefinition>,
    constraints: Registry<ConstraintDefinition>,
    component_pool: Vec<usize>,
    parameter_pool: Vec<Scalar>,
    settings: SessionSettings,
}

/// Buffers reused across substages
#[derive(Debug, Default)]
struct Workspace {
    forces: VecN,
    c: VecN,
    c_dt: VecN,
    jacobian: SparseMatrix,
    jacobian_dt: SparseMatrix,
    rhs: VecN,
    weighted: VecN,
    local_positions: Vec<Scalar>,
    local_velocities: Vec<Scalar>,
    local_output: Vec<Scalar>,
    local_jacobian_dt: Vec<Scalar>,
    scratch: Vec<Scalar>,
}

impl Workspace {
    fn gather(&mut self, indices: &[usize], positions: &[Scalar], velocities: &[Scalar]) {
        self.local_positions.clear();
        self.local_velocities.clear();
        for &index in indices {
            self.local_positions.push(positions[index]);
            self.local_velocities.push(velocities[index]);
        }
    }
}

impl Model {
    fn accumulate_forces(
        &self,
        workspace: &mut Workspace,
        positions: &[Scalar],
        velocities: &[Scalar],
        time: Scalar,
    ) {
        workspace.forces.reset(self.dofs);

        for (definition, mapping) in self.forces.iter() {
            let indices = &self.component_pool[mapping.components()];
            workspace.gather(indices, positions, velocities);
            workspace.local_output.resize(mapping.component_count, 0.0);

            let scope = Scope::new(
                &workspace.local_positions,
                &workspace.local_velocities,
                &self.parameter_pool[mapping.parameters()],
                time,
            );
            definition.compute_q_into(&scope, &mut workspace.local_output);

            for (&index, &q) in indices.iter().zip(&workspace.local_output) {
                workspace.forces[index] += q;
            }
        }
    }

    fn assemble_constraints(
        &self,
        workspace: &mut Workspace,
        positions: &[Scalar],
        velocities: &[Scalar],
        time: Scalar,
    ) {
        workspace.jacobian.clear(self.dofs);
        workspace.jacobian_dt.clear(self.dofs);
        workspace.c.reset(0);
        workspace.c_dt.reset(0);

        for (definition, mapping) in self.constraints.iter() {
            let indices = &self.component_pool[mapping.components()];
            workspace.gather(indices, positions, velocities);
            workspace.local_output.resize(mapping.component_count, 0.0);
            workspace
                .local_jacobian_dt
                .resize(mapping.component_count, 0.0);

            let scope = Scope::new(
                &workspace.local_positions,
                &workspace.local_velocities,
                &self.parameter_pool[mapping.parameters()],
                time,
            );
            let (c, c_dt) = definition.evaluate_into(
                &scope,
                &mut workspace.scratch,
                &mut workspace.local_output,
                &mut workspace.local_jacobian_dt,
            );

            workspace.jacobian.push_row(indices, &workspace.local_output);
            workspace
                .jacobian_dt
                .push_row(indices, &workspace.local_jacobian_dt);
            workspace.c.push(c);
            workspace.c_dt.push(c_dt);
        }
    }

    /// `f(state, t)` for the whole system
    fn derivative(
        &self,
        workspace: &mut Workspace,
        report: &mut StepReport,
        state: &VecN,
        time: Scalar,
    ) -> VecN {
        let (positions, velocities) = state.split_at(self.dofs);
        report.substages += 1;

        self.accumulate_forces(workspace, positions, velocities, time);

        if self.constraints.instances > 0 {
            self.assemble_constraints(workspace, positions, velocities, time);
            let lambda = self.solve_multipliers(workspace, velocities, report);
            let Workspace {
                jacobian, weighted, ..
            } = workspace;
            jacobian.mul_transpose_into(&lambda, weighted);
            workspace.forces += &workspace.weighted;
        }

        let mut derivative = VecN::with_capacity(2 * self.dofs);
        derivative.extend(velocities.iter().copied());
        derivative.extend(
            workspace
                .forces
                .iter()
                .zip(self.inverse_masses.iter())
                .map(|(q, w)| q * w),
        );
        derivative
    }

    fn solve_multipliers(
        &self,
        workspace: &mut Workspace,
        velocities: &[Scalar],
        report: &mut StepReport,
    ) -> VecN {
        let Stabilization { stiffness, damping } = self.settings.stabilization;
        let rows = workspace.c.len();
        let Workspace {
            forces,
            c,
            c_dt,
            jacobian,
            jacobian_dt,
            rhs,
            weighted,
            ..
        } = workspace;

        // rhs = -J_dt v - J W Q - ks C - kd dC/dt
        rhs.reset(rows);
        jacobian_dt.mul_into(velocities, rhs);
        weighted.reset(self.dofs);
        for ((weighted, q), w) in weighted
            .iter_mut()
            .zip(forces.iter())
            .zip(self.inverse_masses.iter())
        {
            *weighted = q * w;
        }
        let projected = jacobian.mul(weighted);
        *rhs += &projected;
        rhs.add_scaled(c, stiffness);
        rhs.add_scaled(c_dt, damping);
        *rhs *= -1.0;

        let solution = solve_with(
            rhs,
            |lambda, out| {
                jacobian.mul_transpose_into(lambda, weighted);
                for (weighted, w) in weighted.iter_mut().zip(self.inverse_masses.iter()) {
                    *weighted *= w;
                }
                jacobian.mul_into(weighted, out);
            },
            &self.settings.solver,
        );

        report.solver_iterations += solution.iterations;
        report.max_solver_iterations = report.max_solver_iterations.max(solution.iterations);
        report.hit_iteration_cap |= !solution.converged
            && self
                .settings
                .solver
                .max_iterations
                .is_some_and(|limit| solution.iterations >= limit);
        solution.x
    }
}

/// A constrained particle system advanced with fixed steps
#[derive(Debug)]
pub struct PhysicsSession {
    state: VecN,
    time: Scalar,
    model: Model,
    workspace: Workspace,
    last_report: StepReport,
}

impl PhysicsSession {
    /// Create a session over `positions.len()` DOFs
    pub fn new(
        positions: impl Into<VecN>,
        velocities: impl Into<VecN>,
        masses: impl Into<VecN>,
        time: Scalar,
    ) -> Result<Self, PhysicsError> {
        let positions = positions.into();
        let velocities = velocities.into();
        let masses = masses.into();

        if positions.len() != velocities.len() {
            return Err(PhysicsError::LengthMismatch {
                positions: positions.len(),
                velocities: velocities.len(),
            });
        }
        let dofs = positions.len();
        if masses.len() != dofs {
            return Err(PhysicsError::MassCountMismatch {
                expected: dofs,
                actual: masses.len(),
            });
        }
        if let Some((index, &mass)) = masses
            .iter()
            .enumerate()
            .find(|&(_, &mass)| !(mass > 0.0 && mass.is_finite()))
        {
            return Err(PhysicsError::NonPositiveMass { index, mass });
        }

        Ok(Self {
            state: VecN::concat(&positions, &velocities),
            time,
            model: Model {
                dofs,
                inverse_masses: masses.recip(),
                masses,
                forces: Registry::new(),
                constraints: Registry::new(),
                component_pool: Vec::new(),
                parameter_pool: Vec::new(),
                settings: SessionSettings::default(),
            },
            workspace: Workspace::default(),
            last_report: StepReport::default(),
        })
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.model.settings = settings;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.model.settings
    }

    pub fn add_force(
        &mut self,
        definition: Arc<ForceDefinition>,
        components: &[usize],
        parameters: &[Scalar],
    ) -> Result<(), PhysicsError> {
        let mapping = self.reserve(definition.as_ref(), components, parameters)?;
        trace!(
            "Registered force '{}' on DOFs {:?}",
            definition.name(),
            components
        );
        self.model.forces.insert(definition, mapping);
        Ok(())
    }

    pub fn add_constraint(
        &mut self,
        definition: Arc<ConstraintDefinition>,
        components: &[usize],
        parameters: &[Scalar],
    ) -> Result<(), PhysicsError> {
        let mapping = self.reserve(definition.as_ref(), components, parameters)?;
        trace!(
            "Registered constraint '{}' on DOFs {:?}",
            definition.name(),
            components
        );
        self.model.constraints.insert(definition, mapping);
        Ok(())
    }

    /// Validate a registration and append it to the shared pools
    fn reserve(
        &mut self,
        definition: &dyn Definition,
        components: &[usize],
        parameters: &[Scalar],
    ) -> Result<Mapping, PhysicsError> {
        let model = &mut self.model;

        if components.len() != definition.num_components() {
            return Err(PhysicsError::ComponentCountMismatch {
                definition: definition.name().to_string(),
                expected: definition.num_components(),
                actual: components.len(),
            });
        }
        if parameters.len() != definition.num_parameters() {
            return Err(PhysicsError::ParameterCountMismatch {
                definition: definition.name().to_string(),
                expected: definition.num_parameters(),
                actual: parameters.len(),
            });
        }
        if let Some(&index) = components.iter().find(|&&index| index >= model.dofs) {
            return Err(PhysicsError::ComponentOutOfRange {
                definition: definition.name().to_string(),
                index,
                dofs: model.dofs,
            });
        }

        let mapping = Mapping {
            component_offset: model.component_pool.len(),
            component_count: components.len(),
            parameter_offset: model.parameter_pool.len(),
            parameter_count: parameters.len(),
        };
        model.component_pool.extend_from_slice(components);
        model.parameter_pool.extend_from_slice(parameters);
        Ok(mapping)
    }

    /// Advance by `h` with the classic fourth-order Runge-Kutta method
    ///
    /// # Panics
    ///
    /// Panics if `h` is not a positive finite number.
    pub fn step(&mut self, h: Scalar) {
        self.step_with(&RungeKuttaFourthOrder, h);
    }

    /// Advance by `h` with any integrator
    ///
    /// # Panics
    ///
    /// Panics if `h` is not a positive finite number.
    pub fn step_with(&mut self, integrator: &dyn Integrator, h: Scalar) {
        assert!(
            h > 0.0 && h.is_finite(),
            "step size must be positive and finite, got {h}"
        );

        let Self {
            state,
            time,
            model,
            workspace,
            last_report,
        } = self;

        let mut report = StepReport::default();
        let next = integrator.step(state, *time, h, &mut |x, t| {
            model.derivative(workspace, &mut report, x, t)
        });

        *state = next;
        *time += h;
        *last_report = report;

        if report.hit_iteration_cap {
            warn!(
                "Constraint solve hit the iteration cap of {:?} during step at t = {:.6}",
                model.settings.solver.max_iterations, *time
            );
        }
    }

    /// `C` of every constraint registration at the current state
    ///
    /// Entry `i` belongs to the `i`-th successful `add_constraint` call.
    pub fn constraint_values(&self) -> VecN {
        let (positions, velocities) = self.state.split_at(self.model.dofs);
        let mut local_positions = Vec::new();
        let mut local_velocities = Vec::new();

        self.model
            .constraints
            .iter_registered()
            .map(|(definition, mapping)| {
                let indices = &self.model.component_pool[mapping.components()];
                local_positions.clear();
                local_velocities.clear();
                local_positions.extend(indices.iter().map(|&index| positions[index]));
                local_velocities.extend(indices.iter().map(|&index| velocities[index]));

                let scope = Scope::new(
                    &local_positions,
                    &local_velocities,
                    &self.model.parameter_pool[mapping.parameters()],
                    self.time,
                );
                definition.compute_c(&scope)
            })
            .collect()
    }

    /// `½ Σ m v²`
    pub fn kinetic_energy(&self) -> Scalar {
        0.5 * self
            .velocities()
            .iter()
            .zip(self.model.masses.iter())
            .map(|(v, m)| m * v * v)
            .sum::<Scalar>()
    }

    pub fn positions(&self) -> &[Scalar] {
        &self.state[..self.model.dofs]
    }

    pub fn velocities(&self) -> &[Scalar] {
        &self.state[self.model.dofs..]
    }

    /// `[positions, velocities]`
    pub fn state(&self) -> &VecN {
        &self.state
    }

    pub fn masses(&self) -> &[Scalar] {
        &self.model.masses
    }

    pub fn time(&self) -> Scalar {
        self.time
    }

    pub fn dofs(&self) -> usize {
        self.model.dofs
    }

    pub fn force_count(&self) -> usize {
        self.model.forces.instances
    }

    pub fn constraint_count(&self) -> usize {
        self.model.constraints.instances
    }

    pub fn last_report(&self) -> StepReport {
        self.last_report
    }
}
