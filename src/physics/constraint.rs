//! Holonomic constraints compiled from symbolic position-level formulas
//!
//! A [`ConstraintDefinition`] is built once from a formula `C(x, p, t)` and
//! caches the symbolic derivatives the session needs every substage:
//! `dC/dt`, the Jacobian row `dC/dx` and its time derivative `d(dC/dt)/dx`.
//! Built-in families are compiled on first use and shared by `Arc`.

use crate::physics::definition::{Definition, DefinitionId};
use crate::physics::expr::{ExprArena, ExprId, Predicate, Scope, Variable};
use crate::physics::math::{Scalar, VecN};
use bevy::log::debug;
use std::sync::{Arc, OnceLock};

/// One-sided constraints are active only while `C < -CONTACT_EPSILON`
pub const CONTACT_EPSILON: Scalar = 1e-6;

#[derive(Debug)]
pub struct ConstraintDefinition {
    id: DefinitionId,
    name: String,
    arena: ExprArena,
    c: ExprId,
    c_dt: ExprId,
    jacobian: Vec<ExprId>,
    jacobian_dt: Vec<ExprId>,
    num_components: usize,
    num_parameters: usize,
}

impl ConstraintDefinition {
    /// Compile a constraint from its position-level formula `c`
    ///
    /// Component and parameter counts are inferred from the highest position
    /// and parameter indices the formula references.
    pub fn compile(name: impl Into<String>, mut arena: ExprArena, c: ExprId) -> Self {
        let name = name.into();
        let num_components = arena.component_count(&[c]);
        let num_parameters = arena.parameter_count(&[c]);

        let c_dt = arena.differentiate(c, Variable::Time);
        let jacobian: Vec<ExprId> = (0..num_components)
            .map(|i| arena.differentiate(c, Variable::Position(i as u32)))
            .collect();
        let jacobian_dt: Vec<ExprId> = (0..num_components)
            .map(|i| arena.differentiate(c_dt, Variable::Position(i as u32)))
            .collect();

        let mut roots = Vec::with_capacity(2 + 2 * num_components);
        roots.push(c);
        roots.push(c_dt);
        roots.extend(&jacobian);
        roots.extend(&jacobian_dt);

        let (arena, roots) = arena.compact(&roots);

        debug!(
            "Compiled constraint '{}': C = {} ({} components, {} parameters, {} nodes)",
            name,
            arena.display(roots[0]),
            num_components,
            num_parameters,
            arena.len()
        );

        Self {
            id: DefinitionId::next(),
            name,
            c: roots[0],
            c_dt: roots[1],
            jacobian: roots[2..2 + num_components].to_vec(),
            jacobian_dt: roots[2 + num_components..].to_vec(),
            arena,
            num_components,
            num_parameters,
        }
    }

    pub fn compute_c(&self, scope: &Scope) -> Scalar {
        self.arena.evaluate(self.c, scope)
    }

    pub fn compute_c_dt(&self, scope: &Scope) -> Scalar {
        self.arena.evaluate(self.c_dt, scope)
    }

    /// `dC/dx`, one entry per component
    pub fn compute_jacobian(&self, scope: &Scope) -> VecN {
        self.jacobian
            .iter()
            .map(|&entry| self.arena.evaluate(entry, scope))
            .collect()
    }

    /// `d(dC/dt)/dx`, one entry per component
    pub fn compute_jacobian_dt(&self, scope: &Scope) -> VecN {
        self.jacobian_dt
            .iter()
            .map(|&entry| self.arena.evaluate(entry, scope))
            .collect()
    }

    /// Evaluate `C`, `dC/dt` and both Jacobian rows in one sweep
    ///
    /// `jacobian` and `jacobian_dt` must hold `num_components()` entries.
    /// Returns `(C, dC/dt)`.
    pub fn evaluate_into(
        &self,
        scope: &Scope,
        scratch: &mut Vec<Scalar>,
        jacobian: &mut [Scalar],
        jacobian_dt: &mut [Scalar],
    ) -> (Scalar, Scalar) {
        self.arena.evaluate_all(scope, scratch);

        for (out, entry) in jacobian.iter_mut().zip(&self.jacobian) {
            *out = scratch[entry.index()];
        }
        for (out, entry) in jacobian_dt.iter_mut().zip(&self.jacobian_dt) {
            *out = scratch[entry.index()];
        }

        (scratch[self.c.index()], scratch[self.c_dt.index()])
    }

    /// `|x - target|² = 0`: pins one point (3 components) to a target
    /// given as 3 parameters
    pub fn fixed() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let x = arena.position3(0);
            let target = arena.parameter3(0);
            let delta = arena.sub3(x, target);
            let c = arena.length_squared3(delta);
            Self::compile("fixed", arena, c)
        })
    }

    /// `|x1 - x2|² - d² = 0` between two free points
    ///
    /// Components: x1 (3), x2 (3). Parameters: d.
    pub fn distance() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let x1 = arena.position3(0);
            let x2 = arena.position3(3);
            let distance = arena.parameter(0);
            let c = distance_formula(&mut arena, x1, x2, distance);
            Self::compile("distance", arena, c)
        })
    }

    /// `|x - o|² - d² = 0` between a free point and a fixed point
    ///
    /// Components: x (3). Parameters: o (3), d.
    pub fn distance_to_point() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let x = arena.position3(0);
            let origin = arena.parameter3(0);
            let distance = arena.parameter(3);
            let c = distance_formula(&mut arena, x, origin, distance);
            Self::compile("distance_to_point", arena, c)
        })
    }

    /// Keeps two spheres from interpenetrating
    ///
    /// Components: x1 (3), x2 (3). Parameters: sum of radii.
    pub fn sphere_collision() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let x1 = arena.position3(0);
            let x2 = arena.position3(3);
            let radii = arena.parameter(0);
            let c = distance_formula(&mut arena, x1, x2, radii);
            let c = one_sided(&mut arena, c);
            Self::compile("sphere_collision", arena, c)
        })
    }

    /// Keeps a sphere out of a fixed sphere
    ///
    /// Components: x (3). Parameters: fixed centre (3), sum of radii.
    pub fn sphere_collision_to_point() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let x = arena.position3(0);
            let centre = arena.parameter3(0);
            let radii = arena.parameter(3);
            let c = distance_formula(&mut arena, x, centre, radii);
            let c = one_sided(&mut arena, c);
            Self::compile("sphere_collision_to_point", arena, c)
        })
    }

    /// Keeps a single coordinate above a floor value
    ///
    /// Components: the coordinate. Parameters: floor height.
    pub fn axis_collision() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let height = arena.position(0);
            let floor = arena.parameter(0);
            let c = arena.sub(height, floor);
            let c = one_sided(&mut arena, c);
            Self::compile("axis_collision", arena, c)
        })
    }

    /// Keeps a point on the positive side of the plane `n · x = offset`
    ///
    /// Components: x (3). Parameters: unit normal n (3), offset.
    pub fn plane_collision() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ConstraintDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let x = arena.position3(0);
            let normal = arena.parameter3(0);
            let offset = arena.parameter(3);
            let height = arena.dot3(normal, x);
            let c = arena.sub(height, offset);
            let c = one_sided(&mut arena, c);
            Self::compile("plane_collision", arena, c)
        })
    }
}

impl Definition for ConstraintDefinition {
    fn id(&self) -> DefinitionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_components(&self) -> usize {
        self.num_components
    }

    fn num_parameters(&self) -> usize {
        self.num_parameters
    }
}

fn cached(
    cache: &'static OnceLock<Arc<ConstraintDefinition>>,
    build: impl FnOnce() -> ConstraintDefinition,
) -> Arc<ConstraintDefinition> {
    Arc::clone(cache.get_or_init(|| Arc::new(build())))
}

fn distance_formula(
    arena: &mut ExprArena,
    a: [ExprId; 3],
    b: [ExprId; 3],
    distance: ExprId,
) -> ExprId {
    let delta = arena.sub3(a, b);
    let length_squared = arena.length_squared3(delta);
    let distance_squared = arena.mul(distance, distance);
    arena.sub(length_squared, distance_squared)
}

/// Gate `c` so it only acts while penetrating
fn one_sided(arena: &mut ExprArena, c: ExprId) -> ExprId {
    arena.conditional(
        Predicate::LessThan(-CONTACT_EPSILON),
        c,
        c,
        ExprArena::ZERO,
    )
}
