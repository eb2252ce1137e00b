//! Generalized forces acting on subsets of degrees of freedom

use crate::physics::definition::{Definition, DefinitionId};
use crate::physics::expr::{ExprArena, ExprId, Scope};
use crate::physics::math::{Scalar, VecN, Vector};
use std::fmt;
use std::sync::{Arc, OnceLock};

type ForceFn = dyn Fn(&Scope, &mut [Scalar]) + Send + Sync;

enum ForceKind {
    Closure(Box<ForceFn>),
    Symbolic {
        arena: ExprArena,
        components: Vec<ExprId>,
    },
}

/// A reusable force law
///
/// Computes one generalized force entry per component from the bound
/// positions, velocities, parameters and time. The output of a registration
/// is added into the session's force vector at the registration's DOF
/// indices.
pub struct ForceDefinition {
    id: DefinitionId,
    name: String,
    num_components: usize,
    num_parameters: usize,
    kind: ForceKind,
}

impl ForceDefinition {
    /// Build a force from a closure writing `num_components` outputs
    pub fn from_fn(
        name: impl Into<String>,
        num_components: usize,
        num_parameters: usize,
        compute: impl Fn(&Scope, &mut [Scalar]) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: DefinitionId::next(),
            name: name.into(),
            num_components,
            num_parameters,
            kind: ForceKind::Closure(Box::new(compute)),
        }
    }

    /// Build a force whose outputs are symbolic expressions
    ///
    /// The number of components is the larger of the output count and the
    /// highest position or velocity index referenced.
    pub fn from_expressions(
        name: impl Into<String>,
        arena: ExprArena,
        outputs: &[ExprId],
    ) -> Self {
        let num_components = arena.component_count(outputs).max(outputs.len());
        let num_parameters = arena.parameter_count(outputs);
        let (arena, components) = arena.compact(outputs);

        Self {
            id: DefinitionId::next(),
            name: name.into(),
            num_components,
            num_parameters,
            kind: ForceKind::Symbolic { arena, components },
        }
    }

    pub fn compute_q(&self, scope: &Scope) -> VecN {
        let mut q = VecN::zeros(self.num_components);
        self.compute_q_into(scope, &mut q);
        q
    }

    /// Overwrite `out` with this force's generalized force
    pub fn compute_q_into(&self, scope: &Scope, out: &mut [Scalar]) {
        match &self.kind {
            ForceKind::Closure(compute) => {
                out.fill(0.0);
                compute(scope, out);
            }
            ForceKind::Symbolic { arena, components } => {
                out.fill(0.0);
                for (value, &component) in out.iter_mut().zip(components) {
                    *value = arena.evaluate(component, scope);
                }
            }
        }
    }

    /// Constant force on one point
    ///
    /// Components: x (3). Parameters: force vector (3).
    pub fn constant() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ForceDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            Self::from_fn("constant", 3, 3, |scope, out| {
                out.copy_from_slice(&scope.parameters[..3]);
            })
        })
    }

    /// Damped spring between two points
    ///
    /// Components: x1 (3), x2 (3). Parameters: stiffness, damping, rest
    /// length. Coincident points exert no force.
    pub fn spring() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ForceDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            Self::from_fn("spring", 6, 3, |scope, out| {
                let delta = Vector::from_slice(&scope.positions[..3])
                    - Vector::from_slice(&scope.positions[3..6]);
                let distance = delta.length();
                if distance == 0.0 {
                    return;
                }

                let [stiffness, damping, rest_length] = [
                    scope.parameters[0],
                    scope.parameters[1],
                    scope.parameters[2],
                ];
                let direction = delta / distance;
                let relative_velocity = Vector::from_slice(&scope.velocities[..3])
                    - Vector::from_slice(&scope.velocities[3..6]);
                let closing_speed = direction.dot(relative_velocity);
                let force =
                    -(stiffness * (distance - rest_length) + damping * closing_speed) * direction;

                out[..3].copy_from_slice(&force.to_array());
                out[3..].copy_from_slice(&(-force).to_array());
            })
        })
    }

    /// Linear velocity drag on one point, `-c * v`
    ///
    /// Components: x (3). Parameters: drag coefficient.
    pub fn linear_drag() -> Arc<Self> {
        static CACHE: OnceLock<Arc<ForceDefinition>> = OnceLock::new();
        cached(&CACHE, || {
            let mut arena = ExprArena::new();
            let coefficient = arena.parameter(0);
            let velocity = arena.velocity3(0);
            let outputs = velocity.map(|v| {
                let scaled = arena.mul(coefficient, v);
                arena.neg(scaled)
            });
            Self::from_expressions("linear_drag", arena, &outputs)
        })
    }
}

impl Definition for ForceDefinition {
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

impl fmt::Debug for ForceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ForceKind::Closure(_) => "closure",
            ForceKind::Symbolic { .. } => "symbolic",
        };
        f.debug_struct("ForceDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("num_components", &self.num_components)
            .field("num_parameters", &self.num_parameters)
            .field("kind", &kind)
            .finish()
    }
}

fn cached(
    cache: &'static OnceLock<Arc<ForceDefinition>>,
    build: impl FnOnce() -> ForceDefinition,
) -> Arc<ForceDefinition> {
    Arc::clone(cache.get_or_init(|| Arc::new(build())))
}
