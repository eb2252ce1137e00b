//! Scene components and factory functions for simulation bodies

use crate::config::SceneConfig;
use crate::prelude::*;

/// World-space position of a body
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position(pub Vector);

impl Position {
    pub fn new(position: Vector) -> Self {
        Self(position)
    }

    #[inline]
    pub fn value(&self) -> Vector {
        self.0
    }

    #[inline]
    pub fn value_mut(&mut self) -> &mut Vector {
        &mut self.0
    }
}

/// A dynamic point mass
#[derive(Component, Debug, Clone, Copy, PartialEq)]
#[require(Position)]
pub struct Particle {
    pub mass: Scalar,
    pub velocity: Vector,
}

impl Particle {
    pub fn new(mass: Scalar) -> Self {
        Self {
            mass,
            velocity: Vector::ZERO,
        }
    }
}

/// Sphere used for contact against other spheres and the ground
///
/// A collider without a [`Particle`] is static.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    pub radius: Scalar,
}

/// Uniform acceleration applied as a force of `mass * acceleration`
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Gravity(pub Vector);

/// Constant external force on a particle
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Force(pub Vector);

/// Pins a particle to a fixed point
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Anchor(pub Vector);

/// What the far end of a [`Tether`] is attached to
///
/// An entity with a [`Position`] but no [`Particle`] acts as a fixed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TetherTarget {
    Particle(Entity),
    Point(Vector),
}

/// Rigid rod of fixed length to another particle or a fixed point
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Tether {
    pub target: TetherTarget,
    pub length: Scalar,
}

/// Factory functions for the demo scene
pub mod factory {
    use super::*;

    /// Height of the chain's anchored end above the ground
    pub fn chain_top(scene: &SceneConfig) -> Scalar {
        scene.ground_height
            + scene.ball_radius * 1.5
            + scene.chain_length.saturating_sub(1) as Scalar * scene.ball_spacing
    }

    /// Position of the `index`th chain ball; the chain starts out horizontal
    pub fn chain_position(scene: &SceneConfig, index: usize) -> Vector {
        Vector::new(
            index as Scalar * scene.ball_spacing,
            chain_top(scene),
            0.0,
        )
    }

    /// Ball resting on top of the anchored end of the chain
    pub fn falling_ball_position(scene: &SceneConfig) -> Vector {
        Vector::new(0.0, chain_top(scene) + scene.ball_radius * 2.0, 0.0)
    }

    /// Random spot above the ground within the spawn radius
    pub fn random_position(rng: &mut SharedRng, scene: &SceneConfig) -> Vector {
        let radius = scene.spawn_radius.max(0.0);
        let angle = rng.random_range(0.0..std::f64::consts::TAU);
        let distance = radius * rng.random::<Scalar>().sqrt();
        let height = rng.random_range(1.0..=3.0) * scene.ball_spacing;
        Vector::new(
            distance * angle.cos(),
            chain_top(scene) + height,
            distance * angle.sin(),
        )
    }

    pub fn gravity(scene: &SceneConfig) -> Gravity {
        Gravity(Vector::new(0.0, -scene.gravity, 0.0))
    }
}
