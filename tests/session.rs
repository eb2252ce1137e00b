//! End-to-end tests of constrained particle sessions against closed-form
//! motion

use std::sync::Arc;
use tether::physics::math::{Scalar, Vector};
use tether::physics::{
    ConstraintDefinition, ExprArena, ForceDefinition, PhysicsError, PhysicsSession,
};

const GRAVITY: Scalar = 9.81;

fn point(session: &PhysicsSession, index: usize) -> Vector {
    Vector::from_slice(&session.positions()[index * 3..index * 3 + 3])
}

fn velocity(session: &PhysicsSession, index: usize) -> Vector {
    Vector::from_slice(&session.velocities()[index * 3..index * 3 + 3])
}

fn run(session: &mut PhysicsSession, h: Scalar, steps: usize) {
    for _ in 0..steps {
        session.step(h);
    }
}

#[test]
fn test_double_pendulum_conserves_energy_and_lengths() {
    let mut session = PhysicsSession::new(
        [1.0, 0.0, 0.0, 2.0, 0.0, 0.0],
        [0.0; 6],
        [1.0; 6],
        0.0,
    )
    .unwrap();
    for dofs in [[0, 1, 2], [3, 4, 5]] {
        session
            .add_force(ForceDefinition::constant(), &dofs, &[0.0, -GRAVITY, 0.0])
            .unwrap();
    }
    session
        .add_constraint(
            ConstraintDefinition::distance_to_point(),
            &[0, 1, 2],
            &[0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
    session
        .add_constraint(
            ConstraintDefinition::distance(),
            &[0, 1, 2, 3, 4, 5],
            &[1.0],
        )
        .unwrap();

    let energy = |session: &PhysicsSession| {
        session.kinetic_energy() + GRAVITY * (point(session, 0).y + point(session, 1).y)
    };
    let initial = energy(&session);

    for _ in 0..4 {
        run(&mut session, 1.0e-3, 500);

        let upper = point(&session, 0);
        let lower = point(&session, 1);
        assert!((upper.length() - 1.0).abs() < 1e-3, "upper rod {}", upper.length());
        assert!(
            (upper.distance(lower) - 1.0).abs() < 1e-3,
            "lower rod {}",
            upper.distance(lower)
        );
        assert!(
            (energy(&session) - initial).abs() < 0.5,
            "energy drifted to {}",
            energy(&session)
        );
    }
    assert!((session.time() - 2.0).abs() < 1e-9);
}

#[test]
fn test_linear_drag_reaches_terminal_velocity() {
    let mass = 2.0;
    let drag = 4.0;
    let mut session = PhysicsSession::new([0.0; 3], [0.0; 3], [mass; 3], 0.0).unwrap();
    session
        .add_force(
            ForceDefinition::constant(),
            &[0, 1, 2],
            &[0.0, -mass * GRAVITY, 0.0],
        )
        .unwrap();
    session
        .add_force(ForceDefinition::linear_drag(), &[0, 1, 2], &[drag])
        .unwrap();

    run(&mut session, 0.01, 1000);

    let terminal = -mass * GRAVITY / drag;
    assert!((velocity(&session, 0).y - terminal).abs() < 1e-6);
    assert_eq!(velocity(&session, 0).x, 0.0);
}

#[test]
fn test_spring_oscillates_with_expected_period() {
    // Reduced mass 1/2, so ω = sqrt(2k)
    let stiffness: Scalar = 50.0;
    let omega = (2.0 * stiffness).sqrt();
    let period = std::f64::consts::TAU / omega;

    let mut session = PhysicsSession::new(
        [0.0, 0.0, 0.0, 1.5, 0.0, 0.0],
        [0.0; 6],
        [1.0; 6],
        0.0,
    )
    .unwrap();
    session
        .add_force(
            ForceDefinition::spring(),
            &[0, 1, 2, 3, 4, 5],
            &[stiffness, 0.0, 1.0],
        )
        .unwrap();

    let h = 1.0e-3;
    run(&mut session, h, 200);
    let compressed = point(&session, 0).distance(point(&session, 1));
    assert!(compressed < 1.0, "spring never compressed: {compressed}");

    let steps = (period / h).round() as usize;
    run(&mut session, h, steps - 200);
    let separation = point(&session, 0).distance(point(&session, 1));
    assert!((separation - 1.5).abs() < 1e-3, "separation {separation}");

    // Internal forces leave the centre of mass at rest
    let centre = (point(&session, 0) + point(&session, 1)) / 2.0;
    assert!((centre - Vector::new(0.75, 0.0, 0.0)).length() < 1e-9);
}

#[test]
fn test_custom_formula_constrains_bead_to_circle() {
    // x² + y² - r² over two DOFs
    let mut arena = ExprArena::new();
    let x = arena.position(0);
    let y = arena.position(1);
    let r = arena.parameter(0);
    let xx = arena.mul(x, x);
    let yy = arena.mul(y, y);
    let rr = arena.mul(r, r);
    let sum = arena.add(xx, yy);
    let c = arena.sub(sum, rr);
    let circle = Arc::new(ConstraintDefinition::compile("circle", arena, c));

    let mut session = PhysicsSession::new([1.0, 0.0], [0.0, 2.0], [1.0, 1.0], 0.0).unwrap();
    session.add_constraint(circle, &[0, 1], &[1.0]).unwrap();

    run(&mut session, 1.0e-3, 1000);

    // Uniform motion at speed 2 on the unit circle covers 2 radians
    let [px, py] = [session.positions()[0], session.positions()[1]];
    assert!((px - 2.0_f64.cos()).abs() < 1e-3, "x = {px}");
    assert!((py - 2.0_f64.sin()).abs() < 1e-3, "y = {py}");
    let speed = session.velocities()[0].hypot(session.velocities()[1]);
    assert!((speed - 2.0).abs() < 1e-3, "speed {speed}");
}

#[test]
fn test_closure_force_drives_harmonic_motion() {
    let stiffness = 4.0;
    let pull = Arc::new(ForceDefinition::from_fn(
        "pull_to_origin",
        3,
        1,
        |scope, out| {
            for (force, x) in out.iter_mut().zip(scope.positions) {
                *force = -scope.parameters[0] * x;
            }
        },
    ));

    let mut session = PhysicsSession::new([1.0, 0.0, 0.0], [0.0; 3], [1.0; 3], 0.0).unwrap();
    session.add_force(pull, &[0, 1, 2], &[stiffness]).unwrap();

    // Half a period of ω = 2
    let h = 1.0e-3;
    let steps = (std::f64::consts::FRAC_PI_2 / h).round() as usize;
    run(&mut session, h, steps);

    assert!((point(&session, 0).x + 1.0).abs() < 1e-3);
}

#[test]
fn test_plane_collision_catches_falling_point() {
    let mut session = PhysicsSession::new([0.0, 0.5, 0.0], [0.0; 3], [1.0; 3], 0.0).unwrap();
    session
        .add_force(ForceDefinition::constant(), &[0, 1, 2], &[0.0, -GRAVITY, 0.0])
        .unwrap();
    session
        .add_constraint(
            ConstraintDefinition::plane_collision(),
            &[0, 1, 2],
            &[0.0, 1.0, 0.0, 0.0],
        )
        .unwrap();

    run(&mut session, 1.0 / 120.0, 360);

    let position = point(&session, 0);
    assert!(position.y > -0.02, "point sank to {}", position.y);
    assert!(position.y < 0.02, "point hovers at {}", position.y);
    assert!(velocity(&session, 0).length() < 0.2);
}

#[test]
fn test_mismatched_registration_names_the_definition() {
    let mut session = PhysicsSession::new([0.0; 6], [0.0; 6], [1.0; 6], 0.0).unwrap();
    let error = session
        .add_constraint(ConstraintDefinition::distance(), &[0, 1, 2], &[1.0])
        .unwrap_err();

    assert_eq!(
        error,
        PhysicsError::ComponentCountMismatch {
            definition: "distance".to_string(),
            expected: 6,
            actual: 3,
        }
    );
    assert!(error.to_string().contains("'distance' expects 6 component indices"));
    assert_eq!(session.constraint_count(), 0);
}
