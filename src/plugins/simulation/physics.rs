use super::components::{
    Anchor, Collider, Force, Gravity, Particle, Position, Tether, TetherTarget, factory,
};
use crate::physics::math::VecN;
use crate::physics::{
    ConstraintDefinition, ForceDefinition, PhysicsError, PhysicsSession, SessionSettings,
    StepReport,
};
use crate::prelude::*;

/// Slack added to every contact query so resting contacts stay registered
pub const CONTACT_MARGIN: Scalar = 0.01;

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicsSet {
    Step,
    Report,
    Exit,
}

/// Snapshot of one dynamic particle handed to the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub entity: Entity,
    pub position: Vector,
    pub velocity: Vector,
    pub mass: Scalar,
    pub radius: Option<Scalar>,
    pub gravity: Option<Vector>,
    pub force: Option<Vector>,
    pub anchor: Option<Vector>,
    pub tether: Option<Tether>,
}

impl BodyState {
    pub fn new(entity: Entity, position: Vector, particle: &Particle) -> Self {
        Self {
            entity,
            position,
            velocity: particle.velocity,
            mass: particle.mass,
            radius: None,
            gravity: None,
            force: None,
            anchor: None,
            tether: None,
        }
    }
}

/// A collider that never moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticSphere {
    pub position: Vector,
    pub radius: Scalar,
}

/// Contact detection inputs for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSettings {
    /// Height of the ground plane, or `None` for no ground
    pub ground_height: Option<Scalar>,
    /// Time span the registered contacts have to cover
    pub lookahead: Scalar,
}

/// Session assembled from a scene snapshot
#[derive(Debug)]
pub struct SceneSession {
    pub session: PhysicsSession,
    pub contacts: usize,
}

fn dofs_of(slot: usize) -> [usize; 3] {
    let offset = slot * 3;
    [offset, offset + 1, offset + 2]
}

/// Whether two surfaces separated by `gap` may meet within `lookahead`
fn may_touch(gap: Scalar, relative_speed: Scalar, lookahead: Scalar) -> bool {
    gap <= CONTACT_MARGIN + relative_speed * lookahead
}

/// Build a session over `bodies`, each body owning three consecutive DOFs
/// in slice order
pub fn build_session(
    bodies: &[BodyState],
    statics: &[StaticSphere],
    contacts: ContactSettings,
    time: Scalar,
    settings: SessionSettings,
) -> Result<SceneSession, PhysicsError> {
    let mut positions = VecN::with_capacity(bodies.len() * 3);
    let mut velocities = VecN::with_capacity(bodies.len() * 3);
    let mut masses = VecN::with_capacity(bodies.len() * 3);
    for body in bodies {
        positions.push_vector(body.position);
        velocities.push_vector(body.velocity);
        masses.extend([body.mass; 3]);
    }

    let mut session =
        PhysicsSession::new(positions, velocities, masses, time)?.with_settings(settings);

    for (slot, body) in bodies.iter().enumerate() {
        let dofs = dofs_of(slot);

        if let Some(gravity) = body.gravity {
            session.add_force(
                ForceDefinition::constant(),
                &dofs,
                &(gravity * body.mass).to_array(),
            )?;
        }

        if let Some(force) = body.force {
            session.add_force(ForceDefinition::constant(), &dofs, &force.to_array())?;
        }

        if let Some(anchor) = body.anchor {
            session.add_constraint(ConstraintDefinition::fixed(), &dofs, &anchor.to_array())?;
        }

        if let Some(tether) = body.tether {
            match tether.target {
                TetherTarget::Particle(target) => {
                    match bodies.iter().position(|other| other.entity == target) {
                        Some(other) => {
                            let [a, b, c] = dofs;
                            let [d, e, f] = dofs_of(other);
                            session.add_constraint(
                                ConstraintDefinition::distance(),
                                &[a, b, c, d, e, f],
                                &[tether.length],
                            )?;
                        }
                        None => warn!(
                            "Tether of {:?} targets {:?}, which has no position; ignoring",
                            body.entity, target
                        ),
                    }
                }
                TetherTarget::Point(point) => {
                    session.add_constraint(
                        ConstraintDefinition::distance_to_point(),
                        &dofs,
                        &[point.x, point.y, point.z, tether.length],
                    )?;
                }
            }
        }
    }

    let contacts = register_contacts(&mut session, bodies, statics, contacts)?;
    Ok(SceneSession { session, contacts })
}

/// Pairwise sweep registering a one-sided contact for every pair that may
/// touch during the lookahead
fn register_contacts(
    session: &mut PhysicsSession,
    bodies: &[BodyState],
    statics: &[StaticSphere],
    settings: ContactSettings,
) -> Result<usize, PhysicsError> {
    let mut count = 0;
    let lookahead = settings.lookahead;

    for (slot, body) in bodies.iter().enumerate() {
        let Some(radius) = body.radius else {
            continue;
        };
        let dofs = dofs_of(slot);

        if let Some(ground) = settings.ground_height {
            let gap = body.position.y - ground - radius;
            if may_touch(gap, body.velocity.y.abs(), lookahead) {
                session.add_constraint(
                    ConstraintDefinition::axis_collision(),
                    &[dofs[1]],
                    &[ground + radius],
                )?;
                count += 1;
            }
        }

        for (other_slot, other) in bodies.iter().enumerate().skip(slot + 1) {
            let Some(other_radius) = other.radius else {
                continue;
            };
            let reach = radius + other_radius;
            let gap = body.position.distance(other.position) - reach;
            let speed = (body.velocity - other.velocity).length();
            if may_touch(gap, speed, lookahead) {
                let [a, b, c] = dofs;
                let [d, e, f] = dofs_of(other_slot);
                session.add_constraint(
                    ConstraintDefinition::sphere_collision(),
                    &[a, b, c, d, e, f],
                    &[reach],
                )?;
                count += 1;
            }
        }

        for sphere in statics {
            let reach = radius + sphere.radius;
            let gap = body.position.distance(sphere.position) - reach;
            if may_touch(gap, body.velocity.length(), lookahead) {
                let centre = sphere.position;
                session.add_constraint(
                    ConstraintDefinition::sphere_collision_to_point(),
                    &dofs,
                    &[centre.x, centre.y, centre.z, reach],
                )?;
                count += 1;
            }
        }
    }

    Ok(count)
}

/// `-Σ m g·x` over bodies under gravity
pub fn potential_energy(bodies: &[BodyState], session: &PhysicsSession) -> Scalar {
    bodies
        .iter()
        .enumerate()
        .filter_map(|(slot, body)| {
            body.gravity.map(|gravity| {
                let position = session.state().vector_at(slot * 3);
                -body.mass * gravity.dot(position)
            })
        })
        .sum()
}

/// Fold the reports of several steps into one
fn merge_reports(total: &mut StepReport, step: StepReport) {
    total.substages += step.substages;
    total.solver_iterations += step.solver_iterations;
    total.max_solver_iterations = total.max_solver_iterations.max(step.max_solver_iterations);
    total.hit_iteration_cap |= step.hit_iteration_cap;
}

type ParticleQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static mut Position,
        &'static mut Particle,
        Option<&'static Collider>,
        Option<&'static Gravity>,
        Option<&'static Force>,
        Option<&'static Anchor>,
        Option<&'static Tether>,
    ),
>;

/// Point a tether at a non-particle entity's position instead
fn resolve_tether(tether: Tether, fixed: &Query<&Position, Without<Particle>>) -> Tether {
    match tether.target {
        TetherTarget::Particle(target) => match fixed.get(target) {
            Ok(position) => Tether {
                target: TetherTarget::Point(position.value()),
                ..tether
            },
            Err(_) => tether,
        },
        TetherTarget::Point(_) => tether,
    }
}

/// Advance every particle by one frame through a freshly assembled session
pub fn step_simulation(
    mut particles: ParticleQuery,
    statics: Query<(&Position, &Collider), Without<Particle>>,
    fixed: Query<&Position, Without<Particle>>,
    integrator: Res<ActiveIntegrator>,
    config: Res<SimulationConfig>,
    mut stats: ResMut<SimulationStats>,
) {
    let physics = &config.physics;
    stats.frame += 1;

    let mut bodies: Vec<BodyState> = particles
        .iter()
        .map(
            |(entity, position, particle, collider, gravity, force, anchor, tether)| BodyState {
                radius: collider.map(|collider| collider.radius),
                gravity: gravity.map(|gravity| gravity.0),
                force: force.map(|force| force.0),
                anchor: anchor.map(|anchor| anchor.0),
                tether: tether.map(|tether| resolve_tether(*tether, &fixed)),
                ..BodyState::new(entity, position.value(), particle)
            },
        )
        .collect();
    if bodies.is_empty() {
        stats.time += physics.timestep;
        return;
    }
    // Query order follows archetype layout; sort so DOF assignment is stable
    bodies.sort_by_key(|body| body.entity);

    let statics: Vec<StaticSphere> = statics
        .iter()
        .map(|(position, collider)| StaticSphere {
            position: position.value(),
            radius: collider.radius,
        })
        .collect();

    let contact_settings = ContactSettings {
        ground_height: Some(config.scene.ground_height),
        lookahead: physics.timestep,
    };

    let SceneSession {
        mut session,
        contacts,
    } = match build_session(
        &bodies,
        &statics,
        contact_settings,
        stats.time,
        physics.session_settings(),
    ) {
        Ok(scene) => scene,
        Err(e) => {
            error!("Failed to assemble physics session: {}", e);
            return;
        }
    };

    let h = physics.substep();
    let mut report = StepReport::default();
    for _ in 0..physics.substeps.max(1) {
        session.step_with(integrator.0.as_ref(), h);
        merge_reports(&mut report, session.last_report());
    }

    let dofs = session.dofs();
    for (entity, mut position, mut particle, ..) in particles.iter_mut() {
        let Ok(slot) = bodies.binary_search_by_key(&entity, |body| body.entity) else {
            continue;
        };
        *position.value_mut() = session.state().vector_at(slot * 3);
        particle.velocity = session.state().vector_at(dofs + slot * 3);
    }

    stats.time = session.time();
    stats.kinetic_energy = session.kinetic_energy();
    stats.potential_energy = potential_energy(&bodies, &session);
    stats.max_violation = session
        .constraint_values()
        .iter()
        .fold(0.0, |max: Scalar, c| max.max(c.abs()));
    stats.constraints = session.constraint_count();
    stats.contacts = contacts;
    stats.report = report;
}

/// Log diagnostics every `run.report_interval` frames
pub fn report_progress(stats: Res<SimulationStats>, config: Res<SimulationConfig>) {
    let interval = config.run.report_interval;
    if interval == 0 || stats.frame == 0 || stats.frame % interval != 0 {
        return;
    }

    info!(
        "frame {:>6} | t = {:8.3} s | energy {:12.4} (kinetic {:.4}) | max |C| {:.3e} | {} constraints, {} contacts | CG {} iterations (max {})",
        stats.frame,
        stats.time,
        stats.total_energy(),
        stats.kinetic_energy,
        stats.max_violation,
        stats.constraints,
        stats.contacts,
        stats.report.solver_iterations,
        stats.report.max_solver_iterations,
    );
}

/// End the app once `run.steps` frames have been simulated
pub fn exit_after_steps(
    stats: Res<SimulationStats>,
    config: Res<SimulationConfig>,
    mut exit: EventWriter<AppExit>,
) {
    let steps = config.run.steps;
    if steps > 0 && stats.frame >= steps {
        info!(
            "Simulated {} frames ({:.3} s); exiting",
            stats.frame, stats.time
        );
        exit.write(AppExit::Success);
    }
}

/// Spawn the chain, the falling ball and any scattered extra balls
pub fn spawn_scene(
    mut commands: Commands,
    mut rng: ResMut<SharedRng>,
    config: Res<SimulationConfig>,
) {
    let scene = &config.scene;
    let gravity = factory::gravity(scene);
    let collider = Collider {
        radius: scene.ball_radius,
    };

    let mut previous: Option<Entity> = None;
    for index in 0..scene.chain_length {
        let position = factory::chain_position(scene, index);
        let mut ball = commands.spawn((
            Particle::new(scene.ball_mass),
            Position::new(position),
            collider,
            gravity,
        ));
        match previous {
            None => {
                ball.insert(Anchor(position));
            }
            Some(target) => {
                ball.insert(Tether {
                    target: TetherTarget::Particle(target),
                    length: scene.ball_spacing,
                });
            }
        }
        previous = Some(ball.id());
    }

    if scene.falling_ball {
        commands.spawn((
            Particle::new(scene.ball_mass),
            Position::new(factory::falling_ball_position(scene)),
            collider,
            gravity,
        ));
    }

    for _ in 0..scene.extra_balls {
        let position = factory::random_position(&mut rng, scene);
        commands.spawn((
            Particle::new(scene.ball_mass),
            Position::new(position),
            collider,
            gravity,
        ));
    }

    info!(
        "Spawned {} chain balls, {} falling ball(s)",
        scene.chain_length,
        scene.extra_balls + usize::from(scene.falling_ball)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::integrators::ExplicitEuler;
    use bevy::ecs::system::RunSystemOnce;

    const NO_CONTACTS: ContactSettings = ContactSettings {
        ground_height: None,
        lookahead: 0.0,
    };

    fn body(index: u32, position: Vector) -> BodyState {
        BodyState::new(
            Entity::from_raw(index),
            position,
            &Particle::new(1.0),
        )
    }

    fn create_test_app(config: SimulationConfig) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(config);
        app.insert_resource(SharedRng::from_seed(5));
        app.init_resource::<SimulationStats>();
        app.init_resource::<ActiveIntegrator>();
        app
    }

    #[test]
    fn test_free_body_gets_no_constraints() {
        let mut a = body(0, Vector::new(0.0, 5.0, 0.0));
        a.gravity = Some(Vector::new(0.0, -9.81, 0.0));

        let scene = build_session(&[a], &[], NO_CONTACTS, 0.0, SessionSettings::default()).unwrap();
        assert_eq!(scene.session.dofs(), 3);
        assert_eq!(scene.session.force_count(), 1);
        assert_eq!(scene.session.constraint_count(), 0);
        assert_eq!(scene.contacts, 0);
    }

    #[test]
    fn test_tethers_and_anchors_register() {
        let mut a = body(0, Vector::ZERO);
        a.anchor = Some(Vector::ZERO);
        let mut b = body(1, Vector::new(1.0, 0.0, 0.0));
        b.tether = Some(Tether {
            target: TetherTarget::Particle(a.entity),
            length: 1.0,
        });
        let mut c = body(2, Vector::new(0.0, -1.0, 0.0));
        c.tether = Some(Tether {
            target: TetherTarget::Point(Vector::ZERO),
            length: 1.0,
        });
        let mut d = body(3, Vector::new(5.0, 0.0, 0.0));
        d.tether = Some(Tether {
            target: TetherTarget::Particle(Entity::from_raw(99)),
            length: 1.0,
        });

        let scene =
            build_session(&[a, b, c, d], &[], NO_CONTACTS, 0.0, SessionSettings::default())
                .unwrap();
        assert_eq!(scene.session.constraint_count(), 3);
        let values = scene.session.constraint_values();
        assert!(values.iter().all(|c| c.abs() < 1e-12));
    }

    #[test]
    fn test_external_force_adds_to_gravity() {
        let mut a = body(0, Vector::ZERO);
        a.gravity = Some(Vector::new(0.0, -10.0, 0.0));
        a.force = Some(Vector::new(3.0, 0.0, 0.0));

        let mut scene =
            build_session(&[a], &[], NO_CONTACTS, 0.0, SessionSettings::default()).unwrap();
        assert_eq!(scene.session.force_count(), 2);

        scene.session.step_with(&ExplicitEuler, 0.1);
        let velocity = scene.session.state().vector_at(3);
        assert!((velocity - Vector::new(0.3, -1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_contact_sweep_only_registers_near_pairs() {
        let contacts = ContactSettings {
            ground_height: Some(0.0),
            lookahead: 0.0,
        };
        let mut near_ground = body(0, Vector::new(0.0, 0.205, 0.0));
        near_ground.radius = Some(0.2);
        let mut touching = body(1, Vector::new(0.4, 0.205, 0.0));
        touching.radius = Some(0.2);
        let mut far = body(2, Vector::new(10.0, 10.0, 0.0));
        far.radius = Some(0.2);
        let no_collider = body(3, Vector::new(0.0, 0.205, 0.0));
        let statics = [StaticSphere {
            position: Vector::new(10.0, 10.5, 0.0),
            radius: 0.3,
        }];

        let scene = build_session(
            &[near_ground, touching, far, no_collider],
            &statics,
            contacts,
            0.0,
            SessionSettings::default(),
        )
        .unwrap();
        // two ground contacts, one sphere pair, one static sphere
        assert_eq!(scene.contacts, 4);
        assert_eq!(scene.session.constraint_count(), 4);
    }

    #[test]
    fn test_fast_bodies_are_swept_ahead() {
        let mut falling = body(0, Vector::new(0.0, 1.0, 0.0));
        falling.radius = Some(0.2);
        falling.velocity = Vector::new(0.0, -50.0, 0.0);
        let contacts = ContactSettings {
            ground_height: Some(0.0),
            lookahead: 1.0 / 60.0,
        };

        let scene =
            build_session(&[falling], &[], contacts, 0.0, SessionSettings::default()).unwrap();
        assert_eq!(scene.contacts, 1);
    }

    #[test]
    fn test_potential_energy() {
        let mut a = body(0, Vector::new(0.0, 2.0, 0.0));
        a.gravity = Some(Vector::new(0.0, -10.0, 0.0));
        let b = body(1, Vector::new(0.0, 7.0, 0.0));

        let scene =
            build_session(&[a, b], &[], NO_CONTACTS, 0.0, SessionSettings::default()).unwrap();
        assert!((potential_energy(&[a, b], &scene.session) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_spawn_scene_layout() {
        let mut config = SimulationConfig::default();
        config.scene.extra_balls = 4;
        let mut app = create_test_app(config);

        app.world_mut().run_system_once(spawn_scene).unwrap();

        let world = app.world_mut();
        assert_eq!(world.query::<&Particle>().iter(world).count(), 3 + 1 + 4);
        assert_eq!(world.query::<&Anchor>().iter(world).count(), 1);
        assert_eq!(world.query::<&Tether>().iter(world).count(), 2);
        assert_eq!(world.query::<&Collider>().iter(world).count(), 8);
    }

    #[test]
    fn test_step_simulation_drops_free_ball() {
        let mut config = SimulationConfig::default();
        config.scene.chain_length = 0;
        let timestep = config.physics.timestep;
        let mut app = create_test_app(config);
        app.world_mut().run_system_once(spawn_scene).unwrap();
        app.add_systems(Update, step_simulation);

        let start = {
            let world = app.world_mut();
            world.query::<&Position>().single(world).unwrap().value()
        };
        app.update();

        let world = app.world_mut();
        let (position, particle) = world
            .query::<(&Position, &Particle)>()
            .single(world)
            .unwrap();
        assert!(position.value().y < start.y);
        assert!((particle.velocity.y + 9.81 * timestep).abs() < 1e-9);

        let stats = world.resource::<SimulationStats>();
        assert_eq!(stats.frame, 1);
        assert!((stats.time - timestep).abs() < 1e-12);
        assert_eq!(stats.constraints, 0);
        assert!(stats.report.substages > 0);
    }

    #[test]
    fn test_ball_comes_to_rest_on_ground() {
        let mut config = SimulationConfig::default();
        config.scene.chain_length = 0;
        config.physics.substeps = 2;
        let mut app = create_test_app(config);
        app.insert_resource(ActiveIntegrator(Box::new(ExplicitEuler)));
        app.world_mut().run_system_once(spawn_scene).unwrap();
        app.add_systems(Update, step_simulation);

        for _ in 0..240 {
            app.update();
        }

        let world = app.world_mut();
        let position = world.query::<&Position>().single(world).unwrap().value();
        assert!(position.y > 0.1, "ball sank to {}", position.y);
        assert!(position.y < 0.3, "ball hovers at {}", position.y);
    }

    #[test]
    fn test_chain_stays_connected() {
        let mut config = SimulationConfig::default();
        config.scene.falling_ball = false;
        config.scene.ground_height = -100.0;
        let spacing = config.scene.ball_spacing;
        let mut app = create_test_app(config);
        app.world_mut().run_system_once(spawn_scene).unwrap();
        app.add_systems(Update, step_simulation);

        for _ in 0..60 {
            app.update();
        }

        let world = app.world_mut();
        let mut links = world.query::<(&Position, &Tether)>();
        let links: Vec<(Vector, Tether)> = links
            .iter(world)
            .map(|(position, tether)| (position.value(), *tether))
            .collect();
        assert_eq!(links.len(), 2);
        for (position, tether) in links {
            let TetherTarget::Particle(target) = tether.target else {
                panic!("chain links target particles");
            };
            let other = world.get::<Position>(target).unwrap().value();
            assert!(
                (position.distance(other) - spacing).abs() < 0.02,
                "link stretched to {}",
                position.distance(other)
            );
        }
    }

    #[test]
    fn test_tether_to_static_entity_holds_at_its_position() {
        let mut config = SimulationConfig::default();
        config.scene.ground_height = -100.0;
        let mut app = create_test_app(config);
        app.add_systems(Update, step_simulation);

        let pivot = Vector::new(0.0, 1.0, 0.0);
        let post = app.world_mut().spawn(Position::new(pivot)).id();
        let bob = app
            .world_mut()
            .spawn((
                Particle::new(1.0),
                Position::new(Vector::new(1.0, 1.0, 0.0)),
                Gravity(Vector::new(0.0, -9.81, 0.0)),
                Tether {
                    target: TetherTarget::Particle(post),
                    length: 1.0,
                },
            ))
            .id();

        // Half a second puts a released quarter swing near the bottom
        for _ in 0..30 {
            app.update();
        }

        let world = app.world();
        let position = world.get::<Position>(bob).unwrap().value();
        assert!(position.y < pivot.y - 0.5, "bob never swung: {position}");
        assert!(
            (position.distance(pivot) - 1.0).abs() < 0.02,
            "rod stretched to {}",
            position.distance(pivot)
        );
        assert_eq!(world.get::<Position>(post).unwrap().value(), pivot);
        assert_eq!(world.resource::<SimulationStats>().constraints, 1);
    }

    #[test]
    fn test_exit_after_steps() {
        let mut config = SimulationConfig::default();
        config.run.steps = 2;
        let mut app = create_test_app(config);
        app.add_systems(Update, (step_simulation, exit_after_steps).chain());

        app.update();
        assert!(app.should_exit().is_none());
        app.update();
        assert!(app.should_exit().is_some());
    }
}
