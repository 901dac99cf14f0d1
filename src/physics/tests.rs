//! Whole-pipeline scenarios driven through [`Physics::tick`].

use super::{body::*, *};
use crate::{
    collision::{Aabb, Collider},
    math::PoseBuilder,
    CollisionLayerSettings,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const DT: f64 = 1.0 / 60.0;

fn layer_settings(subdivisions: u32) -> CollisionLayerSettings {
    CollisionLayerSettings {
        world_aabb: Aabb::from_center_extents(Vec3::zero(), Vec3::broadcast(10.0)),
        subdivisions_per_axis: [subdivisions, 1, subdivisions],
    }
}

fn weightless() -> PhysicsSettings {
    PhysicsSettings {
        collision_layer: layer_settings(1),
        gravity: Vec3::zero(),
        linear_damping: 0.0,
        angular_damping: 0.0,
        ..Default::default()
    }
}

fn at(x: f64, y: f64, z: f64) -> WorldTransform {
    WorldTransform::new(PoseBuilder::new().with_position([x, y, z]))
}

fn spawn_ground(world: &mut hecs::World) -> hecs::Entity {
    world.spawn((
        at(0.0, -0.5, 0.0),
        Collider::new_box(Vec3::new(20.0, 1.0, 20.0)),
        EnvironmentCollisionTag,
    ))
}

fn velocity_of(world: &hecs::World, entity: hecs::Entity) -> Velocity {
    world
        .get::<&RigidBody>(entity)
        .map(|body| body.velocity)
        .expect("entity has a rigid body")
}

fn position_of(world: &hecs::World, entity: hecs::Entity) -> Vec3 {
    world
        .get::<&WorldTransform>(entity)
        .map(|tr| tr.position())
        .expect("entity has a transform")
}

#[test]
fn dropped_sphere_comes_to_rest_on_ground() {
    let mut physics = Physics::new(PhysicsSettings {
        collision_layer: layer_settings(2),
        ..Default::default()
    });
    let mut world = hecs::World::new();
    let ground = spawn_ground(&mut world);
    let ball = world.spawn((
        at(2.5, 1.5, 2.5),
        Collider::new_sphere(0.5),
        RigidBody::new(1.0).with_restitution(0.0),
    ));

    let mut touched_ground = false;
    for _ in 0..120 {
        let report = physics.tick(&mut world, DT).expect("valid timestep");
        touched_ground |= report
            .contact_events
            .iter()
            .any(|ev| ev.entity == ball && ev.other == ContactOther::Environment(ground));
    }

    assert!(touched_ground);
    assert!(velocity_of(&world, ball).linear.mag() < 0.01);
    let pos = position_of(&world, ball);
    assert!((pos.y - 0.5).abs() < 0.02, "{:?}", pos);
    assert!((pos.x - 2.5).abs() < 1e-6 && (pos.z - 2.5).abs() < 1e-6);
}

#[test]
fn elastic_spheres_swap_velocities() {
    let mut physics = Physics::new(weightless());
    let mut world = hecs::World::new();
    let body = RigidBody::new(1.0).with_restitution(1.0).with_friction(0.0);
    let left = world.spawn((
        at(-1.0, 0.0, 0.0),
        Collider::new_sphere(0.5),
        body.with_velocity(Velocity::new(Vec3::unit_x(), Vec3::zero())),
    ));
    let right = world.spawn((
        at(1.0, 0.0, 0.0),
        Collider::new_sphere(0.5),
        body.with_velocity(Velocity::new(-Vec3::unit_x(), Vec3::zero())),
    ));

    for _ in 0..40 {
        physics.tick(&mut world, DT).expect("valid timestep");
    }

    let (vl, vr) = (velocity_of(&world, left), velocity_of(&world, right));
    assert!((vl.linear - -Vec3::unit_x()).mag() < 1e-6, "{:?}", vl);
    assert!((vr.linear - Vec3::unit_x()).mag() < 1e-6, "{:?}", vr);
    assert!(position_of(&world, left).x < position_of(&world, right).x - 1.0);
}

#[test]
fn kinematic_body_pushes_dynamic_body() {
    let mut physics = Physics::new(weightless());
    let mut world = hecs::World::new();
    let start = at(-1.01, 0.0, 0.0);
    let paddle = world.spawn((
        start,
        PreviousTransform(at(-1.01 - DT, 0.0, 0.0)),
        Collider::new_cube(1.0),
        KinematicCollisionTag,
    ));
    let ball = world.spawn((
        at(0.0, 0.0, 0.0),
        Collider::new_sphere(0.5),
        RigidBody::new(1.0).with_restitution(0.0),
    ));

    let report = physics.tick(&mut world, DT).expect("valid timestep");
    assert_eq!(report.num_kinematics, 1);
    let v = velocity_of(&world, ball).linear;
    assert!(v.x > 0.0 && v.x <= 1.0 + 1e-9, "{:?}", v);

    // the host keeps the paddle moving
    let next = position_of(&world, paddle) + Vec3::new(DT, 0.0, 0.0);
    if let Ok(mut tr) = world.get::<&mut WorldTransform>(paddle) {
        tr.pose.translation = next;
    }
    physics.tick(&mut world, DT).expect("valid timestep");
    let v = velocity_of(&world, ball).linear;
    assert!((v.x - 1.0).abs() < 1e-6, "{:?}", v);
    assert!(v.y.abs() < 1e-9 && v.z.abs() < 1e-9);
}

#[test]
fn kinematic_tag_overrides_rigid_body() {
    let mut physics = Physics::new(weightless());
    let mut world = hecs::World::new();
    let start = at(-1.01, 0.0, 0.0);
    world.spawn((
        start,
        PreviousTransform(at(-1.01 - DT, 0.0, 0.0)),
        Collider::new_cube(1.0),
        RigidBody::new(1.0),
        KinematicCollisionTag,
    ));
    let ball = world.spawn((
        at(0.0, 0.0, 0.0),
        Collider::new_sphere(0.5),
        RigidBody::new(1.0).with_restitution(0.0),
    ));

    let report = physics.tick(&mut world, DT).expect("valid timestep");
    assert_eq!(report.num_kinematics, 1);
    assert_eq!(report.num_bodies, 1);
    assert!(report.num_pairs >= 1);
    let v = velocity_of(&world, ball).linear;
    assert!(v.x > 0.0, "{:?}", v);
}

fn spawn_cube_stack(world: &mut hecs::World, height: usize) -> Vec<hecs::Entity> {
    (0..height)
        .map(|i| {
            world.spawn((
                at(2.5, 0.5 + i as f64, 2.5),
                Collider::new_cube(1.0),
                RigidBody::new(1.0).with_restitution(0.0),
            ))
        })
        .collect()
}

#[test]
fn cube_stack_stays_standing() {
    let mut physics = Physics::new(PhysicsSettings {
        collision_layer: layer_settings(2),
        ..Default::default()
    });
    let mut world = hecs::World::new();
    spawn_ground(&mut world);
    let cubes = spawn_cube_stack(&mut world, 5);

    // 15 seconds
    for _ in 0..900 {
        physics.tick(&mut world, DT).expect("valid timestep");
    }

    for (i, &cube) in cubes.iter().enumerate() {
        let pos = position_of(&world, cube);
        let expected = Vec3::new(2.5, 0.5 + i as f64, 2.5);
        assert!((pos - expected).mag() < 0.01, "cube {} at {:?}", i, pos);
        let v = velocity_of(&world, cube);
        assert!(v.linear.mag() < 0.01 && v.angular.mag() < 0.01, "cube {} moving {:?}", i, v);
    }
}

#[test]
fn resting_cube_does_not_creep() {
    let mut physics = Physics::new(PhysicsSettings {
        collision_layer: layer_settings(2),
        ..Default::default()
    });
    let mut world = hecs::World::new();
    spawn_ground(&mut world);
    let cube = spawn_cube_stack(&mut world, 1)[0];

    for _ in 0..600 {
        physics.tick(&mut world, DT).expect("valid timestep");
    }

    let pos = position_of(&world, cube);
    assert!((pos.x - 2.5).abs() < 1e-3 && (pos.z - 2.5).abs() < 1e-3, "{:?}", pos);
    assert!((pos.y - 0.5).abs() < 0.01, "{:?}", pos);
    assert!(velocity_of(&world, cube).linear.mag() < 1e-3);
}

#[test]
fn position_locks_hold_only_locked_axes() {
    let mut physics = Physics::new(PhysicsSettings {
        collision_layer: layer_settings(1),
        ..Default::default()
    });
    let mut world = hecs::World::new();
    let moving = Velocity::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.0, 0.0));
    let pinned = world.spawn((
        at(-3.0, 0.0, 0.0),
        Collider::new_cube(1.0),
        RigidBody::new(1.0).with_velocity(moving),
        LockWorldAxes::new(LockWorldAxes::ALL_POSITIONS),
    ));
    let on_rail = world.spawn((
        at(3.0, 0.0, 0.0),
        Collider::new_cube(1.0),
        RigidBody::new(1.0).with_velocity(moving),
        LockWorldAxes::new(LockWorldAxes::POSITION_Y),
    ));

    physics.tick(&mut world, DT).expect("valid timestep");

    let pinned_pos = position_of(&world, pinned);
    assert!((pinned_pos - Vec3::new(-3.0, 0.0, 0.0)).mag() < 1e-6, "{:?}", pinned_pos);
    let rotation = world
        .get::<&WorldTransform>(pinned)
        .map(|tr| crate::math::scaled_axis_from_rotor(tr.pose.rotation))
        .expect("transform");
    assert!(rotation.y > 0.01, "{:?}", rotation);

    let rail_pos = position_of(&world, on_rail);
    assert!(rail_pos.y.abs() < 1e-6);
    assert!((rail_pos.x - 3.0 - DT).abs() < 1e-3);
    assert!((rail_pos.z - 3.0 * DT).abs() < 1e-3);
}

#[test]
fn empty_world_ticks() {
    let mut physics = Physics::default();
    let mut world = hecs::World::new();
    let report = physics.tick(&mut world, DT).expect("valid timestep");
    assert_eq!(report.num_bodies, 0);
    assert_eq!(report.num_kinematics, 0);
    assert_eq!(report.num_environment_colliders, 0);
    assert_eq!(report.num_pairs, 0);
    assert!(report.contact_events.is_empty());
}

#[test]
fn distant_bodies_never_pair() {
    let mut physics = Physics::new(weightless());
    let mut world = hecs::World::new();
    world.spawn((at(-5.0, 0.0, 0.0), Collider::new_sphere(0.5), RigidBody::new(1.0)));
    world.spawn((at(5.0, 0.0, 0.0), Collider::new_capsule(0.5, 0.5), RigidBody::new(1.0)));
    world.spawn((at(0.0, 5.0, 0.0), Collider::new_cube(1.0), EnvironmentCollisionTag));

    let report = physics.tick(&mut world, DT).expect("valid timestep");
    assert_eq!(report.num_bodies, 2);
    assert_eq!(report.num_environment_colliders, 1);
    assert_eq!(report.num_pairs, 0);
    assert!(report.contact_events.is_empty());
}

#[test]
fn invalid_timestep_leaves_world_untouched() {
    let mut physics = Physics::default();
    let mut world = hecs::World::new();
    let mut impulses = ImpulseBuffer::default();
    impulses.push_field(Vec3::unit_x());
    let ball = world.spawn((at(0.0, 1.0, 0.0), Collider::new_sphere(0.5), RigidBody::new(1.0), impulses));

    for dt in [0.0, -DT, f64::NAN, f64::INFINITY] {
        let result = physics.tick(&mut world, dt);
        assert!(matches!(result, Err(PhysicsError::InvalidTimestep(_))));
    }
    assert_eq!(velocity_of(&world, ball), Velocity::default());
    assert_eq!(position_of(&world, ball), Vec3::new(0.0, 1.0, 0.0));
    assert!(world
        .get::<&ImpulseBuffer>(ball)
        .map(|buf| !buf.is_empty())
        .unwrap_or(false));
}

fn random_pile(seed: u64) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut physics = Physics::new(PhysicsSettings {
        collision_layer: layer_settings(3),
        ..Default::default()
    });
    let mut world = hecs::World::new();
    spawn_ground(&mut world);
    let bodies: Vec<hecs::Entity> = (0..30)
        .map(|i| {
            let pos = at(
                rng.gen_range(-4.0..4.0),
                rng.gen_range(0.5..4.0),
                rng.gen_range(-4.0..4.0),
            );
            let collider = match i % 3 {
                0 => Collider::new_sphere(0.3),
                1 => Collider::new_capsule(0.2, 0.2),
                _ => Collider::new_cube(0.5),
            };
            world.spawn((pos, collider, RigidBody::new(rng.gen_range(0.5..2.0))))
        })
        .collect();

    for _ in 0..60 {
        physics.tick(&mut world, DT).expect("valid timestep");
    }
    bodies.iter().map(|&e| position_of(&world, e)).collect()
}

#[test]
fn random_pile_is_deterministic_and_stays_above_ground() {
    let first = random_pile(5);
    let second = random_pile(5);
    itertools::assert_equal(first.iter(), second.iter());
    for pos in &first {
        assert!(crate::math::is_finite(*pos));
        assert!(pos.y > -0.1, "{:?}", pos);
    }
}
