//! Layer building: capturing the live world into flat per-tick collections.
//!
//! Every tick starts by reading transforms, colliders and bodies out of the `hecs::World`
//! into three collision layers (environment, kinematic and dynamic bodies)
//! and dense arrays of captured state. Nothing after this stage looks at the world
//! until the integrator writes results back.

use super::{
    body::{
        AddImpulse, EnvironmentCollisionTag, ImpulseBuffer, KinematicCollisionTag, LockWorldAxes,
        PreviousTransform, RigidBody, WorldTransform,
    },
    collision::{Collider, CollisionLayer, LayerBody, MotionExpansion},
    constraint::{
        PositionLockJacobian, RotationLock1Jacobian, RotationLock2Jacobian, RotationLock3Jacobian,
        StiffSpring,
    },
    pair_stream::{Pair, PairData, PairStream, PairTarget},
    settings::PhysicsSettings,
    stabilizer::MotionStabilizer,
    Velocity,
};
use crate::math::{self as m, Mat3, Pose, Vec3};

use std::collections::HashMap;

/// Everything the solver needs to know about a dynamic body during one tick.
#[derive(Clone, Copy, Debug)]
pub struct CapturedRigidBodyState {
    pub entity: hecs::Entity,
    pub velocity: Velocity,
    pub motion_expansion: MotionExpansion,
    /// Pose of the centre of mass in world space, without scale.
    pub inertial_pose: Pose,
    pub inverse_mass: f64,
    /// Inverse inertia tensor in world space.
    pub inverse_inertia: Mat3,
    pub motion_stabilizer: MotionStabilizer,
    pub gravity: Vec3,
    pub angular_expansion: f64,
    /// Collision layer bucket the body was sorted into.
    pub bucket: usize,
    /// Significant bodies touching this one, counted on the first solver iteration.
    pub num_significant_contacts: u32,
    pub coefficient_of_friction: f64,
    pub coefficient_of_restitution: f64,
}

/// Captured dynamic bodies, in the same order as their collision layer.
#[derive(Clone, Debug, Default)]
pub struct CapturedRigidBodies {
    pub states: Vec<CapturedRigidBodyState>,
    pub entity_to_index: HashMap<hecs::Entity, usize>,
}

impl CapturedRigidBodies {
    pub fn index_of(&self, entity: hecs::Entity) -> Option<usize> {
        self.entity_to_index.get(&entity).copied()
    }
}

/// A body moved by something outside physics, seen by the solver as a moving wall.
#[derive(Clone, Copy, Debug)]
pub struct CapturedKinematic {
    pub entity: hecs::Entity,
    /// Velocity derived from the change since the previous transform.
    pub velocity: Velocity,
    pub inertial_pose: Pose,
    pub motion_expansion: MotionExpansion,
}

/// Captured kinematic bodies, in the same order as their collision layer.
#[derive(Clone, Debug, Default)]
pub struct CapturedKinematics {
    pub kinematics: Vec<CapturedKinematic>,
    pub entity_to_index: HashMap<hecs::Entity, usize>,
}

impl CapturedKinematics {
    pub fn index_of(&self, entity: hecs::Entity) -> Option<usize> {
        self.entity_to_index.get(&entity).copied()
    }
}

/// Mass and inertia of a collider placed in the world.
#[derive(Clone, Copy, Debug)]
pub struct WorldMass {
    pub inertial_pose: Pose,
    pub inverse_mass: f64,
    pub inverse_inertia: Mat3,
    pub angular_expansion: f64,
}

impl WorldMass {
    pub fn new(collider: &Collider, transform: &WorldTransform, inverse_mass: f64) -> Self {
        let props = collider.mass_properties(transform.scale);
        let rotation = transform.pose.rotation;
        let inverse_inertia = if inverse_mass > 0.0 {
            let local = m::mat3_scaled(m::inverse_or_zero(props.inertia_per_unit_mass), inverse_mass);
            m::rotate_tensor(rotation, local)
        } else {
            m::mat3_zero()
        };
        Self {
            inertial_pose: Pose::new(
                m::transform_point(&transform.pose, props.center_of_mass),
                rotation,
            ),
            inverse_mass,
            inverse_inertia,
            angular_expansion: props.angular_expansion_factor,
        }
    }
}

/// Change a body's velocity by a uniform impulse.
#[inline]
pub fn apply_field_impulse(velocity: &mut Velocity, inverse_mass: f64, impulse: Vec3) {
    velocity.linear += impulse * inverse_mass;
}

/// Change a body's velocity by an impulse acting at a point in world space.
pub fn apply_point_impulse(
    velocity: &mut Velocity,
    mass: &WorldMass,
    point: Vec3,
    impulse: Vec3,
) {
    velocity.linear += impulse * mass.inverse_mass;
    let offset = point - mass.inertial_pose.translation;
    velocity.angular += mass.inverse_inertia * offset.cross(impulse);
}

/// Capture static colliders.
///
/// These are entities with a [`Collider`], [`WorldTransform`] and
/// [`EnvironmentCollisionTag`] that aren't rigid bodies.
pub fn build_environment_layer(world: &hecs::World, settings: &PhysicsSettings) -> CollisionLayer {
    let _span = tracy_span!("build environment layer", "build_environment_layer");

    let mut query = world
        .query::<(&WorldTransform, &Collider)>()
        .with::<&EnvironmentCollisionTag>()
        .without::<&RigidBody>();
    let items: Vec<_> = query
        .iter()
        .map(|(entity, (transform, collider))| {
            let shape = collider.world_shape(transform);
            (LayerBody { entity, shape }, shape.aabb())
        })
        .collect();

    CollisionLayer::build(&settings.collision_layer, items)
}

/// Capture kinematic colliders and derive their velocities.
///
/// These are entities with a [`Collider`], [`WorldTransform`], [`PreviousTransform`]
/// and [`KinematicCollisionTag`]. A [`RigidBody`] on the same entity is ignored,
/// the tag takes it out of the simulation and makes it move only by its transform.
pub fn build_kinematic_layer(
    world: &hecs::World,
    settings: &PhysicsSettings,
    dt: f64,
) -> (CollisionLayer, CapturedKinematics) {
    let _span = tracy_span!("build kinematic layer", "build_kinematic_layer");

    let mut query = world
        .query::<(&WorldTransform, &PreviousTransform, &Collider)>()
        .with::<&KinematicCollisionTag>();
    let (items, kinematics): (Vec<_>, Vec<_>) = query
        .iter()
        .map(|(entity, (transform, previous, collider))| {
            let current = WorldMass::new(collider, transform, 0.0);
            let previous = WorldMass::new(collider, &previous.0, 0.0);
            let velocity = kinematic_velocity(&previous.inertial_pose, &current.inertial_pose, dt);
            let motion_expansion = MotionExpansion::new(&velocity, dt, current.angular_expansion);

            let shape = collider.world_shape(transform);
            let aabb = motion_expansion.expand_aabb(shape.aabb());
            let kinematic = CapturedKinematic {
                entity,
                velocity,
                inertial_pose: current.inertial_pose,
                motion_expansion,
            };
            ((LayerBody { entity, shape }, aabb), kinematic)
        })
        .unzip();

    let layer = CollisionLayer::build(&settings.collision_layer, items);
    let kinematics: Vec<CapturedKinematic> = layer
        .source_indices()
        .iter()
        .map(|&src| kinematics[src])
        .collect();
    let entity_to_index = kinematics
        .iter()
        .enumerate()
        .map(|(idx, kin)| (kin.entity, idx))
        .collect();

    (
        layer,
        CapturedKinematics {
            kinematics,
            entity_to_index,
        },
    )
}

/// Velocity that takes a body from one pose to another in `dt`.
///
/// Angular velocity is the world-space axis-angle of the rotation delta over `dt`,
/// not a difference of Euler angles. The two agree for the small rotations of a single step.
pub fn kinematic_velocity(previous: &Pose, current: &Pose, dt: f64) -> Velocity {
    let rotation_delta = current.rotation * previous.rotation.reversed();
    Velocity {
        linear: (current.translation - previous.translation) / dt,
        angular: m::scaled_axis_from_rotor(rotation_delta) / dt,
    }
}

/// Capture dynamic bodies.
///
/// Drains each body's [`ImpulseBuffer`], adds gravity and works out mass and motion bounds.
/// Bodies with [`LockWorldAxes`] also get lock constraints in the returned pair stream.
pub fn build_rigid_body_layer(
    world: &mut hecs::World,
    settings: &PhysicsSettings,
    dt: f64,
) -> (CollisionLayer, CapturedRigidBodies, PairStream) {
    let _span = tracy_span!("build rigid body layer", "build_rigid_body_layer");

    let mut items = Vec::new();
    let mut unsorted_states = Vec::new();
    let mut unsorted_locks = Vec::new();

    for (entity, (transform, collider, body, impulses, locks)) in world
        .query_mut::<(
            &WorldTransform,
            &Collider,
            &RigidBody,
            Option<&mut ImpulseBuffer>,
            Option<&LockWorldAxes>,
        )>()
        .without::<&KinematicCollisionTag>()
    {
        let mass = WorldMass::new(collider, transform, body.mass.inv());
        let mut velocity = body.velocity;
        let gravity = if mass.inverse_mass > 0.0 {
            settings.gravity
        } else {
            Vec3::zero()
        };
        velocity.linear += gravity * dt;

        if let Some(impulses) = impulses {
            for impulse in impulses.0.drain(..) {
                match impulse {
                    AddImpulse::Field(imp) => apply_field_impulse(&mut velocity, mass.inverse_mass, imp),
                    AddImpulse::Point { point, impulse } => {
                        apply_point_impulse(&mut velocity, &mass, point, impulse)
                    }
                }
            }
        }

        let motion_expansion = MotionExpansion::new(&velocity, dt, mass.angular_expansion);
        let shape = collider.world_shape(transform);
        let aabb = motion_expansion.expand_aabb(shape.aabb());

        items.push((LayerBody { entity, shape }, aabb));
        unsorted_locks.push(locks.copied().filter(|l| !l.is_empty()));
        unsorted_states.push(CapturedRigidBodyState {
            entity,
            velocity,
            motion_expansion,
            inertial_pose: mass.inertial_pose,
            inverse_mass: mass.inverse_mass,
            inverse_inertia: mass.inverse_inertia,
            motion_stabilizer: MotionStabilizer::default(),
            gravity,
            angular_expansion: mass.angular_expansion,
            bucket: 0,
            num_significant_contacts: 0,
            coefficient_of_friction: body.coefficient_of_friction,
            coefficient_of_restitution: body.coefficient_of_restitution,
        });
    }

    let layer = CollisionLayer::build(&settings.collision_layer, items);

    let mut states = Vec::with_capacity(unsorted_states.len());
    let mut entity_to_index = HashMap::with_capacity(unsorted_states.len());
    let mut lock_stream = PairStream::new(layer.calculator());
    let spring = StiffSpring::stiff(dt, settings.num_iterations);
    for (index, &src) in layer.source_indices().iter().enumerate() {
        let mut state = unsorted_states[src];
        state.bucket = layer.bucket_of(index);
        entity_to_index.insert(state.entity, index);
        if let Some(locks) = unsorted_locks[src] {
            push_lock_pairs(&mut lock_stream, index, &state, locks, spring, dt);
        }
        states.push(state);
    }

    (
        layer,
        CapturedRigidBodies {
            states,
            entity_to_index,
        },
        lock_stream,
    )
}

/// Emit the position lock and the rotation lock of one body.
fn push_lock_pairs(
    stream: &mut PairStream,
    index: usize,
    state: &CapturedRigidBodyState,
    locks: LockWorldAxes,
    spring: StiffSpring,
    dt: f64,
) {
    let bucket = stream.bucket_for(state.bucket, None);
    let mut push = |data: PairData| {
        stream.push(
            bucket,
            Pair {
                a: index,
                b: PairTarget::None,
                data,
            },
        )
    };

    if locks.positions() != 0 {
        let axes = [0, 1, 2].map(|axis| locks.position_locked(axis));
        push(PairData::PositionLock(PositionLockJacobian::new(axes, spring, dt)));
    }

    let rotations = locks.rotations();
    let inverse_inertia = state.inverse_inertia;
    match rotations.count_ones() {
        0 => {}
        1 => push(PairData::RotationLock1(RotationLock1Jacobian {
            locked_axis: rotations.trailing_zeros() as usize,
            inverse_inertia,
            spring,
            dt,
        })),
        2 => push(PairData::RotationLock2(RotationLock2Jacobian {
            free_axis: (!rotations).trailing_zeros() as usize,
            inverse_inertia,
            spring,
            dt,
        })),
        _ => push(PairData::RotationLock3(RotationLock3Jacobian {
            inverse_inertia,
            spring,
            dt,
        })),
    }
}
