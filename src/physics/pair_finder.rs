//! Pair finding: broad phase over collision layers followed by contact generation.
//!
//! There are three finders, one per kind of thing a dynamic body can touch.
//! They read disjoint data and can run at the same time.

use super::{
    capture::{CapturedKinematics, CapturedRigidBodies, CapturedRigidBodyState},
    collision::{self, layer, CollisionLayer, MotionExpansion},
    constraint::{
        ContactBody, ContactJacobian, ContactParameters, MAX_DEPENETRATION_VELOCITY_DYNAMIC_DYNAMIC,
        MAX_DEPENETRATION_VELOCITY_DYNAMIC_STATIC,
    },
    pair_stream::{Pair, PairData, PairStream, PairTarget},
    Velocity,
};
use crate::math::Vec3;

impl From<&CapturedRigidBodyState> for ContactBody {
    fn from(state: &CapturedRigidBodyState) -> Self {
        ContactBody {
            center_of_mass: state.inertial_pose.translation,
            velocity: state.velocity,
            inverse_mass: state.inverse_mass,
            inverse_inertia: state.inverse_inertia,
        }
    }
}

/// Component of gravity pushing a body along `-normal`, i.e. into whatever it's touching.
#[inline]
fn gravity_into(gravity: Vec3, normal: Vec3) -> f64 {
    gravity.dot(-normal)
}

fn stream_from(body_layer: &CollisionLayer, pairs: Vec<(usize, Pair)>) -> PairStream {
    let mut stream = PairStream::new(body_layer.calculator());
    for (bucket, pair) in pairs {
        stream.push(bucket, pair);
    }
    stream
}

/// Contacts between dynamic bodies and static colliders.
pub fn find_environment_pairs(
    body_layer: &CollisionLayer,
    bodies: &CapturedRigidBodies,
    environment: &CollisionLayer,
    dt: f64,
) -> PairStream {
    let _span = tracy_span!("find environment pairs", "find_environment_pairs");

    let template = PairStream::new(body_layer.calculator());
    let pairs = layer::find_pairs_between(body_layer, environment, |a, e| {
        let state = &bodies.states[a];
        let shape_a = &body_layer.bodies()[a].shape;
        let shape_e = &environment.bodies()[e].shape;

        let dist = collision::distance_between(shape_a, shape_e, state.motion_expansion.max_distance())?;
        let manifold = collision::contacts_between(shape_a, shape_e, &dist);
        if manifold.contacts.is_empty() {
            return None;
        }

        let params = ContactParameters {
            coefficient_of_restitution: state.coefficient_of_restitution,
            coefficient_of_friction: state.coefficient_of_friction,
            max_depenetration_velocity: MAX_DEPENETRATION_VELOCITY_DYNAMIC_STATIC,
            gravity_against_normal: gravity_into(state.gravity, *manifold.normal).max(0.0),
            dt,
        };
        let ground = ContactBody::immovable(environment.aabbs()[e].center(), Velocity::default());
        let jac = ContactJacobian::new(&ContactBody::from(state), &ground, &manifold, &params);

        Some((
            template.bucket_for(state.bucket, None),
            Pair {
                a,
                b: PairTarget::Environment(e),
                data: PairData::ContactEnvironment(jac),
            },
        ))
    });

    stream_from(body_layer, pairs)
}

/// Contacts between dynamic bodies and kinematic bodies.
pub fn find_kinematic_pairs(
    body_layer: &CollisionLayer,
    bodies: &CapturedRigidBodies,
    kinematic_layer: &CollisionLayer,
    kinematics: &CapturedKinematics,
    dt: f64,
) -> PairStream {
    let _span = tracy_span!("find kinematic pairs", "find_kinematic_pairs");

    let template = PairStream::new(body_layer.calculator());
    let pairs = layer::find_pairs_between(body_layer, kinematic_layer, |a, k| {
        let state = &bodies.states[a];
        let kinematic = &kinematics.kinematics[k];
        let shape_a = &body_layer.bodies()[a].shape;
        let shape_k = &kinematic_layer.bodies()[k].shape;

        let max_distance =
            MotionExpansion::max_distance_between(&state.motion_expansion, &kinematic.motion_expansion);
        let dist = collision::distance_between(shape_a, shape_k, max_distance)?;
        let manifold = collision::contacts_between(shape_a, shape_k, &dist);
        if manifold.contacts.is_empty() {
            return None;
        }

        let params = ContactParameters {
            coefficient_of_restitution: state.coefficient_of_restitution,
            coefficient_of_friction: state.coefficient_of_friction,
            max_depenetration_velocity: MAX_DEPENETRATION_VELOCITY_DYNAMIC_STATIC,
            gravity_against_normal: gravity_into(state.gravity, *manifold.normal).max(0.0),
            dt,
        };
        let mover = ContactBody::immovable(kinematic.inertial_pose.translation, kinematic.velocity);
        let jac = ContactJacobian::new(&ContactBody::from(state), &mover, &manifold, &params);

        Some((
            template.bucket_for(state.bucket, None),
            Pair {
                a,
                b: PairTarget::Kinematic(k),
                data: PairData::ContactKinematic(jac),
            },
        ))
    });

    stream_from(body_layer, pairs)
}

/// Contacts between pairs of dynamic bodies.
pub fn find_body_pairs(body_layer: &CollisionLayer, bodies: &CapturedRigidBodies, dt: f64) -> PairStream {
    let _span = tracy_span!("find body pairs", "find_body_pairs");

    let template = PairStream::new(body_layer.calculator());
    let pairs = layer::find_pairs_within(body_layer, |a, b| {
        let state_a = &bodies.states[a];
        let state_b = &bodies.states[b];
        if state_a.inverse_mass == 0.0 && state_b.inverse_mass == 0.0 {
            return None;
        }
        let shape_a = &body_layer.bodies()[a].shape;
        let shape_b = &body_layer.bodies()[b].shape;

        let max_distance =
            state_a.motion_expansion.max_distance() + state_b.motion_expansion.max_distance();
        let dist = collision::distance_between(shape_a, shape_b, max_distance)?;
        let manifold = collision::contacts_between(shape_a, shape_b, &dist);
        if manifold.contacts.is_empty() {
            return None;
        }

        let normal = *manifold.normal;
        let gravity = gravity_into(state_a.gravity, normal)
            .max(-gravity_into(state_b.gravity, normal))
            .max(0.0);
        let params = ContactParameters {
            coefficient_of_restitution: (state_a.coefficient_of_restitution
                * state_b.coefficient_of_restitution)
                .sqrt(),
            coefficient_of_friction: (state_a.coefficient_of_friction
                * state_b.coefficient_of_friction)
                .sqrt(),
            max_depenetration_velocity: MAX_DEPENETRATION_VELOCITY_DYNAMIC_DYNAMIC,
            gravity_against_normal: gravity,
            dt,
        };
        let jac = ContactJacobian::new(
            &ContactBody::from(state_a),
            &ContactBody::from(state_b),
            &manifold,
            &params,
        );

        Some((
            template.bucket_for(state_a.bucket, Some(state_b.bucket)),
            Pair {
                a,
                b: PairTarget::Body(b),
                data: PairData::ContactBody(jac),
            },
        ))
    });

    stream_from(body_layer, pairs)
}
