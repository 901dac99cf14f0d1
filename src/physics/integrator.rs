//! Moving bodies by their solved velocities and writing the results back into the world.

use super::{
    body::{PreviousTransform, RigidBody, WorldTransform},
    capture::{CapturedRigidBodies, CapturedRigidBodyState},
    settings::PhysicsSettings,
    Velocity,
};
use crate::math::{self as m, Pose};

/// Inertial pose and velocity of a body at the end of a tick.
#[derive(Clone, Copy, Debug)]
pub struct IntegratedBody {
    pub previous_pose: Pose,
    pub pose: Pose,
    pub velocity: Velocity,
}

/// Replace non-finite halves of a velocity with zero. Returns whether anything was replaced.
pub fn zero_non_finite(velocity: &mut Velocity) -> bool {
    let mut changed = false;
    if !m::is_finite(velocity.linear) {
        velocity.linear = m::Vec3::zero();
        changed = true;
    }
    if !m::is_finite(velocity.angular) {
        velocity.angular = m::Vec3::zero();
        changed = true;
    }
    changed
}

/// Advance one captured body by `dt`.
pub fn integrate_body(state: &CapturedRigidBodyState, settings: &PhysicsSettings, dt: f64) -> IntegratedBody {
    let mut velocity = state.velocity;
    if zero_non_finite(&mut velocity) {
        log::trace!("Zeroed non-finite velocity of {:?}", state.entity);
    }

    velocity.linear *= (1.0 - settings.linear_damping * dt).clamp(0.0, 1.0);
    velocity.angular *= (1.0 - settings.angular_damping * dt).clamp(0.0, 1.0);

    IntegratedBody {
        previous_pose: state.inertial_pose,
        pose: velocity.apply_to_pose(dt, state.inertial_pose),
        velocity,
    }
}

/// Integrate every captured body and write poses and velocities back into `world`.
///
/// The change in each inertial pose is applied on top of the entity's [`WorldTransform`],
/// so offsets between the collider's centre of mass and the entity origin are kept.
/// Every [`PreviousTransform`] in the world is refreshed afterwards.
pub fn integrate(world: &mut hecs::World, bodies: &CapturedRigidBodies, settings: &PhysicsSettings, dt: f64) {
    let _span = tracy_span!("integrate", "integrate");

    #[cfg(feature = "parallel")]
    let results: Vec<IntegratedBody> = {
        use rayon::prelude::*;
        bodies
            .states
            .par_iter()
            .map(|state| integrate_body(state, settings, dt))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<IntegratedBody> = bodies
        .states
        .iter()
        .map(|state| integrate_body(state, settings, dt))
        .collect();

    for (state, result) in itertools::izip!(&bodies.states, &results) {
        let Ok((transform, body)) =
            world.query_one_mut::<(&mut WorldTransform, &mut RigidBody)>(state.entity)
        else {
            log::warn!("Body {:?} disappeared during the physics tick", state.entity);
            continue;
        };
        let delta = m::compose(&result.pose, &m::inverse(&result.previous_pose));
        transform.pose = m::compose(&delta, &transform.pose);
        body.velocity = result.velocity;
    }

    for (_, (previous, current)) in world.query_mut::<(&mut PreviousTransform, &WorldTransform)>() {
        previous.0 = *current;
    }
}
