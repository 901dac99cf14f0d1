//! Velocity constraints solved by sequential impulses.
//!
//! Each constraint is precomputed once per tick into a Jacobian
//! and then solved several times by the [`solver`][super::solver],
//! reading and writing body velocities in place.

use super::Velocity;

pub mod contact;
pub use contact::{
    ContactBody, ContactJacobian, ContactParameters, ContactPointJacobian,
    MAX_DEPENETRATION_VELOCITY_DYNAMIC_DYNAMIC, MAX_DEPENETRATION_VELOCITY_DYNAMIC_STATIC,
};

pub mod lock;
pub use lock::{
    PositionLockJacobian, RotationLock1Jacobian, RotationLock2Jacobian, RotationLock3Jacobian,
    StiffSpring,
};

/// One side of a constraint while it's being solved.
///
/// Kinematic bodies and environment colliders get a throwaway velocity
/// and zero inverse mass, so impulses applied to them have no effect.
#[derive(Debug)]
pub struct SolverBody<'a> {
    pub velocity: &'a mut Velocity,
    pub inverse_mass: f64,
    /// Multiplier on the angular response, set by the motion stabilizer.
    pub inverse_inertia_scale: f64,
}

impl<'a> SolverBody<'a> {
    /// A body that doesn't react to impulses but may still be moving.
    pub fn immovable(velocity: &'a mut Velocity) -> Self {
        Self {
            velocity,
            inverse_mass: 0.0,
            inverse_inertia_scale: 0.0,
        }
    }
}
