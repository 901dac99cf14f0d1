//! A 3D rigid body physics pipeline for `hecs` worlds.
//!
//! Every frame goes through five stages:
//! layer building, pair finding, stream combining, iterative solving and integration.
//! [`Physics::tick`] runs them all; each stage is also exposed on its own in [`physics`].

/// Open a tracy profiling zone that ends when the returned value is dropped.
/// Does nothing unless the `tracy` feature is enabled and a client is running.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod math;
#[cfg(feature = "serde-types")]
pub use math::serde_pose;
pub use math::{uv, Angle, Mat3, Pose, PoseBuilder, Rotor3, Unit, Vec3};

pub mod physics;
pub use physics::{
    body::{
        AddImpulse, EnvironmentCollisionTag, ImpulseBuffer, KinematicCollisionTag, LockWorldAxes,
        Mass, PreviousTransform, RigidBody, WorldTransform,
    },
    collision::{self, Aabb, Collider, ColliderShape},
    settings::{CollisionLayerSettings, PhysicsSettings},
    ContactEvent, ContactOther, Physics, PhysicsError, StepReport, Velocity,
};
