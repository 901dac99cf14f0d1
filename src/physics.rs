use crate::math::{self as m, Pose, Vec3};

use thiserror::Error;

//

pub mod body;
pub mod collision;
pub mod settings;

pub mod capture;
pub use capture::{CapturedKinematic, CapturedKinematics, CapturedRigidBodies, CapturedRigidBodyState};

pub mod pair_stream;
pub use pair_stream::{Pair, PairData, PairStream, PairTarget};

pub mod constraint;
pub mod pair_finder;
pub mod solver;
pub mod stabilizer;

pub mod integrator;

#[cfg(test)]
mod tests;

use settings::PhysicsSettings;

//

/// Velocity of an object.
///
// Equivalent to a 6D vector but with names for the translational and rotational part.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocity {
    /// Linear velocity in metres per second.
    pub linear: Vec3,
    /// Angular velocity in radians per second around world axes.
    pub angular: Vec3,
}

impl Velocity {
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    /// Get the linear velocity of a point offset from the center of mass.
    #[inline]
    pub fn point_velocity(&self, offset: Vec3) -> Vec3 {
        self.linear + self.angular.cross(offset)
    }

    /// Move a pose as if this velocity was held for `dt` seconds.
    pub fn apply_to_pose(&self, dt: f64, mut pose: Pose) -> Pose {
        pose.translation += self.linear * dt;
        pose.rotation = (m::rotor_from_scaled_axis(self.angular * dt) * pose.rotation).normalized();
        pose
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            linear: self.linear + other.linear,
            angular: self.angular + other.angular,
        }
    }
}
impl std::ops::AddAssign for Velocity {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}
impl std::ops::Sub for Velocity {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            linear: self.linear - other.linear,
            angular: self.angular - other.angular,
        }
    }
}
impl std::ops::Mul<f64> for Velocity {
    type Output = Velocity;

    fn mul(self, rhs: f64) -> Self::Output {
        Velocity {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

/// Errors that stop a tick from running at all.
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("Timestep must be finite and positive, got {0}")]
    InvalidTimestep(f64),
}

/// What a dynamic body touched during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactOther {
    Body(hecs::Entity),
    Kinematic(hecs::Entity),
    Environment(hecs::Entity),
}

/// A contact that pushed on a dynamic body during a tick.
#[derive(Clone, Copy, Debug)]
pub struct ContactEvent {
    /// The dynamic body the contact acted on.
    pub entity: hecs::Entity,
    pub other: ContactOther,
    /// Impulse-weighted average of the contact points.
    pub point: Vec3,
    /// Contact normal pointing from `other` towards `entity`.
    pub normal: Vec3,
    /// Total normal impulse applied to `entity` over the tick.
    pub impulse: f64,
}

/// Summary of a completed tick.
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    pub num_bodies: usize,
    pub num_kinematics: usize,
    pub num_environment_colliders: usize,
    /// Contact and lock pairs that went through the solver.
    pub num_pairs: usize,
    pub contact_events: Vec<ContactEvent>,
}

/// The rigid body pipeline. Holds configuration; all per-frame data is rebuilt every tick.
#[derive(Clone, Debug, Default)]
pub struct Physics {
    settings: PhysicsSettings,
}

impl Physics {
    /// Create a pipeline with the given settings, clamping invalid values.
    pub fn new(settings: PhysicsSettings) -> Self {
        Self {
            settings: settings.sanitized(),
        }
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PhysicsSettings) {
        self.settings = settings.sanitized();
    }

    /// Detect collisions, solve contacts and locks and move bodies by `dt` seconds.
    ///
    /// If `dt` is invalid the world is left untouched.
    pub fn tick(&mut self, world: &mut hecs::World, dt: f64) -> Result<StepReport, PhysicsError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::InvalidTimestep(dt));
        }
        let _span = tracy_span!("physics tick", "tick");
        let settings = &self.settings;

        let environment = capture::build_environment_layer(world, settings);
        let (kinematic_layer, kinematics) = capture::build_kinematic_layer(world, settings, dt);
        let (body_layer, mut bodies, lock_stream) = capture::build_rigid_body_layer(world, settings, dt);

        let ((env_stream, kin_stream), body_stream) = join(
            || {
                join(
                    || pair_finder::find_environment_pairs(&body_layer, &bodies, &environment, dt),
                    || {
                        pair_finder::find_kinematic_pairs(
                            &body_layer,
                            &bodies,
                            &kinematic_layer,
                            &kinematics,
                            dt,
                        )
                    },
                )
            },
            || pair_finder::find_body_pairs(&body_layer, &bodies, dt),
        );

        let mut stream = pair_stream::combine_streams(env_stream, kin_stream, body_stream, lock_stream);

        solver::solve(
            &mut bodies.states,
            body_layer.bucket_ranges(),
            &mut stream,
            &kinematics.kinematics,
            settings,
            dt,
        );
        let contact_events =
            solver::contact_events(&stream, &bodies.states, &kinematics.kinematics, &environment);

        integrator::integrate(world, &bodies, settings, dt);

        let report = StepReport {
            num_bodies: bodies.states.len(),
            num_kinematics: kinematics.kinematics.len(),
            num_environment_colliders: environment.len(),
            num_pairs: stream.len(),
            contact_events,
        };
        log::debug!(
            "Physics tick: {} bodies, {} kinematics, {} environment colliders, {} pairs, {} contact events",
            report.num_bodies,
            report.num_kinematics,
            report.num_environment_colliders,
            report.num_pairs,
            report.contact_events.len(),
        );
        Ok(report)
    }
}

/// Run two closures, in parallel if the `parallel` feature is enabled.
pub(crate) fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    #[cfg(feature = "parallel")]
    {
        rayon::join(a, b)
    }
    #[cfg(not(feature = "parallel"))]
    {
        (a(), b())
    }
}
