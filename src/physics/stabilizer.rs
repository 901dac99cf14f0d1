//! Heuristics that calm down bodies in stacks and piles.
//!
//! Plain sequential impulses jitter when a body is squeezed between several heavy neighbours.
//! After every solver iteration each body is inspected. Bodies resting on something
//! significant have near-resting velocities clipped to zero, and bodies pressed against
//! several significant neighbours also get a reduced angular response for the following iterations.

use super::{capture::CapturedRigidBodyState, Velocity};
use crate::math::Vec3;

/// A neighbour counts as significant if it's at least this heavy relative to the body.
pub const SIGNIFICANT_MASS_RATIO: f64 = 0.2;
/// How much each significant contact beyond the first scales down angular response.
pub const DEFAULT_INERTIA_SCALING_FACTOR: f64 = 0.5;
/// Velocities below this multiple of one step of gravity are clipped for resting bodies.
pub const DEFAULT_VELOCITY_CLIPPING_FACTOR: f64 = 1.0;
/// Fraction of the remaining inertia scaling kept after each later iteration.
pub const INERTIA_SCALE_DECAY: f64 = 0.5;

/// Per-body state of the stabilizer during one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionStabilizer {
    /// Multiplier on the inverse inertia while solving. 1 means no stabilization.
    pub inverse_inertia_scale: f64,
}

impl Default for MotionStabilizer {
    fn default() -> Self {
        Self {
            inverse_inertia_scale: 1.0,
        }
    }
}

/// Whether a body in contact with something of `other_inverse_mass` should count it
/// towards the stabilizer's contact count. Static and kinematic things always count.
#[inline]
pub fn is_significant(inverse_mass: f64, other_inverse_mass: f64) -> bool {
    other_inverse_mass * SIGNIFICANT_MASS_RATIO <= inverse_mass
}

/// Tunables of [`update_after_iteration`].
#[derive(Clone, Copy, Debug)]
pub struct StabilizerSettings {
    pub velocity_clipping_factor: f64,
    pub inertia_scaling_factor: f64,
}

impl Default for StabilizerSettings {
    fn default() -> Self {
        Self {
            velocity_clipping_factor: DEFAULT_VELOCITY_CLIPPING_FACTOR,
            inertia_scaling_factor: DEFAULT_INERTIA_SCALING_FACTOR,
        }
    }
}

/// Adjust a body after a solver iteration.
///
/// Only bodies with at least one significant contact are affected.
/// On the first iteration the inertia scale is seeded from the number of
/// significant contacts counted during that iteration, which leaves it at 1 for a single contact.
/// Later iterations let it relax back towards 1 so the final passes solve accurately.
pub fn update_after_iteration(
    stabilizer: &mut MotionStabilizer,
    velocity: &mut Velocity,
    inverse_mass: f64,
    angular_expansion: f64,
    num_significant_contacts: u32,
    gravity_step: Vec3,
    settings: &StabilizerSettings,
    first_iteration: bool,
) {
    if num_significant_contacts == 0 || inverse_mass == 0.0 {
        return;
    }

    let threshold = settings.velocity_clipping_factor * gravity_step.mag();
    let linear_resting = velocity.linear.mag_sq() < threshold * threshold;
    let angular_resting = velocity.angular.mag() * angular_expansion < threshold;
    if linear_resting && angular_resting {
        *velocity = Velocity::default();
    }

    if first_iteration {
        let extra_contacts = (num_significant_contacts - 1) as f64;
        stabilizer.inverse_inertia_scale = 1.0 / (1.0 + settings.inertia_scaling_factor * extra_contacts);
    } else {
        let remaining = 1.0 - stabilizer.inverse_inertia_scale;
        stabilizer.inverse_inertia_scale = 1.0 - remaining * INERTIA_SCALE_DECAY;
    }
}

/// Run [`update_after_iteration`] on every captured body.
pub fn stabilize_bodies(states: &mut [CapturedRigidBodyState], dt: f64, first_iteration: bool) {
    let _span = tracy_span!("stabilize bodies", "stabilize_bodies");

    let settings = StabilizerSettings::default();
    let stabilize = |state: &mut CapturedRigidBodyState| {
        update_after_iteration(
            &mut state.motion_stabilizer,
            &mut state.velocity,
            state.inverse_mass,
            state.angular_expansion,
            state.num_significant_contacts,
            state.gravity * dt,
            &settings,
            first_iteration,
        );
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        states.par_iter_mut().for_each(stabilize);
    }
    #[cfg(not(feature = "parallel"))]
    states.iter_mut().for_each(stabilize);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gravity_step() -> Vec3 {
        Vec3::new(0.0, -9.81 / 60.0, 0.0)
    }

    #[test]
    fn significance() {
        assert!(is_significant(1.0, 0.0));
        assert!(is_significant(1.0, 1.0));
        assert!(is_significant(1.0, 4.0));
        assert!(!is_significant(1.0, 10.0));
        assert!(!is_significant(0.0, 1.0));
    }

    #[test]
    fn bodies_without_contacts_are_untouched() {
        let mut stab = MotionStabilizer::default();
        let mut vel = Velocity::new(Vec3::new(0.01, 0.0, 0.0), Vec3::zero());
        let before = vel;
        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 0, gravity_step(), &StabilizerSettings::default(), true);
        assert_eq!(vel, before);
        assert_eq!(stab, MotionStabilizer::default());
    }

    #[test]
    fn single_contact_clips_without_scaling_inertia() {
        let settings = StabilizerSettings::default();
        let mut stab = MotionStabilizer::default();
        let mut vel = Velocity::new(Vec3::new(0.001, 0.0, -0.002), Vec3::new(0.0, 0.0, 0.01));
        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 1, gravity_step(), &settings, true);
        assert_eq!(vel, Velocity::default());
        assert_eq!(stab, MotionStabilizer::default());

        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 1, gravity_step(), &settings, false);
        assert_eq!(stab, MotionStabilizer::default());
    }

    #[test]
    fn stacked_bodies_are_seeded_then_relax() {
        let settings = StabilizerSettings::default();
        let mut stab = MotionStabilizer::default();
        let mut vel = Velocity::new(Vec3::new(1.0, 0.0, 0.0), Vec3::zero());

        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 3, gravity_step(), &settings, true);
        assert!((stab.inverse_inertia_scale - 0.5).abs() < 1e-12);
        // moving too fast to be clipped
        assert_eq!(vel.linear.x, 1.0);

        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 3, gravity_step(), &settings, false);
        assert!((stab.inverse_inertia_scale - 0.75).abs() < 1e-12);
    }

    #[test]
    fn resting_velocity_is_clipped() {
        let mut stab = MotionStabilizer::default();
        let mut vel = Velocity::new(Vec3::new(0.0, -0.05, 0.01), Vec3::new(0.1, 0.0, 0.0));
        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 2, gravity_step(), &StabilizerSettings::default(), true);
        assert_eq!(vel, Velocity::default());
        // no zero gravity clipping
        let mut vel = Velocity::new(Vec3::new(0.0, -0.05, 0.0), Vec3::zero());
        update_after_iteration(&mut stab, &mut vel, 1.0, 0.5, 2, Vec3::zero(), &StabilizerSettings::default(), true);
        assert_eq!(vel.linear.y, -0.05);
    }
}
