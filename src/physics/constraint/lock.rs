//! Constraints that lock a body's motion along or around world axes.
//!
//! Locks act as very stiff springs anchored at the body's pose at the start of the tick.
//! The spring is expressed as `tau` (fraction of position error corrected per step)
//! and `damping` (fraction of velocity error removed per solver iteration),
//! chosen so that a fixed number of Gauss-Seidel iterations behaves
//! like an implicitly integrated damped spring.

use super::SolverBody;
use crate::math::{self as m, Mat3, Vec3};
use std::f64::consts::PI;

/// Spring parameters of a lock in solver terms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StiffSpring {
    pub tau: f64,
    pub damping: f64,
}

impl StiffSpring {
    /// Frequency in oscillations per second of the springs used for locks.
    pub const STIFF_FREQUENCY: f64 = 74341.31;
    pub const STIFF_DAMPING_RATIO: f64 = 2530.126;

    /// Match `iterations` solver passes to an implicit Euler step of a damped spring.
    ///
    /// With `a = 1 - damping`, `n` iterations of a constraint with error `x` give
    /// `v_n = a^n v_0 - (a^(n-1) + ... + a + 1)(tau / h) x`,
    /// while the spring gives `v' = v / (1 + h²ω² + 2hζω) - h ω² x / (1 + h²ω² + 2hζω)`.
    /// Equating coefficients yields both values.
    pub fn new(frequency: f64, damping_ratio: f64, dt: f64, iterations: u32) -> Self {
        let iterations = iterations.max(1);
        let omega = frequency * 2.0 * PI;
        let hw = dt * omega;
        let hhww = hw * hw;

        let a_exp = 1.0 / (1.0 + hhww + 2.0 * hw * damping_ratio);
        let a = a_exp.powf(1.0 / iterations as f64);
        let a_sum = (1..iterations).fold(1.0, |sum, _| a * sum + 1.0);

        Self {
            tau: hhww * a_exp / a_sum,
            damping: 1.0 - a,
        }
    }

    /// The spring used for axis locks.
    pub fn stiff(dt: f64, iterations: u32) -> Self {
        Self::new(Self::STIFF_FREQUENCY, Self::STIFF_DAMPING_RATIO, dt, iterations)
    }

    /// Amount of error to remove this iteration, given the error predicted at the end of the step
    /// and the error the constraint had at the start.
    #[inline]
    pub fn correction(&self, predicted_error: f64, initial_error: f64) -> f64 {
        (predicted_error - initial_error) * self.damping + initial_error * self.tau
    }
}

/// Locks the centre of mass along up to three world axes.
#[derive(Clone, Copy, Debug)]
pub struct PositionLockJacobian {
    pub axes: [bool; 3],
    /// Offset of the centre of mass from the anchor at the start of the step.
    pub initial_error: Vec3,
    pub spring: StiffSpring,
    pub dt: f64,
}

impl PositionLockJacobian {
    /// Lock the given axes at the body's current position.
    pub fn new(axes: [bool; 3], spring: StiffSpring, dt: f64) -> Self {
        Self {
            axes,
            initial_error: Vec3::zero(),
            spring,
            dt,
        }
    }

    pub fn solve(&self, a: &mut SolverBody) {
        if a.inverse_mass <= 0.0 {
            return;
        }
        for (axis, _) in self.axes.iter().enumerate().filter(|(_, locked)| **locked) {
            let initial = m::component(self.initial_error, axis);
            let predicted = initial + m::component(a.velocity.linear, axis) * self.dt;
            let correction = self.spring.correction(predicted, initial) / self.dt;
            // effective mass along a world axis is just the mass,
            // so the impulse times the inverse mass is the correction itself
            a.velocity.linear -= m::unit_axis(axis) * correction;
        }
    }
}

// For rotation locks the effective mass matrix K is the block of I⁻¹
// belonging to the locked axes, and the impulse λ = K⁻¹ Δω changes the body's
// angular velocity by I⁻¹ λ.

fn single_axis_velocity_change(inverse_inertia: &Mat3, axis: usize, rhs: f64) -> Option<Vec3> {
    let col = inverse_inertia.cols[axis];
    let k = m::component(col, axis);
    if k.abs() < 1e-12 {
        return None;
    }
    Some(col * (rhs / k))
}

fn two_axis_velocity_change(inverse_inertia: &Mat3, axes: [usize; 2], rhs: [f64; 2]) -> Option<Vec3> {
    let cols = axes.map(|axis| inverse_inertia.cols[axis]);
    let k = |i: usize, j: usize| m::component(cols[j], axes[i]);
    let det = k(0, 0) * k(1, 1) - k(0, 1) * k(1, 0);
    if det.abs() < 1e-24 {
        return None;
    }
    let l0 = (k(1, 1) * rhs[0] - k(0, 1) * rhs[1]) / det;
    let l1 = (k(0, 0) * rhs[1] - k(1, 0) * rhs[0]) / det;
    Some(cols[0] * l0 + cols[1] * l1)
}

/// Locks rotation around a single world axis.
#[derive(Clone, Copy, Debug)]
pub struct RotationLock1Jacobian {
    pub locked_axis: usize,
    pub inverse_inertia: Mat3,
    pub spring: StiffSpring,
    pub dt: f64,
}

impl RotationLock1Jacobian {
    pub fn solve(&self, a: &mut SolverBody) {
        let axis = self.locked_axis;
        let predicted = m::component(a.velocity.angular, axis) * self.dt;
        let rhs = -self.spring.correction(predicted, 0.0) / self.dt;
        if let Some(dw) = single_axis_velocity_change(&self.inverse_inertia, axis, rhs) {
            a.velocity.angular += dw;
        }
    }
}

/// Locks rotation around two world axes, leaving the third free.
#[derive(Clone, Copy, Debug)]
pub struct RotationLock2Jacobian {
    pub free_axis: usize,
    pub inverse_inertia: Mat3,
    pub spring: StiffSpring,
    pub dt: f64,
}

impl RotationLock2Jacobian {
    /// The two axes this constraint holds still.
    pub fn locked_axes(&self) -> [usize; 2] {
        [(self.free_axis + 1) % 3, (self.free_axis + 2) % 3]
    }

    pub fn solve(&self, a: &mut SolverBody) {
        let axes = self.locked_axes();
        let rhs = axes.map(|axis| {
            let predicted = m::component(a.velocity.angular, axis) * self.dt;
            -self.spring.correction(predicted, 0.0) / self.dt
        });
        if let Some(dw) = two_axis_velocity_change(&self.inverse_inertia, axes, rhs) {
            a.velocity.angular += dw;
        }
    }
}

/// Locks rotation around all three world axes.
#[derive(Clone, Copy, Debug)]
pub struct RotationLock3Jacobian {
    pub inverse_inertia: Mat3,
    pub spring: StiffSpring,
    pub dt: f64,
}

impl RotationLock3Jacobian {
    pub fn solve(&self, a: &mut SolverBody) {
        // with every axis locked K is the whole inverse inertia and cancels out,
        // unless the body can't rotate in the first place
        if self.inverse_inertia.determinant().abs() < 1e-30 {
            return;
        }
        let predicted = a.velocity.angular * self.dt;
        let correction = Vec3::new(
            self.spring.correction(predicted.x, 0.0),
            self.spring.correction(predicted.y, 0.0),
            self.spring.correction(predicted.z, 0.0),
        );
        a.velocity.angular -= correction / self.dt;
    }
}
