//! Components read and written by the physics pipeline.

use super::Velocity;
use crate::math::{Pose, Vec3};

/// The externally visible transform of an entity.
///
/// Physics works on poses without scaling, so the scale only affects collider geometry.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldTransform {
    #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_pose"))]
    pub pose: Pose,
    pub scale: f64,
}

impl Default for WorldTransform {
    fn default() -> Self {
        Self {
            pose: Pose::identity(),
            scale: 1.0,
        }
    }
}

impl WorldTransform {
    pub fn new(pose: impl Into<Pose>) -> Self {
        Self {
            pose: pose.into(),
            scale: 1.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.pose.translation
    }
}

/// The transform an entity had on the previous frame.
///
/// Kinematic bodies need this to have a velocity.
/// The pipeline overwrites it with the current transform at the end of every tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreviousTransform(pub WorldTransform);

/// Marks a collider as static level geometry.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvironmentCollisionTag;

/// Marks a collider as moved by something other than physics.
#[derive(Clone, Copy, Debug, Default)]
pub struct KinematicCollisionTag;

/// Mass of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    /// Zero, negative or non-finite masses are treated as infinite.
    #[inline]
    fn from(mass: f64) -> Self {
        if mass > 0.0 && mass.is_finite() {
            Mass::Finite {
                mass,
                inverse: 1.0 / mass,
            }
        } else {
            Mass::Infinite
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }
}

/// A dynamic body simulated by the solver.
/// Needs a [`WorldTransform`] and a [`Collider`][crate::Collider] alongside it.
#[derive(Clone, Copy, Debug)]
pub struct RigidBody {
    pub velocity: Velocity,
    pub mass: Mass,
    pub coefficient_of_friction: f64,
    pub coefficient_of_restitution: f64,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RigidBody {
    pub const DEFAULT_FRICTION: f64 = 0.3;
    pub const DEFAULT_RESTITUTION: f64 = 0.3;

    pub fn new(mass: f64) -> Self {
        Self {
            velocity: Velocity::default(),
            mass: Mass::from(mass),
            coefficient_of_friction: Self::DEFAULT_FRICTION,
            coefficient_of_restitution: Self::DEFAULT_RESTITUTION,
        }
    }

    /// Set the velocity of the body in a builder-like chain.
    pub fn with_velocity(mut self, vel: Velocity) -> Self {
        self.velocity = vel;
        self
    }

    pub fn with_friction(mut self, coef: f64) -> Self {
        self.coefficient_of_friction = coef.max(0.0);
        self
    }

    pub fn with_restitution(mut self, coef: f64) -> Self {
        self.coefficient_of_restitution = coef.clamp(0.0, 1.0);
        self
    }
}

/// An impulse waiting to be applied to a body on the next tick.
#[derive(Clone, Copy, Debug)]
pub enum AddImpulse {
    /// Uniform impulse acting on the whole body, like wind. Never causes rotation.
    Field(Vec3),
    /// Impulse applied at a point in world space.
    Point { point: Vec3, impulse: Vec3 },
}

/// Queue of impulses for a body. Emptied every tick.
#[derive(Clone, Debug, Default)]
pub struct ImpulseBuffer(pub Vec<AddImpulse>);

impl ImpulseBuffer {
    pub fn push_field(&mut self, impulse: Vec3) {
        self.0.push(AddImpulse::Field(impulse));
    }

    pub fn push_point(&mut self, point: Vec3, impulse: Vec3) {
        self.0.push(AddImpulse::Point { point, impulse });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Locks motion of a body along or around world axes.
///
/// Bits 0 to 2 lock position along x, y and z, bits 3 to 5 lock rotation around them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct LockWorldAxes {
    pub packed: u8,
}

impl LockWorldAxes {
    pub const POSITION_X: u8 = 1 << 0;
    pub const POSITION_Y: u8 = 1 << 1;
    pub const POSITION_Z: u8 = 1 << 2;
    pub const ROTATION_X: u8 = 1 << 3;
    pub const ROTATION_Y: u8 = 1 << 4;
    pub const ROTATION_Z: u8 = 1 << 5;

    pub const ALL_POSITIONS: u8 = 0b000111;
    pub const ALL_ROTATIONS: u8 = 0b111000;

    pub const fn new(packed: u8) -> Self {
        Self {
            packed: packed & (Self::ALL_POSITIONS | Self::ALL_ROTATIONS),
        }
    }

    /// Position bits in the low three bits.
    #[inline]
    pub fn positions(&self) -> u8 {
        self.packed & Self::ALL_POSITIONS
    }

    /// Rotation bits shifted down into the low three bits.
    #[inline]
    pub fn rotations(&self) -> u8 {
        (self.packed & Self::ALL_ROTATIONS) >> 3
    }

    #[inline]
    pub fn position_locked(&self, axis: usize) -> bool {
        self.positions() & (1 << axis) != 0
    }

    #[inline]
    pub fn rotation_locked(&self, axis: usize) -> bool {
        self.rotations() & (1 << axis) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packed == 0
    }
}
