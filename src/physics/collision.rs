//! Collision detection: collider shapes, the bucketed broad phase and contact generation.

use crate::math::{self as m, Vec3};

mod collider;
pub use collider::{Collider, ColliderShape, MassProperties, OrientedBox, WorldShape};

pub mod layer;
pub use layer::{BucketCalculator, CollisionLayer, LayerBody};

pub mod distance;
pub use distance::{distance_between, DistanceResult};

pub mod manifold;
pub use manifold::{contacts_between, ContactManifold, ContactOnB};

use super::Velocity;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// The smallest AABB containing all the given points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut iter = points.into_iter();
        let first = iter.next().unwrap_or_else(Vec3::zero);
        iter.fold(Self::from_center_extents(first, Vec3::zero()), |acc, p| {
            Self {
                min: acc.min.min_by_component(p),
                max: acc.max.max_by_component(p),
            }
        })
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[inline]
    pub fn padded(&self, amount: f64) -> Self {
        Self {
            min: self.min - Vec3::broadcast(amount),
            max: self.max + Vec3::broadcast(amount),
        }
    }

    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// Check for overlap on all three axes. Touching counts as overlapping.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        m::is_finite(self.min) && m::is_finite(self.max)
    }
}

/// How far a body's surface can move during one tick.
///
/// `linear` is the full displacement of the centre of mass,
/// `uniform` covers the extra travel of surface points caused by rotation.
#[derive(Clone, Copy, Debug, Default)]
pub struct MotionExpansion {
    pub linear: Vec3,
    pub uniform: f64,
}

impl MotionExpansion {
    pub fn new(velocity: &Velocity, dt: f64, angular_expansion_factor: f64) -> Self {
        Self {
            linear: velocity.linear * dt,
            uniform: velocity.angular.mag() * dt * angular_expansion_factor,
        }
    }

    /// Grow an AABB so that it contains every position the body can reach this tick.
    pub fn expand_aabb(&self, aabb: Aabb) -> Aabb {
        let lin_min = self.linear.min_by_component(Vec3::zero());
        let lin_max = self.linear.max_by_component(Vec3::zero());
        let uniform = Vec3::broadcast(self.uniform);
        Aabb {
            min: aabb.min + lin_min - uniform,
            max: aabb.max + lin_max + uniform,
        }
    }

    /// Largest separation at which contacts against something static still matter.
    #[inline]
    pub fn max_distance(&self) -> f64 {
        self.linear.mag() + self.uniform
    }

    /// Largest separation at which two moving bodies can still touch this tick.
    #[inline]
    pub fn max_distance_between(a: &Self, b: &Self) -> f64 {
        (a.linear - b.linear).mag() + a.uniform + b.uniform
    }
}
