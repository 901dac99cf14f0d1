use super::Aabb;
use crate::{
    math::{self as m, Mat3, Vec3},
    physics::body::WorldTransform,
};
use std::f64::consts::PI;

/// A component that allows an entity to collide with others.
/// Note that a [`WorldTransform`] component must also be present.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Collider {
    pub shape: ColliderShape,
}

/// The physical shape of a collider, in the local space of its entity.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum ColliderShape {
    Sphere { center: Vec3, radius: f64 },
    /// All points within `radius` of the segment from `a` to `b`.
    Capsule { a: Vec3, b: Vec3, radius: f64 },
    /// The box stores its side lengths halved because this makes
    /// intersection tests easier.
    Box { center: Vec3, half_extents: Vec3 },
}

/// Mass distribution of a collider per unit of mass, in the collider's local space.
#[derive(Clone, Copy, Debug)]
pub struct MassProperties {
    pub center_of_mass: Vec3,
    pub inertia_per_unit_mass: Mat3,
    /// How far surface points can move per radian of rotation
    /// beyond what a rotation-free bound already covers.
    pub angular_expansion_factor: f64,
}

impl Collider {
    /// Create a sphere collider centered on the entity.
    pub fn new_sphere(radius: f64) -> Self {
        Collider {
            shape: ColliderShape::Sphere {
                center: Vec3::zero(),
                radius,
            },
        }
    }

    /// Create a capsule collider along the local y axis.
    /// `half_height` is the distance from the centre to either hemisphere's centre.
    pub fn new_capsule(half_height: f64, radius: f64) -> Self {
        Collider {
            shape: ColliderShape::Capsule {
                a: Vec3::new(0.0, -half_height, 0.0),
                b: Vec3::new(0.0, half_height, 0.0),
                radius,
            },
        }
    }

    /// Create a box collider from its full side lengths.
    pub fn new_box(size: Vec3) -> Self {
        Collider {
            shape: ColliderShape::Box {
                center: Vec3::zero(),
                half_extents: size * 0.5,
            },
        }
    }

    /// Create a cube collider with all sides set to the same length.
    pub fn new_cube(side_length: f64) -> Self {
        Collider::new_box(Vec3::broadcast(side_length))
    }

    pub fn shape(&self) -> &ColliderShape {
        &self.shape
    }

    /// Mass properties of the collider after applying a uniform scale.
    pub fn mass_properties(&self, scale: f64) -> MassProperties {
        // from https://en.wikipedia.org/wiki/List_of_moments_of_inertia
        match self.shape {
            ColliderShape::Sphere { center, radius } => {
                let r = radius * scale;
                MassProperties {
                    center_of_mass: center * scale,
                    inertia_per_unit_mass: m::mat3_diagonal(Vec3::broadcast(0.4 * r * r)),
                    angular_expansion_factor: 0.0,
                }
            }
            ColliderShape::Capsule { a, b, radius } => {
                let (a, b, r) = (a * scale, b * scale, radius * scale);
                let axis = b - a;
                let h = axis.mag();
                let dir = if h > 1e-12 {
                    axis / h
                } else {
                    Vec3::unit_y()
                };

                let cylinder_vol = PI * r * r * h;
                let caps_vol = 4.0 / 3.0 * PI * r * r * r;
                let total_vol = cylinder_vol + caps_vol;
                let (cyl, caps) = if total_vol > 0.0 {
                    (cylinder_vol / total_vol, caps_vol / total_vol)
                } else {
                    (0.0, 1.0)
                };
                let along = cyl * r * r / 2.0 + caps * 0.4 * r * r;
                let across = cyl * (r * r / 4.0 + h * h / 12.0)
                    + caps * (0.4 * r * r + h * h / 4.0 + 3.0 * h * r / 8.0);

                // across * I + (along - across) * dir dirᵀ
                let diff = along - across;
                let col = |j: usize| dir * (m::component(dir, j) * diff) + m::unit_axis(j) * across;
                MassProperties {
                    center_of_mass: (a + b) * 0.5,
                    inertia_per_unit_mass: Mat3::new(col(0), col(1), col(2)),
                    angular_expansion_factor: h * 0.5,
                }
            }
            ColliderShape::Box {
                center,
                half_extents,
            } => {
                let h = half_extents * scale;
                let sq = Vec3::new(h.x * h.x, h.y * h.y, h.z * h.z);
                MassProperties {
                    center_of_mass: center * scale,
                    inertia_per_unit_mass: m::mat3_diagonal(
                        Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) / 3.0,
                    ),
                    angular_expansion_factor: h.mag() - h.component_min(),
                }
            }
        }
    }

    /// The collider placed in the world by a transform.
    pub fn world_shape(&self, transform: &WorldTransform) -> WorldShape {
        let s = transform.scale;
        let to_world = |p: Vec3| m::transform_point(&transform.pose, p * s);
        match self.shape {
            ColliderShape::Sphere { center, radius } => WorldShape::Sphere {
                center: to_world(center),
                radius: radius * s,
            },
            ColliderShape::Capsule { a, b, radius } => WorldShape::Capsule {
                a: to_world(a),
                b: to_world(b),
                radius: radius * s,
            },
            ColliderShape::Box {
                center,
                half_extents,
            } => {
                let rot = transform.pose.rotation;
                WorldShape::Box(OrientedBox {
                    center: to_world(center),
                    axes: [
                        rot * Vec3::unit_x(),
                        rot * Vec3::unit_y(),
                        rot * Vec3::unit_z(),
                    ],
                    half_extents: half_extents * s,
                })
            }
        }
    }
}

/// A collider shape in world space, ready for collision tests.
#[derive(Clone, Copy, Debug)]
pub enum WorldShape {
    Sphere {
        center: Vec3,
        radius: f64,
    },
    Capsule {
        a: Vec3,
        b: Vec3,
        radius: f64,
    },
    Box(OrientedBox),
}

/// A box with arbitrary orientation.
#[derive(Clone, Copy, Debug)]
pub struct OrientedBox {
    pub center: Vec3,
    /// Unit vectors of the box's local frame.
    pub axes: [Vec3; 3],
    pub half_extents: Vec3,
}

impl OrientedBox {
    /// Coordinates of a world point in the box's frame.
    #[inline]
    pub fn to_local(&self, p: Vec3) -> Vec3 {
        let offset = p - self.center;
        Vec3::new(
            offset.dot(self.axes[0]),
            offset.dot(self.axes[1]),
            offset.dot(self.axes[2]),
        )
    }

    #[inline]
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.center
            + self.axes[0] * local.x
            + self.axes[1] * local.y
            + self.axes[2] * local.z
    }

    /// Projected radius of the box onto a direction.
    #[inline]
    pub fn projected_radius(&self, dir: Vec3) -> f64 {
        self.half_extents.x * self.axes[0].dot(dir).abs()
            + self.half_extents.y * self.axes[1].dot(dir).abs()
            + self.half_extents.z * self.axes[2].dot(dir).abs()
    }

    /// The vertex furthest in a direction.
    #[inline]
    pub fn support(&self, dir: Vec3) -> Vec3 {
        let sign = |i: usize| if self.axes[i].dot(dir) >= 0.0 { 1.0 } else { -1.0 };
        self.to_world(Vec3::new(
            self.half_extents.x * sign(0),
            self.half_extents.y * sign(1),
            self.half_extents.z * sign(2),
        ))
    }
}

impl WorldShape {
    pub fn aabb(&self) -> Aabb {
        match *self {
            WorldShape::Sphere { center, radius } => {
                Aabb::from_center_extents(center, Vec3::broadcast(radius))
            }
            WorldShape::Capsule { a, b, radius } => Aabb {
                min: a.min_by_component(b),
                max: a.max_by_component(b),
            }
            .padded(radius),
            WorldShape::Box(obb) => {
                let h = obb.half_extents;
                let extents =
                    obb.axes[0].abs() * h.x + obb.axes[1].abs() * h.y + obb.axes[2].abs() * h.z;
                Aabb::from_center_extents(obb.center, extents)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Angle, PoseBuilder};

    #[test]
    fn rotated_box_aabb() {
        let coll = Collider::new_box(Vec3::new(2.0, 2.0, 4.0));
        let tr = WorldTransform::new(
            PoseBuilder::new()
                .with_position([1.0, 0.0, 0.0])
                .with_rotation([0.0, 0.0, 1.0], Angle::Deg(45.0)),
        );
        let aabb = coll.world_shape(&tr).aabb();
        let diag = 2.0_f64.sqrt();
        assert!((aabb.max.x - (1.0 + diag)).abs() < 1e-9);
        assert!((aabb.min.y + diag).abs() < 1e-9);
        assert!((aabb.max.z - 2.0).abs() < 1e-9);
    }

    #[test]
    fn scaled_sphere() {
        let coll = Collider::new_sphere(0.5);
        let tr = WorldTransform::default().with_scale(2.0);
        let props = coll.mass_properties(tr.scale);
        assert!((props.inertia_per_unit_mass.cols[0].x - 0.4).abs() < 1e-12);
        assert_eq!(props.angular_expansion_factor, 0.0);
        match coll.world_shape(&tr) {
            WorldShape::Sphere { radius, .. } => assert_eq!(radius, 1.0),
            other => panic!("Expected a sphere, got {other:?}"),
        }
    }

    #[test]
    fn capsule_inertia_is_symmetric_around_axis() {
        let props = Collider::new_capsule(1.0, 0.5).mass_properties(1.0);
        let i = props.inertia_per_unit_mass;
        // axis is y, so x and z moments match and y is the smallest
        assert!((i.cols[0].x - i.cols[2].z).abs() < 1e-12);
        assert!(i.cols[1].y < i.cols[0].x);
        assert!(i.cols[0].y.abs() < 1e-12);
        assert_eq!(props.angular_expansion_factor, 1.0);
    }
}
