//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// Inertial poses used by the solver are always Poses.
/// Scaling only exists on the host-facing [`WorldTransform`][crate::WorldTransform].
pub type Pose = uv::DIsometry3;
pub type Vec3 = uv::DVec3;
pub type Rotor3 = uv::DRotor3;
pub type Mat3 = uv::DMat3;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<f64> for Angle {
    fn from(deg: f64) -> Self {
        Angle::Deg(deg)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug)]
pub struct Unit<T>(T);

impl Unit<Vec3> {
    pub fn new_normalize(v: Vec3) -> Self {
        Unit(v.normalized())
    }

    /// Normalize if the vector has a usable length, otherwise return `fallback`.
    pub fn try_new_normalize(v: Vec3, fallback: Self) -> Self {
        let mag_sq = v.mag_sq();
        if mag_sq > 1e-24 && mag_sq.is_finite() {
            Unit(v / mag_sq.sqrt())
        } else {
            fallback
        }
    }

    pub const fn new_unchecked(v: Vec3) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec3::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec3::unit_y())
    }

    pub fn unit_z() -> Self {
        Unit(Vec3::unit_z())
    }

    #[inline]
    pub fn into_inner(self) -> Vec3 {
        self.0
    }
}

impl std::ops::Mul<Unit<Vec3>> for Rotor3 {
    type Output = Unit<Vec3>;

    fn mul(self, rhs: Unit<Vec3>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

/// A builder to create [`Pose`][self::Pose]s.
///
/// Rotation is given as an axis and an angle around it.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PoseBuilder {
    position: [f64; 3],
    axis: [f64; 3],
    rotation: Angle,
}
impl PoseBuilder {
    pub fn new() -> Self {
        PoseBuilder {
            position: [0.0; 3],
            axis: [0.0, 0.0, 1.0],
            rotation: Angle::default(),
        }
    }
    #[inline]
    pub fn with_position(mut self, pos: impl Into<[f64; 3]>) -> Self {
        self.position = pos.into();
        self
    }
    #[inline]
    pub fn with_rotation(mut self, axis: impl Into<[f64; 3]>, angle: Angle) -> Self {
        self.axis = axis.into();
        self.rotation = angle;
        self
    }
    #[inline]
    pub fn build(self) -> Pose {
        let axis = Unit::try_new_normalize(Vec3::from(self.axis), Unit::unit_z());
        Pose::new(
            Vec3::from(self.position),
            rotor_from_axis_angle(axis, self.rotation.rad()),
        )
    }
}
impl Default for PoseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl From<PoseBuilder> for Pose {
    fn from(iso: PoseBuilder) -> Pose {
        iso.build()
    }
}
impl From<[f64; 3]> for PoseBuilder {
    fn from(vec: [f64; 3]) -> Self {
        PoseBuilder::new().with_position(vec)
    }
}
impl From<Vec3> for PoseBuilder {
    fn from(vec: Vec3) -> Self {
        PoseBuilder::new().with_position(vec)
    }
}
impl From<Pose> for PoseBuilder {
    fn from(pose: Pose) -> Self {
        let scaled_axis = scaled_axis_from_rotor(pose.rotation);
        let angle = scaled_axis.mag();
        let axis = if angle > 0.0 {
            scaled_axis / angle
        } else {
            Vec3::unit_z()
        };
        PoseBuilder::new()
            .with_position(pose.translation)
            .with_rotation(axis, Angle::Rad(angle))
    }
}

/// Module to deserialize `Pose`s from `PoseBuilder` format without manually converting,
/// using the serde attribute `#[serde(with = "serde_pose")]`.
#[cfg(feature = "serde-types")]
pub mod serde_pose {
    use super::*;

    pub fn serialize<S>(pose: &Pose, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::Serialize;
        PoseBuilder::from(*pose).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pose, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;
        PoseBuilder::deserialize(deserializer).map(|p| p.build())
    }
}

// rotation utils
//
// conversions go through `[x, y, z, w]` quaternion arrays,
// which ultraviolet maps onto its own bivector layout

#[inline]
pub fn rotor_from_axis_angle(axis: Unit<Vec3>, angle: f64) -> Rotor3 {
    let (sin, cos) = (angle * 0.5).sin_cos();
    Rotor3::from_quaternion_array([axis.x * sin, axis.y * sin, axis.z * sin, cos])
}

/// Rotor rotating by `|v|` radians around the direction of `v`.
pub fn rotor_from_scaled_axis(v: Vec3) -> Rotor3 {
    let angle = v.mag();
    if angle < 1e-12 {
        // first order, exact enough at this scale
        return Rotor3::from_quaternion_array([v.x * 0.5, v.y * 0.5, v.z * 0.5, 1.0])
            .normalized();
    }
    rotor_from_axis_angle(Unit::new_unchecked(v / angle), angle)
}

/// Inverse of [`rotor_from_scaled_axis`], taking the shortest way around.
pub fn scaled_axis_from_rotor(r: Rotor3) -> Vec3 {
    let [mut x, mut y, mut z, mut w] = r.normalized().into_quaternion_array();
    if w < 0.0 {
        x = -x;
        y = -y;
        z = -z;
        w = -w;
    }
    let xyz = Vec3::new(x, y, z);
    let sin_half = xyz.mag();
    if sin_half < 1e-12 {
        return xyz * 2.0;
    }
    let angle = 2.0 * sin_half.atan2(w);
    xyz * (angle / sin_half)
}

/// Transform a point by a pose.
#[inline]
pub fn transform_point(pose: &Pose, p: Vec3) -> Vec3 {
    pose.rotation * p + pose.translation
}

/// Transform a point from world space into the local space of a pose.
#[inline]
pub fn inverse_transform_point(pose: &Pose, p: Vec3) -> Vec3 {
    pose.rotation.reversed() * (p - pose.translation)
}

/// `after ∘ before`, i.e. apply `before` first.
#[inline]
pub fn compose(after: &Pose, before: &Pose) -> Pose {
    Pose::new(
        after.rotation * before.translation + after.translation,
        (after.rotation * before.rotation).normalized(),
    )
}

#[inline]
pub fn inverse(pose: &Pose) -> Pose {
    let rot = pose.rotation.reversed();
    Pose::new(-(rot * pose.translation), rot)
}

// Vec3 utils

#[inline]
pub fn is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[inline]
pub fn component(v: Vec3, axis: usize) -> f64 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

#[inline]
pub fn unit_axis(axis: usize) -> Vec3 {
    match axis {
        0 => Vec3::unit_x(),
        1 => Vec3::unit_y(),
        _ => Vec3::unit_z(),
    }
}

/// Two unit vectors perpendicular to `n` and to each other.
pub fn orthonormal_basis(n: Unit<Vec3>) -> (Unit<Vec3>, Unit<Vec3>) {
    // pick the world axis least aligned with n to avoid degenerate cross products
    let helper = if n.x.abs() < 0.57735 {
        Vec3::unit_x()
    } else if n.y.abs() < 0.57735 {
        Vec3::unit_y()
    } else {
        Vec3::unit_z()
    };
    let t1 = n.cross(helper).normalized();
    let t2 = n.cross(t1);
    (Unit(t1), Unit(t2))
}

/// Closest point to `p` on the segment `a..b`, returned as the segment parameter.
#[inline]
pub fn closest_param_on_segment(a: Vec3, b: Vec3, p: Vec3) -> f64 {
    let ab = b - a;
    let len_sq = ab.mag_sq();
    if len_sq < 1e-24 {
        return 0.0;
    }
    ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
}

/// Parameters of the closest points between segments `p1..q1` and `p2..q2`.
///
/// From Ericson, Real-Time Collision Detection, section 5.1.9.
pub fn closest_params_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (f64, f64) {
    const EPS: f64 = 1e-12;
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.mag_sq();
    let e = d2.mag_sq();
    let f = d2.dot(r);

    if a <= EPS && e <= EPS {
        return (0.0, 0.0);
    }
    if a <= EPS {
        return (0.0, (f / e).clamp(0.0, 1.0));
    }
    let c = d1.dot(r);
    if e <= EPS {
        return ((-c / a).clamp(0.0, 1.0), 0.0);
    }
    let b = d1.dot(d2);
    let denom = a * e - b * b;
    let mut s = if denom > EPS {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }
    (s, t)
}

// Mat3 utils

#[inline]
pub fn mat3_zero() -> Mat3 {
    Mat3::new(Vec3::zero(), Vec3::zero(), Vec3::zero())
}

#[inline]
pub fn mat3_diagonal(d: Vec3) -> Mat3 {
    Mat3::new(
        Vec3::new(d.x, 0.0, 0.0),
        Vec3::new(0.0, d.y, 0.0),
        Vec3::new(0.0, 0.0, d.z),
    )
}

#[inline]
pub fn mat3_scaled(m: Mat3, s: f64) -> Mat3 {
    Mat3::new(m.cols[0] * s, m.cols[1] * s, m.cols[2] * s)
}

/// Express a tensor given in a rotated frame in the outer frame: `R M Rᵀ`.
#[inline]
pub fn rotate_tensor(rotation: Rotor3, m: Mat3) -> Mat3 {
    let r = rotation.into_matrix();
    r * m * r.transposed()
}

/// Inverse of a symmetric positive semi-definite tensor,
/// returning zero for singular input instead of infinities.
pub fn inverse_or_zero(m: Mat3) -> Mat3 {
    let det = m.determinant();
    if det.abs() < 1e-30 || !det.is_finite() {
        mat3_zero()
    } else {
        m.inversed()
    }
}
