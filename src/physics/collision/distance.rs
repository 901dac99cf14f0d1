//! Closest points and signed distance between pairs of world-space shapes.

use super::{OrientedBox, WorldShape};
use crate::math::{self as m, Unit, Vec3};

/// Closest features of two shapes.
#[derive(Clone, Copy, Debug)]
pub struct DistanceResult {
    /// Point on the surface of shape A closest to B (deepest into B when penetrating).
    pub point_a: Vec3,
    /// Point on the surface of shape B closest to A.
    pub point_b: Vec3,
    /// Direction from B towards A.
    pub normal: Unit<Vec3>,
    /// Separation along the normal. Negative when the shapes overlap.
    pub distance: f64,
}

impl DistanceResult {
    /// The same result with the roles of A and B swapped.
    #[inline]
    pub fn flipped(self) -> Self {
        Self {
            point_a: self.point_b,
            point_b: self.point_a,
            normal: -self.normal,
            distance: self.distance,
        }
    }
}

/// Compute the signed distance between two shapes,
/// returning `None` if they are further than `max_distance` apart.
pub fn distance_between(
    a: &WorldShape,
    b: &WorldShape,
    max_distance: f64,
) -> Option<DistanceResult> {
    use WorldShape::*;
    let result = match (*a, *b) {
        (
            Sphere {
                center: ca,
                radius: ra,
            },
            Sphere {
                center: cb,
                radius: rb,
            },
        ) => sphere_sphere(ca, ra, cb, rb),
        (Sphere { center, radius }, Capsule { a: p, b: q, radius: rb }) => {
            let t = m::closest_param_on_segment(p, q, center);
            sphere_sphere(center, radius, lerp(p, q, t), rb)
        }
        (Capsule { .. }, Sphere { .. }) => distance_between(b, a, f64::INFINITY)?.flipped(),
        (
            Capsule {
                a: p1,
                b: q1,
                radius: r1,
            },
            Capsule {
                a: p2,
                b: q2,
                radius: r2,
            },
        ) => {
            let (s, t) = m::closest_params_between_segments(p1, q1, p2, q2);
            sphere_sphere(lerp(p1, q1, s), r1, lerp(p2, q2, t), r2)
        }
        (Sphere { center, radius }, Box(obb)) => sphere_box(center, radius, &obb),
        (Box(_), Sphere { .. }) => distance_between(b, a, f64::INFINITY)?.flipped(),
        (Capsule { a: p, b: q, radius }, Box(obb)) => {
            let t = deepest_param_against_box(p, q, &obb);
            sphere_box(lerp(p, q, t), radius, &obb)
        }
        (Box(_), Capsule { .. }) => distance_between(b, a, f64::INFINITY)?.flipped(),
        (Box(obb_a), Box(obb_b)) => box_box(&obb_a, &obb_b),
    };

    (result.distance <= max_distance).then_some(result)
}

#[inline]
pub(crate) fn lerp(a: Vec3, b: Vec3, t: f64) -> Vec3 {
    a + (b - a) * t
}

fn sphere_sphere(ca: Vec3, ra: f64, cb: Vec3, rb: f64) -> DistanceResult {
    let offset = ca - cb;
    let center_dist = offset.mag();
    let normal = Unit::try_new_normalize(offset, Unit::unit_y());
    DistanceResult {
        point_a: ca - *normal * ra,
        point_b: cb + *normal * rb,
        normal,
        distance: center_dist - ra - rb,
    }
}

/// Closest point on the surface of a box to `p`, the outward surface normal there,
/// and the signed distance from the surface (negative inside).
pub(crate) fn point_box_query(p: Vec3, obb: &OrientedBox) -> (Vec3, Unit<Vec3>, f64) {
    let h = obb.half_extents;
    let local = obb.to_local(p);
    let outside = Vec3::new(
        local.x.abs() - h.x,
        local.y.abs() - h.y,
        local.z.abs() - h.z,
    );

    if outside.x > 0.0 || outside.y > 0.0 || outside.z > 0.0 {
        let closest = obb.to_world(local.clamped(-h, h));
        let diff = p - closest;
        (closest, Unit::try_new_normalize(diff, Unit::unit_y()), diff.mag())
    } else {
        // inside, push out through the nearest face
        let axis = if outside.x >= outside.y && outside.x >= outside.z {
            0
        } else if outside.y >= outside.z {
            1
        } else {
            2
        };
        let sign = if m::component(local, axis) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        let normal = Unit::new_unchecked(obb.axes[axis] * sign);
        let dist = m::component(outside, axis);
        (p - *normal * dist, normal, dist)
    }
}

fn sphere_box(center: Vec3, radius: f64, obb: &OrientedBox) -> DistanceResult {
    let (closest, normal, dist) = point_box_query(center, obb);
    DistanceResult {
        point_a: center - *normal * radius,
        point_b: closest,
        normal,
        distance: dist - radius,
    }
}

/// Segment parameter minimizing the signed distance to a box.
///
/// Signed distance to a convex shape is convex along a line,
/// so a golden section search finds the global minimum.
pub(crate) fn deepest_param_against_box(p: Vec3, q: Vec3, obb: &OrientedBox) -> f64 {
    const INV_PHI: f64 = 0.618_033_988_749_894_8;
    const ITERATIONS: usize = 48;

    let f = |t: f64| point_box_query(lerp(p, q, t), obb).2;
    let (mut lo, mut hi) = (0.0, 1.0);
    let mut x1 = hi - INV_PHI * (hi - lo);
    let mut x2 = lo + INV_PHI * (hi - lo);
    let (mut f1, mut f2) = (f(x1), f(x2));
    for _ in 0..ITERATIONS {
        if f1 <= f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INV_PHI * (hi - lo);
            f1 = f(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INV_PHI * (hi - lo);
            f2 = f(x2);
        }
    }
    let mid = 0.5 * (lo + hi);

    // endpoints aren't always bracketed exactly, check them too
    [0.0, mid, 1.0]
        .into_iter()
        .map(|t| (t, f(t)))
        .fold((mid, f64::INFINITY), |best, (t, d)| if d < best.1 { (t, d) } else { best })
        .0
}

/// Which part of two boxes a separating axis came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SatAxis {
    FaceA(usize),
    FaceB(usize),
    Edges(usize, usize),
}

/// Edge axes must beat face axes by this much to be chosen.
/// Keeps face contacts stable when the two are nearly equal.
const EDGE_AXIS_TOLERANCE: f64 = 1e-3;

fn box_box(a: &OrientedBox, b: &OrientedBox) -> DistanceResult {
    let offset = a.center - b.center;
    let separation = |axis: Vec3| -> (f64, Vec3) {
        let d = offset.dot(axis);
        let oriented = if d >= 0.0 { axis } else { -axis };
        (
            d.abs() - a.projected_radius(axis) - b.projected_radius(axis),
            oriented,
        )
    };

    let mut best_face = (f64::NEG_INFINITY, Vec3::unit_y(), SatAxis::FaceA(0));
    for i in 0..3 {
        let (sep, n) = separation(a.axes[i]);
        if sep > best_face.0 {
            best_face = (sep, n, SatAxis::FaceA(i));
        }
    }
    for j in 0..3 {
        let (sep, n) = separation(b.axes[j]);
        if sep > best_face.0 {
            best_face = (sep, n, SatAxis::FaceB(j));
        }
    }
    let mut best = best_face;
    for i in 0..3 {
        for j in 0..3 {
            let cross = a.axes[i].cross(b.axes[j]);
            let len = cross.mag();
            if len < 1e-6 {
                // parallel edges, covered by the face axes
                continue;
            }
            let (sep, n) = separation(cross / len);
            if sep > best.0 && sep > best_face.0 + EDGE_AXIS_TOLERANCE {
                best = (sep, n, SatAxis::Edges(i, j));
            }
        }
    }

    let (distance, n, axis) = best;
    let normal = Unit::new_unchecked(n);
    match axis {
        SatAxis::FaceA(_) => {
            // deepest vertex of B towards A
            let point_b = b.support(n);
            DistanceResult {
                point_a: point_b + n * distance,
                point_b,
                normal,
                distance,
            }
        }
        SatAxis::FaceB(_) => {
            let point_a = a.support(-n);
            DistanceResult {
                point_a,
                point_b: point_a - n * distance,
                normal,
                distance,
            }
        }
        SatAxis::Edges(i, j) => {
            // the edge of each box parallel to the axis and closest to the other box
            let edge = |obb: &OrientedBox, axis: usize, dir: Vec3| {
                let mut center = obb.center;
                for k in (0..3).filter(|&k| k != axis) {
                    let sign = if obb.axes[k].dot(dir) >= 0.0 { 1.0 } else { -1.0 };
                    center += obb.axes[k] * (m::component(obb.half_extents, k) * sign);
                }
                let half = obb.axes[axis] * m::component(obb.half_extents, axis);
                (center - half, center + half)
            };
            let (pa, qa) = edge(a, i, -n);
            let (pb, qb) = edge(b, j, n);
            let (s, t) = m::closest_params_between_segments(pa, qa, pb, qb);
            DistanceResult {
                point_a: lerp(pa, qa, s),
                point_b: lerp(pb, qb, t),
                normal,
                distance,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::{Angle, PoseBuilder},
        physics::body::WorldTransform,
        Collider,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn place(coll: Collider, pose: PoseBuilder) -> WorldShape {
        coll.world_shape(&WorldTransform::new(pose))
    }

    fn ground() -> WorldShape {
        place(
            Collider::new_box(Vec3::new(20.0, 1.0, 20.0)),
            PoseBuilder::new().with_position([0.0, -0.5, 0.0]),
        )
    }

    #[test]
    fn sphere_over_box() {
        let sphere = place(
            Collider::new_sphere(0.5),
            PoseBuilder::new().with_position([1.0, 1.5, 0.0]),
        );
        let res = distance_between(&sphere, &ground(), 10.0).unwrap();
        assert!((res.distance - 1.0).abs() < 1e-12);
        assert!((res.normal.y - 1.0).abs() < 1e-12);
        assert!((res.point_b - Vec3::new(1.0, 0.0, 0.0)).mag() < 1e-12);
        assert!((res.point_a - Vec3::new(1.0, 1.0, 0.0)).mag() < 1e-12);

        assert!(distance_between(&sphere, &ground(), 0.5).is_none());

        // swapped roles flip the normal
        let res = distance_between(&ground(), &sphere, 10.0).unwrap();
        assert!((res.normal.y + 1.0).abs() < 1e-12);
        assert!((res.point_a - Vec3::new(1.0, 0.0, 0.0)).mag() < 1e-12);
    }

    #[test]
    fn sphere_sinking_into_box() {
        let sphere = place(
            Collider::new_sphere(0.5),
            PoseBuilder::new().with_position([0.0, 0.3, 0.0]),
        );
        let res = distance_between(&sphere, &ground(), 0.0).unwrap();
        assert!((res.distance + 0.2).abs() < 1e-12);
        assert!((res.normal.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn capsule_lying_across_box() {
        let capsule = place(
            Collider::new_capsule(1.0, 0.25),
            PoseBuilder::new()
                .with_position([0.0, 0.2, 0.0])
                .with_rotation([0.0, 0.0, 1.0], Angle::Deg(80.0)),
        );
        let res = distance_between(&capsule, &ground(), 1.0).unwrap();
        // lowest hemisphere centre is at 0.2 - sin(10°)
        let expected = 0.2 - 10.0_f64.to_radians().sin() - 0.25;
        assert!((res.distance - expected).abs() < 1e-6);
        assert!((res.normal.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn crossed_capsules() {
        let a = place(
            Collider::new_capsule(1.0, 0.1),
            PoseBuilder::new().with_position([0.0, 0.0, 0.5]),
        );
        let b = place(
            Collider::new_capsule(1.0, 0.1),
            PoseBuilder::new().with_rotation([0.0, 0.0, 1.0], Angle::Deg(90.0)),
        );
        let res = distance_between(&a, &b, 1.0).unwrap();
        assert!((res.distance - 0.3).abs() < 1e-9);
        assert!((res.normal.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stacked_boxes() {
        let top = place(
            Collider::new_cube(1.0),
            PoseBuilder::new()
                .with_position([0.2, 0.55, 0.0])
                .with_rotation([0.0, 1.0, 0.0], Angle::Deg(30.0)),
        );
        let res = distance_between(&top, &ground(), 1.0).unwrap();
        assert!((res.distance - 0.05).abs() < 1e-9);
        assert!((res.normal.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn box_distance_never_exceeds_center_distance() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let random_box = |rng: &mut StdRng| {
                let size = Vec3::new(
                    rng.gen_range(0.1..2.0),
                    rng.gen_range(0.1..2.0),
                    rng.gen_range(0.1..2.0),
                );
                let pose = PoseBuilder::new()
                    .with_position([
                        rng.gen_range(-2.0..2.0),
                        rng.gen_range(-2.0..2.0),
                        rng.gen_range(-2.0..2.0),
                    ])
                    .with_rotation(
                        [
                            rng.gen_range(-1.0..1.0),
                            rng.gen_range(-1.0..1.0),
                            rng.gen_range(-1.0..1.0),
                        ],
                        Angle::Rad(rng.gen_range(0.0..6.0)),
                    );
                (place(Collider::new_box(size), pose), pose.build().translation)
            };
            let (a, ca) = random_box(&mut rng);
            let (b, cb) = random_box(&mut rng);
            let res = distance_between(&a, &b, f64::INFINITY).unwrap();
            assert!(res.distance.is_finite());
            assert!(res.distance <= (ca - cb).mag());
            assert!((res.normal.mag() - 1.0).abs() < 1e-9);
        }
    }
}
