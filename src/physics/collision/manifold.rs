//! Contact manifolds: the set of points two shapes touch at, built from their closest features.

use super::{
    distance::{self, DistanceResult},
    OrientedBox, WorldShape,
};
use crate::math::{self as m, Unit, Vec3};

/// A contact point on the surface of shape B.
#[derive(Clone, Copy, Debug)]
pub struct ContactOnB {
    pub location: Vec3,
    /// Separation from A along the manifold normal. Negative when penetrating.
    pub distance: f64,
}

impl ContactOnB {
    /// The matching point on the surface of A.
    #[inline]
    pub fn location_on_a(&self, normal: Unit<Vec3>) -> Vec3 {
        self.location + *normal * self.distance
    }
}

#[derive(Clone, Debug)]
pub struct ContactManifold {
    /// Direction from B towards A, shared by all contacts.
    pub normal: Unit<Vec3>,
    pub contacts: Vec<ContactOnB>,
}

/// Most contacts kept for a single pair of shapes.
pub const MAX_CONTACTS: usize = 4;

/// A feature counts as a face of a box when the normal is this aligned with an axis.
const FACE_ALIGNMENT: f64 = 0.999;
/// Surfaces count as parallel when the normal is this close to perpendicular
/// to a capsule's segment.
const PARALLEL_TOLERANCE: f64 = 0.2;

/// Generate contact points between two shapes whose closest features are already known.
pub fn contacts_between(a: &WorldShape, b: &WorldShape, dist: &DistanceResult) -> ContactManifold {
    use WorldShape::*;
    let single = || ContactManifold {
        normal: dist.normal,
        contacts: vec![ContactOnB {
            location: dist.point_b,
            distance: dist.distance,
        }],
    };

    match (*a, *b) {
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
        ) => capsule_capsule((p1, q1, r1), (p2, q2, r2), dist).unwrap_or_else(single),
        (Capsule { a: p, b: q, radius }, Box(obb)) => {
            capsule_box(p, q, radius, &obb, dist, false).unwrap_or_else(single)
        }
        (Box(obb), Capsule { a: p, b: q, radius }) => {
            capsule_box(p, q, radius, &obb, dist, true).unwrap_or_else(single)
        }
        (Box(obb_a), Box(obb_b)) => box_box(&obb_a, &obb_b, dist).unwrap_or_else(single),
        // anything involving a sphere touches at one point
        _ => single(),
    }
}

/// Two points when the capsules lie side by side, otherwise `None`.
fn capsule_capsule(
    (p1, q1, r1): (Vec3, Vec3, f64),
    (p2, q2, r2): (Vec3, Vec3, f64),
    dist: &DistanceResult,
) -> Option<ContactManifold> {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let (len1, len2) = (d1.mag(), d2.mag());
    if len1 < 1e-9 || len2 < 1e-9 || (d1.dot(d2) / (len1 * len2)).abs() < 0.98 {
        return None;
    }

    let n = dist.normal;
    let mut contacts: Vec<ContactOnB> = Vec::with_capacity(4);
    // endpoints of A that project inside B, and vice versa,
    // are the ends of the overlapping stretch
    for end_a in [p1, q1] {
        let t = (end_a - p2).dot(d2) / (len2 * len2);
        if (0.0..=1.0).contains(&t) {
            let on_b = distance::lerp(p2, q2, t);
            let separation = (end_a - on_b).dot(*n) - r1 - r2;
            contacts.push(ContactOnB {
                location: on_b + *n * r2,
                distance: separation,
            });
        }
    }
    for end_b in [p2, q2] {
        let s = (end_b - p1).dot(d1) / (len1 * len1);
        if (0.0..=1.0).contains(&s) {
            let on_a = distance::lerp(p1, q1, s);
            let separation = (on_a - end_b).dot(*n) - r1 - r2;
            contacts.push(ContactOnB {
                location: end_b + *n * r2,
                distance: separation,
            });
        }
    }
    if contacts.len() < 2 {
        return None;
    }
    keep_furthest_pair(&mut contacts);
    Some(ContactManifold {
        normal: n,
        contacts,
    })
}

fn keep_furthest_pair(contacts: &mut Vec<ContactOnB>) {
    let mut best = (0, 1, f64::NEG_INFINITY);
    for i in 0..contacts.len() {
        for j in (i + 1)..contacts.len() {
            let d = (contacts[i].location - contacts[j].location).mag_sq();
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    let pair = [contacts[best.0], contacts[best.1]];
    contacts.clear();
    contacts.extend(pair);
}

/// Contacts at both hemisphere centres when the capsule lies flat against a face.
///
/// `box_is_a` tells which side of the pair the box is on.
fn capsule_box(
    p: Vec3,
    q: Vec3,
    radius: f64,
    obb: &OrientedBox,
    dist: &DistanceResult,
    box_is_a: bool,
) -> Option<ContactManifold> {
    let n = dist.normal;
    let axis = q - p;
    let len = axis.mag();
    if len < 1e-9 || (axis.dot(*n) / len).abs() > PARALLEL_TOLERANCE {
        return None;
    }

    let contacts = [p, q]
        .into_iter()
        .map(|end| {
            let (on_box, _, signed) = distance::point_box_query(end, obb);
            let separation = signed - radius;
            if box_is_a {
                // contact point lives on the capsule
                ContactOnB {
                    location: end + *n * radius,
                    distance: separation,
                }
            } else {
                ContactOnB {
                    location: on_box,
                    distance: separation,
                }
            }
        })
        .collect();
    Some(ContactManifold {
        normal: n,
        contacts,
    })
}

/// Face contact between boxes by clipping the incident face against the reference face.
/// Returns `None` for edge contacts, which only have one point.
fn box_box(a: &OrientedBox, b: &OrientedBox, dist: &DistanceResult) -> Option<ContactManifold> {
    let n = *dist.normal;
    let best_axis = |obb: &OrientedBox| {
        (0..3)
            .map(|i| (i, obb.axes[i].dot(n).abs()))
            .fold((0, f64::NEG_INFINITY), |best, c| if c.1 > best.1 { c } else { best })
    };
    let (axis_a, align_a) = best_axis(a);
    let (axis_b, align_b) = best_axis(b);
    if align_a.max(align_b) < FACE_ALIGNMENT {
        return None;
    }

    // reference face normal points from the reference box towards the incident box
    let reference_is_a = align_a >= align_b;
    let (reference, ref_axis, ref_normal, incident) = if reference_is_a {
        (a, axis_a, -n, b)
    } else {
        (b, axis_b, n, a)
    };
    let ref_sign = if reference.axes[ref_axis].dot(ref_normal) >= 0.0 {
        1.0
    } else {
        -1.0
    };
    let ref_face_center = reference.center
        + reference.axes[ref_axis] * (m::component(reference.half_extents, ref_axis) * ref_sign);

    // incident face is the one facing most against the reference normal
    let (inc_axis, _) = (0..3)
        .map(|i| (i, incident.axes[i].dot(ref_normal).abs()))
        .fold((0, f64::NEG_INFINITY), |best, c| if c.1 > best.1 { c } else { best });
    let inc_sign = if incident.axes[inc_axis].dot(ref_normal) >= 0.0 {
        -1.0
    } else {
        1.0
    };
    let (u, v) = ((inc_axis + 1) % 3, (inc_axis + 2) % 3);
    let inc_center = incident.center
        + incident.axes[inc_axis] * (m::component(incident.half_extents, inc_axis) * inc_sign);
    let hu = incident.axes[u] * m::component(incident.half_extents, u);
    let hv = incident.axes[v] * m::component(incident.half_extents, v);
    let mut polygon = vec![
        inc_center + hu + hv,
        inc_center - hu + hv,
        inc_center - hu - hv,
        inc_center + hu - hv,
    ];

    for side in (0..3).filter(|&i| i != ref_axis) {
        let axis = reference.axes[side];
        let extent = m::component(reference.half_extents, side);
        let offset = reference.center.dot(axis);
        polygon = clip_polygon(&polygon, axis, offset + extent);
        polygon = clip_polygon(&polygon, -axis, -offset + extent);
        if polygon.is_empty() {
            return None;
        }
    }

    // speculative points far above the deepest one don't help the solver
    let slop = 0.1 * incident.half_extents.component_min().max(1e-3);
    let limit = dist.distance.max(0.0) + slop;
    let mut contacts: Vec<ContactOnB> = polygon
        .into_iter()
        .filter_map(|p| {
            let separation = (p - ref_face_center).dot(ref_normal);
            (separation <= limit).then(|| ContactOnB {
                location: if reference_is_a {
                    p
                } else {
                    p - ref_normal * separation
                },
                distance: separation,
            })
        })
        .collect();
    if contacts.is_empty() {
        return None;
    }
    reduce_to_four(&mut contacts, ref_normal);

    Some(ContactManifold {
        normal: dist.normal,
        contacts,
    })
}

/// Sutherland-Hodgman clip keeping the part of the polygon where `p . normal <= offset`.
fn clip_polygon(polygon: &[Vec3], normal: Vec3, offset: f64) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, &curr) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let d_curr = curr.dot(normal) - offset;
        let d_next = next.dot(normal) - offset;
        if d_curr <= 0.0 {
            out.push(curr);
        }
        if (d_curr <= 0.0) != (d_next <= 0.0) {
            let t = d_curr / (d_curr - d_next);
            out.push(distance::lerp(curr, next, t));
        }
    }
    out
}

/// Keep the deepest point and three others spanning the largest area.
fn reduce_to_four(contacts: &mut Vec<ContactOnB>, plane_normal: Vec3) {
    if contacts.len() <= MAX_CONTACTS {
        return;
    }
    let pick = |contacts: &[ContactOnB], score: &dyn Fn(&ContactOnB) -> f64| {
        contacts
            .iter()
            .enumerate()
            .map(|(i, c)| (i, score(c)))
            .fold((0, f64::NEG_INFINITY), |best, c| if c.1 > best.1 { c } else { best })
            .0
    };

    let first = pick(&contacts[..], &|c: &ContactOnB| -c.distance);
    let p0 = contacts[first].location;
    let second = pick(&contacts[..], &|c: &ContactOnB| (c.location - p0).mag_sq());
    let p1 = contacts[second].location;
    let signed_area = |c: &ContactOnB| (p1 - p0).cross(c.location - p0).dot(plane_normal);
    let third = pick(&contacts[..], &signed_area);
    let fourth = pick(&contacts[..], &|c: &ContactOnB| -signed_area(c));

    let mut kept: Vec<ContactOnB> = Vec::with_capacity(MAX_CONTACTS);
    for idx in [first, second, third, fourth] {
        let c = contacts[idx];
        if !kept
            .iter()
            .any(|k| (k.location - c.location).mag_sq() < 1e-18)
        {
            kept.push(c);
        }
    }
    *contacts = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::{Angle, PoseBuilder},
        physics::{body::WorldTransform, collision::distance_between},
        Collider,
    };

    fn place(coll: Collider, pose: PoseBuilder) -> WorldShape {
        coll.world_shape(&WorldTransform::new(pose))
    }

    fn manifold(a: &WorldShape, b: &WorldShape) -> ContactManifold {
        let dist = distance_between(a, b, 1.0).unwrap();
        contacts_between(a, b, &dist)
    }

    #[test]
    fn box_resting_on_box_has_four_corners() {
        let ground = place(
            Collider::new_box(Vec3::new(10.0, 1.0, 10.0)),
            PoseBuilder::new().with_position([0.0, -0.5, 0.0]),
        );
        let cube = place(
            Collider::new_cube(1.0),
            PoseBuilder::new()
                .with_position([1.0, 0.49, 0.0])
                .with_rotation([0.0, 1.0, 0.0], Angle::Deg(20.0)),
        );

        let res = manifold(&cube, &ground);
        assert_eq!(res.contacts.len(), 4);
        assert!((res.normal.y - 1.0).abs() < 1e-9);
        for c in &res.contacts {
            assert!((c.distance + 0.01).abs() < 1e-9);
            // points are on the ground's top face
            assert!(c.location.y.abs() < 1e-9);
            assert!((c.location_on_a(res.normal).y - -0.01).abs() < 1e-9);
        }

        // same pair the other way round puts the points on the cube
        let res = manifold(&ground, &cube);
        assert_eq!(res.contacts.len(), 4);
        assert!((res.normal.y + 1.0).abs() < 1e-9);
        for c in &res.contacts {
            assert!((c.location.y + 0.01).abs() < 1e-9);
        }
    }

    #[test]
    fn tilted_box_touches_with_an_edge() {
        let ground = place(
            Collider::new_box(Vec3::new(10.0, 1.0, 10.0)),
            PoseBuilder::new().with_position([0.0, -0.5, 0.0]),
        );
        let half_diag = 0.5 * 2.0_f64.sqrt();
        let cube = place(
            Collider::new_cube(1.0),
            PoseBuilder::new()
                .with_position([0.0, half_diag, 0.0])
                .with_rotation([0.0, 0.0, 1.0], Angle::Deg(45.0)),
        );
        let res = manifold(&cube, &ground);
        assert_eq!(res.contacts.len(), 2);
        for c in &res.contacts {
            assert!(c.distance.abs() < 1e-9);
        }
    }

    #[test]
    fn capsule_lying_on_box() {
        let ground = place(
            Collider::new_box(Vec3::new(10.0, 1.0, 10.0)),
            PoseBuilder::new().with_position([0.0, -0.5, 0.0]),
        );
        let capsule = place(
            Collider::new_capsule(1.0, 0.5),
            PoseBuilder::new()
                .with_position([0.0, 0.5, 0.0])
                .with_rotation([1.0, 0.0, 0.0], Angle::Deg(90.0)),
        );
        let res = manifold(&capsule, &ground);
        assert_eq!(res.contacts.len(), 2);
        for c in &res.contacts {
            assert!(c.distance.abs() < 1e-9);
            assert!(c.location.y.abs() < 1e-9);
        }
    }

    #[test]
    fn parallel_capsules() {
        let a = place(
            Collider::new_capsule(1.0, 0.25),
            PoseBuilder::new().with_position([0.0, 0.0, 0.45]),
        );
        let b = place(
            Collider::new_capsule(1.0, 0.25),
            PoseBuilder::new().with_position([0.0, 0.5, 0.0]),
        );
        let res = manifold(&a, &b);
        assert_eq!(res.contacts.len(), 2);
        let ys: Vec<f64> = res.contacts.iter().map(|c| c.location.y).collect();
        assert!(ys.iter().any(|y| (y + 0.5).abs() < 1e-9));
        assert!(ys.iter().any(|y| (y - 1.0).abs() < 1e-9));
        for c in &res.contacts {
            assert!((c.distance + 0.05).abs() < 1e-9);
        }
    }

    #[test]
    fn sphere_has_one_contact() {
        let sphere = place(Collider::new_sphere(1.0), PoseBuilder::new());
        let cube = place(
            Collider::new_cube(1.0),
            PoseBuilder::new().with_position([1.2, 0.0, 0.0]),
        );
        let res = manifold(&sphere, &cube);
        assert_eq!(res.contacts.len(), 1);
        assert!((res.contacts[0].distance + 0.3).abs() < 1e-9);
    }
}
