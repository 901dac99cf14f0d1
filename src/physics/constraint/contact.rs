use super::SolverBody;
use crate::{
    math::{self as m, Mat3, Vec3},
    physics::{collision::ContactManifold, Velocity},
};

/// Fastest allowed separation speed when pushing a body out of something static.
pub const MAX_DEPENETRATION_VELOCITY_DYNAMIC_STATIC: f64 = 10.0;
/// Fastest allowed separation speed when pushing two dynamic bodies apart.
pub const MAX_DEPENETRATION_VELOCITY_DYNAMIC_DYNAMIC: f64 = 3.0;

/// Separation under which a contact counts as touching rather than speculative.
pub const TOUCHING_DISTANCE: f64 = 1e-4;

const MIN_INVERSE_EFFECTIVE_MASS: f64 = 1e-12;

/// State of one side of a contact at the start of the tick.
#[derive(Clone, Copy, Debug)]
pub struct ContactBody {
    pub center_of_mass: Vec3,
    pub velocity: Velocity,
    pub inverse_mass: f64,
    /// World space inverse inertia tensor.
    pub inverse_inertia: Mat3,
}

impl ContactBody {
    /// Something that can't be pushed, like a kinematic body or level geometry.
    pub fn immovable(center_of_mass: Vec3, velocity: Velocity) -> Self {
        Self {
            center_of_mass,
            velocity,
            inverse_mass: 0.0,
            inverse_inertia: m::mat3_zero(),
        }
    }
}

/// Material and tuning values for building a contact.
#[derive(Clone, Copy, Debug)]
pub struct ContactParameters {
    pub coefficient_of_restitution: f64,
    pub coefficient_of_friction: f64,
    pub max_depenetration_velocity: f64,
    /// Gravitational acceleration pushing the bodies together along the normal.
    /// Approach speeds below what gravity adds in one step don't bounce.
    pub gravity_against_normal: f64,
    pub dt: f64,
}

/// One direction of a contact point, precomputed for both bodies.
#[derive(Clone, Copy, Debug)]
struct JacobianRow {
    dir: Vec3,
    /// `r_a × dir`
    angular_a: Vec3,
    angular_b: Vec3,
    /// `I_a⁻¹ (r_a × dir)`
    inertia_a: Vec3,
    inertia_b: Vec3,
}

impl JacobianRow {
    fn new(dir: Vec3, r_a: Vec3, r_b: Vec3, a: &ContactBody, b: &ContactBody) -> Self {
        let angular_a = r_a.cross(dir);
        let angular_b = r_b.cross(dir);
        Self {
            dir,
            angular_a,
            angular_b,
            inertia_a: a.inverse_inertia * angular_a,
            inertia_b: b.inverse_inertia * angular_b,
        }
    }

    /// A row acting only on rotation around `axis`.
    fn angular(axis: Vec3, a: &ContactBody, b: &ContactBody) -> Self {
        Self {
            dir: Vec3::zero(),
            angular_a: axis,
            angular_b: axis,
            inertia_a: a.inverse_inertia * axis,
            inertia_b: b.inverse_inertia * axis,
        }
    }

    /// Velocity of A relative to B along the row. Positive means separating.
    #[inline]
    fn relative_velocity(&self, va: &Velocity, vb: &Velocity) -> f64 {
        va.linear.dot(self.dir) + va.angular.dot(self.angular_a)
            - vb.linear.dot(self.dir)
            - vb.angular.dot(self.angular_b)
    }

    #[inline]
    fn inverse_effective_mass(&self, a: &SolverBody, b: &SolverBody) -> f64 {
        let linear = self.dir.mag_sq();
        a.inverse_mass * linear
            + a.inverse_inertia_scale * self.angular_a.dot(self.inertia_a)
            + b.inverse_mass * linear
            + b.inverse_inertia_scale * self.angular_b.dot(self.inertia_b)
    }

    #[inline]
    fn apply(&self, a: &mut SolverBody, b: &mut SolverBody, impulse: f64) {
        a.velocity.linear += self.dir * (impulse * a.inverse_mass);
        a.velocity.angular += self.inertia_a * (impulse * a.inverse_inertia_scale);
        b.velocity.linear -= self.dir * (impulse * b.inverse_mass);
        b.velocity.angular -= self.inertia_b * (impulse * b.inverse_inertia_scale);
    }

    /// Impulse that would bring the row's relative velocity to `target`.
    #[inline]
    fn impulse_towards(&self, a: &SolverBody, b: &SolverBody, target: f64) -> Option<f64> {
        let k = self.inverse_effective_mass(a, b);
        (k > MIN_INVERSE_EFFECTIVE_MASS)
            .then(|| (target - self.relative_velocity(&*a.velocity, &*b.velocity)) / k)
    }
}

/// A single contact point with its accumulated normal impulse.
#[derive(Clone, Copy, Debug)]
pub struct ContactPointJacobian {
    /// World position halfway between the two surfaces.
    pub location: Vec3,
    /// Signed distance between the surfaces when the tick started.
    pub separation: f64,
    normal_row: JacobianRow,
    /// Relative normal velocity the solver aims for.
    pub target_velocity: f64,
    pub normal_impulse: f64,
}

/// Friction for a whole manifold, acting at the middle of the contact patch.
///
/// Two linear rows resist sliding and a twist row resists spinning around the normal.
/// All three are limited by the manifold's summed normal impulse.
#[derive(Clone, Copy, Debug)]
struct PatchFriction {
    tangent_rows: [JacobianRow; 2],
    twist_row: JacobianRow,
    /// Mean distance of the points from the patch centre, the lever arm for twist.
    radius: f64,
    tangent_impulses: [f64; 2],
    twist_impulse: f64,
}

impl PatchFriction {
    fn solve(&mut self, a: &mut SolverBody, b: &mut SolverBody, max_friction: f64) {
        // circular cone around the normal
        let old = self.tangent_impulses;
        let mut new = old;
        for (row, imp) in self.tangent_rows.iter().zip(&mut new) {
            if let Some(delta) = row.impulse_towards(a, b, 0.0) {
                *imp += delta;
            }
        }
        let mag = (new[0] * new[0] + new[1] * new[1]).sqrt();
        if mag > max_friction {
            let scale = if mag > 0.0 { max_friction / mag } else { 0.0 };
            new = [new[0] * scale, new[1] * scale];
        }
        for ((row, new), old) in self.tangent_rows.iter().zip(new).zip(old) {
            row.apply(a, b, new - old);
        }
        self.tangent_impulses = new;

        let max_twist = max_friction * self.radius;
        if let Some(delta) = self.twist_row.impulse_towards(a, b, 0.0) {
            let old = self.twist_impulse;
            self.twist_impulse = (old + delta).clamp(-max_twist, max_twist);
            self.twist_row.apply(a, b, self.twist_impulse - old);
        }
    }
}

/// All contact points between two colliders, sharing one normal.
#[derive(Clone, Debug)]
pub struct ContactJacobian {
    /// Points from B towards A.
    pub normal: Vec3,
    pub coefficient_of_friction: f64,
    pub points: Vec<ContactPointJacobian>,
    friction: PatchFriction,
}

impl ContactJacobian {
    pub fn new(
        a: &ContactBody,
        b: &ContactBody,
        manifold: &ContactManifold,
        params: &ContactParameters,
    ) -> Self {
        let normal = *manifold.normal;
        let inv_dt = 1.0 / params.dt;
        let gravity_step = params.gravity_against_normal.max(0.0) * params.dt;

        let points: Vec<ContactPointJacobian> = manifold
            .contacts
            .iter()
            .map(|contact| {
                let location = contact.location + normal * (contact.distance * 0.5);
                let r_a = location - a.center_of_mass;
                let r_b = location - b.center_of_mass;
                let normal_row = JacobianRow::new(normal, r_a, r_b, a, b);

                // speculative contacts let the bodies close the gap but not more,
                // penetrating ones push apart at a limited speed
                let mut target_velocity = if contact.distance > 0.0 {
                    -contact.distance * inv_dt
                } else {
                    (-contact.distance * inv_dt).min(params.max_depenetration_velocity)
                };

                let approach_speed = -normal_row.relative_velocity(&a.velocity, &b.velocity);
                let touches_this_step = contact.distance - approach_speed * params.dt < 0.0;
                if params.coefficient_of_restitution > 0.0
                    && approach_speed > gravity_step
                    && touches_this_step
                {
                    target_velocity =
                        target_velocity.max(params.coefficient_of_restitution * approach_speed);
                }

                ContactPointJacobian {
                    location,
                    separation: contact.distance,
                    normal_row,
                    target_velocity,
                    normal_impulse: 0.0,
                }
            })
            .collect();

        let centre = if points.is_empty() {
            (a.center_of_mass + b.center_of_mass) * 0.5
        } else {
            points.iter().fold(Vec3::zero(), |acc, p| acc + p.location) / points.len() as f64
        };
        let radius = if points.is_empty() {
            0.0
        } else {
            points.iter().map(|p| (p.location - centre).mag()).sum::<f64>() / points.len() as f64
        };
        let r_a = centre - a.center_of_mass;
        let r_b = centre - b.center_of_mass;
        let (t1, t2) = m::orthonormal_basis(manifold.normal);
        let friction = PatchFriction {
            tangent_rows: [
                JacobianRow::new(*t1, r_a, r_b, a, b),
                JacobianRow::new(*t2, r_a, r_b, a, b),
            ],
            twist_row: JacobianRow::angular(normal, a, b),
            radius,
            tangent_impulses: [0.0; 2],
            twist_impulse: 0.0,
        };

        Self {
            normal,
            coefficient_of_friction: params.coefficient_of_friction,
            points,
            friction,
        }
    }

    /// Run one sequential impulse pass: every normal row, then the manifold's friction.
    pub fn solve(&mut self, a: &mut SolverBody, b: &mut SolverBody) {
        for point in &mut self.points {
            if let Some(delta) = point.normal_row.impulse_towards(a, b, point.target_velocity) {
                let old = point.normal_impulse;
                point.normal_impulse = (old + delta).max(0.0);
                point.normal_row.apply(a, b, point.normal_impulse - old);
            }
        }

        let max_friction = self.coefficient_of_friction * self.total_normal_impulse();
        self.friction.solve(a, b, max_friction);
    }

    pub fn total_normal_impulse(&self) -> f64 {
        self.points.iter().map(|p| p.normal_impulse).sum()
    }

    /// Accumulated friction impulse along the two tangent directions.
    pub fn friction_impulses(&self) -> [f64; 2] {
        self.friction.tangent_impulses
    }

    pub fn twist_impulse(&self) -> f64 {
        self.friction.twist_impulse
    }

    /// Whether any point was already in contact when the tick started.
    pub fn is_touching(&self) -> bool {
        self.points.iter().any(|p| p.separation <= TOUCHING_DISTANCE)
    }

    /// Average of contact locations weighted by their normal impulses,
    /// or `None` if nothing was pushed.
    pub fn impulse_weighted_location(&self) -> Option<Vec3> {
        let total = self.total_normal_impulse();
        if total <= 0.0 {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vec3::zero(), |acc, p| acc + p.location * p.normal_impulse);
        Some(sum / total)
    }
}
