use crate::{
    collision::Aabb,
    math::{self as m, Vec3},
};

/// Parameters of the uniform grid used to bucket colliders.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CollisionLayerSettings {
    /// Region of space divided into cells.
    /// Colliders outside it are assigned to the nearest edge cell,
    /// so it doesn't need to cover the whole world,
    /// but a good fit means fewer pairs to test.
    pub world_aabb: Aabb,
    /// Number of cells along each axis. Must be at least one.
    ///
    /// More cells means more parallel work when the `parallel` feature is enabled,
    /// but also more colliders that straddle cell boundaries and get tested against everything.
    pub subdivisions_per_axis: [u32; 3],
}

impl Default for CollisionLayerSettings {
    fn default() -> Self {
        Self {
            world_aabb: Aabb::from_center_extents(Vec3::zero(), Vec3::broadcast(0.5)),
            subdivisions_per_axis: [2, 2, 2],
        }
    }
}

impl CollisionLayerSettings {
    /// Smallest allowed size of the world AABB along any axis.
    pub const MIN_WORLD_EXTENT: f64 = 1e-3;

    /// Clamp subdivisions to at least one and world bounds to a positive size.
    pub fn sanitized(mut self) -> Self {
        for (axis, subdiv) in self.subdivisions_per_axis.iter_mut().enumerate() {
            if *subdiv == 0 {
                log::warn!("Collision layer has zero subdivisions on axis {axis}, using 1");
                *subdiv = 1;
            }
        }

        let aabb = &mut self.world_aabb;
        if !m::is_finite(aabb.min) || !m::is_finite(aabb.max) {
            log::warn!("Collision layer world AABB is not finite, using the default");
            *aabb = Self::default().world_aabb;
        }
        let size = aabb.max - aabb.min;
        if size.x < Self::MIN_WORLD_EXTENT
            || size.y < Self::MIN_WORLD_EXTENT
            || size.z < Self::MIN_WORLD_EXTENT
        {
            log::warn!("Collision layer world AABB has non-positive extents, clamping");
            // twice the minimum so rounding in `max - min` can't land below it
            aabb.max = aabb
                .max
                .max_by_component(aabb.min + Vec3::broadcast(2.0 * Self::MIN_WORLD_EXTENT));
        }
        self
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.subdivisions_per_axis
            .iter()
            .map(|&s| s.max(1) as usize)
            .product()
    }
}

/// Global parameters for the physics pipeline.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PhysicsSettings {
    pub collision_layer: CollisionLayerSettings,
    /// Acceleration applied to every dynamic body.
    pub gravity: Vec3,
    /// Fraction of linear velocity lost per second, between 0 and 1.
    pub linear_damping: f64,
    /// Fraction of angular velocity lost per second, between 0 and 1.
    pub angular_damping: f64,
    /// Number of solver iterations per tick. At least one.
    ///
    /// More iterations make stacks and chains of bodies more rigid at a linear cost.
    pub num_iterations: u32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            collision_layer: CollisionLayerSettings::default(),
            gravity: Vec3::new(0.0, -9.81, 0.0),
            linear_damping: 0.05,
            angular_damping: 0.05,
            num_iterations: 4,
        }
    }
}

impl PhysicsSettings {
    /// Clamp every value into its valid range, logging what was changed.
    pub fn sanitized(mut self) -> Self {
        self.collision_layer = self.collision_layer.sanitized();

        if !m::is_finite(self.gravity) {
            log::warn!("Gravity {:?} is not finite, using zero gravity", self.gravity);
            self.gravity = Vec3::zero();
        }
        self.linear_damping = sanitize_damping(self.linear_damping, "linear");
        self.angular_damping = sanitize_damping(self.angular_damping, "angular");
        if self.num_iterations == 0 {
            log::warn!("Solver iteration count is zero, using 1");
            self.num_iterations = 1;
        }
        self
    }
}

fn sanitize_damping(damping: f64, kind: &str) -> f64 {
    if !damping.is_finite() {
        log::warn!("{kind} damping is not finite, using 0");
        0.0
    } else if !(0.0..=1.0).contains(&damping) {
        log::warn!("{kind} damping {damping} is outside 0..=1, clamping");
        damping.clamp(0.0, 1.0)
    } else {
        damping
    }
}
