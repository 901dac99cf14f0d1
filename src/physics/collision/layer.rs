//! Bucketed broad phase.
//!
//! Space inside the world AABB is divided into a uniform grid of cells.
//! Every collider goes into the bucket of the one cell its AABB fits in,
//! or into a shared cross bucket if it spans several cells.
//! Colliders within a bucket are sorted along x for sweep-and-prune,
//! and only bucket combinations that can contain overlaps are tested against each other.

use super::{Aabb, WorldShape};
use crate::{
    math::Vec3,
    physics::settings::CollisionLayerSettings,
};
use std::{cmp::Ordering, ops::Range};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maps AABBs to bucket indices.
#[derive(Clone, Copy, Debug)]
pub struct BucketCalculator {
    world_min: Vec3,
    cell_size: Vec3,
    subdivisions: [usize; 3],
}

impl BucketCalculator {
    /// Settings are normally sanitized by [`Physics`][crate::Physics] already.
    /// Anything degenerate that's left is clamped here without logging.
    pub fn new(settings: &CollisionLayerSettings) -> Self {
        let subdivisions = settings.subdivisions_per_axis.map(|s| s.max(1) as usize);
        let world = if settings.world_aabb.is_finite() {
            settings.world_aabb
        } else {
            CollisionLayerSettings::default().world_aabb
        };
        let size = (world.max - world.min)
            .max_by_component(Vec3::broadcast(CollisionLayerSettings::MIN_WORLD_EXTENT));
        Self {
            world_min: world.min,
            cell_size: Vec3::new(
                size.x / subdivisions[0] as f64,
                size.y / subdivisions[1] as f64,
                size.z / subdivisions[2] as f64,
            ),
            subdivisions,
        }
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.subdivisions.iter().product()
    }

    /// Bucket for colliders spanning more than one cell.
    #[inline]
    pub fn cross_bucket(&self) -> usize {
        self.cell_count()
    }

    /// Bucket for colliders with non-finite bounds. Never paired with anything.
    #[inline]
    pub fn nan_bucket(&self) -> usize {
        self.cell_count() + 1
    }

    /// Total number of buckets including the cross and NaN buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.cell_count() + 2
    }

    fn cell_coords(&self, p: Vec3) -> [usize; 3] {
        let rel = p - self.world_min;
        let coord = |v: f64, size: f64, count: usize| {
            // positions outside the world clamp to the edge cells
            ((v / size).floor().max(0.0) as usize).min(count - 1)
        };
        [
            coord(rel.x, self.cell_size.x, self.subdivisions[0]),
            coord(rel.y, self.cell_size.y, self.subdivisions[1]),
            coord(rel.z, self.cell_size.z, self.subdivisions[2]),
        ]
    }

    pub fn bucket_index(&self, aabb: &Aabb) -> usize {
        if !aabb.is_finite() {
            return self.nan_bucket();
        }
        let min = self.cell_coords(aabb.min);
        let max = self.cell_coords(aabb.max);
        if min != max {
            return self.cross_bucket();
        }
        (min[0] * self.subdivisions[1] + min[1]) * self.subdivisions[2] + min[2]
    }
}

/// A collider captured into a layer.
#[derive(Clone, Copy, Debug)]
pub struct LayerBody {
    pub entity: hecs::Entity,
    pub shape: WorldShape,
}

/// A spatially bucketed, immutable set of colliders for one frame.
#[derive(Clone, Debug)]
pub struct CollisionLayer {
    calculator: BucketCalculator,
    bucket_ranges: Vec<Range<usize>>,
    bodies: Vec<LayerBody>,
    aabbs: Vec<Aabb>,
    source_indices: Vec<usize>,
}

impl CollisionLayer {
    /// A layer with no colliders, valid for every query.
    pub fn empty(settings: &CollisionLayerSettings) -> Self {
        Self::build(settings, Vec::new())
    }

    /// Sort colliders into buckets.
    ///
    /// The original position of each item is kept in [`source_indices`][Self::source_indices].
    pub fn build(settings: &CollisionLayerSettings, items: Vec<(LayerBody, Aabb)>) -> Self {
        let _span = tracy_span!("build collision layer", "CollisionLayer::build");

        let calculator = BucketCalculator::new(settings);
        let mut keyed: Vec<(usize, usize, LayerBody, Aabb)> = items
            .into_iter()
            .enumerate()
            .map(|(src, (body, aabb))| (calculator.bucket_index(&aabb), src, body, aabb))
            .collect();
        keyed.sort_by(|a, b| match a.0.cmp(&b.0) {
            Ordering::Equal => a.3.min.x.total_cmp(&b.3.min.x),
            other => other,
        });

        let mut bucket_ranges = Vec::with_capacity(calculator.bucket_count());
        let mut start = 0;
        for bucket in 0..calculator.bucket_count() {
            let end = start + keyed[start..].iter().take_while(|k| k.0 == bucket).count();
            bucket_ranges.push(start..end);
            start = end;
        }

        let mut bodies = Vec::with_capacity(keyed.len());
        let mut aabbs = Vec::with_capacity(keyed.len());
        let mut source_indices = Vec::with_capacity(keyed.len());
        for (_, src, body, aabb) in keyed {
            bodies.push(body);
            aabbs.push(aabb);
            source_indices.push(src);
        }

        Self {
            calculator,
            bucket_ranges,
            bodies,
            aabbs,
            source_indices,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    #[inline]
    pub fn bodies(&self) -> &[LayerBody] {
        &self.bodies
    }

    #[inline]
    pub fn aabbs(&self) -> &[Aabb] {
        &self.aabbs
    }

    /// Index each sorted collider had in the list the layer was built from.
    #[inline]
    pub fn source_indices(&self) -> &[usize] {
        &self.source_indices
    }

    #[inline]
    pub fn calculator(&self) -> &BucketCalculator {
        &self.calculator
    }

    /// Ranges of sorted collider indices per bucket:
    /// one per cell, then the cross bucket, then the NaN bucket.
    #[inline]
    pub fn bucket_ranges(&self) -> &[Range<usize>] {
        &self.bucket_ranges
    }

    /// Bucket that the collider at a sorted index lives in.
    pub fn bucket_of(&self, index: usize) -> usize {
        self.bucket_ranges
            .partition_point(|range| range.end <= index)
            .min(self.calculator.nan_bucket())
    }
}

/// Which bucket combination a unit of broad phase work covers.
#[derive(Clone, Copy, Debug)]
enum SweepJob {
    Within(usize),
    Between(usize, usize),
}

/// Find all overlapping pairs within one layer.
///
/// `process` gets sorted indices `(a, b)` with `a < b` and decides what to output for the pair.
/// Output order only depends on the layer contents.
pub fn find_pairs_within<T, F>(layer: &CollisionLayer, process: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize, usize) -> Option<T> + Sync,
{
    let _span = tracy_span!("find pairs within layer", "find_pairs_within");

    let cross = layer.calculator.cross_bucket();
    let mut jobs = Vec::with_capacity(2 * cross + 1);
    for cell in 0..cross {
        jobs.push(SweepJob::Within(cell));
        jobs.push(SweepJob::Between(cell, cross));
    }
    jobs.push(SweepJob::Within(cross));

    run_jobs(&jobs, |job, out| match job {
        SweepJob::Within(bucket) => {
            sweep_within(&layer.aabbs, layer.bucket_ranges[bucket].clone(), out, &process)
        }
        SweepJob::Between(ba, bb) => sweep_between(
            &layer.aabbs,
            layer.bucket_ranges[ba].clone(),
            &layer.aabbs,
            layer.bucket_ranges[bb].clone(),
            out,
            &process,
        ),
    })
}

/// Find all overlapping pairs between two layers.
///
/// `process` gets sorted indices `(a, b)` into `layer_a` and `layer_b` respectively.
pub fn find_pairs_between<T, F>(layer_a: &CollisionLayer, layer_b: &CollisionLayer, process: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize, usize) -> Option<T> + Sync,
{
    let _span = tracy_span!("find pairs between layers", "find_pairs_between");

    let mut jobs = Vec::new();
    if layer_a.calculator.cell_count() == layer_b.calculator.cell_count() {
        let cross = layer_a.calculator.cross_bucket();
        for cell in 0..cross {
            jobs.push(SweepJob::Between(cell, cell));
            jobs.push(SweepJob::Between(cell, cross));
            jobs.push(SweepJob::Between(cross, cell));
        }
        jobs.push(SweepJob::Between(cross, cross));
    } else {
        // differently divided layers can't share cells, test every combination
        let nan_a = layer_a.calculator.nan_bucket();
        let nan_b = layer_b.calculator.nan_bucket();
        for ba in 0..nan_a {
            for bb in 0..nan_b {
                jobs.push(SweepJob::Between(ba, bb));
            }
        }
    }

    run_jobs(&jobs, |job, out| {
        if let SweepJob::Between(ba, bb) = job {
            sweep_between(
                &layer_a.aabbs,
                layer_a.bucket_ranges[ba].clone(),
                &layer_b.aabbs,
                layer_b.bucket_ranges[bb].clone(),
                out,
                &process,
            )
        }
    })
}

/// Run every job and concatenate outputs in job order.
fn run_jobs<T, J>(jobs: &[SweepJob], job_fn: J) -> Vec<T>
where
    T: Send,
    J: Fn(SweepJob, &mut Vec<T>) + Sync,
{
    let run_one = |job: &SweepJob| {
        let mut out = Vec::new();
        job_fn(*job, &mut out);
        out
    };

    #[cfg(feature = "parallel")]
    let per_job: Vec<Vec<T>> = jobs.par_iter().map(run_one).collect();
    #[cfg(not(feature = "parallel"))]
    let per_job: Vec<Vec<T>> = jobs.iter().map(run_one).collect();

    per_job.into_iter().flatten().collect()
}

fn sweep_within<T, F>(aabbs: &[Aabb], range: Range<usize>, out: &mut Vec<T>, process: &F)
where
    F: Fn(usize, usize) -> Option<T>,
{
    for i in range.clone() {
        for k in (i + 1)..range.end {
            if aabbs[k].min.x > aabbs[i].max.x {
                break;
            }
            if aabbs[i].overlaps(&aabbs[k]) {
                out.extend(process(i, k));
            }
        }
    }
}

fn sweep_between<T, F>(
    aabbs_a: &[Aabb],
    range_a: Range<usize>,
    aabbs_b: &[Aabb],
    range_b: Range<usize>,
    out: &mut Vec<T>,
    process: &F,
) where
    F: Fn(usize, usize) -> Option<T>,
{
    let (mut i, mut j) = (range_a.start, range_b.start);
    // whichever list has the lower min x next is swept against the other
    while i < range_a.end && j < range_b.end {
        if aabbs_a[i].min.x <= aabbs_b[j].min.x {
            let mut k = j;
            while k < range_b.end && aabbs_b[k].min.x <= aabbs_a[i].max.x {
                if aabbs_a[i].overlaps(&aabbs_b[k]) {
                    out.extend(process(i, k));
                }
                k += 1;
            }
            i += 1;
        } else {
            let mut k = i;
            while k < range_a.end && aabbs_a[k].min.x <= aabbs_b[j].max.x {
                if aabbs_a[k].overlaps(&aabbs_b[j]) {
                    out.extend(process(k, j));
                }
                k += 1;
            }
            j += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collision::Aabb;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn settings() -> CollisionLayerSettings {
        CollisionLayerSettings {
            world_aabb: Aabb {
                min: Vec3::broadcast(-10.0),
                max: Vec3::broadcast(10.0),
            },
            subdivisions_per_axis: [4, 2, 3],
        }
    }

    fn dummy_body() -> LayerBody {
        LayerBody {
            entity: hecs::Entity::DANGLING,
            shape: WorldShape::Sphere {
                center: Vec3::zero(),
                radius: 0.0,
            },
        }
    }

    fn random_aabbs(rng: &mut StdRng, count: usize) -> Vec<Aabb> {
        (0..count)
            .map(|_| {
                let center = Vec3::new(
                    rng.gen_range(-12.0..12.0),
                    rng.gen_range(-12.0..12.0),
                    rng.gen_range(-12.0..12.0),
                );
                let half = Vec3::new(
                    rng.gen_range(0.1..2.0),
                    rng.gen_range(0.1..2.0),
                    rng.gen_range(0.1..2.0),
                );
                Aabb::from_center_extents(center, half)
            })
            .collect()
    }

    fn build(aabbs: &[Aabb]) -> CollisionLayer {
        CollisionLayer::build(
            &settings(),
            aabbs.iter().map(|&aabb| (dummy_body(), aabb)).collect(),
        )
    }

    #[test]
    fn bucket_assignment() {
        let calc = BucketCalculator::new(&settings());
        assert_eq!(calc.cell_count(), 24);

        let small = Aabb::from_center_extents(Vec3::new(-9.0, -9.0, -9.0), Vec3::broadcast(0.5));
        assert_eq!(calc.bucket_index(&small), 0);
        let far_out = Aabb::from_center_extents(Vec3::new(100.0, 100.0, 100.0), Vec3::one());
        assert_eq!(calc.bucket_index(&far_out), 23);
        let spanning = Aabb::from_center_extents(Vec3::zero(), Vec3::one());
        assert_eq!(calc.bucket_index(&spanning), calc.cross_bucket());
        let broken = Aabb {
            min: Vec3::broadcast(f64::NAN),
            max: Vec3::zero(),
        };
        assert_eq!(calc.bucket_index(&broken), calc.nan_bucket());
    }

    #[test]
    fn zero_subdivisions_are_clamped() {
        let mut s = settings();
        s.subdivisions_per_axis = [0, 0, 0];
        let calc = BucketCalculator::new(&s);
        assert_eq!(calc.cell_count(), 1);
        let aabb = Aabb::from_center_extents(Vec3::zero(), Vec3::one());
        assert_eq!(calc.bucket_index(&aabb), 0);
    }

    #[test]
    fn degenerate_world_still_gives_cell_buckets() {
        let inside = Aabb::from_center_extents(Vec3::broadcast(3.0), Vec3::broadcast(0.1));
        let inverted = CollisionLayerSettings {
            world_aabb: Aabb {
                min: Vec3::broadcast(1.0),
                max: Vec3::broadcast(-1.0),
            },
            subdivisions_per_axis: [2, 2, 2],
        };
        let calc = BucketCalculator::new(&inverted);
        assert_eq!(calc.cell_count(), 8);
        assert!(calc.bucket_index(&inside) < calc.cell_count());

        let unbounded = CollisionLayerSettings {
            world_aabb: Aabb {
                min: Vec3::broadcast(f64::NEG_INFINITY),
                max: Vec3::broadcast(f64::INFINITY),
            },
            subdivisions_per_axis: [2, 2, 2],
        };
        let calc = BucketCalculator::new(&unbounded);
        assert!(calc.bucket_index(&inside) < calc.cell_count());
    }

    #[test]
    fn empty_layer_is_valid() {
        let layer = CollisionLayer::empty(&settings());
        assert!(layer.is_empty());
        assert_eq!(layer.bucket_ranges().len(), 26);
        assert!(find_pairs_within(&layer, |a, b| Some((a, b))).is_empty());
        assert!(find_pairs_between(&layer, &layer, |a, b| Some((a, b))).is_empty());
    }

    #[test]
    fn sorted_layer_keeps_sources() {
        let mut rng = StdRng::seed_from_u64(3);
        let aabbs = random_aabbs(&mut rng, 50);
        let layer = build(&aabbs);
        for (sorted, &src) in layer.source_indices().iter().enumerate() {
            assert_eq!(layer.aabbs()[sorted], aabbs[src]);
            let bucket = layer.bucket_of(sorted);
            assert!(layer.bucket_ranges()[bucket].contains(&sorted));
        }
    }

    #[test]
    fn pairs_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(11);
        let aabbs = random_aabbs(&mut rng, 120);
        let layer = build(&aabbs);
        let srcs = layer.source_indices();

        let mut found: Vec<(usize, usize)> = find_pairs_within(&layer, |a, b| {
            let (x, y) = (srcs[a], srcs[b]);
            Some((x.min(y), x.max(y)))
        });
        found.sort_unstable();

        let mut expected = Vec::new();
        for i in 0..aabbs.len() {
            for k in (i + 1)..aabbs.len() {
                if aabbs[i].overlaps(&aabbs[k]) {
                    expected.push((i, k));
                }
            }
        }
        itertools::assert_equal(found, expected);
    }

    #[test]
    fn pairs_between_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(5);
        let aabbs_a = random_aabbs(&mut rng, 60);
        let aabbs_b = random_aabbs(&mut rng, 40);
        let (layer_a, layer_b) = (build(&aabbs_a), build(&aabbs_b));

        let mut found: Vec<(usize, usize)> = find_pairs_between(&layer_a, &layer_b, |a, b| {
            Some((layer_a.source_indices()[a], layer_b.source_indices()[b]))
        });
        found.sort_unstable();

        let mut expected = Vec::new();
        for (i, a) in aabbs_a.iter().enumerate() {
            for (k, b) in aabbs_b.iter().enumerate() {
                if a.overlaps(b) {
                    expected.push((i, k));
                }
            }
        }
        itertools::assert_equal(found, expected);
    }
}
