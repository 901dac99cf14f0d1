//! The iterative solver: sequential impulses over the combined pair stream.
//!
//! Velocities live in the captured states and are updated in place,
//! so every constraint sees the effect of the ones solved before it.

use super::{
    capture::{CapturedKinematic, CapturedRigidBodyState},
    collision::CollisionLayer,
    constraint::{ContactJacobian, SolverBody},
    pair_stream::{Pair, PairData, PairStream, PairTarget},
    settings::PhysicsSettings,
    stabilizer::{self, is_significant},
    ContactEvent, ContactOther, Velocity,
};

use std::ops::Range;

impl CapturedRigidBodyState {
    fn solver_body(&mut self) -> SolverBody<'_> {
        SolverBody {
            velocity: &mut self.velocity,
            inverse_mass: self.inverse_mass,
            inverse_inertia_scale: self.motion_stabilizer.inverse_inertia_scale,
        }
    }
}

/// Run every solver iteration over `stream`.
///
/// `bucket_ranges` are the state ranges of each body bucket,
/// as given by [`CollisionLayer::bucket_ranges`].
/// Pairs in a cell or cross bucket must only refer to states within that bucket's range.
pub fn solve(
    states: &mut [CapturedRigidBodyState],
    bucket_ranges: &[Range<usize>],
    stream: &mut PairStream,
    kinematics: &[CapturedKinematic],
    settings: &PhysicsSettings,
    dt: f64,
) {
    let _span = tracy_span!("solve constraints", "solve");

    let mixed = stream.mixed_bucket();
    let bucketed_separately = bucket_ranges.len() >= mixed;
    if !bucketed_separately {
        log::warn!(
            "Pair stream has {} buckets but only {} body ranges were given, solving serially",
            stream.bucket_count(),
            bucket_ranges.len()
        );
    }

    for iteration in 0..settings.num_iterations.max(1) {
        let first_iteration = iteration == 0;
        let (local_buckets, mixed_buckets) = stream.buckets_mut().split_at_mut(mixed);

        if bucketed_separately {
            let slices = split_by_ranges(states, &bucket_ranges[..mixed]);
            let work = slices.into_iter().zip(local_buckets.iter_mut());
            type BucketWork<'a> = ((usize, &'a mut [CapturedRigidBodyState]), &'a mut Vec<Pair>);
            let solve_one = |((offset, bucket_states), pairs): BucketWork<'_>| {
                solve_pairs(bucket_states, offset, pairs, kinematics, first_iteration)
            };

            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;
                work.collect::<Vec<_>>().into_par_iter().for_each(solve_one);
            }
            #[cfg(not(feature = "parallel"))]
            work.for_each(solve_one);
        } else {
            for pairs in local_buckets.iter_mut() {
                solve_pairs(states, 0, pairs, kinematics, first_iteration);
            }
        }

        for pairs in mixed_buckets.iter_mut() {
            solve_pairs(states, 0, pairs, kinematics, first_iteration);
        }

        stabilizer::stabilize_bodies(states, dt, first_iteration);
    }
}

/// Cut `states` into disjoint slices along `ranges`, tagged with their starting index.
fn split_by_ranges<'a, T>(states: &'a mut [T], ranges: &[Range<usize>]) -> Vec<(usize, &'a mut [T])> {
    let mut slices = Vec::with_capacity(ranges.len());
    let mut rest = states;
    let mut offset = 0;
    for range in ranges {
        let skip = range.start.saturating_sub(offset).min(rest.len());
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(skip);
        offset += skip;
        let len = range.len().min(tail.len());
        let (head, tail) = tail.split_at_mut(len);
        slices.push((offset, head));
        offset += len;
        rest = tail;
    }
    slices
}

/// Two distinct elements of a slice, mutably.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a.max(b) >= slice.len() {
        return None;
    }
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = slice.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}

/// Solve one bucket's pairs in order.
/// `states` starts at global state index `offset`.
/// Contacts that were touching at the start of the tick.
/// Speculative contacts don't count, or a falling body would be clipped to a halt above the ground.
fn carries_load(jac: &ContactJacobian) -> bool {
    jac.is_touching()
}

fn solve_pairs(
    states: &mut [CapturedRigidBodyState],
    offset: usize,
    pairs: &mut [Pair],
    kinematics: &[CapturedKinematic],
    count_contacts: bool,
) {
    for pair in pairs {
        let Some(a) = pair.a.checked_sub(offset).filter(|&a| a < states.len()) else {
            log::error!("Pair refers to body {} outside of its bucket", pair.a);
            continue;
        };

        match (&mut pair.data, pair.b) {
            (PairData::ContactEnvironment(jac), _) => {
                let mut ground = Velocity::default();
                jac.solve(&mut states[a].solver_body(), &mut SolverBody::immovable(&mut ground));
                if count_contacts && carries_load(jac) {
                    states[a].num_significant_contacts += 1;
                }
            }
            (PairData::ContactKinematic(jac), PairTarget::Kinematic(k)) => {
                let Some(kinematic) = kinematics.get(k) else {
                    continue;
                };
                let mut mover = kinematic.velocity;
                jac.solve(&mut states[a].solver_body(), &mut SolverBody::immovable(&mut mover));
                if count_contacts && carries_load(jac) {
                    states[a].num_significant_contacts += 1;
                }
            }
            (PairData::ContactBody(jac), PairTarget::Body(b)) => {
                let Some((state_a, state_b)) =
                    b.checked_sub(offset).and_then(|b| pair_mut(states, a, b))
                else {
                    log::error!("Body pair ({}, {}) crosses bucket boundaries", pair.a, b);
                    continue;
                };
                jac.solve(&mut state_a.solver_body(), &mut state_b.solver_body());
                if count_contacts && carries_load(jac) {
                    if is_significant(state_a.inverse_mass, state_b.inverse_mass) {
                        state_a.num_significant_contacts += 1;
                    }
                    if is_significant(state_b.inverse_mass, state_a.inverse_mass) {
                        state_b.num_significant_contacts += 1;
                    }
                }
            }
            (PairData::PositionLock(jac), _) => jac.solve(&mut states[a].solver_body()),
            (PairData::RotationLock1(jac), _) => jac.solve(&mut states[a].solver_body()),
            (PairData::RotationLock2(jac), _) => jac.solve(&mut states[a].solver_body()),
            (PairData::RotationLock3(jac), _) => jac.solve(&mut states[a].solver_body()),
            (data, target) => {
                log::error!("Pair data {:?} doesn't match target {:?}", data, target);
            }
        }
    }
}

/// Report every contact that pushed on a body during the solve.
pub fn contact_events(
    stream: &PairStream,
    states: &[CapturedRigidBodyState],
    kinematics: &[CapturedKinematic],
    environment: &CollisionLayer,
) -> Vec<ContactEvent> {
    let _span = tracy_span!("collect contact events", "contact_events");

    stream
        .iter()
        .filter_map(|pair| {
            let jac = pair.data.as_contact()?;
            let point = jac.impulse_weighted_location()?;
            let entity = states.get(pair.a)?.entity;
            let other = match pair.b {
                PairTarget::Body(b) => ContactOther::Body(states.get(b)?.entity),
                PairTarget::Kinematic(k) => ContactOther::Kinematic(kinematics.get(k)?.entity),
                PairTarget::Environment(e) => {
                    ContactOther::Environment(environment.bodies().get(e)?.entity)
                }
                PairTarget::None => return None,
            };
            Some(ContactEvent {
                entity,
                other,
                point,
                normal: jac.normal,
                impulse: jac.total_normal_impulse(),
            })
        })
        .collect()
}
