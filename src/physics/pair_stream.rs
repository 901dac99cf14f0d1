//! Bucketed storage for everything the solver iterates over.
//!
//! Pairs are grouped by the collision layer bucket of the dynamic bodies they touch.
//! A pair whose bodies all live in the same bucket only ever touches that bucket's
//! states, which lets the solver process buckets in parallel.
//! Pairs joining bodies from different buckets go into a trailing mixed bucket
//! that is solved on its own.

use super::{
    collision::BucketCalculator,
    constraint::{
        ContactJacobian, PositionLockJacobian, RotationLock1Jacobian, RotationLock2Jacobian,
        RotationLock3Jacobian,
    },
};

/// The second participant of a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairTarget {
    /// Another dynamic body, by its index in the captured states.
    Body(usize),
    /// A kinematic body, by its index in the captured kinematics.
    Kinematic(usize),
    /// A static collider, by its index in the environment layer.
    Environment(usize),
    /// The world itself, for locks.
    None,
}

/// Constraint data attached to a pair, selecting how the solver treats it.
#[derive(Clone, Debug)]
pub enum PairData {
    ContactEnvironment(ContactJacobian),
    ContactKinematic(ContactJacobian),
    ContactBody(ContactJacobian),
    PositionLock(PositionLockJacobian),
    RotationLock1(RotationLock1Jacobian),
    RotationLock2(RotationLock2Jacobian),
    RotationLock3(RotationLock3Jacobian),
}

impl PairData {
    pub fn as_contact(&self) -> Option<&ContactJacobian> {
        match self {
            PairData::ContactEnvironment(jac)
            | PairData::ContactKinematic(jac)
            | PairData::ContactBody(jac) => Some(jac),
            _ => None,
        }
    }
}

/// Something for the solver to do, involving dynamic body `a` and optionally something else.
#[derive(Clone, Debug)]
pub struct Pair {
    /// Index of a dynamic body in the captured states.
    pub a: usize,
    pub b: PairTarget,
    pub data: PairData,
}

#[derive(Clone, Debug)]
pub struct PairStream {
    buckets: Vec<Vec<Pair>>,
}

impl PairStream {
    /// Create an empty stream with buckets matching a collision layer.
    pub fn new(calculator: &BucketCalculator) -> Self {
        // one bucket per cell, the cross bucket and the mixed bucket
        Self::with_bucket_count(calculator.cell_count() + 2)
    }

    fn with_bucket_count(count: usize) -> Self {
        Self {
            buckets: (0..count.max(1)).map(|_| Vec::new()).collect(),
        }
    }

    /// Index of the bucket for pairs spanning several body buckets.
    #[inline]
    pub fn mixed_bucket(&self) -> usize {
        self.buckets.len() - 1
    }

    /// Bucket for a pair given the body buckets of its dynamic participants.
    /// `bucket_b` is `None` if the second participant isn't a dynamic body.
    pub fn bucket_for(&self, bucket_a: usize, bucket_b: Option<usize>) -> usize {
        let mixed = self.mixed_bucket();
        match bucket_b {
            Some(bucket_b) if bucket_b != bucket_a => mixed,
            // bodies with broken bounds also land here
            _ => bucket_a.min(mixed),
        }
    }

    /// Add a pair to the given bucket, as obtained from [`bucket_for`][Self::bucket_for].
    pub fn push(&mut self, bucket: usize, pair: Pair) {
        let bucket = bucket.min(self.mixed_bucket());
        self.buckets[bucket].push(pair);
    }

    /// Move every pair from `other` to the end of the matching bucket in `self`.
    pub fn concatenate_from(&mut self, other: PairStream) {
        if other.buckets.len() != self.buckets.len() {
            log::warn!(
                "Concatenating pair streams with different bucket counts ({} and {}), merging into the mixed bucket",
                self.buckets.len(),
                other.buckets.len()
            );
            let mixed = self.mixed_bucket();
            for bucket in other.buckets {
                self.buckets[mixed].extend(bucket);
            }
            return;
        }
        for (ours, theirs) in self.buckets.iter_mut().zip(other.buckets) {
            ours.extend(theirs);
        }
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    pub fn buckets(&self) -> &[Vec<Pair>] {
        &self.buckets
    }

    pub fn buckets_mut(&mut self) -> &mut [Vec<Pair>] {
        &mut self.buckets
    }

    /// Every pair, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.buckets.iter().flatten()
    }
}

/// Merge the pair streams of one tick into the one the solver runs over.
///
/// Within each bucket, environment contacts come first,
/// then kinematic contacts, body contacts and finally locks.
pub fn combine_streams(
    mut environment: PairStream,
    kinematic: PairStream,
    body: PairStream,
    locks: PairStream,
) -> PairStream {
    let _span = tracy_span!("combine pair streams", "combine_streams");

    environment.concatenate_from(kinematic);
    environment.concatenate_from(body);
    environment.concatenate_from(locks);
    environment
}
