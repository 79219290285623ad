//! Bounded, time-ordered history of estimated vehicle poses
//!
//! The estimator is the only writer; any number of readers (terrain mapping, reporting) ask
//! for the pose at an arbitrary timestamp. The buffer is small, guarded by a mutex, and the
//! lock is only held while entries are copied in or out. Interpolation runs after the lock has
//! been released.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::error::{EstimatorError, Result};
use crate::interpolate::{self, InterpolationStrategy};
use crate::pose::{Pose, TimestampedPose};

/// Number of poses kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 4;

/// Answer to a "pose at time" query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PoseQuery {
    /// The interpolated pose, stamped with the requested time and the CEP of the newer bracket
    Found(TimestampedPose),
    /// The requested time is newer than anything estimated so far; ask again later
    NotYet,
    /// The requested time has already been evicted from the history
    TooLate,
}
impl PoseQuery {
    pub fn found(&self) -> Option<&TimestampedPose> {
        match self {
            PoseQuery::Found(pose) => Some(pose),
            _ => None,
        }
    }
    pub fn is_found(&self) -> bool {
        matches!(self, PoseQuery::Found(_))
    }
}

#[derive(Debug)]
pub struct PoseHistory {
    capacity: usize,
    strategy: InterpolationStrategy,
    poses: Mutex<VecDeque<TimestampedPose>>,
}
impl Default for PoseHistory {
    fn default() -> Self {
        PoseHistory::new(DEFAULT_CAPACITY, InterpolationStrategy::default())
    }
}
impl PoseHistory {
    /// Create an empty history. Capacities below two cannot bracket a query and are raised to
    /// two.
    pub fn new(capacity: usize, strategy: InterpolationStrategy) -> Self {
        let capacity = capacity.max(2);
        PoseHistory {
            capacity,
            strategy,
            poses: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TimestampedPose>> {
        self.poses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a pose, evicting the oldest entry when full.
    ///
    /// A timestamp older than the newest stored entry is rejected and leaves the history
    /// unchanged; an equal timestamp is accepted.
    pub fn add_pose(&self, pose: Pose, cep: f64, timestamp_ns: u64) -> Result<()> {
        let mut poses = self.lock();
        if let Some(newest) = poses.back() {
            if timestamp_ns < newest.timestamp_ns {
                let newest_ns = newest.timestamp_ns;
                drop(poses);
                warn!("rejecting out-of-order pose at {timestamp_ns} ns (newest {newest_ns} ns)");
                return Err(EstimatorError::OutOfOrderTimestamp {
                    timestamp_ns,
                    newest_ns,
                });
            }
        }
        if poses.len() == self.capacity {
            poses.pop_front();
        }
        poses.push_back(TimestampedPose::new(pose, timestamp_ns, cep));
        Ok(())
    }

    /// Pose of the vehicle at `timestamp_ns`.
    ///
    /// Searches from the newest pair of entries backwards for `prev.t <= t <= curr.t` and
    /// interpolates between them with the configured strategy.
    pub fn pose_at_time(&self, timestamp_ns: u64) -> PoseQuery {
        let bracket = {
            let poses = self.lock();
            let Some(newest) = poses.back() else {
                return PoseQuery::NotYet;
            };
            if timestamp_ns > newest.timestamp_ns {
                return PoseQuery::NotYet;
            }
            if poses.len() < 2 {
                // A later pose can still bracket a query at the newest time.
                return if timestamp_ns == newest.timestamp_ns {
                    PoseQuery::NotYet
                } else {
                    PoseQuery::TooLate
                };
            }
            poses
                .iter()
                .rev()
                .zip(poses.iter().rev().skip(1))
                .find(|(_, prev)| prev.timestamp_ns <= timestamp_ns)
                .map(|(curr, prev)| (*prev, *curr))
        };

        match bracket {
            Some((prev, curr)) => {
                let pose = interpolate::interpolate(
                    &prev.pose,
                    prev.timestamp_ns,
                    &curr.pose,
                    curr.timestamp_ns,
                    timestamp_ns,
                    self.strategy,
                );
                PoseQuery::Found(TimestampedPose::new(pose, timestamp_ns, curr.cep))
            }
            None => PoseQuery::TooLate,
        }
    }

    /// The most recently added pose.
    pub fn latest(&self) -> Option<TimestampedPose> {
        self.lock().back().copied()
    }
    pub fn len(&self) -> usize {
        self.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn strategy(&self) -> InterpolationStrategy {
        self.strategy
    }
    pub fn clear(&self) {
        self.lock().clear();
    }
}
