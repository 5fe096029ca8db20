//! Bounded in-memory collection of trajectories for one owner.
//!
//! The only retention policy is recency: once `max_trajectories` is reached,
//! each insert evicts the oldest-inserted trajectory. Quality gating happens
//! before trajectories get here.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::PoolConfig;
use crate::obs;

use super::Trajectory;

#[derive(Debug, Default)]
struct PoolState {
    /// Insertion order, oldest at the front.
    order: VecDeque<String>,
    by_id: HashMap<String, Trajectory>,
}

/// FIFO-bounded trajectory store, safe to share across threads.
#[derive(Debug)]
pub struct TrajectoryPool {
    owner: String,
    max_trajectories: usize,
    state: Mutex<PoolState>,
}

impl TrajectoryPool {
    /// A `max_trajectories` of zero is treated as one.
    pub fn new(owner: &str, max_trajectories: usize) -> Self {
        Self {
            owner: owner.to_string(),
            max_trajectories: max_trajectories.max(1),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(&config.owner, config.max_trajectories)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn max_trajectories(&self) -> usize {
        self.max_trajectories
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `trajectory`, returning the one evicted to make room, if any.
    ///
    /// Re-adding an id that is already present replaces the stored record and
    /// moves it to the newest position.
    pub fn add(&self, trajectory: Trajectory) -> Option<Trajectory> {
        let evicted = {
            let mut state = self.lock();
            let id = trajectory.trajectory_id.clone();
            if state.by_id.insert(id.clone(), trajectory).is_some() {
                state.order.retain(|existing| existing != &id);
                state.order.push_back(id);
                None
            } else {
                state.order.push_back(id);
                if state.order.len() > self.max_trajectories {
                    state
                        .order
                        .pop_front()
                        .and_then(|oldest| state.by_id.remove(&oldest))
                } else {
                    None
                }
            }
        };

        if let Some(ref t) = evicted {
            obs::emit_pool_evicted(&self.owner, &t.trajectory_id);
        }
        evicted
    }

    pub fn get_trajectory(&self, trajectory_id: &str) -> Option<Trajectory> {
        self.lock().by_id.get(trajectory_id).cloned()
    }

    pub fn contains(&self, trajectory_id: &str) -> bool {
        self.lock().by_id.contains_key(trajectory_id)
    }

    pub fn size(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Up to `limit` trajectories, most recently inserted first.
    pub fn recent(&self, limit: usize) -> Vec<Trajectory> {
        let state = self.lock();
        state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.by_id.get(id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Up to `limit` trajectories with the highest success score.
    /// Ties go to the more recently inserted trajectory.
    pub fn best(&self, limit: usize) -> Vec<Trajectory> {
        let mut all = self.recent(usize::MAX);
        all.sort_by(|a, b| b.success_score.total_cmp(&a.success_score));
        all.truncate(limit);
        all
    }

    /// Drop every trajectory; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let n = state.order.len();
        state.order.clear();
        state.by_id.clear();
        n
    }
}
