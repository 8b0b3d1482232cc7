//! Interpolation.
//!
//! The server reports remote positions whenever they change; the client
//! renders at its own rate. Each remote player's rendered position approaches
//! its last reported target exponentially:
//! `rendered = lerp(rendered, target, min(1, rate * dt))`.
//! There is no extrapolation: without new updates the rendered position
//! settles on the last target and stays there.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use finders_shared::{math::Vec3, net::PlayerId};

/// Smoothing state for one remote player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteMotion {
    pub rendered: Vec3,
    pub target: Vec3,
    pub last_update: Instant,
}

/// Per-player smoothing table.
#[derive(Debug)]
pub struct MotionSmoother {
    entities: HashMap<PlayerId, RemoteMotion>,
    smooth_rate: f32,
    enabled: bool,
}

impl MotionSmoother {
    pub fn new(smooth_rate: f32, enabled: bool) -> Self {
        Self {
            entities: HashMap::new(),
            smooth_rate,
            enabled,
        }
    }

    /// Starts tracking a player at `position` (rendered and target coincide).
    pub fn spawn(&mut self, id: PlayerId, position: Vec3, now: Instant) {
        self.entities.insert(
            id,
            RemoteMotion {
                rendered: position,
                target: position,
                last_update: now,
            },
        );
    }

    /// Records a new reported position. Returns `false` for untracked ids.
    pub fn set_target(&mut self, id: &PlayerId, position: Vec3, now: Instant) -> bool {
        let Some(motion) = self.entities.get_mut(id) else {
            return false;
        };
        motion.target = position;
        motion.last_update = now;
        if !self.enabled {
            motion.rendered = position;
        }
        true
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<RemoteMotion> {
        self.entities.remove(id)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Advances every rendered position by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        let t = (self.smooth_rate * dt.max(0.0)).min(1.0);
        for motion in self.entities.values_mut() {
            motion.rendered = motion.rendered.lerp(motion.target, t);
        }
    }

    pub fn get(&self, id: &PlayerId) -> Option<&RemoteMotion> {
        self.entities.get(id)
    }

    pub fn rendered_position(&self, id: &PlayerId) -> Option<Vec3> {
        self.entities.get(id).map(|m| m.rendered)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Players whose last update is older than `after`.
    pub fn stale(&self, now: Instant, after: Duration) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self
            .entities
            .iter()
            .filter(|(_, m)| now.saturating_duration_since(m.last_update) > after)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
