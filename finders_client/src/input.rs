//! Input handling.
//!
//! In a real client this would integrate with windowing and key bindings.
//! Here the host hands us a desired displacement per frame; this module
//! turns it into a locally predicted position and decides when that position
//! is worth sending.

use std::time::{Duration, Instant};

use finders_shared::{config::ClientConfig, math::Vec3};

/// Distance since the last send that forces a send.
pub const SEND_THRESHOLD: f32 = 0.1;
/// Time since the last send that forces a send (about 20 Hz).
pub const SEND_INTERVAL: Duration = Duration::from_millis(50);

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
}

impl InputState {
    /// Direction in world space: `+z` forward, `+x` right, `+y` up.
    pub fn wish_vector(self) -> Vec3 {
        Vec3::new(self.right, self.up, self.forward)
    }

    /// Displacement for one frame; diagonals are not faster than straight moves.
    pub fn displacement(self, move_speed: f32, dt: f32) -> Vec3 {
        self.wish_vector().clamp_len_one() * (move_speed * dt)
    }
}

/// Critically damped approach of `current` toward `target` over roughly
/// `smooth_time` seconds. `velocity` carries state between calls.
pub fn smooth_damp(
    current: Vec3,
    target: Vec3,
    velocity: &mut Vec3,
    smooth_time: f32,
    dt: f32,
) -> Vec3 {
    if smooth_time <= 0.0 {
        *velocity = Vec3::ZERO;
        return target;
    }
    if dt <= 0.0 {
        return current;
    }

    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (*velocity + change * omega) * dt;
    *velocity = (*velocity - temp * omega) * decay;
    let mut output = target + (change + temp) * decay;

    // Never overshoot.
    if (target - current).dot(output - target) > 0.0 {
        output = target;
        *velocity = Vec3::ZERO;
    }
    output
}

/// Locally predicted position of the player we control.
#[derive(Debug, Clone, Copy)]
pub struct LocalPrediction {
    position: Vec3,
    target: Vec3,
    velocity: Vec3,
    smooth_time: f32,
}

impl LocalPrediction {
    pub fn new(smooth_time: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            target: Vec3::ZERO,
            velocity: Vec3::ZERO,
            smooth_time,
        }
    }

    /// Places the player at `position` with no pending motion.
    pub fn reset(&mut self, position: Vec3) {
        self.position = position;
        self.target = position;
        self.velocity = Vec3::ZERO;
    }

    /// Adds a displacement to the goal and advances the rendered position.
    pub fn apply(&mut self, displacement: Vec3, dt: f32) -> Vec3 {
        self.target += displacement;
        self.position = smooth_damp(
            self.position,
            self.target,
            &mut self.velocity,
            self.smooth_time,
            dt,
        );
        self.position
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }
}

/// Decides when the local position should go on the wire.
///
/// A send is due when the player moved more than `threshold` since the last
/// send, or when more than `interval` has passed. Either condition alone is
/// enough.
#[derive(Debug, Clone)]
pub struct SendThrottler {
    threshold: f32,
    interval: Duration,
    last_sent_pos: Vec3,
    last_sent_time: Option<Instant>,
}

impl Default for SendThrottler {
    fn default() -> Self {
        Self::new(SEND_THRESHOLD, SEND_INTERVAL)
    }
}

impl SendThrottler {
    pub fn new(threshold: f32, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            last_sent_pos: Vec3::ZERO,
            last_sent_time: None,
        }
    }

    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::new(cfg.send_threshold, cfg.send_interval())
    }

    /// The pure decision. A missing `last_sent_time` counts as overdue.
    pub fn should_send(
        &self,
        current_pos: Vec3,
        last_sent_pos: Vec3,
        now: Instant,
        last_sent_time: Option<Instant>,
    ) -> bool {
        if current_pos.distance(last_sent_pos) > self.threshold {
            return true;
        }
        match last_sent_time {
            Some(at) => now.saturating_duration_since(at) > self.interval,
            None => true,
        }
    }

    /// Whether `current_pos` is due against the recorded baseline.
    pub fn is_due(&self, current_pos: Vec3, now: Instant) -> bool {
        self.should_send(current_pos, self.last_sent_pos, now, self.last_sent_time)
    }

    /// Records a send attempt.
    ///
    /// Callers record every attempt, including ones the connection dropped, so
    /// stale samples never pile up waiting for a reconnect.
    pub fn mark_sent(&mut self, pos: Vec3, now: Instant) {
        self.last_sent_pos = pos;
        self.last_sent_time = Some(now);
    }

    /// Moves the baseline without counting as a send.
    pub fn reset(&mut self, pos: Vec3) {
        self.last_sent_pos = pos;
        self.last_sent_time = None;
    }

    pub fn last_sent(&self) -> (Vec3, Option<Instant>) {
        (self.last_sent_pos, self.last_sent_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_alone_triggers_send() {
        let throttler = SendThrottler::default();
        let now = Instant::now();
        assert!(throttler.should_send(
            Vec3::new(0.11, 0.0, 0.0),
            Vec3::ZERO,
            now,
            Some(now)
        ));
        assert!(!throttler.should_send(
            Vec3::new(0.05, 0.0, 0.0),
            Vec3::ZERO,
            now,
            Some(now)
        ));
    }

    #[test]
    fn elapsed_time_alone_triggers_send() {
        let throttler = SendThrottler::default();
        let sent = Instant::now();
        assert!(!throttler.should_send(
            Vec3::ZERO,
            Vec3::ZERO,
            sent + Duration::from_millis(50),
            Some(sent)
        ));
        assert!(throttler.should_send(
            Vec3::ZERO,
            Vec3::ZERO,
            sent + Duration::from_millis(51),
            Some(sent)
        ));
    }

    #[test]
    fn first_sample_is_always_due() {
        let throttler = SendThrottler::default();
        assert!(throttler.is_due(Vec3::ZERO, Instant::now()));
    }

    #[test]
    fn mark_sent_moves_baseline() {
        let mut throttler = SendThrottler::default();
        let now = Instant::now();
        throttler.mark_sent(Vec3::new(1.0, 0.0, 0.0), now);
        assert!(!throttler.is_due(Vec3::new(1.05, 0.0, 0.0), now));
        assert!(throttler.is_due(Vec3::new(1.2, 0.0, 0.0), now));
    }

    #[test]
    fn diagonal_input_is_normalized() {
        let input = InputState {
            forward: 1.0,
            right: 1.0,
            up: 0.0,
        };
        let d = input.displacement(5.0, 0.1);
        assert!((d.len() - 0.5).abs() < 1e-5);
        assert!(d.z > 0.0 && d.x > 0.0);
    }

    #[test]
    fn prediction_converges_without_overshoot() {
        let mut prediction = LocalPrediction::new(0.1);
        prediction.apply(Vec3::new(1.0, 0.0, 0.0), 1.0 / 60.0);
        let mut last = prediction.position().x;
        assert!(last > 0.0 && last < 1.0);
        for _ in 0..240 {
            let x = prediction.apply(Vec3::ZERO, 1.0 / 60.0).x;
            assert!(x >= last - 1e-6);
            assert!(x <= 1.0 + 1e-6);
            last = x;
        }
        assert!((last - 1.0).abs() < 1e-3);
    }

    #[test]
    fn zero_smooth_time_snaps() {
        let mut prediction = LocalPrediction::new(0.0);
        prediction.reset(Vec3::new(2.0, 0.0, 0.0));
        let pos = prediction.apply(Vec3::new(0.0, 0.0, 3.0), 0.016);
        assert_eq!(pos, Vec3::new(2.0, 0.0, 3.0));
    }
}
