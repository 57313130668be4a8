//! Profile follower: per-axis trajectory queue execution.
//!
//! Holds one sample queue per motion axis and consumes one sample per axis
//! each time the host pumps it. The state machine enqueues profiles and
//! polls per-axis completion; it never waits on the follower.

use std::collections::VecDeque;

use crate::trajectory::TrajectorySample;

/// Motion axes driven by the follower.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Straight-line displacement
    Linear,
    /// Chassis heading
    Heading,
}

/// Setpoints reported to the drive after each pump.
#[derive(Clone, Copy, Debug, Default)]
pub struct DriveSetpoint {
    /// Commanded linear velocity (m/s)
    pub linear_velocity: f32,
    /// Commanded absolute heading (radians)
    pub heading: f32,
}

/// Per-axis trajectory execution engine.
pub struct ProfileFollower {
    linear: VecDeque<TrajectorySample>,
    heading: VecDeque<TrajectorySample>,
    executing: bool,
    setpoint: DriveSetpoint,
}

impl ProfileFollower {
    pub fn new() -> Self {
        Self {
            linear: VecDeque::new(),
            heading: VecDeque::new(),
            executing: false,
            setpoint: DriveSetpoint::default(),
        }
    }

    /// Enqueue new samples per axis, appended or replacing the current queue.
    ///
    /// Only the axes passed as `Some` are touched; `overwrite` replaces the
    /// existing samples of those axes instead of appending.
    pub fn modify_queue(
        &mut self,
        heading: Option<Vec<TrajectorySample>>,
        linear: Option<Vec<TrajectorySample>>,
        overwrite: bool,
    ) {
        if let Some(samples) = heading {
            if overwrite {
                self.heading.clear();
            }
            tracing::debug!(
                "modify_queue: heading {} samples (overwrite={})",
                samples.len(),
                overwrite
            );
            self.heading.extend(samples);
        }
        if let Some(samples) = linear {
            if overwrite {
                self.linear.clear();
            }
            tracing::debug!(
                "modify_queue: linear {} samples (overwrite={})",
                samples.len(),
                overwrite
            );
            self.linear.extend(samples);
        }
    }

    /// Begin or resume consuming the queued samples.
    pub fn execute_queue(&mut self) {
        self.executing = true;
    }

    /// Halt consumption and clear all queued motion.
    pub fn stop(&mut self) {
        if self.executing || self.has_pending(Axis::Linear) || self.has_pending(Axis::Heading) {
            tracing::info!(
                "follower stop: dropping {} linear / {} heading samples",
                self.linear.len(),
                self.heading.len()
            );
        }
        self.linear.clear();
        self.heading.clear();
        self.executing = false;
        self.setpoint.linear_velocity = 0.0;
    }

    /// True while unconsumed samples remain for the axis. An empty queue
    /// signals motion-goal completion for that axis.
    pub fn has_pending(&self, axis: Axis) -> bool {
        match axis {
            Axis::Linear => !self.linear.is_empty(),
            Axis::Heading => !self.heading.is_empty(),
        }
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Consume at most one sample per axis and report the current setpoints.
    ///
    /// When an axis's queue is empty its last setpoint is held, so a linear
    /// leg keeps the heading reached by the previous rotation.
    pub fn advance(&mut self) -> DriveSetpoint {
        if !self.executing {
            return DriveSetpoint {
                linear_velocity: 0.0,
                heading: self.setpoint.heading,
            };
        }
        if let Some(sample) = self.linear.pop_front() {
            self.setpoint.linear_velocity = sample.velocity;
        }
        if let Some(sample) = self.heading.pop_front() {
            self.setpoint.heading = sample.position;
        }
        self.setpoint
    }
}

impl Default for ProfileFollower {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[(f32, f32)]) -> Vec<TrajectorySample> {
        values
            .iter()
            .map(|&(position, velocity)| TrajectorySample { position, velocity })
            .collect()
    }

    #[test]
    fn test_enqueue_and_consume() {
        let mut follower = ProfileFollower::new();
        follower.modify_queue(None, Some(samples(&[(0.1, 1.0), (0.2, 0.0)])), false);
        follower.execute_queue();

        assert!(follower.has_pending(Axis::Linear));
        assert!(!follower.has_pending(Axis::Heading));

        let sp = follower.advance();
        assert_eq!(sp.linear_velocity, 1.0);
        let sp = follower.advance();
        assert_eq!(sp.linear_velocity, 0.0);
        assert!(!follower.has_pending(Axis::Linear));
    }

    #[test]
    fn test_no_consumption_before_execute() {
        let mut follower = ProfileFollower::new();
        follower.modify_queue(Some(samples(&[(0.5, 1.0)])), None, false);

        let sp = follower.advance();
        assert_eq!(sp.linear_velocity, 0.0);
        assert!(follower.has_pending(Axis::Heading));
    }

    #[test]
    fn test_overwrite_replaces_only_given_axis() {
        let mut follower = ProfileFollower::new();
        follower.modify_queue(
            Some(samples(&[(0.1, 1.0), (0.2, 1.0)])),
            Some(samples(&[(0.5, 2.0)])),
            false,
        );
        follower.modify_queue(Some(samples(&[(0.9, 1.0)])), None, true);

        // Heading queue replaced, linear untouched
        assert!(follower.has_pending(Axis::Linear));
        follower.execute_queue();
        let sp = follower.advance();
        assert_eq!(sp.heading, 0.9);
        assert!(!follower.has_pending(Axis::Heading));
    }

    #[test]
    fn test_append_extends_queue() {
        let mut follower = ProfileFollower::new();
        follower.modify_queue(None, Some(samples(&[(0.1, 1.0)])), false);
        follower.modify_queue(None, Some(samples(&[(0.2, 1.0)])), false);
        follower.execute_queue();

        follower.advance();
        assert!(follower.has_pending(Axis::Linear));
        follower.advance();
        assert!(!follower.has_pending(Axis::Linear));
    }

    #[test]
    fn test_holds_last_heading_when_queue_empty() {
        let mut follower = ProfileFollower::new();
        follower.modify_queue(Some(samples(&[(0.7, 1.0)])), None, false);
        follower.execute_queue();

        follower.advance();
        // Queue drained; heading setpoint held on later pumps
        let sp = follower.advance();
        assert_eq!(sp.heading, 0.7);
        let sp = follower.advance();
        assert_eq!(sp.heading, 0.7);
    }

    #[test]
    fn test_stop_clears_queues_and_intent() {
        let mut follower = ProfileFollower::new();
        follower.modify_queue(
            Some(samples(&[(0.5, 1.0)])),
            Some(samples(&[(0.1, 2.0)])),
            false,
        );
        follower.execute_queue();
        follower.advance();
        follower.stop();

        assert!(!follower.is_executing());
        assert!(!follower.has_pending(Axis::Linear));
        assert!(!follower.has_pending(Axis::Heading));
        assert_eq!(follower.advance().linear_velocity, 0.0);
    }
}
