//! Peg alignment state machine.
//!
//! Approaches the airship, squares up to the selected peg face, corrects
//! lateral displacement in a closed measure/correct loop, places the gear
//! and retreats. The host calls [`AlignController::tick`] at a fixed
//! cadence; each tick does a bounded amount of work and makes at most one
//! state transition. Motion goals are delegated to the profile follower and
//! polled, never awaited.

use crate::alignment::geometry::{ApproachGeometry, PegTarget, displacement_error};
use crate::config::AlignConfig;
use crate::devices::{GearMechanism, HeadingSensor, RangeSensor, VisionSensor};
use crate::follower::{Axis, ProfileFollower};
use crate::trajectory::generate_trapezoidal;

/// State of the alignment run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignState {
    /// Waiting for enable
    Idle,
    /// Driving the forward leg into sensor range of the structure
    DriveToAirship,
    /// Rotating to the squared approach heading
    RotateTowardsAirship,
    /// Refining heading from vision, then measuring lateral displacement
    MeasurePosition,
    /// Rotating back to heading zero for the correction drive
    RotateStraight,
    /// Driving out the measured lateral displacement
    DriveAlignSegment,
    /// Final vision refinement before the wall approach
    RotateTowardsPeg,
    /// Driving onto the peg while the gear mechanism executes
    DriveToWall,
    /// Retreating after placement
    RollBack,
    /// Run finished successfully
    Done,
    /// Run aborted (stalled motion goal)
    Failed,
}

impl AlignState {
    pub fn name(&self) -> &'static str {
        match self {
            AlignState::Idle => "idle",
            AlignState::DriveToAirship => "drive_to_airship",
            AlignState::RotateTowardsAirship => "rotate_towards_airship",
            AlignState::MeasurePosition => "measure_position",
            AlignState::RotateStraight => "rotate_straight",
            AlignState::DriveAlignSegment => "drive_align_segment",
            AlignState::RotateTowardsPeg => "rotate_towards_peg",
            AlignState::DriveToWall => "drive_to_wall",
            AlignState::RollBack => "roll_back",
            AlignState::Done => "done",
            AlignState::Failed => "failed",
        }
    }
}

/// Result of one controller tick, for diagnostics only.
#[derive(Clone, Copy, Debug)]
pub struct AlignStatus {
    pub state: AlignState,
    pub transitioned: bool,
}

/// The alignment state machine.
pub struct AlignController<H, R, V, G> {
    config: AlignConfig,
    target: PegTarget,
    geometry: ApproachGeometry,
    follower: ProfileFollower,
    heading: H,
    range: R,
    vision: V,
    gear: G,
    state: AlignState,
    first_tick: bool,
    ticks_in_state: u32,
    displacement_error: Option<f32>,
}

impl<H, R, V, G> AlignController<H, R, V, G>
where
    H: HeadingSensor,
    R: RangeSensor,
    V: VisionSensor,
    G: GearMechanism,
{
    pub fn new(config: AlignConfig, target: PegTarget, heading: H, range: R, vision: V, gear: G) -> Self {
        let geometry = ApproachGeometry::for_target(target, &config.geometry);
        Self {
            config,
            target,
            geometry,
            follower: ProfileFollower::new(),
            heading,
            range,
            vision,
            gear,
            state: AlignState::Idle,
            first_tick: false,
            ticks_in_state: 0,
            displacement_error: None,
        }
    }

    /// Start (or restart) the run.
    ///
    /// Zeros the heading reference, stops any queued motion, stows the gear
    /// mechanism and recomputes the approach geometry before entering the
    /// initial state. Calling this mid-run cancels the run in flight;
    /// nothing from the previous run survives.
    pub fn enable(&mut self) {
        self.heading.reset_heading();
        self.follower.stop();
        self.gear.reset_position();
        self.gear.retract_gear();
        self.gear.lock_gear();
        self.geometry = ApproachGeometry::for_target(self.target, &self.config.geometry);
        self.displacement_error = None;
        tracing::info!(
            "alignment enabled: target {:?}, forward {:.2}m, perpendicular {:.3}rad",
            self.target,
            self.geometry.forward_displacement,
            self.geometry.perpendicular_heading
        );
        self.set_state(AlignState::DriveToAirship);
    }

    /// Cancel the run: stop in-flight motion, drop vision mode and return
    /// to idle. A later [`enable`](Self::enable) starts a fresh run.
    pub fn disable(&mut self) {
        self.follower.stop();
        self.vision.set_vision_mode(false);
        self.displacement_error = None;
        tracing::info!("alignment disabled");
        self.set_state(AlignState::Idle);
    }

    /// Advance exactly one state's logic.
    pub fn tick(&mut self) -> AlignStatus {
        let first = self.first_tick;
        self.first_tick = false;
        self.ticks_in_state = self.ticks_in_state.saturating_add(1);
        let previous = self.state;

        match self.state {
            AlignState::Idle | AlignState::Done | AlignState::Failed => {}
            AlignState::DriveToAirship => self.drive_to_airship(first),
            AlignState::RotateTowardsAirship => self.rotate_towards_airship(first),
            AlignState::MeasurePosition => self.measure_position(first),
            AlignState::RotateStraight => self.rotate_straight(first),
            AlignState::DriveAlignSegment => self.drive_align_segment(first),
            AlignState::RotateTowardsPeg => self.rotate_towards_peg(first),
            AlignState::DriveToWall => self.drive_to_wall(first),
            AlignState::RollBack => self.roll_back(first),
        }

        if self.state == previous {
            self.check_stall();
        }

        AlignStatus {
            state: self.state,
            transitioned: self.state != previous,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == AlignState::Done
    }

    /// True once the run has reached a terminal state, successful or not.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, AlignState::Done | AlignState::Failed)
    }

    pub fn state(&self) -> AlignState {
        self.state
    }

    pub fn geometry(&self) -> ApproachGeometry {
        self.geometry
    }

    /// The profile follower, for the host to pump at its own cadence.
    pub fn follower_mut(&mut self) -> &mut ProfileFollower {
        &mut self.follower
    }

    fn set_state(&mut self, next: AlignState) {
        tracing::debug!("state {} -> {}", self.state.name(), next.name());
        self.state = next;
        self.first_tick = true;
        self.ticks_in_state = 0;
    }

    /// Abort the run if the active state has made no transition within the
    /// configured window. A motion goal that never completes would
    /// otherwise stall the machine forever.
    fn check_stall(&mut self) {
        if matches!(
            self.state,
            AlignState::Idle | AlignState::Done | AlignState::Failed
        ) {
            return;
        }
        let timeout = self.config.control.stall_timeout_s;
        if timeout <= 0.0 {
            return;
        }
        let limit = (timeout / self.config.control.period_s).ceil() as u32;
        if self.ticks_in_state > limit {
            tracing::warn!(
                "no transition out of {} within {:.1}s, aborting run",
                self.state.name(),
                timeout
            );
            self.follower.stop();
            self.set_state(AlignState::Failed);
        }
    }

    fn drive_to_airship(&mut self, first: bool) {
        if first {
            self.vision.set_vision_mode(true);
            let motion = &self.config.motion;
            let displace = generate_trapezoidal(
                0.0,
                0.0,
                self.geometry.forward_displacement,
                0.0,
                motion.displace_velocity,
                motion.displace_accel,
                motion.displace_decel,
                self.config.control.period_s,
            );
            tracing::info!(
                "driving {:.2}m towards the airship ({} samples)",
                self.geometry.forward_displacement,
                displace.len()
            );
            self.follower.modify_queue(None, Some(displace), false);
            self.follower.execute_queue();
        }
        if !self.follower.has_pending(Axis::Linear) {
            if self.target == PegTarget::Centre {
                // Centre is already square to its peg face
                self.set_state(AlignState::RotateTowardsPeg);
            } else {
                self.set_state(AlignState::RotateTowardsAirship);
            }
        }
    }

    fn rotate_towards_airship(&mut self, first: bool) {
        if first {
            self.enqueue_rotation_to(self.geometry.perpendicular_heading, true);
        }
        if !self.follower.has_pending(Axis::Heading) {
            self.set_state(AlignState::MeasurePosition);
        }
    }

    fn measure_position(&mut self, first: bool) {
        if first {
            self.enqueue_vision_correction();
        }
        if !self.follower.has_pending(Axis::Heading) {
            let current_heading = self.heading.heading();
            let error = displacement_error(
                self.range.distance(),
                current_heading,
                self.geometry.perpendicular_heading,
                &self.config.geometry,
            );
            self.displacement_error = Some(error);
            tracing::info!(
                "measured displacement {:.3}m at heading {:.3}rad",
                error,
                current_heading
            );

            if error.abs() < self.config.alignment.peg_align_tolerance {
                tracing::debug!("within tolerance, skipping correction");
                self.set_state(AlignState::RotateTowardsPeg);
            } else {
                self.set_state(AlignState::RotateStraight);
            }
        }
    }

    fn rotate_straight(&mut self, first: bool) {
        if first {
            self.enqueue_rotation_to(0.0, false);
        }
        if !self.follower.has_pending(Axis::Heading) {
            self.set_state(AlignState::DriveAlignSegment);
        }
    }

    fn drive_align_segment(&mut self, first: bool) {
        if first {
            let correction = self.displacement_error.take().unwrap_or(0.0);
            let motion = &self.config.motion;
            let displace = generate_trapezoidal(
                0.0,
                0.0,
                correction,
                0.0,
                motion.displace_velocity,
                motion.displace_accel,
                motion.displace_decel,
                self.config.control.period_s,
            );
            tracing::info!("driving {:.3}m to correct displacement", correction);
            self.follower.modify_queue(None, Some(displace), false);
            self.follower.execute_queue();
        }
        if !self.follower.has_pending(Axis::Linear) {
            // Re-verify: measure again before committing to the peg
            self.set_state(AlignState::RotateTowardsAirship);
        }
    }

    fn rotate_towards_peg(&mut self, first: bool) {
        if first {
            self.enqueue_vision_correction();
        }
        if !self.follower.has_pending(Axis::Heading) {
            self.set_state(AlignState::DriveToWall);
        }
    }

    fn drive_to_wall(&mut self, first: bool) {
        if first {
            let distance = self.range.distance() - self.config.geometry.lidar_to_front_bumper;
            let motion = &self.config.motion;
            let to_peg = generate_trapezoidal(
                0.0,
                0.0,
                distance,
                0.0,
                motion.displace_velocity,
                motion.displace_accel,
                // Sharper stop into the wall than on the measurement legs
                motion.displace_decel * 2.0,
                self.config.control.period_s,
            );
            tracing::info!("driving {:.2}m onto the peg, engaging gear", distance);
            self.follower.modify_queue(None, Some(to_peg), true);
            self.follower.execute_queue();
            self.gear.engage();
        }
        if !self.gear.is_executing() {
            self.set_state(AlignState::RollBack);
        }
    }

    fn roll_back(&mut self, first: bool) {
        if first {
            let motion = &self.config.motion;
            let retreat = generate_trapezoidal(
                0.0,
                0.0,
                -self.config.alignment.rollback_distance,
                0.0,
                motion.displace_velocity,
                motion.displace_accel,
                motion.displace_decel,
                self.config.control.period_s,
            );
            tracing::info!(
                "rolling back {:.2}m",
                self.config.alignment.rollback_distance
            );
            self.follower.modify_queue(None, Some(retreat), true);
            self.follower.execute_queue();
        }
        if !self.follower.has_pending(Axis::Linear) {
            self.vision.set_vision_mode(false);
            tracing::info!("alignment run complete");
            self.set_state(AlignState::Done);
        }
    }

    /// Overwrite the heading queue with a rotation from the current heading
    /// to the vision-corrected bearing, if the vision system has a
    /// detection. No detection skips the refinement; gyro and range alone
    /// carry the state.
    fn enqueue_vision_correction(&mut self) {
        let offset = self.vision.lateral_offset();
        if let Some(correction) = self.vision.bearing_correction() {
            let current = self.heading.heading();
            tracing::info!(
                "vision offset {:.2}, correction {:.3}rad from heading {:.3}rad",
                offset.unwrap_or(0.0),
                correction,
                current
            );
            self.enqueue_rotation_to(current + correction, true);
        } else {
            tracing::debug!("no vision detection, keeping current heading");
        }
    }

    fn enqueue_rotation_to(&mut self, end_heading: f32, overwrite: bool) {
        let start = self.heading.heading();
        let motion = &self.config.motion;
        let rotate = generate_trapezoidal(
            start,
            0.0,
            end_heading,
            0.0,
            motion.rotate_velocity,
            motion.rotate_accel,
            motion.rotate_accel / 2.0,
            self.config.control.period_s,
        );
        tracing::debug!(
            "rotation {:.3} -> {:.3}rad ({} samples)",
            start,
            end_heading,
            rotate.len()
        );
        self.follower.modify_queue(Some(rotate), None, overwrite);
        self.follower.execute_queue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::f32::consts::FRAC_PI_3;
    use std::rc::Rc;

    /// Scriptable hardware bench shared by the mock handles.
    #[derive(Default)]
    struct BenchState {
        heading: f32,
        heading_resets: u32,
        range: f32,
        /// Bearing corrections handed out one per vision query
        corrections: VecDeque<f32>,
        vision_mode_calls: Vec<bool>,
        gear_ticks_left: u32,
        gear_engage_duration: u32,
        gear_engages: u32,
        gear_resets: u32,
        gear_retracts: u32,
        gear_locks: u32,
    }

    #[derive(Clone)]
    struct Bench(Rc<RefCell<BenchState>>);

    impl Bench {
        fn new(range: f32) -> Self {
            Bench(Rc::new(RefCell::new(BenchState {
                range,
                gear_engage_duration: 5,
                ..Default::default()
            })))
        }

        fn push_correction(&self, correction: f32) {
            self.0.borrow_mut().corrections.push_back(correction);
        }
    }

    struct BenchHeading(Bench);
    impl HeadingSensor for BenchHeading {
        fn heading(&self) -> f32 {
            self.0.0.borrow().heading
        }
        fn reset_heading(&mut self) {
            let mut bench = self.0.0.borrow_mut();
            bench.heading = 0.0;
            bench.heading_resets += 1;
        }
    }

    struct BenchRange(Bench);
    impl RangeSensor for BenchRange {
        fn distance(&self) -> f32 {
            self.0.0.borrow().range
        }
    }

    struct BenchVision(Bench);
    impl VisionSensor for BenchVision {
        fn lateral_offset(&self) -> Option<f32> {
            self.0.0.borrow().corrections.front().map(|_| 0.0)
        }
        fn bearing_correction(&self) -> Option<f32> {
            self.0.0.borrow_mut().corrections.pop_front()
        }
        fn set_vision_mode(&mut self, enabled: bool) {
            self.0.0.borrow_mut().vision_mode_calls.push(enabled);
        }
    }

    struct BenchGear(Bench);
    impl GearMechanism for BenchGear {
        fn engage(&mut self) {
            let mut bench = self.0.0.borrow_mut();
            bench.gear_ticks_left = bench.gear_engage_duration;
            bench.gear_engages += 1;
        }
        fn is_executing(&self) -> bool {
            let mut bench = self.0.0.borrow_mut();
            if bench.gear_ticks_left > 0 {
                bench.gear_ticks_left -= 1;
                true
            } else {
                false
            }
        }
        fn reset_position(&mut self) {
            self.0.0.borrow_mut().gear_resets += 1;
        }
        fn retract_gear(&mut self) {
            self.0.0.borrow_mut().gear_retracts += 1;
        }
        fn lock_gear(&mut self) {
            self.0.0.borrow_mut().gear_locks += 1;
        }
    }

    type BenchController = AlignController<BenchHeading, BenchRange, BenchVision, BenchGear>;

    fn controller_for(target: PegTarget, bench: &Bench) -> BenchController {
        AlignController::new(
            AlignConfig::default(),
            target,
            BenchHeading(bench.clone()),
            BenchRange(bench.clone()),
            BenchVision(bench.clone()),
            BenchGear(bench.clone()),
        )
    }

    /// One host-loop iteration: tick the controller, pump the follower and
    /// let the bench gyro track the heading profile perfectly.
    fn pump(controller: &mut BenchController, bench: &Bench) -> AlignStatus {
        let status = controller.tick();
        let setpoint = controller.follower_mut().advance();
        bench.0.borrow_mut().heading = setpoint.heading;
        status
    }

    /// Pump until the controller reaches `goal`, returning every state
    /// transition seen on the way.
    fn pump_until(
        controller: &mut BenchController,
        bench: &Bench,
        goal: AlignState,
        max_ticks: usize,
    ) -> Vec<AlignState> {
        let mut visited = Vec::new();
        for _ in 0..max_ticks {
            let status = pump(controller, bench);
            if status.transitioned {
                visited.push(status.state);
            }
            if status.state == goal {
                return visited;
            }
            assert!(
                !controller.is_complete(),
                "run terminated in {:?} before reaching {:?} (visited {:?})",
                status.state,
                goal,
                visited
            );
        }
        panic!("never reached {:?}, visited {:?}", goal, visited);
    }

    #[test]
    fn test_centre_bypasses_airship_rotation() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Centre, &bench);
        controller.enable();

        let visited = pump_until(&mut controller, &bench, AlignState::RotateTowardsPeg, 1000);
        assert!(!visited.contains(&AlignState::RotateTowardsAirship));
        assert!(!visited.contains(&AlignState::MeasurePosition));

        let geometry = controller.geometry();
        assert_eq!(geometry.perpendicular_heading, 0.0);
        assert!((geometry.forward_displacement - (2.93 / 2.0 - 0.49)).abs() < 1e-6);
    }

    #[test]
    fn test_left_rotates_towards_airship_after_forward_leg() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Left, &bench);
        controller.enable();

        let visited = pump_until(&mut controller, &bench, AlignState::MeasurePosition, 1000);
        assert_eq!(
            visited,
            vec![
                AlignState::RotateTowardsAirship,
                AlignState::MeasurePosition
            ]
        );

        let geometry = controller.geometry();
        assert!((geometry.perpendicular_heading + FRAC_PI_3).abs() < 1e-6);
        assert!((geometry.forward_displacement - (2.54 - 0.49)).abs() < 1e-6);
    }

    #[test]
    fn test_within_tolerance_skips_correction() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Right, &bench);
        controller.enable();

        // Gyro tracks the squared heading exactly, so the measured
        // displacement is zero and the correction states are skipped.
        let visited = pump_until(&mut controller, &bench, AlignState::DriveToWall, 2000);
        assert!(visited.contains(&AlignState::MeasurePosition));
        assert!(!visited.contains(&AlignState::RotateStraight));
        assert!(!visited.contains(&AlignState::DriveAlignSegment));
    }

    #[test]
    fn test_out_of_tolerance_runs_correction_loop() {
        let bench = Bench::new(1.0);
        // One vision detection that leaves the robot short of square
        bench.push_correction(-0.2);
        let mut controller = controller_for(PegTarget::Right, &bench);
        controller.enable();

        let visited = pump_until(&mut controller, &bench, AlignState::DriveToWall, 4000);
        assert!(visited.contains(&AlignState::RotateStraight));
        assert!(visited.contains(&AlignState::DriveAlignSegment));
        // The loop re-measures after correcting
        let measurements = visited
            .iter()
            .filter(|&&s| s == AlignState::MeasurePosition)
            .count();
        assert_eq!(measurements, 2);
    }

    #[test]
    fn test_no_vision_detection_enqueues_no_rotation() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Centre, &bench);
        controller.enable();

        pump_until(&mut controller, &bench, AlignState::RotateTowardsPeg, 1000);

        // First tick of rotate_towards_peg: no detection, nothing enqueued,
        // and the state moves on immediately.
        let status = pump(&mut controller, &bench);
        assert!(!controller.follower_mut().has_pending(Axis::Heading));
        assert_eq!(status.state, AlignState::DriveToWall);
    }

    #[test]
    fn test_run_completes_and_disables_vision_once() {
        let bench = Bench::new(1.0);
        bench.push_correction(-0.2);
        let mut controller = controller_for(PegTarget::Right, &bench);
        controller.enable();

        pump_until(&mut controller, &bench, AlignState::Done, 6000);
        assert!(controller.is_done());
        assert!(controller.is_complete());

        let bench_state = bench.0.borrow();
        assert_eq!(bench_state.gear_engages, 1);
        let disables = bench_state
            .vision_mode_calls
            .iter()
            .filter(|&&enabled| !enabled)
            .count();
        assert_eq!(disables, 1);
        assert_eq!(bench_state.vision_mode_calls.last(), Some(&false));
    }

    #[test]
    fn test_enable_is_idempotent() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Left, &bench);

        controller.enable();
        let first_state = controller.state();
        let first_geometry = controller.geometry();

        controller.enable();
        assert_eq!(controller.state(), first_state);
        assert_eq!(controller.geometry(), first_geometry);
        assert!(!controller.follower_mut().has_pending(Axis::Linear));
        assert!(!controller.follower_mut().has_pending(Axis::Heading));

        let bench_state = bench.0.borrow();
        assert_eq!(bench_state.heading_resets, 2);
        assert_eq!(bench_state.gear_resets, 2);
        assert_eq!(bench_state.gear_retracts, 2);
        assert_eq!(bench_state.gear_locks, 2);
    }

    #[test]
    fn test_enable_mid_run_cancels_queued_motion() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Centre, &bench);
        controller.enable();

        // Start the forward leg, then restart before it completes
        pump(&mut controller, &bench);
        assert!(controller.follower_mut().has_pending(Axis::Linear));

        controller.enable();
        assert_eq!(controller.state(), AlignState::DriveToAirship);
        assert!(!controller.follower_mut().has_pending(Axis::Linear));
    }

    #[test]
    fn test_disable_cancels_run_and_returns_to_idle() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Centre, &bench);
        controller.enable();

        // Partway into the forward leg
        for _ in 0..10 {
            pump(&mut controller, &bench);
        }
        assert!(controller.follower_mut().has_pending(Axis::Linear));

        controller.disable();
        assert_eq!(controller.state(), AlignState::Idle);
        assert!(!controller.follower_mut().has_pending(Axis::Linear));
        assert_eq!(bench.0.borrow().vision_mode_calls.last(), Some(&false));

        // Idle ticks do nothing, and never trip the stall abort
        for _ in 0..600 {
            controller.tick();
        }
        assert_eq!(controller.state(), AlignState::Idle);

        // A fresh enable starts over
        controller.enable();
        assert_eq!(controller.state(), AlignState::DriveToAirship);
    }

    #[test]
    fn test_stalled_queue_aborts_to_failed() {
        let bench = Bench::new(1.0);
        let mut config = AlignConfig::default();
        config.control.stall_timeout_s = 0.1; // 5 ticks
        let mut controller = AlignController::new(
            config,
            PegTarget::Centre,
            BenchHeading(bench.clone()),
            BenchRange(bench.clone()),
            BenchVision(bench.clone()),
            BenchGear(bench.clone()),
        );
        controller.enable();

        // Never pump the follower: the linear queue can never drain
        for _ in 0..10 {
            controller.tick();
        }
        assert_eq!(controller.state(), AlignState::Failed);
        assert!(controller.is_complete());
        assert!(!controller.is_done());
        assert!(!controller.follower_mut().has_pending(Axis::Linear));
    }

    #[test]
    fn test_geometry_invariant_for_whole_run() {
        let bench = Bench::new(1.0);
        let mut controller = controller_for(PegTarget::Right, &bench);
        controller.enable();
        let at_start = controller.geometry();

        pump_until(&mut controller, &bench, AlignState::Done, 6000);
        assert_eq!(controller.geometry(), at_start);
    }
}
