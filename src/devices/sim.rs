//! Hardware-free simulated rig.
//!
//! Simulates the chassis, the airship structure and the gear mechanism so
//! the full alignment sequence can run without a robot. All trait handles
//! share one world behind a mutex; the host steps the world at the control
//! cadence with the follower's setpoints.
//!
//! The simulation is deterministic by design: the heading tracks its
//! setpoint exactly and the only injected imperfection is a configurable
//! lateral offset of the peg from the ideal approach line.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex};

use crate::alignment::{ApproachGeometry, PegTarget};
use crate::config::AlignConfig;
use crate::devices::{GearMechanism, HeadingSensor, RangeSensor, VisionSensor};
use crate::follower::DriveSetpoint;

/// Range reported when the beam does not hit the target wall.
const RANGE_MAX: f32 = 10.0;

/// Shared world state behind all sim handles.
struct SimWorld {
    // Chassis pose (world frame; the run starts at the origin, heading 0)
    x: f32,
    y: f32,
    th: f32,
    heading_ref: f32,

    // Structure
    peg: (f32, f32),
    /// Unit vector of the squared approach direction (the peg centerline)
    approach_dir: (f32, f32),

    // Mounting and sensor parameters
    lidar_mount: f32,
    bumper_offset: f32,
    half_fov: f32,
    vision_max_range: f32,
    vision_mode: bool,

    // Gear mechanism
    gear_steps_remaining: u32,
    gear_engage_steps: u32,

    /// Lateral error of the bumper point when the gear finished executing
    placement_error: Option<f32>,
}

impl SimWorld {
    fn bearing_to_peg(&self) -> f32 {
        let angle = (self.peg.1 - self.y).atan2(self.peg.0 - self.x);
        normalize_angle(angle - self.th)
    }

    fn distance_to_peg(&self) -> f32 {
        let dx = self.peg.0 - self.x;
        let dy = self.peg.1 - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    fn detection(&self) -> Option<f32> {
        if !self.vision_mode {
            return None;
        }
        let bearing = self.bearing_to_peg();
        if bearing.abs() > self.half_fov || self.distance_to_peg() > self.vision_max_range {
            return None;
        }
        Some(bearing)
    }

    /// Signed lateral distance of the front bumper point from the peg
    /// centerline, positive to the left of the approach direction.
    fn bumper_lateral_error(&self) -> f32 {
        let bx = self.x + self.bumper_offset * self.th.cos();
        let by = self.y + self.bumper_offset * self.th.sin();
        self.approach_dir.0 * (by - self.peg.1) - self.approach_dir.1 * (bx - self.peg.0)
    }
}

/// Simulated rig owning the shared world.
pub struct SimRig {
    world: Arc<Mutex<SimWorld>>,
}

impl SimRig {
    /// Build the rig for one target approach.
    ///
    /// The peg is placed so the range sensor reads `sim.wall_standoff` at
    /// the measurement pose, offset laterally by `sim.initial_lateral_error`
    /// to give the correction loop real work.
    pub fn new(config: &AlignConfig, target: PegTarget) -> Self {
        let geometry = ApproachGeometry::for_target(target, &config.geometry);
        let p = geometry.perpendicular_heading;
        let approach_dir = (p.cos(), p.sin());
        let perp = (-p.sin(), p.cos());
        let lidar_mount =
            config.geometry.centre_to_front_bumper - config.geometry.lidar_to_front_bumper;

        let leg_end = (geometry.forward_displacement, 0.0);
        let reach = config.sim.wall_standoff + lidar_mount;
        let lateral = config.sim.initial_lateral_error;
        let peg = (
            leg_end.0 + reach * approach_dir.0 + lateral * perp.0,
            leg_end.1 + reach * approach_dir.1 + lateral * perp.1,
        );

        tracing::debug!(
            "sim rig: peg at ({:.2}, {:.2}), approach heading {:.3} rad",
            peg.0,
            peg.1,
            p
        );

        Self {
            world: Arc::new(Mutex::new(SimWorld {
                x: 0.0,
                y: 0.0,
                th: 0.0,
                heading_ref: 0.0,
                peg,
                approach_dir,
                lidar_mount,
                bumper_offset: config.geometry.centre_to_front_bumper,
                half_fov: config.camera.horizontal_fov / 2.0,
                vision_max_range: config.sim.vision_max_range,
                vision_mode: false,
                gear_steps_remaining: 0,
                gear_engage_steps: config.sim.gear_engage_steps,
                placement_error: None,
            })),
        }
    }

    pub fn heading_sensor(&self) -> SimHeadingSensor {
        SimHeadingSensor(Arc::clone(&self.world))
    }

    pub fn range_sensor(&self) -> SimRangeSensor {
        SimRangeSensor(Arc::clone(&self.world))
    }

    pub fn vision_sensor(&self) -> SimVisionSensor {
        SimVisionSensor(Arc::clone(&self.world))
    }

    pub fn gear(&self) -> SimGearMechanism {
        SimGearMechanism(Arc::clone(&self.world))
    }

    /// Advance the world by one control period with the follower's setpoints.
    pub fn step(&self, setpoint: DriveSetpoint, dt: f32) {
        let mut w = self.world.lock().unwrap();
        w.th = w.heading_ref + setpoint.heading;
        w.x += setpoint.linear_velocity * dt * w.th.cos();
        w.y += setpoint.linear_velocity * dt * w.th.sin();

        if w.gear_steps_remaining > 0 {
            w.gear_steps_remaining -= 1;
            if w.gear_steps_remaining == 0 {
                let error = w.bumper_lateral_error();
                w.placement_error = Some(error);
                tracing::debug!("sim gear placed, bumper lateral error {:.3}m", error);
            }
        }
    }

    /// Chassis pose `(x, y, heading)` in the world frame.
    pub fn pose(&self) -> (f32, f32, f32) {
        let w = self.world.lock().unwrap();
        (w.x, w.y, w.th)
    }

    /// Lateral error of the bumper point recorded when the gear mechanism
    /// finished executing, if it has.
    pub fn placement_error(&self) -> Option<f32> {
        self.world.lock().unwrap().placement_error
    }
}

pub struct SimHeadingSensor(Arc<Mutex<SimWorld>>);

impl HeadingSensor for SimHeadingSensor {
    fn heading(&self) -> f32 {
        let w = self.0.lock().unwrap();
        w.th - w.heading_ref
    }

    fn reset_heading(&mut self) {
        let mut w = self.0.lock().unwrap();
        w.heading_ref = w.th;
    }
}

pub struct SimRangeSensor(Arc<Mutex<SimWorld>>);

impl RangeSensor for SimRangeSensor {
    fn distance(&self) -> f32 {
        let w = self.0.lock().unwrap();
        let dir = (w.th.cos(), w.th.sin());
        let lidar = (w.x + w.lidar_mount * dir.0, w.y + w.lidar_mount * dir.1);
        // Intersect the beam with the wall plane through the peg
        let to_peg = (w.peg.0 - lidar.0, w.peg.1 - lidar.1);
        let reach = to_peg.0 * w.approach_dir.0 + to_peg.1 * w.approach_dir.1;
        let closing = dir.0 * w.approach_dir.0 + dir.1 * w.approach_dir.1;
        if closing < 0.2 || reach <= 0.0 {
            return RANGE_MAX;
        }
        reach / closing
    }
}

pub struct SimVisionSensor(Arc<Mutex<SimWorld>>);

impl VisionSensor for SimVisionSensor {
    fn lateral_offset(&self) -> Option<f32> {
        let w = self.0.lock().unwrap();
        // A target to the left (positive bearing) sits left of image centre
        w.detection()
            .map(|bearing| (-bearing / w.half_fov).clamp(-1.0, 1.0))
    }

    fn bearing_correction(&self) -> Option<f32> {
        self.0.lock().unwrap().detection()
    }

    fn set_vision_mode(&mut self, enabled: bool) {
        self.0.lock().unwrap().vision_mode = enabled;
    }
}

pub struct SimGearMechanism(Arc<Mutex<SimWorld>>);

impl GearMechanism for SimGearMechanism {
    fn engage(&mut self) {
        let mut w = self.0.lock().unwrap();
        w.gear_steps_remaining = w.gear_engage_steps;
    }

    fn is_executing(&self) -> bool {
        self.0.lock().unwrap().gear_steps_remaining > 0
    }

    fn reset_position(&mut self) {
        let mut w = self.0.lock().unwrap();
        w.gear_steps_remaining = 0;
        w.placement_error = None;
    }

    fn retract_gear(&mut self) {
        tracing::debug!("sim gear retracted");
    }

    fn lock_gear(&mut self) {
        tracing::debug!("sim gear locked");
    }
}

fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}
