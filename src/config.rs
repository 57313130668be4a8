//! Configuration loading for the alignment controller

use crate::error::{AlignError, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AlignConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Control loop settings
#[derive(Clone, Debug, Deserialize)]
pub struct ControlConfig {
    /// Control tick period in seconds (default: 0.02 = 50 Hz)
    #[serde(default = "default_period")]
    pub period_s: f32,

    /// Abort the run if a state makes no transition within this many
    /// seconds (default: 10.0, 0 disables)
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_s: f32,
}

/// Robot and structure dimensions
#[derive(Clone, Debug, Deserialize)]
pub struct GeometryConfig {
    /// Distance from robot centre to the front bumper (meters)
    #[serde(default = "default_centre_to_front_bumper")]
    pub centre_to_front_bumper: f32,

    /// Distance from the lidar mount to the front bumper (meters)
    #[serde(default = "default_lidar_to_front_bumper")]
    pub lidar_to_front_bumper: f32,

    /// Wall-to-wall span of the airship along the centre approach (meters)
    #[serde(default = "default_centre_airship_distance")]
    pub centre_airship_distance: f32,

    /// Forward leg length for the side approaches (meters)
    #[serde(default = "default_side_drive_forward_length")]
    pub side_drive_forward_length: f32,

    /// Rotation that squares a side approach to its peg face (radians)
    #[serde(default = "default_side_rotate_angle")]
    pub side_rotate_angle: f32,
}

/// Velocity and acceleration limits for generated profiles
#[derive(Clone, Debug, Deserialize)]
pub struct MotionConfig {
    /// Cruise velocity for straight legs (m/s)
    #[serde(default = "default_displace_velocity")]
    pub displace_velocity: f32,

    /// Acceleration for straight legs (m/s²)
    #[serde(default = "default_displace_accel")]
    pub displace_accel: f32,

    /// Deceleration for straight legs approaching a measurement pose (m/s²);
    /// the wall approach uses twice this
    #[serde(default = "default_displace_decel")]
    pub displace_decel: f32,

    /// Cruise velocity for in-place rotations (rad/s)
    #[serde(default = "default_rotate_velocity")]
    pub rotate_velocity: f32,

    /// Acceleration for in-place rotations (rad/s²)
    #[serde(default = "default_rotate_accel")]
    pub rotate_accel: f32,
}

/// Alignment tolerances and distances
#[derive(Clone, Debug, Deserialize)]
pub struct AlignmentConfig {
    /// Lateral displacement below which the correction loop is skipped (meters)
    #[serde(default = "default_peg_align_tolerance")]
    pub peg_align_tolerance: f32,

    /// Retreat distance after gear placement (meters)
    #[serde(default = "default_rollback_distance")]
    pub rollback_distance: f32,
}

/// Vision system parameters
#[derive(Clone, Debug, Deserialize)]
pub struct CameraConfig {
    /// Horizontal field of view (radians); a normalized lateral offset of
    /// ±1.0 maps to a bearing of ±fov/2
    #[serde(default = "default_horizontal_fov")]
    pub horizontal_fov: f32,
}

/// Simulated rig parameters (hardware-free runs and tests)
#[derive(Clone, Debug, Deserialize)]
pub struct SimConfig {
    /// Range reading expected at the measurement pose (meters)
    #[serde(default = "default_wall_standoff")]
    pub wall_standoff: f32,

    /// Lateral offset of the peg from the ideal approach line (meters)
    #[serde(default = "default_initial_lateral_error")]
    pub initial_lateral_error: f32,

    /// Number of rig steps the gear mechanism stays executing after engage
    #[serde(default = "default_gear_engage_steps")]
    pub gear_engage_steps: u32,

    /// Maximum range at which the vision system reports a detection (meters)
    #[serde(default = "default_vision_max_range")]
    pub vision_max_range: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period_s: default_period(),
            stall_timeout_s: default_stall_timeout(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            centre_to_front_bumper: default_centre_to_front_bumper(),
            lidar_to_front_bumper: default_lidar_to_front_bumper(),
            centre_airship_distance: default_centre_airship_distance(),
            side_drive_forward_length: default_side_drive_forward_length(),
            side_rotate_angle: default_side_rotate_angle(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            displace_velocity: default_displace_velocity(),
            displace_accel: default_displace_accel(),
            displace_decel: default_displace_decel(),
            rotate_velocity: default_rotate_velocity(),
            rotate_accel: default_rotate_accel(),
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            peg_align_tolerance: default_peg_align_tolerance(),
            rollback_distance: default_rollback_distance(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            horizontal_fov: default_horizontal_fov(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            wall_standoff: default_wall_standoff(),
            initial_lateral_error: default_initial_lateral_error(),
            gear_engage_steps: default_gear_engage_steps(),
            vision_max_range: default_vision_max_range(),
        }
    }
}

// Default value functions
fn default_period() -> f32 {
    0.02
}
fn default_stall_timeout() -> f32 {
    10.0
}
fn default_centre_to_front_bumper() -> f32 {
    0.49
}
fn default_lidar_to_front_bumper() -> f32 {
    0.36
}
fn default_centre_airship_distance() -> f32 {
    2.93
}
fn default_side_drive_forward_length() -> f32 {
    2.54
}
fn default_side_rotate_angle() -> f32 {
    std::f32::consts::FRAC_PI_3
}
fn default_displace_velocity() -> f32 {
    2.5
}
fn default_displace_accel() -> f32 {
    3.0
}
fn default_displace_decel() -> f32 {
    1.0
}
fn default_rotate_velocity() -> f32 {
    2.0
}
fn default_rotate_accel() -> f32 {
    2.0
}
fn default_peg_align_tolerance() -> f32 {
    0.15
}
fn default_rollback_distance() -> f32 {
    1.0
}
fn default_horizontal_fov() -> f32 {
    1.0
}
fn default_wall_standoff() -> f32 {
    1.0
}
fn default_initial_lateral_error() -> f32 {
    0.2
}
fn default_gear_engage_steps() -> u32 {
    75
}
fn default_vision_max_range() -> f32 {
    4.0
}

impl AlignConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AlignError::Config(format!("Failed to read config file: {}", e)))?;
        let config: AlignConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
