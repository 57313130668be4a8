//! Target selection and approach geometry.

use std::f32::consts::PI;
use std::str::FromStr;

use crate::config::GeometryConfig;
use crate::error::AlignError;

/// Which of the three symmetric peg approaches to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PegTarget {
    Left,
    Centre,
    Right,
}

impl FromStr for PegTarget {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(PegTarget::Left),
            "centre" | "center" => Ok(PegTarget::Centre),
            "right" => Ok(PegTarget::Right),
            other => Err(AlignError::Target(other.to_string())),
        }
    }
}

/// Scalars derived from the target at run start; immutable for the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApproachGeometry {
    /// Rotation that faces the structure squarely (radians; 0 for centre)
    pub perpendicular_heading: f32,
    /// Straight-line distance to travel before the first rotation (meters)
    pub forward_displacement: f32,
}

impl ApproachGeometry {
    pub fn for_target(target: PegTarget, geometry: &GeometryConfig) -> Self {
        match target {
            PegTarget::Left => Self {
                perpendicular_heading: -geometry.side_rotate_angle,
                forward_displacement: geometry.side_drive_forward_length
                    - geometry.centre_to_front_bumper,
            },
            PegTarget::Right => Self {
                perpendicular_heading: geometry.side_rotate_angle,
                forward_displacement: geometry.side_drive_forward_length
                    - geometry.centre_to_front_bumper,
            },
            PegTarget::Centre => Self {
                perpendicular_heading: 0.0,
                forward_displacement: geometry.centre_airship_distance / 2.0
                    - geometry.centre_to_front_bumper,
            },
        }
    }
}

/// Lateral displacement of the robot from the peg centerline, in meters.
///
/// Derived from one range reading and the current heading relative to the
/// squared approach heading. The raw range is referenced back to the robot
/// centre via the lidar mount offset before the law-of-sines relation is
/// applied. Positive error is corrected by driving forward at heading 0.
pub fn displacement_error(
    range_reading: f32,
    current_heading: f32,
    perpendicular_heading: f32,
    geometry: &GeometryConfig,
) -> f32 {
    let r = range_reading + geometry.centre_to_front_bumper - geometry.lidar_to_front_bumper;
    -(r * (current_heading - perpendicular_heading).sin()) / (PI - current_heading).sin()
}
