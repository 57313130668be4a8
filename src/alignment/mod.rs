//! Alignment core: target geometry and the run state machine.

mod controller;
mod geometry;

pub use controller::{AlignController, AlignState, AlignStatus};
pub use geometry::{ApproachGeometry, PegTarget, displacement_error};
