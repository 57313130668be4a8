//! LakshyaAlign - autonomous peg alignment controller
//!
//! Drives a differential-drive robot up to the airship, squares it to the
//! selected peg face using gyro, lidar and vision, places the gear and
//! retreats. The control core is a fixed-cadence state machine; motion is
//! delegated to a per-axis profile follower fed with trapezoidal
//! trajectories.
//!
//! Without robot hardware the binary runs the full sequence against a
//! deterministic simulated rig:
//!
//! ```text
//! lakshya-align [config.toml] [--target left|centre|right]
//! ```

mod alignment;
mod config;
mod devices;
mod error;
mod follower;
mod trajectory;

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{error, info};

use alignment::{AlignController, PegTarget};
use config::AlignConfig;
use devices::sim::SimRig;
use error::Result;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lakshya_align=info".parse().unwrap()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();

    let target = match args.iter().position(|a| a == "--target") {
        Some(i) => match args.get(i + 1) {
            Some(name) => name.parse::<PegTarget>()?,
            None => PegTarget::Centre,
        },
        None => PegTarget::Centre,
    };

    // First positional argument that is not the --target value
    let config_arg = args
        .iter()
        .find(|a| !a.starts_with("--") && a.parse::<PegTarget>().is_err());

    let config = if let Some(path) = config_arg {
        info!("Loading configuration from {:?}", path);
        AlignConfig::load(Path::new(path))?
    } else if Path::new("lakshya.toml").exists() {
        info!("Loading configuration from lakshya.toml");
        AlignConfig::load(Path::new("lakshya.toml"))?
    } else {
        info!("Using default configuration");
        AlignConfig::default()
    };

    info!("LakshyaAlign v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Target: {:?}, control rate {:.0}Hz",
        target,
        1.0 / config.control.period_s
    );

    // Hardware-free rig: the alignment sequence runs against a simulated
    // chassis and structure
    let rig = SimRig::new(&config, target);
    let mut controller = AlignController::new(
        config.clone(),
        target,
        rig.heading_sensor(),
        rig.range_sensor(),
        rig.vision_sensor(),
        rig.gear(),
    );
    controller.enable();

    // Single-threaded cooperative loop at the control cadence
    let period = Duration::from_secs_f32(config.control.period_s);
    loop {
        let tick_start = Instant::now();

        let status = controller.tick();
        if status.transitioned {
            info!("state: {}", status.state.name());
        }

        let setpoint = controller.follower_mut().advance();
        rig.step(setpoint, config.control.period_s);

        if controller.is_complete() {
            break;
        }

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        }
    }

    let (x, y, th) = rig.pose();
    if controller.is_done() {
        match rig.placement_error() {
            Some(placement) => info!(
                "Run complete: gear placed with {:.3}m lateral error, final pose ({:.2}, {:.2}, {:.3})",
                placement, x, y, th
            ),
            None => info!("Run complete, final pose ({:.2}, {:.2}, {:.3})", x, y, th),
        }
    } else {
        error!(
            "Run aborted in state {}, final pose ({:.2}, {:.2}, {:.3})",
            controller.state().name(),
            x,
            y,
            th
        );
        // Leave the rig safe: motion stopped, vision mode off
        controller.disable();
    }

    Ok(())
}
