//! Motion profile generation.
//!
//! Pure functions producing time-indexed position/velocity samples for the
//! profile follower, one sample per control tick. The trapezoidal generator
//! degrades to a triangular profile when the displacement is too short to
//! reach cruise velocity.

/// Displacements below this are treated as zero and produce an empty profile.
const MIN_DISPLACEMENT: f32 = 1e-4;

/// One profile sample consumed per control tick by the follower.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectorySample {
    /// Position along the profile axis (meters or radians)
    pub position: f32,
    /// Velocity at this sample (m/s or rad/s)
    pub velocity: f32,
}

/// Generate a trapezoidal profile from `start_pos` to `end_pos`.
///
/// `accel` and `decel` are magnitudes; asymmetric shaping is the caller's
/// choice. Boundary velocities are projected onto the direction of travel
/// and must not exceed the achievable peak. A zero net displacement returns
/// an empty profile, which the follower completes immediately.
#[allow(clippy::too_many_arguments)]
pub fn generate_trapezoidal(
    start_pos: f32,
    start_vel: f32,
    end_pos: f32,
    end_vel: f32,
    max_vel: f32,
    accel: f32,
    decel: f32,
    dt: f32,
) -> Vec<TrajectorySample> {
    debug_assert!(dt > 0.0);
    debug_assert!(max_vel > 0.0 && accel > 0.0 && decel > 0.0);

    let displacement = end_pos - start_pos;
    let dist = displacement.abs();
    if dist < MIN_DISPLACEMENT {
        return Vec::new();
    }
    let dir = displacement.signum();

    let a = accel.abs();
    let d = decel.abs();
    let v0 = (start_vel * dir).max(0.0);
    let v1 = (end_vel * dir).max(0.0);

    // Peak velocity: either the requested cruise speed, or the apex of a
    // triangular profile when the distance is too short to reach it.
    let v_apex = ((2.0 * a * d * dist + d * v0 * v0 + a * v1 * v1) / (a + d)).sqrt();
    let v_peak = v_apex.min(max_vel.abs()).max(v0.max(v1));

    let t_acc = (v_peak - v0) / a;
    let d_acc = (v_peak * v_peak - v0 * v0) / (2.0 * a);
    let t_dec = (v_peak - v1) / d;
    let d_dec = (v_peak * v_peak - v1 * v1) / (2.0 * d);
    let d_cruise = (dist - d_acc - d_dec).max(0.0);
    let t_cruise = d_cruise / v_peak;
    let total = t_acc + t_cruise + t_dec;

    let steps = (total / dt).ceil().max(1.0) as usize;
    let mut samples = Vec::with_capacity(steps);
    for i in 1..=steps {
        let t = (i as f32 * dt).min(total);
        let (s, v) = if t < t_acc {
            (v0 * t + 0.5 * a * t * t, v0 + a * t)
        } else if t < t_acc + t_cruise {
            (d_acc + v_peak * (t - t_acc), v_peak)
        } else {
            let tau = t - t_acc - t_cruise;
            (
                d_acc + d_cruise + v_peak * tau - 0.5 * d * tau * tau,
                v_peak - d * tau,
            )
        };
        samples.push(TrajectorySample {
            position: start_pos + dir * s.min(dist),
            velocity: dir * v.max(0.0),
        });
    }

    // Land exactly on the requested end state
    if let Some(last) = samples.last_mut() {
        last.position = end_pos;
        last.velocity = end_vel;
    }
    samples
}

/// Generate a constant-velocity linear interpolation from `start_pos` to
/// `end_pos`. Companion to the trapezoidal generator where a different
/// shaping is wanted (reserved for slow shape-free legs); the final sample
/// comes to rest at the end position.
#[allow(dead_code)]
pub fn generate_interpolation(
    start_pos: f32,
    end_pos: f32,
    velocity: f32,
    dt: f32,
) -> Vec<TrajectorySample> {
    debug_assert!(dt > 0.0);
    debug_assert!(velocity > 0.0);

    let displacement = end_pos - start_pos;
    let dist = displacement.abs();
    if dist < MIN_DISPLACEMENT {
        return Vec::new();
    }
    let dir = displacement.signum();
    let v = velocity.abs();

    let total = dist / v;
    let steps = (total / dt).ceil().max(1.0) as usize;
    let mut samples = Vec::with_capacity(steps);
    for i in 1..=steps {
        let t = (i as f32 * dt).min(total);
        samples.push(TrajectorySample {
            position: start_pos + dir * (v * t).min(dist),
            velocity: dir * v,
        });
    }
    if let Some(last) = samples.last_mut() {
        last.position = end_pos;
        last.velocity = 0.0;
    }
    samples
}
