//! Progress math: per-measure progress and goal status rollup.
//!
//! Everything here is pure. Storage calls into it whenever a measure's
//! values change and writes the results back.

use super::{GoalStatus, MeasureType};

/// Progress at or above this is COMPLETED.
pub const COMPLETED_THRESHOLD: f64 = 100.0;
/// Progress at or above this is ON_TRACK.
pub const ON_TRACK_THRESHOLD: f64 = 70.0;
/// Progress at or above this is AT_RISK; below is BEHIND.
pub const AT_RISK_THRESHOLD: f64 = 40.0;

/// Compute a measure's progress as a percentage in `[0, 100]`.
///
/// Total over all finite inputs. A zero range (start == target) counts as
/// already met, except for milestones which only compare current to target.
pub fn measure_progress(kind: MeasureType, start: f64, current: f64, target: f64) -> f64 {
    let range = (target - start).abs();

    match kind {
        MeasureType::Milestone => {
            if current >= target {
                100.0
            } else {
                0.0
            }
        }
        _ if range == 0.0 => 100.0,
        MeasureType::IncreaseTo => clamp_percent((current - start) / range * 100.0),
        MeasureType::DecreaseTo => clamp_percent((start - current) / range * 100.0),
        MeasureType::Maintain => {
            let deviation = (current - target).abs() / range.max(1.0);
            clamp_percent((1.0 - deviation) * 100.0)
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Map an average progress value to a goal status.
pub fn derive_status(average: f64) -> GoalStatus {
    if average >= COMPLETED_THRESHOLD {
        GoalStatus::Completed
    } else if average >= ON_TRACK_THRESHOLD {
        GoalStatus::OnTrack
    } else if average >= AT_RISK_THRESHOLD {
        GoalStatus::AtRisk
    } else {
        GoalStatus::Behind
    }
}

/// Roll measure progress values up into a goal's progress and status.
///
/// Returns `None` for an empty slice: a goal with no measures keeps whatever
/// progress and status it already has.
pub fn rollup(progresses: &[f64]) -> Option<(f64, GoalStatus)> {
    if progresses.is_empty() {
        return None;
    }
    let average = progresses.iter().sum::<f64>() / progresses.len() as f64;
    Some((average, derive_status(average)))
}
