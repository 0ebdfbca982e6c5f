//! Battery power curve calibration from observed full-rate samples.

use itertools::Itertools;
use sundial_quantities::power::Kilowatts;

use crate::{
    battery::{Direction, PowerCurve},
    config::CurvePoint,
    core::aggregate::Aggregate,
    error::Warning,
    input::CalibrationSample,
    prelude::*,
};

/// Calibrated fractions never drop below this, so that a window can always make progress.
const MIN_FRACTION: f64 = 0.05;

/// Power curve of one direction, in order of precedence: configured, calibrated, flat.
#[instrument(skip_all, fields(direction = %direction))]
pub fn resolve_curve(
    direction: Direction,
    configured: &[CurvePoint],
    samples: &[CalibrationSample],
    max_rate: Kilowatts,
    min_buckets: usize,
) -> (PowerCurve, Option<Warning>) {
    if !configured.is_empty() {
        return (PowerCurve::from_points(configured), None);
    }
    let samples = samples.iter().filter(|sample| sample.direction == direction).collect_vec();
    if samples.is_empty() {
        return (PowerCurve::FLAT, None);
    }
    calibrate(direction, &samples, max_rate, min_buckets)
}

fn calibrate(
    direction: Direction,
    samples: &[&CalibrationSample],
    max_rate: Kilowatts,
    min_buckets: usize,
) -> (PowerCurve, Option<Warning>) {
    let buckets = samples.iter().into_group_map_by(|sample| sample.soc_percent.min(100));
    if buckets.len() < min_buckets || max_rate <= Kilowatts::ZERO {
        warn!(n_buckets = buckets.len(), min_buckets, "not enough calibration data");
        let warning = Warning::CalibrationPending {
            direction,
            n_buckets: buckets.len(),
            n_required: min_buckets,
        };
        return (PowerCurve::FLAT, Some(warning));
    }

    let points = buckets
        .into_iter()
        .filter_map(|(soc_percent, samples)| {
            let median = samples.into_iter().map(|sample| sample.power).median()?;
            Some(CurvePoint { soc_percent, fraction: median / max_rate })
        })
        .collect_vec();
    let PowerCurve(mut fractions) = PowerCurve::from_points(&points);

    match direction {
        // Charging slows down towards full:
        Direction::Charge => {
            for percent in (0..100).rev() {
                fractions[percent] = fractions[percent].max(fractions[percent + 1]);
            }
        }
        // Discharging slows down towards empty:
        Direction::Discharge => {
            for percent in 1..=100 {
                fractions[percent] = fractions[percent].max(fractions[percent - 1]);
            }
        }
    }
    for fraction in &mut fractions {
        *fraction = fraction.clamp(MIN_FRACTION, 1.0);
    }

    info!(n_points = points.len(), "calibrated");
    (PowerCurve(fractions), None)
}
