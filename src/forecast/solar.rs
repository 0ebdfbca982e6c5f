//! Solar generation per slot.

use chrono::{DateTime, DurationRound, Local, TimeDelta};
use itertools::Itertools;
use sundial_quantities::{energy::KilowattHours, power::Kilowatts};

use crate::{config::ForecastConfig, input::SolarPoint, ops::Interval};

/// Zero-sum sub-slot modulation applied within each plan interval.
const CLOUD_PATTERN: [f64; 6] = [1.0, -1.0, 0.5, -0.5, 1.0, -1.0];

#[derive(Debug)]
pub struct SolarForecast {
    /// Blended central generation.
    pub pv: Vec<KilowattHours>,

    /// Generation in the 10% scenario.
    pub pv10: Vec<KilowattHours>,

    /// Generation in the 90% scenario, when provided.
    pub pv90: Vec<Option<KilowattHours>>,

    /// Slots not covered by any forecast point.
    pub n_missing: usize,
}

/// Value of the latest point that started at or before `time` and has not been superseded.
///
/// The last point is held for `last_period`.
pub fn held<T: Copy>(
    points: &[(DateTime<Local>, T)],
    time: DateTime<Local>,
    last_period: TimeDelta,
) -> Option<T> {
    let index = points.partition_point(|(start, _)| *start <= time).checked_sub(1)?;
    let (start, value) = points[index];
    if index + 1 == points.len() && time >= start + last_period {
        return None;
    }
    Some(value)
}

#[must_use]
pub fn forecast_solar(
    config: &ForecastConfig,
    points: &[SolarPoint],
    slots: &[Interval],
    plan_interval: TimeDelta,
) -> SolarForecast {
    let points = points
        .iter()
        .sorted_by_key(|point| point.start)
        .map(|point| (point.start, *point))
        .collect_vec();

    let mut n_missing = 0;
    let mut pv = Vec::with_capacity(slots.len());
    let mut pv50 = Vec::with_capacity(slots.len());
    let mut pv10 = Vec::with_capacity(slots.len());
    let mut pv90 = Vec::with_capacity(slots.len());
    for slot in slots {
        let energy =
            |power: Kilowatts| (power * slot.len() * config.pv_scaling).max(KilowattHours::ZERO);
        if let Some(point) = held(&points, slot.start, plan_interval) {
            let (central, pessimistic) = (energy(point.pv50), energy(point.pv10));
            pv.push(central + (pessimistic - central) * config.pv_weight10);
            pv50.push(central);
            pv10.push(pessimistic);
            pv90.push(point.pv90.map(energy));
        } else {
            n_missing += 1;
            pv.push(KilowattHours::ZERO);
            pv50.push(KilowattHours::ZERO);
            pv10.push(KilowattHours::ZERO);
            pv90.push(None);
        }
    }

    if config.cloud_variance {
        apply_cloud_variance(slots, plan_interval, &pv50, &pv10, &mut pv);
    }

    SolarForecast { pv, pv10, pv90, n_missing }
}

/// Modulate the central generation within each plan interval, preserving the interval total.
///
/// The amplitude is the cloud factor: the relative gap between the median and the 10% scenario.
fn apply_cloud_variance(
    slots: &[Interval],
    plan_interval: TimeDelta,
    pv50: &[KilowattHours],
    pv10: &[KilowattHours],
    pv: &mut [KilowattHours],
) {
    let blocks = slots
        .iter()
        .enumerate()
        .chunk_by(|(_, slot)| slot.start.duration_trunc(plan_interval).unwrap_or(slot.start))
        .into_iter()
        .map(|(_, chunk)| chunk.map(|(index, _)| index).collect_vec())
        .collect_vec();

    for indices in blocks {
        let median: KilowattHours = indices.iter().map(|index| pv50[*index]).sum();
        if median <= KilowattHours::ZERO {
            continue;
        }
        let pessimistic: KilowattHours = indices.iter().map(|index| pv10[*index]).sum();
        let cloud_factor = ((median - pessimistic) / median).clamp(0.0, 1.0);
        if cloud_factor == 0.0 {
            continue;
        }

        let total: KilowattHours = indices.iter().map(|index| pv[*index]).sum();
        let perturbed = indices
            .iter()
            .zip(CLOUD_PATTERN.iter().cycle())
            .map(|(index, pattern)| pv[*index] * (1.0 + cloud_factor * pattern))
            .collect_vec();
        let perturbed_total: KilowattHours = perturbed.iter().copied().sum();
        if perturbed_total <= KilowattHours::ZERO {
            continue;
        }
        let scale = total / perturbed_total;
        for (index, value) in indices.iter().zip(perturbed) {
            pv[*index] = value * scale;
        }
    }
}
