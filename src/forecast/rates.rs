//! Rate timeline resolution.

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::Serialize;
use sundial_quantities::rate::KilowattHourRate;

use crate::{config::ManualRate, error::PlanError, input::RateRange, ops::Interval};

/// Where a slot rate came from, in order of increasing precedence.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Fallback,
    Manual,
    Integration,
    Override,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Import,
    Export,
}

/// All rate definitions of one direction.
#[derive(Copy, Clone)]
pub struct RateSources<'a> {
    pub flow: Flow,
    pub overrides: &'a [ManualRate],
    pub integration: &'a [RateRange],
    pub manual: &'a [ManualRate],
    pub fallback: Option<KilowattHourRate>,
}

impl ManualRate {
    /// Whether the daily-repeating range covers the timestamp.
    #[must_use]
    pub fn covers(&self, time: DateTime<Local>) -> bool {
        if self.date.is_some_and(|date| date != time.date_naive()) {
            return false;
        }
        let time = time.time();
        if self.start < self.end {
            (self.start <= time) && (time < self.end)
        } else {
            (time >= self.start) || (time < self.end)
        }
    }
}

impl RateSources<'_> {
    /// Resolve the rate at the given time.
    pub fn rate_at(&self, time: DateTime<Local>) -> Option<(KilowattHourRate, RateSource)> {
        let manual_rate = |ranges: &[ManualRate]| {
            ranges.iter().rev().find(|range| range.covers(time)).map(|range| range.rate)
        };
        manual_rate(self.overrides)
            .map(|rate| (rate, RateSource::Override))
            .or_else(|| {
                self.integration
                    .iter()
                    .find(|range| range.interval().contains(time))
                    .map(|range| (range.rate, RateSource::Integration))
            })
            .or_else(|| manual_rate(self.manual).map(|rate| (rate, RateSource::Manual)))
            .or_else(|| self.fallback.map(|rate| (rate, RateSource::Fallback)))
    }

    /// Resolve the rate of every slot, failing when any slot is left uncovered.
    pub fn resolve(&self, slots: &[Interval]) -> Result<Vec<KilowattHourRate>, PlanError> {
        slots
            .iter()
            .map(|slot| {
                self.rate_at(slot.start).map(|(rate, _)| rate).ok_or_else(|| {
                    PlanError::configuration(format!(
                        "no {:?} rate covers {}, configure manual rates or a fallback",
                        self.flow, slot.start,
                    ))
                })
            })
            .collect()
    }
}

/// Merged run of consecutive slots with the same rate.
#[derive(Copy, Clone, Debug, Serialize)]
pub struct RatePeriod {
    pub interval: Interval,
    pub rate: KilowattHourRate,
}

/// Compress per-slot rates into periods.
#[must_use]
pub fn timeline(slots: &[Interval], rates: &[KilowattHourRate]) -> Vec<RatePeriod> {
    slots
        .iter()
        .zip(rates)
        .chunk_by(|(_, rate)| **rate)
        .into_iter()
        .filter_map(|(rate, chunk)| {
            let mut chunk = chunk.into_iter();
            let first = chunk.next()?.0;
            let last = chunk.last().map_or(first, |(last, _)| last);
            Some(RatePeriod { interval: Interval::from_std(first.start..last.end), rate })
        })
        .collect()
}
