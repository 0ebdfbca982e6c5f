//! House load prediction from the consumption history.

use bon::Builder;
use chrono::{DateTime, Days, Local, NaiveTime, TimeDelta};
use itertools::Itertools;
use sundial_quantities::energy::KilowattHours;

use crate::{
    config::ForecastConfig,
    core::aggregate::Aggregate,
    input::EnergySeries,
    ops::Interval,
    prelude::*,
};

/// Time after midnight by which the in-day correction has faded out.
const IN_DAY_CORRECTION_SPAN: TimeDelta = TimeDelta::hours(8);

/// Historical sample used for `time`, `days` earlier.
///
/// When the source is not in the past yet, keep going back one more day until it is.
pub fn source_time(time: DateTime<Local>, now: DateTime<Local>, days: u32) -> DateTime<Local> {
    let mut days = days;
    loop {
        let source = time
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or_else(|| time - TimeDelta::days(i64::from(days)));
        if source < now {
            return source;
        }
        days += 1;
    }
}

#[derive(Debug)]
pub struct LoadForecast {
    /// Predicted energy per slot, before scaling.
    pub energy: Vec<KilowattHours>,

    /// History slots without any sample.
    pub n_missing: usize,

    /// Lookback offset discarded by the modal filter.
    pub dropped_day: Option<u32>,

    /// Applied actual-to-predicted ratio for today.
    pub in_day_ratio: Option<f64>,
}

#[derive(Builder)]
pub struct LoadForecaster<'a> {
    config: &'a ForecastConfig,
    history: &'a EnergySeries,
    car_energy: Option<&'a EnergySeries>,

    /// Slot-aligned start of the horizon.
    now: DateTime<Local>,

    slot: TimeDelta,
    gap_fill: TimeDelta,
}

/// Dense, gap-filled history on the slot grid.
struct HistoryGrid {
    origin: DateTime<Local>,
    slot: TimeDelta,
    values: Vec<KilowattHours>,
}

impl HistoryGrid {
    fn value_at(&self, time: DateTime<Local>) -> KilowattHours {
        let offset = (time - self.origin).num_seconds();
        if offset < 0 {
            return KilowattHours::ZERO;
        }
        usize::try_from(offset / self.slot.num_seconds())
            .ok()
            .and_then(|index| self.values.get(index).copied())
            .unwrap_or(KilowattHours::ZERO)
    }

    fn sum(&self, interval: Interval) -> KilowattHours {
        interval.steps(self.slot).map(|slot| self.value_at(slot.start)).sum()
    }
}

impl LoadForecaster<'_> {
    #[instrument(skip_all)]
    pub fn forecast(&self, slots: &[Interval]) -> LoadForecast {
        let (grid, n_missing) = self.build_grid();

        let mut weighted_days = self.config.weighted_days().collect_vec();
        let dropped_day = if self.config.modal_filter && weighted_days.len() >= 2 {
            self.lowest_day(&grid, &weighted_days)
        } else {
            None
        };
        if let Some(dropped_day) = dropped_day {
            debug!(dropped_day, "modal filter dropped the lowest day");
            weighted_days.retain(|(days, _)| *days != dropped_day);
        }

        let predict = |time: DateTime<Local>| -> KilowattHours {
            weighted_days
                .iter()
                .map(|(days, weight)| {
                    (grid.value_at(source_time(time, self.now, *days)).into_inner(), *weight)
                })
                .weighted_mean()
                .map_or(KilowattHours::ZERO, KilowattHours::from)
        };

        let mut energy = slots.iter().map(|slot| predict(slot.start)).collect_vec();

        let in_day_ratio =
            if self.config.in_day_correction { self.in_day_ratio(&grid, &predict) } else { None };
        if let Some(ratio) = in_day_ratio {
            info!(ratio, "applying in-day load correction");
            let midnight = self.midnight();
            for (slot, energy) in slots.iter().zip(&mut energy) {
                let elapsed = (slot.start - midnight).as_seconds_f64();
                let weight =
                    (1.0 - elapsed / IN_DAY_CORRECTION_SPAN.as_seconds_f64()).clamp(0.0, 1.0);
                *energy = *energy * (1.0 + (ratio - 1.0) * weight);
            }
        }

        LoadForecast { energy, n_missing, dropped_day, in_day_ratio }
    }

    fn midnight(&self) -> DateTime<Local> {
        self.now
            .with_time(NaiveTime::MIN)
            .earliest()
            .unwrap_or_else(|| self.now - TimeDelta::days(1))
    }

    /// Sample the history onto the slot grid, then fill short gaps and subtract car charging.
    fn build_grid(&self) -> (HistoryGrid, usize) {
        let max_days = self.config.days_previous.iter().copied().max().unwrap_or(1);
        let origin = self
            .midnight()
            .checked_sub_days(Days::new(u64::from(max_days)))
            .unwrap_or_else(|| self.midnight() - TimeDelta::days(i64::from(max_days)));
        let intervals = Interval::from_std(origin..self.now).steps(self.slot).collect_vec();

        let mut n_missing = 0;
        let mut values = intervals
            .iter()
            .map(|interval| {
                self.history.energy_in(*interval).unwrap_or_else(|| {
                    n_missing += 1;
                    KilowattHours::ZERO
                })
            })
            .collect_vec();

        self.fill_gaps(&intervals, &mut values);

        for (interval, value) in intervals.iter().zip(&mut values) {
            let car = match self.car_energy {
                Some(series) => series.energy_in(*interval).unwrap_or(KilowattHours::ZERO),
                None if *value / interval.len() > self.config.car_charging_threshold => {
                    self.config.car_charging_rate * interval.len()
                }
                None => KilowattHours::ZERO,
            };
            *value = (*value - car).max(KilowattHours::ZERO);
        }

        (HistoryGrid { origin, slot: self.slot, values }, n_missing)
    }

    /// Replace runs of zeros shorter than the threshold with the daily slot average.
    fn fill_gaps(&self, intervals: &[Interval], values: &mut [KilowattHours]) {
        let daily_averages = intervals
            .iter()
            .zip(values.iter())
            .filter(|(_, value)| **value > KilowattHours::ZERO)
            .into_group_map_by(|(interval, _)| interval.start.date_naive())
            .into_iter()
            .map(|(date, samples)| {
                let average = samples
                    .iter()
                    .map(|(_, value)| (value.into_inner(), 1.0))
                    .weighted_mean()
                    .unwrap_or_default();
                (date, KilowattHours::from(average))
            })
            .collect::<std::collections::HashMap<_, _>>();

        let mut index = 0;
        let mut n_filled = 0;
        while index < values.len() {
            if values[index] > KilowattHours::ZERO {
                index += 1;
                continue;
            }
            let run_end = (index..values.len())
                .find(|i| values[*i] > KilowattHours::ZERO)
                .unwrap_or(values.len());
            let run_length = intervals[run_end - 1].end - intervals[index].start;
            if run_length < self.gap_fill {
                let run = index..run_end;
                for (interval, value) in intervals[run.clone()].iter().zip(&mut values[run]) {
                    if let Some(average) = daily_averages.get(&interval.start.date_naive()) {
                        *value = *average;
                        n_filled += 1;
                    }
                }
            }
            index = run_end;
        }
        if n_filled != 0 {
            debug!(n_filled, "filled short load gaps");
        }
    }

    /// Lookback offset whose most recent day has the lowest consumption.
    fn lowest_day(&self, grid: &HistoryGrid, weighted_days: &[(u32, f64)]) -> Option<u32> {
        weighted_days
            .iter()
            .map(|(days, _)| {
                let end = self.now - TimeDelta::days(i64::from(*days) - 1);
                let total = grid.sum(Interval::from_std(end - TimeDelta::days(1)..end));
                (*days, total)
            })
            .min_by_key(|(_, total)| *total)
            .map(|(days, _)| days)
    }

    /// Ratio of today's actual consumption to what the forecast would have predicted.
    fn in_day_ratio(
        &self,
        grid: &HistoryGrid,
        predict: &impl Fn(DateTime<Local>) -> KilowattHours,
    ) -> Option<f64> {
        let today = Interval::from_std(self.midnight()..self.now);
        let actual = grid.sum(today);
        let predicted: KilowattHours = today.steps(self.slot).map(|slot| predict(slot.start)).sum();
        if predicted <= KilowattHours::ZERO || actual <= KilowattHours::ZERO {
            return None;
        }
        Some((actual / predicted).clamp(self.config.in_day_ratio_min, self.config.in_day_ratio_max))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{Datelike, TimeZone, Timelike};

    use super::*;

    const SLOT: TimeDelta = TimeDelta::minutes(5);

    fn time(day: u32, hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn horizon(now: DateTime<Local>, hours: i64) -> Vec<Interval> {
        Interval::from_std(now..now + TimeDelta::hours(hours)).steps(SLOT).collect()
    }

    fn config() -> ForecastConfig {
        ForecastConfig {
            days_previous: vec![1],
            in_day_correction: false,
            ..ForecastConfig::default()
        }
    }

    /// History from `start` until `end` with the value returned by the closure.
    fn history(
        start: DateTime<Local>,
        end: DateTime<Local>,
        value: impl Fn(DateTime<Local>) -> f64,
    ) -> EnergySeries {
        EnergySeries::regular(
            start,
            SLOT,
            Interval::from_std(start..end).steps(SLOT).map(|slot| value(slot.start).into()),
        )
    }

    #[test]
    fn test_source_time_falls_back() {
        // Monday 15:00, forecasting Wednesday 09:00:
        assert_eq!(source_time(time(4, 9), time(2, 15), 1), time(2, 9));
        assert_eq!(source_time(time(2, 16), time(2, 15), 1), time(1, 16));
        assert_eq!(
            source_time(time(4, 9), time(2, 15), 7),
            Local.with_ymd_and_hms(2026, 2, 25, 9, 0, 0).unwrap(),
        );
    }

    #[test]
    fn test_repeats_previous_day() {
        let now = time(2, 15);
        let history = history(time(1, 0), now, |time| if time.hour() < 12 { 0.1 } else { 0.3 });
        let forecast = LoadForecaster::builder()
            .config(&config())
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 24));
        assert_eq!(forecast.n_missing, 0);
        // Monday 15:00 comes from Sunday 15:00, Tuesday 09:00 from Monday 09:00:
        assert_abs_diff_eq!(forecast.energy[0].into_inner(), 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(forecast.energy[18 * 12].into_inner(), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_weighted_average() {
        let now = time(9, 0);
        let history = history(time(1, 0), now, |time| if time.day() == 8 { 0.2 } else { 0.1 });
        let config = ForecastConfig {
            days_previous: vec![1, 7],
            days_previous_weight: vec![3.0, 1.0],
            ..config()
        };
        let forecast = LoadForecaster::builder()
            .config(&config)
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 1));
        let expected = (0.2 * 3.0 + 0.1) / 4.0;
        assert_abs_diff_eq!(forecast.energy[0].into_inner(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_fills_short_gaps_only() {
        let now = time(3, 0);
        let history = history(time(1, 0), now, |time| {
            let hour = time.hour();
            let minute = time.minute();
            if hour == 10 && minute < 15 {
                // 15 minutes without samples:
                0.0
            } else if (14..16).contains(&hour) {
                // Two hours away from home:
                0.0
            } else {
                0.1
            }
        });
        let forecast = LoadForecaster::builder()
            .config(&config())
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 24));
        assert_abs_diff_eq!(forecast.energy[10 * 12].into_inner(), 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(forecast.energy[14 * 12].into_inner(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_history_counts_gaps() {
        let now = time(3, 0);
        let forecast = LoadForecaster::builder()
            .config(&config())
            .history(&EnergySeries::default())
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 1));
        assert_eq!(forecast.n_missing, 24 * 12);
        assert_eq!(forecast.energy[0], KilowattHours::ZERO);
    }

    #[test]
    fn test_modal_filter_drops_lowest_day() {
        let now = time(5, 0);
        let history = history(time(1, 0), now, |time| if time.day() == 3 { 0.01 } else { 0.1 });
        let config =
            ForecastConfig { days_previous: vec![1, 2, 3], modal_filter: true, ..config() };
        let forecast = LoadForecaster::builder()
            .config(&config)
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 1));
        assert_eq!(forecast.dropped_day, Some(2));
        assert_abs_diff_eq!(forecast.energy[0].into_inner(), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_subtracts_car_charging_above_threshold() {
        let now = time(3, 0);
        let history = history(time(1, 0), now, |time| if time.hour() == 1 { 0.7 } else { 0.1 });
        let forecast = LoadForecaster::builder()
            .config(&config())
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 2));
        // 8.4 kW in the history minus 7.4 kW of car charging:
        assert_abs_diff_eq!(forecast.energy[12].into_inner(), 0.7 - 7.4 / 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_subtracts_car_energy_series() {
        let now = time(3, 0);
        let history = history(time(1, 0), now, |_| 0.3);
        let car = history_of_car(time(2, 0), time(2, 1));
        let forecast = LoadForecaster::builder()
            .config(&config())
            .history(&history)
            .car_energy(&car)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 2));
        assert_abs_diff_eq!(forecast.energy[0].into_inner(), 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(forecast.energy[12].into_inner(), 0.3, epsilon = 1e-9);
    }

    fn history_of_car(start: DateTime<Local>, end: DateTime<Local>) -> EnergySeries {
        history(start, end, |_| 0.2)
    }

    #[test]
    fn test_in_day_correction_fades_out() {
        let now = time(3, 2);
        let history = history(time(1, 0), now, |time| if time.day() == 3 { 0.2 } else { 0.1 });
        let config = ForecastConfig { in_day_correction: true, ..config() };
        let forecast = LoadForecaster::builder()
            .config(&config)
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 12));
        assert_eq!(forecast.in_day_ratio, Some(2.0));
        // The weight fades from midnight, so at 02:00 it is already down to three quarters:
        assert_abs_diff_eq!(forecast.energy[0].into_inner(), 0.175, epsilon = 1e-9);
        assert_abs_diff_eq!(forecast.energy[2 * 12].into_inner(), 0.15, epsilon = 1e-9);
        assert_abs_diff_eq!(forecast.energy[6 * 12].into_inner(), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_in_day_correction_expires_in_the_morning() {
        let now = time(3, 9);
        let history = history(time(1, 0), now, |time| if time.day() == 3 { 0.2 } else { 0.1 });
        let config = ForecastConfig { in_day_correction: true, ..config() };
        let forecast = LoadForecaster::builder()
            .config(&config)
            .history(&history)
            .now(now)
            .slot(SLOT)
            .gap_fill(TimeDelta::minutes(30))
            .build()
            .forecast(&horizon(now, 2));
        assert_eq!(forecast.in_day_ratio, Some(2.0));
        assert_abs_diff_eq!(forecast.energy[0].into_inner(), 0.1, epsilon = 1e-9);
    }
}
