//! Candidate window construction.

use chrono::{DurationRound, TimeDelta};
use itertools::Itertools;
use sundial_quantities::{energy::KilowattHours, rate::KilowattHourRate};

use crate::{
    config::{OptimizerConfig, Timing},
    core::{
        aggregate::Aggregate,
        slot::Slot,
        window::{Window, WindowKind},
    },
    ops::Interval,
    optimizer::thresholds::Thresholds,
};

/// Plan interval with its duration-weighted average rates.
#[derive(Copy, Clone, Debug)]
pub struct Block {
    pub interval: Interval,
    pub import_rate: KilowattHourRate,
    pub export_rate: KilowattHourRate,
}

/// Group the slots into plan intervals, the first one may be partial.
#[must_use]
pub fn blocks(slots: &[Slot], plan_interval: TimeDelta) -> Vec<Block> {
    slots
        .iter()
        .chunk_by(|slot| {
            slot.interval.start.duration_trunc(plan_interval).unwrap_or(slot.interval.start)
        })
        .into_iter()
        .filter_map(|(_, chunk)| {
            let chunk = chunk.collect_vec();
            let interval =
                Interval::from_std(chunk.first()?.interval.start..chunk.last()?.interval.end);
            let average = |rate: fn(&Slot) -> KilowattHourRate| {
                chunk
                    .iter()
                    .map(|slot| (rate(slot).into_inner(), slot.interval.hours()))
                    .weighted_mean()
                    .map_or(KilowattHourRate::ZERO, KilowattHourRate::from)
            };
            Some(Block {
                interval,
                import_rate: average(|slot| slot.import_rate),
                export_rate: average(|slot| slot.export_rate),
            })
        })
        .collect()
}

/// Window under construction.
struct Run {
    interval: Interval,
    rate: KilowattHourRate,
}

impl Run {
    fn extend(&mut self, block_interval: Interval, block_rate: KilowattHourRate) {
        let (hours, block_hours) = (self.interval.hours(), block_interval.hours());
        self.rate = (self.rate * hours + block_rate * block_hours) / (hours + block_hours);
        self.interval.end = block_interval.end;
    }
}

/// Build inactive charge and export candidates, chronologically ordered.
///
/// Charge windows start at the reserve and export windows at the full capacity, so that the
/// initial plan is equivalent to no plan at all.
#[must_use]
pub fn candidates(
    config: &OptimizerConfig,
    thresholds: Thresholds,
    timing: Timing,
    slots: &[Slot],
    reserve: KilowattHours,
    capacity: KilowattHours,
) -> Vec<Window> {
    let blocks = blocks(slots, timing.plan_interval);
    let split = TimeDelta::minutes(config.window_split_minutes);

    let charge = group(
        blocks
            .iter()
            .filter(|block| block.import_rate <= thresholds.charge)
            .map(|block| (block.interval, block.import_rate)),
        config.combine_charge_slots,
        config.combine_rate_threshold,
        split,
    )
    .into_iter()
    .map(|run| Window {
        kind: WindowKind::Charge,
        interval: run.interval,
        target: reserve,
        average_rate: run.rate,
    });

    let export = if config.calculate_export {
        group(
            blocks
                .iter()
                .filter(|block| block.export_rate >= thresholds.export)
                .map(|block| (block.interval, block.export_rate)),
            config.combine_export_slots,
            config.combine_rate_threshold,
            split,
        )
    } else {
        Vec::new()
    }
    .into_iter()
    .map(|run| Window {
        kind: WindowKind::Export,
        interval: run.interval,
        target: capacity,
        average_rate: run.rate,
    });

    charge
        .chain(export)
        .sorted_by_key(|window| (window.interval.start, !window.kind.is_charge()))
        .collect()
}

/// Merge adjacent candidate blocks.
///
/// When combining, a block joins the current run while its rate is within `rate_threshold` of the
/// run average. Otherwise only equal-rate blocks are merged, up to `split` long.
fn group(
    blocks: impl IntoIterator<Item = (Interval, KilowattHourRate)>,
    combine: bool,
    rate_threshold: KilowattHourRate,
    split: TimeDelta,
) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (interval, rate) in blocks {
        if let Some(run) = runs.last_mut()
            && run.interval.end == interval.start
        {
            let joins = if combine {
                (rate - run.rate).abs() <= rate_threshold
            } else {
                rate == run.rate && run.interval.len() + interval.len() <= split
            };
            if joins {
                run.extend(interval, rate);
                continue;
            }
        }
        runs.push(Run { interval, rate });
    }
    runs
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, Local, TimeZone};

    use super::*;

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
    }

    fn timing() -> Timing {
        Timing {
            slot: TimeDelta::minutes(5),
            plan_interval: TimeDelta::minutes(30),
            horizon: TimeDelta::hours(48),
        }
    }

    /// Five-minute slots with one import rate per half hour.
    fn slots(import_rates: &[f64]) -> Vec<Slot> {
        let end = start() + TimeDelta::minutes(30) * i32::try_from(import_rates.len()).unwrap();
        Interval::from_std(start()..end)
            .steps(TimeDelta::minutes(5))
            .zip(import_rates.iter().flat_map(|rate| [*rate; 6]))
            .map(|(interval, rate)| Slot {
                interval,
                load: KilowattHours::ZERO,
                load10: KilowattHours::ZERO,
                pv: KilowattHours::ZERO,
                pv10: KilowattHours::ZERO,
                pv90: None,
                import_rate: KilowattHourRate::from(rate),
                export_rate: KilowattHourRate::from(15.0),
                carbon_intensity: None,
                car_load: KilowattHours::ZERO,
            })
            .collect()
    }

    fn charge_windows(config: &OptimizerConfig, import_rates: &[f64]) -> Vec<Window> {
        let thresholds = Thresholds { charge: 12.0.into(), export: 100.0.into() };
        let slots = slots(import_rates);
        candidates(config, thresholds, timing(), &slots, KilowattHours::ZERO, 10.0.into())
    }

    #[test]
    fn test_blocks_follow_plan_intervals() {
        let mut slots = slots(&[10.0, 20.0]);
        slots.remove(0);
        let blocks = blocks(&slots, TimeDelta::minutes(30));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].interval.start, start() + TimeDelta::minutes(5));
        assert_eq!(blocks[1].interval.start, start() + TimeDelta::minutes(30));
        assert_abs_diff_eq!(blocks[1].import_rate.into_inner(), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_combine_close_rates() {
        let windows = charge_windows(&OptimizerConfig::default(), &[10.0, 10.4, 30.0]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].interval, Interval::from_std(start()..start() + TimeDelta::hours(1)));
        assert_abs_diff_eq!(windows[0].average_rate.into_inner(), 10.2, epsilon = 1e-9);
        assert_eq!(windows[0].target, KilowattHours::ZERO);
    }

    #[test]
    fn test_distant_rates_are_separate() {
        let windows = charge_windows(&OptimizerConfig::default(), &[5.0, 10.4]);
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn test_split_when_not_combining() {
        let config = OptimizerConfig { combine_charge_slots: false, ..OptimizerConfig::default() };
        let windows = charge_windows(&config, &[10.0, 10.0, 10.0, 10.4]);
        assert_eq!(
            windows.iter().map(|window| window.interval.minutes()).collect_vec(),
            [60, 30, 30],
        );
    }

    #[test]
    fn test_export_candidates() {
        let config = OptimizerConfig::default();
        let thresholds = Thresholds { charge: 0.0.into(), export: 15.0.into() };
        let slots = slots(&[30.0, 30.0, 30.0]);
        let windows =
            candidates(&config, thresholds, timing(), &slots, KilowattHours::ZERO, 10.0.into());
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|window| window.kind == WindowKind::Export));
        assert!(windows.iter().all(|window| window.target == KilowattHours::from(10.0)));

        let config = OptimizerConfig { calculate_export: false, ..config };
        assert!(
            candidates(&config, thresholds, timing(), &slots, KilowattHours::ZERO, 10.0.into())
                .is_empty()
        );
    }
}
