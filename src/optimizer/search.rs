//! Multi-pass local search over window targets.
//!
//! Every pass starts from the incumbent windows and only accepts a change that lowers the metric by
//! more than the applicable threshold, so no pass can make the plan worse.

use bon::bon;
use chrono::{DateTime, Local, TimeDelta};
use itertools::Itertools;
use sundial_quantities::{cost::Cost, energy::KilowattHours};

use crate::{
    battery::{Battery, Simulator},
    config::OptimizerConfig,
    core::{
        plan::Plan,
        scenario::Scenario,
        window::{ENERGY_EPSILON, Window, WindowKind},
    },
    optimizer::pool::Pool,
    prelude::*,
};

/// Number of windows that get the full treatment in fast mode, and that the tweak pass revisits.
const N_NEAR_WINDOWS: usize = 8;

/// Coarse region length of the pruning pass.
const REGION: TimeDelta = TimeDelta::hours(4);

/// Weighted metric of a set of windows.
pub struct Evaluator<'a> {
    pub simulator: &'a Simulator<'a>,

    /// Weight of the pessimistic scenario.
    pub weight10: f64,

    pub discharge_on_charge: bool,
}

impl Evaluator<'_> {
    #[must_use]
    pub fn metric(&self, windows: &[Window]) -> Cost {
        let plan = Plan::new(windows.to_vec(), self.discharge_on_charge);
        let best = self.simulator.run(&plan, Scenario::Best, false).totals.metric;
        if self.weight10 == 0.0 {
            return best;
        }
        let best10 = self.simulator.run(&plan, Scenario::Best10, false).totals.metric;
        best * (1.0 - self.weight10) + best10 * self.weight10
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Depth {
    /// Every target step.
    Full,

    /// Disabled or at the extreme target.
    OnOff,

    /// A couple of steps around the current target.
    Tweak,
}

pub struct Search<'a> {
    config: &'a OptimizerConfig,
    evaluator: Evaluator<'a>,
    pool: Pool,
    battery: &'a Battery,
    slot: TimeDelta,
    plan_interval: TimeDelta,

    /// Start of the horizon.
    origin: DateTime<Local>,

    pub windows: Vec<Window>,

    /// Windows as constructed, before any start tuning.
    origins: Vec<Window>,

    /// Windows excluded by the region pass.
    pruned: Vec<bool>,

    pub metric: Cost,
    pub n_evaluations: usize,
}

#[bon]
impl<'a> Search<'a> {
    #[builder]
    pub fn new(
        config: &'a OptimizerConfig,
        evaluator: Evaluator<'a>,
        pool: Pool,
        battery: &'a Battery,
        slot: TimeDelta,
        plan_interval: TimeDelta,
        origin: DateTime<Local>,
        windows: Vec<Window>,
    ) -> Self {
        let metric = evaluator.metric(&windows);
        Self {
            config,
            evaluator,
            pool,
            battery,
            slot,
            plan_interval,
            origin,
            pruned: vec![false; windows.len()],
            origins: windows.clone(),
            windows,
            metric,
            n_evaluations: 1,
        }
    }

    /// Run all the configured passes.
    #[instrument(skip_all, fields(n_windows = self.windows.len()))]
    pub fn run(&mut self) {
        let initial_metric = self.metric;
        if self.config.calculate_regions {
            self.region_pass();
        }

        let order = (0..self.windows.len()).filter(|index| !self.pruned[*index]).collect_vec();
        for (position, index) in order.iter().copied().enumerate() {
            let depth = if self.config.fast_plan && position >= N_NEAR_WINDOWS {
                Depth::OnOff
            } else {
                Depth::Full
            };
            self.optimize_window(index, depth);
        }
        info!(metric = %self.metric, n_evaluations = self.n_evaluations, "main pass done");

        if self.config.tweak_plan {
            for index in order.iter().copied().take(N_NEAR_WINDOWS) {
                self.optimize_window(index, Depth::Tweak);
            }
            debug!(metric = %self.metric, "tweak pass done");
        }

        if self.config.second_pass {
            for index in order.iter().copied() {
                self.optimize_window(index, Depth::Full);
            }
            debug!(metric = %self.metric, "second pass done");
        }

        info!(
            initial_metric = %initial_metric,
            metric = %self.metric,
            n_evaluations = self.n_evaluations,
            n_pruned = self.pruned.iter().filter(|pruned| **pruned).count(),
            "optimized",
        );
    }

    /// Evaluate variants of the incumbent windows in parallel.
    fn evaluate(&mut self, variants: Vec<Vec<Window>>) -> Vec<Cost> {
        self.n_evaluations += variants.len();
        let evaluator = &self.evaluator;
        self.pool.map(variants, |windows| evaluator.metric(&windows))
    }

    /// Incumbent windows with the one at `index` replaced by each candidate.
    fn with_candidates(&self, index: usize, candidates: &[Window]) -> Vec<Vec<Window>> {
        candidates
            .iter()
            .map(|candidate| {
                let mut windows = self.windows.clone();
                windows[index] = *candidate;
                windows
            })
            .collect()
    }

    /// Accept the most preferred candidate among the best ones, unless the incumbent is as good.
    ///
    /// Each candidate has to beat the incumbent by its own threshold.
    fn accept(
        &mut self,
        index: usize,
        candidates: &[Window],
        metrics: &[Cost],
        thresholds: &[Cost],
    ) {
        let Some(best) = metrics.iter().copied().min() else {
            return;
        };
        let chosen = candidates.iter().zip(metrics).zip(thresholds).find(
            |((_, metric), threshold)| {
                **metric <= best + **threshold && **metric < self.metric - **threshold
            },
        );
        if let Some(((candidate, metric), _)) = chosen {
            trace!(index, target = %candidate.target, kind = %candidate.kind, %metric, "accepted");
            self.windows[index] = *candidate;
            self.metric = *metric;
        }
    }

    fn optimize_window(&mut self, index: usize, depth: Depth) {
        let window = self.windows[index];
        let (candidates, threshold) = if window.kind.is_charge() {
            (self.charge_candidates(window, depth), self.config.metric_min_improvement)
        } else {
            (self.export_candidates(window, depth), self.export_threshold(window))
        };
        let candidates =
            candidates.into_iter().filter(|candidate| *candidate != window).collect_vec();
        let metrics = self.evaluate(self.with_candidates(index, &candidates));
        self.accept(index, &candidates, &metrics, &vec![threshold; candidates.len()]);

        if depth == Depth::Full
            && self.windows[index].kind == WindowKind::Export
            && self.windows[index].is_active(self.battery.reserve, self.battery.capacity)
        {
            self.tune_export_start(index);
        }
    }

    /// Minimum improvement for exporting, proportional to the window length.
    fn export_threshold(&self, window: Window) -> Cost {
        self.export_threshold_over(window.interval.len())
    }

    /// Minimum improvement for exporting over `span`.
    fn export_threshold_over(&self, span: TimeDelta) -> Cost {
        #[expect(clippy::cast_precision_loss)]
        let n_half_hours = span.abs().num_minutes() as f64 / 30.0;
        self.config.metric_min_improvement_export * n_half_hours
    }

    /// Charge range, the lower end disables the window.
    fn charge_range(&self) -> (KilowattHours, KilowattHours) {
        let capacity = self.battery.capacity;
        let lower = self.battery.reserve.max(self.config.best_soc_min).min(capacity);
        let upper = self.config.best_soc_max.unwrap_or(capacity).min(capacity).max(lower);
        (lower, upper)
    }

    /// Charge candidates in ascending target order, so that ties prefer less charging.
    fn charge_candidates(&self, window: Window, depth: Depth) -> Vec<Window> {
        let reserve = self.battery.reserve;
        let (lower, upper) = self.charge_range();
        let step = self.config.soc_step;
        let mut targets = match depth {
            Depth::Full => steps(lower, upper, step),
            Depth::OnOff => vec![lower, upper],
            Depth::Tweak => around(window.target, lower, upper, step),
        };
        targets.push(reserve);
        let mut candidates = targets
            .into_iter()
            .sorted()
            .dedup_by(|lhs, rhs| (*lhs - *rhs).abs() < ENERGY_EPSILON)
            .map(|target| Window { kind: WindowKind::Charge, target, ..window })
            .collect_vec();
        if self.config.set_charge_freeze {
            candidates.push(Window { kind: WindowKind::ChargeFreeze, ..window });
        }
        candidates
    }

    /// Export candidates in descending target order, so that ties prefer less exporting.
    fn export_candidates(&self, window: Window, depth: Depth) -> Vec<Window> {
        let (reserve, capacity) = (self.battery.reserve, self.battery.capacity);
        let step = self.config.soc_step;
        let mut targets = match depth {
            Depth::Full => steps(reserve, capacity, step),
            Depth::OnOff => vec![reserve],
            Depth::Tweak => around(window.target, reserve, capacity, step),
        };
        targets.push(capacity);
        let mut candidates = targets
            .into_iter()
            .sorted_by(|lhs, rhs| rhs.cmp(lhs))
            .dedup_by(|lhs, rhs| (*lhs - *rhs).abs() < ENERGY_EPSILON)
            .map(|target| Window { kind: WindowKind::Export, target, ..window })
            .collect_vec();
        if self.config.set_export_freeze {
            candidates.push(Window { kind: WindowKind::ExportFreeze, ..window });
        }
        candidates
    }

    /// Move the export start in slot steps within its first plan interval, keeping the end.
    fn tune_export_start(&mut self, index: usize) {
        let window = self.windows[index];
        let origin = self.origins[index].interval;
        let latest = (origin.start + self.plan_interval - self.slot).min(origin.end - self.slot);
        let in_origin = |start: &DateTime<Local>| *start >= origin.start;
        let candidates = std::iter::successors(Some(latest).filter(in_origin), |start| {
            Some(*start - self.slot).filter(in_origin)
        })
        .filter(|start| *start != window.interval.start)
        .map(|start| Window { interval: window.interval.with_start(start), ..window })
        .collect_vec();
        if candidates.is_empty() {
            return;
        }
        let metrics = self.evaluate(self.with_candidates(index, &candidates));
        // Only the shifted span has to pay for itself:
        let thresholds = candidates
            .iter()
            .map(|candidate| {
                self.export_threshold_over(candidate.interval.start - window.interval.start)
            })
            .collect_vec();
        self.accept(index, &candidates, &metrics, &thresholds);
    }

    /// Prune the windows of the regions where neither charging nor exporting helps.
    #[instrument(skip_all)]
    fn region_pass(&mut self) {
        let regions = (0..self.windows.len())
            .into_group_map_by(|index| {
                (self.windows[*index].interval.start - self.origin).num_seconds()
                    / REGION.num_seconds()
            })
            .into_iter()
            .sorted_by_key(|(region, _)| *region)
            .map(|(_, indices)| indices)
            .collect_vec();

        let (lower, upper) = self.charge_range();
        let charge_targets = [upper, lower + (upper - lower) * 0.5];
        let charge_metrics = self.region_metrics(&regions, true, &charge_targets);
        let threshold = self.config.metric_min_improvement;
        for (indices, metrics) in regions.iter().zip(&charge_metrics) {
            if metrics.iter().all(|metric| *metric >= self.metric - threshold) {
                self.prune(indices, true);
            }
        }

        // Exports are judged with all remaining charge windows at the full target:
        let mut charged = self.windows.clone();
        for (window, pruned) in charged.iter_mut().zip(&self.pruned) {
            if window.kind == WindowKind::Charge && !pruned {
                window.target = upper;
            }
        }
        let charged_metric = self.evaluator.metric(&charged);
        self.n_evaluations += 1;
        let (reserve, capacity) = (self.battery.reserve, self.battery.capacity);
        let export_targets = [reserve, reserve + (capacity - reserve) * 0.5];
        let incumbent = std::mem::replace(&mut self.windows, charged);
        let export_metrics = self.region_metrics(&regions, false, &export_targets);
        self.windows = incumbent;
        for (indices, metrics) in regions.iter().zip(&export_metrics) {
            let threshold = indices
                .iter()
                .filter(|index| !self.windows[**index].kind.is_charge())
                .map(|index| self.export_threshold(self.windows[*index]))
                .sum::<Cost>();
            if metrics.iter().all(|metric| *metric >= charged_metric - threshold) {
                self.prune(indices, false);
            }
        }
        debug!(
            n_regions = regions.len(),
            n_pruned = self.pruned.iter().filter(|pruned| **pruned).count(),
            "region pass done",
        );
    }

    /// Metric of every region with its windows of one direction set to each of the targets.
    fn region_metrics(
        &mut self,
        regions: &[Vec<usize>],
        charge: bool,
        targets: &[KilowattHours],
    ) -> Vec<Vec<Cost>> {
        let incumbent = &self.windows;
        let variants = regions
            .iter()
            .flat_map(|indices| {
                targets.iter().map(move |target| {
                    let mut windows = incumbent.clone();
                    for index in indices {
                        if windows[*index].kind.is_charge() == charge {
                            windows[*index].target = *target;
                        }
                    }
                    windows
                })
            })
            .collect_vec();
        let metrics = self.evaluate(variants);
        metrics.chunks(targets.len().max(1)).map(<[Cost]>::to_vec).collect()
    }

    fn prune(&mut self, indices: &[usize], charge: bool) {
        for index in indices {
            if self.windows[*index].kind.is_charge() == charge {
                self.pruned[*index] = true;
            }
        }
    }
}

/// `lower`, `lower + step`, … up to and including `upper`.
fn steps(lower: KilowattHours, upper: KilowattHours, step: KilowattHours) -> Vec<KilowattHours> {
    let mut targets = Vec::new();
    let mut target = lower;
    while target < upper - ENERGY_EPSILON {
        targets.push(target);
        target += step;
    }
    targets.push(upper);
    targets
}

/// Up to two steps either side of the current target, within the range.
fn around(
    target: KilowattHours,
    lower: KilowattHours,
    upper: KilowattHours,
    step: KilowattHours,
) -> Vec<KilowattHours> {
    [-2.0, -1.0, 0.0, 1.0, 2.0]
        .into_iter()
        .map(|n_steps| (target + step * n_steps).clamp_to(lower, upper))
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use sundial_quantities::rate::KilowattHourRate;

    use super::*;
    use crate::{
        battery::PowerCurve,
        config::BatteryConfig,
        core::slot::Slot,
        ops::Interval,
        optimizer::Threads,
    };

    const SLOT: TimeDelta = TimeDelta::minutes(5);

    fn origin() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 22, 0, 0).unwrap()
    }

    /// Average power and rates over one hour of the horizon.
    #[derive(Copy, Clone, Default)]
    struct Hour {
        pv: f64,
        load: f64,
        import_rate: f64,
        export_rate: f64,
    }

    fn slots(hours: &[Hour]) -> Vec<Slot> {
        let end = origin() + TimeDelta::hours(i64::try_from(hours.len()).unwrap());
        Interval::from_std(origin()..end)
            .steps(SLOT)
            .zip(hours.iter().flat_map(|hour| std::iter::repeat_n(*hour, 12)))
            .map(|(interval, hour)| Slot {
                interval,
                load: KilowattHours::from(hour.load / 12.0),
                load10: KilowattHours::from(hour.load / 12.0),
                pv: KilowattHours::from(hour.pv / 12.0),
                pv10: KilowattHours::from(hour.pv / 12.0),
                pv90: None,
                import_rate: KilowattHourRate::from(hour.import_rate),
                export_rate: KilowattHourRate::from(hour.export_rate),
                carbon_intensity: None,
                car_load: KilowattHours::ZERO,
            })
            .collect()
    }

    /// Cheap hour, then two hours of 1 kW house load at the peak rate.
    fn evening_load() -> Vec<Slot> {
        let peak = Hour { import_rate: 30.0, ..Hour::default() };
        let evening = Hour { load: 1.0, ..peak };
        slots(&[peak, Hour { import_rate: 5.0, ..peak }, evening, evening])
    }

    /// Solar worth exporting now, and a battery worth keeping for the evening.
    fn sunny_export() -> Vec<Slot> {
        let evening = Hour { load: 1.0, import_rate: 30.0, ..Hour::default() };
        slots(&[
            Hour { pv: 1.0, import_rate: 20.0, export_rate: 28.0, ..Hour::default() },
            evening,
            evening,
        ])
    }

    fn battery() -> Battery {
        let config = BatteryConfig {
            reserve_percent: 0.0,
            inverter_loss: 0.0,
            value_scaling: 0.0,
            ..BatteryConfig::default()
        };
        Battery::new(&config, PowerCurve::FLAT, PowerCurve::FLAT)
    }

    fn simulator<'a>(slots: &'a [Slot], battery: &'a Battery, initial_soc: f64) -> Simulator<'a> {
        Simulator::builder()
            .slots(slots)
            .battery(battery)
            .initial_soc(KilowattHours::from(initial_soc))
            .slot_duration(SLOT)
            .build()
    }

    fn window(kind: WindowKind, minutes: std::ops::Range<i64>, target: f64) -> Window {
        Window {
            kind,
            interval: Interval::from_std(
                origin() + TimeDelta::minutes(minutes.start)
                    ..origin() + TimeDelta::minutes(minutes.end),
            ),
            target: KilowattHours::from(target),
            average_rate: KilowattHourRate::ZERO,
        }
    }

    fn config() -> OptimizerConfig {
        OptimizerConfig {
            calculate_regions: false,
            tweak_plan: false,
            second_pass: false,
            ..OptimizerConfig::default()
        }
    }

    fn new_search<'a>(
        config: &'a OptimizerConfig,
        simulator: &'a Simulator<'a>,
        battery: &'a Battery,
        windows: Vec<Window>,
    ) -> Search<'a> {
        Search::builder()
            .config(config)
            .evaluator(Evaluator { simulator, weight10: 0.0, discharge_on_charge: true })
            .pool(Pool::new(Threads::Count(1)))
            .battery(battery)
            .slot(SLOT)
            .plan_interval(TimeDelta::minutes(30))
            .origin(origin())
            .windows(windows)
            .build()
    }

    #[test]
    fn test_charge_within_min_improvement_prefers_lower_soc() {
        let slots = evening_load();
        let battery = battery();
        let simulator = simulator(&slots, &battery, 0.0);
        let windows = vec![window(WindowKind::Charge, 60..120, 0.0)];
        let target_with = |metric_min_improvement: f64| {
            let metric_min_improvement = Cost::from(metric_min_improvement);
            let config = OptimizerConfig { metric_min_improvement, ..config() };
            let mut search = new_search(&config, &simulator, &battery, windows.clone());
            search.run();
            search.windows[0].target
        };

        // 2.5 kWh covers the evening, 2 kWh leaves 0.1 kWh to import at 30p:
        assert_eq!(target_with(0.0), KilowattHours::from(2.5));
        assert_eq!(target_with(1.0), KilowattHours::from(2.0));
        assert_eq!(target_with(100.0), KilowattHours::ZERO);
    }

    #[test]
    fn test_export_needs_min_improvement() {
        let slots = slots(&[Hour { import_rate: 30.0, export_rate: 50.0, ..Hour::default() }; 2]);
        let battery = battery();
        let simulator = simulator(&slots, &battery, 5.0);
        let windows = vec![window(WindowKind::Export, 0..120, 10.0)];
        let target_with = |per_half_hour: f64| {
            let metric_min_improvement_export = Cost::from(per_half_hour);
            let config = OptimizerConfig { metric_min_improvement_export, ..config() };
            let mut search = new_search(&config, &simulator, &battery, windows.clone());
            search.run();
            search.windows[0].target
        };

        assert_eq!(target_with(0.0), KilowattHours::ZERO);
        // 4.75 kWh at 50p does not earn 100p per half hour over two hours:
        assert_eq!(target_with(100.0), battery.capacity);
    }

    #[test]
    fn test_fast_plan_decides_far_windows_on_off() {
        let slots = evening_load();
        let battery = battery();
        let simulator = simulator(&slots, &battery, 0.0);
        // Eight short windows at the peak rate, then the cheap hour:
        let windows = (0..8)
            .map(|index| window(WindowKind::Charge, index * 5..index * 5 + 5, 0.0))
            .chain([window(WindowKind::Charge, 60..120, 0.0)])
            .collect_vec();

        let full_config = config();
        let mut full = new_search(&full_config, &simulator, &battery, windows.clone());
        full.run();
        let fast_config = OptimizerConfig { fast_plan: true, ..config() };
        let mut fast = new_search(&fast_config, &simulator, &battery, windows);
        fast.run();

        assert!(full.windows[..8].iter().all(|window| window.target == KilowattHours::ZERO));
        assert_eq!(full.windows[8].target, KilowattHours::from(2.5));
        assert_eq!(fast.windows[8].target, battery.capacity);
        assert!(fast.metric > full.metric);
        assert!(fast.n_evaluations < full.n_evaluations);
    }

    #[test]
    fn test_region_pass_prunes_unprofitable_windows() {
        let peak = Hour { import_rate: 30.0, ..Hour::default() };
        let slots = slots(&[
            Hour { import_rate: 5.0, ..peak },
            Hour { load: 1.0, ..peak },
            Hour { load: 1.0, ..peak },
            peak,
            peak,
            peak,
            peak,
            peak,
        ]);
        let battery = battery();
        let simulator = simulator(&slots, &battery, 0.0);
        // The second window is in the next region with nothing left to cover:
        let windows =
            vec![window(WindowKind::Charge, 0..60, 0.0), window(WindowKind::Charge, 300..360, 0.0)];

        let regions_config = OptimizerConfig { calculate_regions: true, ..config() };
        let mut pruning = new_search(&regions_config, &simulator, &battery, windows.clone());
        pruning.run();
        let exhaustive_config = config();
        let mut exhaustive = new_search(&exhaustive_config, &simulator, &battery, windows);
        exhaustive.run();

        assert_eq!(pruning.pruned, [false, true]);
        assert_eq!(pruning.windows, exhaustive.windows);
        assert_eq!(pruning.windows[0].target, KilowattHours::from(2.5));
        assert!(pruning.n_evaluations < exhaustive.n_evaluations);
    }

    #[test]
    fn test_charge_freeze_candidate() {
        let slots = sunny_export();
        let battery = battery();
        let simulator = simulator(&slots, &battery, 2.0);
        let windows = vec![window(WindowKind::Charge, 0..60, 0.0)];
        let kind_with = |set_charge_freeze: bool| {
            let config = OptimizerConfig { set_charge_freeze, ..config() };
            let mut search = new_search(&config, &simulator, &battery, windows.clone());
            search.run();
            search.windows[0].kind
        };

        assert_eq!(kind_with(false), WindowKind::Charge);
        assert_eq!(kind_with(true), WindowKind::ChargeFreeze);
    }

    #[test]
    fn test_export_freeze_candidate() {
        let slots = sunny_export();
        let battery = battery();
        let simulator = simulator(&slots, &battery, 2.0);
        let windows = vec![window(WindowKind::Export, 0..60, 10.0)];
        let kind_with = |set_export_freeze: bool| {
            let config = OptimizerConfig {
                set_export_freeze,
                metric_min_improvement_export: Cost::ZERO,
                ..config()
            };
            let mut search = new_search(&config, &simulator, &battery, windows.clone());
            search.run();
            search.windows[0].kind
        };

        assert_eq!(kind_with(false), WindowKind::Export);
        assert_eq!(kind_with(true), WindowKind::ExportFreeze);
    }

    #[test]
    fn test_export_start_tuning() {
        let mut slots =
            slots(&[Hour { import_rate: 30.0, export_rate: 50.0, ..Hour::default() }; 2]);
        // Nothing to earn for the first quarter of an hour:
        for slot in &mut slots[..3] {
            slot.export_rate = KilowattHourRate::ZERO;
        }
        let battery = battery();
        let simulator = simulator(&slots, &battery, 2.0);
        let config =
            OptimizerConfig { metric_min_improvement_export: Cost::from(20.0), ..config() };
        let windows = vec![window(WindowKind::Export, 0..60, 10.0)];
        let mut search = new_search(&config, &simulator, &battery, windows);
        search.run();

        let tuned = search.windows[0];
        assert_eq!(tuned.target, KilowattHours::ZERO);
        assert!(tuned.interval.start > origin());
        assert!(tuned.interval.start < origin() + TimeDelta::minutes(30));
        assert_eq!(tuned.interval.end, origin() + TimeDelta::hours(1));
        // Starting on time exports 2 kWh with three idle slots, worth 5 × 0.2375 kWh × 50p:
        assert!(search.metric < Cost::from(-5.0 * 0.2375 * 50.0 - 1.0));
    }

    #[test]
    fn test_steps_include_upper() {
        let targets = steps(0.4.into(), 1.5.into(), 0.5.into());
        assert_eq!(targets.len(), 4);
        assert_abs_diff_eq!(targets[2].into_inner(), 1.4, epsilon = 1e-9);
        assert_abs_diff_eq!(targets[3].into_inner(), 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_around_is_clamped() {
        let targets = around(9.5.into(), 0.0.into(), 10.0.into(), 0.5.into());
        assert_abs_diff_eq!(targets[0].into_inner(), 8.5, epsilon = 1e-9);
        assert_abs_diff_eq!(targets[4].into_inner(), 10.0, epsilon = 1e-9);
    }
}
