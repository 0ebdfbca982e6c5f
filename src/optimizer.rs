//! Charge and export window optimization.

mod pool;
mod search;
mod thresholds;
mod windows;

use bon::Builder;
use enumset::EnumSet;
use itertools::Itertools;
use serde::Serialize;
use sundial_quantities::{cost::Cost, energy::KilowattHours};

pub use self::{
    pool::{Pool, Threads},
    thresholds::Thresholds,
    windows::{Block, blocks, candidates},
};
use self::search::{Evaluator, Search};
use crate::{
    battery::{Simulation, Simulator, SlotFlow},
    config::OptimizerConfig,
    core::{
        plan::{Plan, ScenarioTotals},
        scenario::{PerScenario, Scenario},
    },
    error::Warning,
    forecast::Forecast,
    prelude::*,
};

#[must_use]
#[derive(Clone, Debug, Serialize)]
pub struct Optimization {
    pub plan: Plan,
    pub thresholds: Thresholds,
    pub totals: PerScenario<ScenarioTotals>,

    /// Weighted metric of the chosen plan.
    pub metric: Cost,

    /// Per-slot records of the central scenario with the plan.
    pub flows: Vec<SlotFlow>,

    /// Per-slot records of the central scenario without the plan.
    pub base_flows: Vec<SlotFlow>,

    pub warnings: Vec<Warning>,
    pub n_evaluations: usize,
}

impl Optimization {
    /// Any scenario had to clamp an invalid state.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.totals.iter().any(|(_, totals)| totals.degraded)
    }
}

#[derive(Builder)]
#[builder(finish_fn(vis = ""))]
pub struct Optimizer<'a> {
    config: &'a OptimizerConfig,
    forecast: &'a Forecast,
    initial_soc: KilowattHours,

    #[builder(default)]
    car_from_battery: bool,
}

impl<S: optimizer_builder::IsComplete> OptimizerBuilder<'_, S> {
    pub fn optimize(self) -> Optimization {
        self.build().optimize()
    }
}

impl Optimizer<'_> {
    #[instrument(skip_all, fields(initial_soc = %self.initial_soc))]
    fn optimize(self) -> Optimization {
        let forecast = self.forecast;
        let battery = &forecast.battery;
        let simulator = Simulator::builder()
            .slots(&forecast.slots)
            .battery(battery)
            .initial_soc(self.initial_soc)
            .slot_duration(forecast.timing.slot)
            .standing_charge(forecast.standing_charge)
            .metric_carbon(self.config.metric_carbon)
            .keep(self.config.best_soc_keep)
            .keep_weight(self.config.best_soc_keep_weight)
            .car_from_battery(self.car_from_battery)
            .build();
        let pool = Pool::new(self.config.threads);

        let thresholds = Thresholds::select(self.config, &forecast.slots);
        let windows = candidates(
            self.config,
            thresholds,
            forecast.timing,
            &forecast.slots,
            battery.reserve,
            battery.capacity,
        );
        info!(
            charge_threshold = %thresholds.charge,
            export_threshold = %thresholds.export,
            n_candidates = windows.len(),
            n_threads = pool.n_threads(),
            "searching",
        );

        let mut search = Search::builder()
            .config(self.config)
            .evaluator(Evaluator {
                simulator: &simulator,
                weight10: self.config.pv_metric10_weight,
                discharge_on_charge: self.config.calculate_discharge_oncharge,
            })
            .pool(pool)
            .battery(battery)
            .slot(forecast.timing.slot)
            .plan_interval(forecast.timing.plan_interval)
            .origin(forecast.now)
            .windows(windows)
            .build();
        search.run();

        let plan = Plan::new(
            search
                .windows
                .iter()
                .filter(|window| window.is_active(battery.reserve, battery.capacity))
                .copied()
                .collect(),
            self.config.calculate_discharge_oncharge,
        );

        let run = |scenario: Scenario| {
            let record = matches!(scenario, Scenario::Base | Scenario::Best);
            simulator.run(&plan, scenario, record)
        };
        let mut simulations =
            pool.map(EnumSet::<Scenario>::all().iter().collect_vec(), run).into_iter();
        let simulations: PerScenario<Simulation> =
            PerScenario::from_fn(|scenario| simulations.next().unwrap_or_else(|| run(scenario)));

        let warnings = simulations
            .iter()
            .filter_map(|(_, simulation)| simulation.divergence.clone())
            .dedup()
            .collect_vec();
        let totals = PerScenario::from_fn(|scenario| simulations[scenario].totals);
        info!(
            n_windows = plan.windows.len(),
            base = %totals.base.cost,
            best = %totals.best.cost,
            best10 = %totals.best10.cost,
            "optimized",
        );
        let PerScenario { base, best, .. } = simulations;
        Optimization {
            plan,
            thresholds,
            totals,
            metric: search.metric,
            flows: best.flows,
            base_flows: base.flows,
            warnings,
            n_evaluations: search.n_evaluations,
        }
    }
}
