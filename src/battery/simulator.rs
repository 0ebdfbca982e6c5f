use std::fmt::{Display, Formatter};

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta, Timelike};
use comfy_table::Color;
use serde::Serialize;
use sundial_quantities::{Quantity, cost::Cost, energy::KilowattHours, rate::KilowattHourRate};

use crate::{
    battery::Battery,
    core::{
        plan::{Plan, ScenarioTotals},
        scenario::Scenario,
        slot::Slot,
        window::{ENERGY_EPSILON, WindowKind},
    },
    error::Warning,
    ops::Interval,
};

/// What the battery was asked to do in a slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Solar first, then battery, then grid.
    Eco,

    /// Forced charging towards the window target.
    Charge,

    /// Charge window target reached, battery is not discharged.
    Hold,

    /// State of charge is kept constant.
    Freeze,

    /// Forced discharging towards the window target.
    Export,
}

impl SimulationMode {
    pub const fn color(self) -> Color {
        match self {
            Self::Eco => Color::Reset,
            Self::Charge => Color::Green,
            Self::Hold => Color::DarkGreen,
            Self::Freeze => Color::Cyan,
            Self::Export => Color::Blue,
        }
    }
}

impl Display for SimulationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eco => write!(f, "Eco"),
            Self::Charge => write!(f, "Charge"),
            Self::Hold => write!(f, "Hold"),
            Self::Freeze => write!(f, "Freeze"),
            Self::Export => write!(f, "Export"),
        }
    }
}

/// Energy balance of one simulated slot.
///
/// `pv + import + battery_out = load + battery_in + export + losses` holds for every record.
#[derive(Copy, Clone, Debug, Serialize)]
pub struct SlotFlow {
    pub interval: Interval,
    pub mode: SimulationMode,

    /// Usable solar generation.
    pub pv: KilowattHours,

    /// Solar discarded at the inverter or the export limit.
    pub clipped: KilowattHours,

    pub load: KilowattHours,
    pub import: KilowattHours,
    pub export: KilowattHours,

    /// Energy added to the state of charge.
    pub battery_in: KilowattHours,

    /// Energy removed from the state of charge.
    pub battery_out: KilowattHours,

    pub losses: KilowattHours,
    pub soc_before: KilowattHours,
    pub soc_after: KilowattHours,
    pub cost: Cost,
}

pub struct Simulation {
    pub totals: ScenarioTotals,

    /// Per-slot records, empty unless recording was requested.
    pub flows: Vec<SlotFlow>,

    pub divergence: Option<Warning>,
}

#[derive(Builder)]
pub struct Simulator<'a> {
    slots: &'a [Slot],
    battery: &'a Battery,
    initial_soc: KilowattHours,
    slot_duration: TimeDelta,

    /// Charged once per local day, at midnight.
    #[builder(default)]
    standing_charge: Cost,

    /// Carbon price in pence per kilogram.
    #[builder(default)]
    metric_carbon: f64,

    /// Soft floor, the metric is penalized while the battery is below it.
    #[builder(default)]
    keep: KilowattHours,

    #[builder(default)]
    keep_weight: f64,

    #[builder(default)]
    car_from_battery: bool,
}

/// Per-slot directive resolved from the plan.
#[derive(Copy, Clone)]
enum Directive {
    None,
    Charge { target: KilowattHours, remaining_slots: usize },
    Freeze,
    Export { target: KilowattHours },
}

impl Simulator<'_> {
    /// Simulate the scenario, the plan is ignored for the base scenarios.
    #[must_use]
    pub fn run(&self, plan: &Plan, scenario: Scenario, record: bool) -> Simulation {
        let battery = self.battery;
        let slot_hours = self.slot_duration.as_seconds_f64() / 3600.0;
        let directives = if scenario.uses_plan() {
            self.directives(plan)
        } else {
            vec![Directive::None; self.slots.len()]
        };
        let min_future_import = self.min_future_import_rates();
        let terminal_rate = min_future_import.first().copied().unwrap_or(KilowattHourRate::ZERO);

        let (mut soc, mut divergence) = self.validated_initial_soc();
        let start = self.slots.first().map_or_else(Local::now, |slot| slot.interval.start);

        let mut flows = Vec::with_capacity(if record { self.slots.len() } else { 0 });
        let mut totals = ScenarioTotals {
            cost: Cost::ZERO,
            metric: Cost::ZERO,
            import: KilowattHours::ZERO,
            export: KilowattHours::ZERO,
            end_soc: soc,
            min_soc: soc,
            min_soc_at: start,
            carbon_kg: 0.0,
            clipped: KilowattHours::ZERO,
            degraded: divergence.is_some(),
        };
        let mut keep_penalty = Cost::ZERO;

        for ((slot, directive), min_import) in
            self.slots.iter().zip(directives).zip(min_future_import)
        {
            let mut flow = self.step(slot, directive, scenario, soc);
            if !flow.soc_after.is_finite()
                || flow.soc_after < -ENERGY_EPSILON
                || flow.soc_after > battery.capacity + ENERGY_EPSILON
            {
                divergence.get_or_insert_with(|| Warning::SimulationDivergence {
                    at: slot.interval.start,
                    reason: format!("state of charge {:?} out of bounds", flow.soc_after),
                });
                totals.degraded = true;
            }
            flow.soc_after = clamp_soc(flow.soc_after, battery.capacity);
            soc = flow.soc_after;

            if slot.interval.start.hour() == 0 && slot.interval.start.minute() == 0 {
                flow.cost += self.standing_charge;
            }
            if let Some(intensity) = slot.carbon_intensity {
                totals.carbon_kg += (flow.import - flow.export).into_inner() * intensity / 1000.0;
            }
            if soc < self.keep {
                keep_penalty += (self.keep - soc) * min_import * (slot_hours * self.keep_weight);
            }

            totals.cost += flow.cost;
            totals.import += flow.import;
            totals.export += flow.export;
            totals.clipped += flow.clipped;
            if soc < totals.min_soc {
                totals.min_soc = soc;
                totals.min_soc_at = slot.interval.end;
            }
            if record {
                flows.push(flow);
            }
        }

        totals.end_soc = soc;
        let terminal_value =
            soc * terminal_rate.max(KilowattHourRate::ZERO) * battery.value_scaling;
        let carbon_cost = Cost::from(totals.carbon_kg * self.metric_carbon);
        totals.metric = totals.cost + carbon_cost + keep_penalty - terminal_value;
        Simulation { totals, flows, divergence }
    }

    fn validated_initial_soc(&self) -> (KilowattHours, Option<Warning>) {
        let soc = self.initial_soc;
        let capacity = self.battery.capacity;
        if soc.is_finite() && soc >= KilowattHours::ZERO && soc <= capacity + ENERGY_EPSILON {
            return (clamp_soc(soc, capacity), None);
        }
        let at = self.slots.first().map_or_else(Local::now, |slot| slot.interval.start);
        let warning = Warning::SimulationDivergence {
            at,
            reason: format!("initial state of charge {soc:?} outside 0..={capacity:?}"),
        };
        (clamp_soc(soc, capacity), Some(warning))
    }

    /// Lowest import rate from each slot to the end of the horizon.
    fn min_future_import_rates(&self) -> Vec<KilowattHourRate> {
        let mut rates = vec![KilowattHourRate::ZERO; self.slots.len()];
        let mut minimum: Option<KilowattHourRate> = None;
        for (index, slot) in self.slots.iter().enumerate().rev() {
            let rate = minimum.map_or(slot.import_rate, |minimum| minimum.min(slot.import_rate));
            minimum = Some(rate);
            rates[index] = rate;
        }
        rates
    }

    /// Resolve the active window of every slot.
    fn directives(&self, plan: &Plan) -> Vec<Directive> {
        let mut kinds = vec![None; self.slots.len()];
        let Some(origin) = self.slots.first().map(|slot| slot.interval.start) else {
            return Vec::new();
        };
        let step = self.slot_duration.num_seconds().max(1);
        let to_index = |time: DateTime<Local>| -> usize {
            let seconds = (time - origin).num_seconds();
            usize::try_from((seconds + step - 1).div_euclid(step).max(0))
                .unwrap_or(0)
                .min(self.slots.len())
        };

        // Later assignments win:
        let (first_pass, second_pass) = if plan.discharge_on_charge {
            (true, false)
        } else {
            (false, true)
        };
        for charge_pass in [first_pass, second_pass] {
            for window in plan.active_windows(self.battery.reserve, self.battery.capacity) {
                if window.kind.is_charge() != charge_pass {
                    continue;
                }
                let (from, to) = (to_index(window.interval.start), to_index(window.interval.end));
                for (index, kind) in kinds.iter_mut().enumerate().take(to).skip(from) {
                    *kind = Some((window.kind, window.target, to - index));
                }
            }
        }

        kinds
            .into_iter()
            .map(|kind| match kind {
                None => Directive::None,
                Some((WindowKind::Charge, target, remaining_slots)) => {
                    Directive::Charge { target, remaining_slots }
                }
                Some((WindowKind::ChargeFreeze | WindowKind::ExportFreeze, _, _)) => {
                    Directive::Freeze
                }
                Some((WindowKind::Export, target, _)) => Directive::Export { target },
            })
            .collect()
    }

    #[expect(clippy::too_many_lines)]
    fn step(
        &self,
        slot: &Slot,
        directive: Directive,
        scenario: Scenario,
        soc: KilowattHours,
    ) -> SlotFlow {
        let battery = self.battery;
        let duration = self.slot_duration;
        let ac_limit = battery.inverter_limit * duration;

        let pv_raw = slot.pv_for(scenario).max(KilowattHours::ZERO);
        let load = slot.load_for(scenario).max(KilowattHours::ZERO);
        let mut pv = pv_raw.min(ac_limit);
        let mut clipped = pv_raw - pv;

        let may_discharge = self.car_from_battery || !slot.is_car_charging();
        let room = (battery.capacity - soc).max(KilowattHours::ZERO) / battery.charge_efficiency();
        let max_in = battery.max_charge(soc, duration).min(room);
        let max_out = if may_discharge {
            battery.max_discharge(soc, duration).min(ac_limit / battery.discharge_efficiency())
        } else {
            KilowattHours::ZERO
        };

        let direct = pv.min(load);
        let mut pv_left = pv - direct;
        let mut deficit = load - direct;

        // Terminal energy taken from solar and from the grid, energy removed from the battery:
        let mut solar_in = KilowattHours::ZERO;
        let mut grid_in = KilowattHours::ZERO;
        let mut out = KilowattHours::ZERO;
        let mut battery_export = KilowattHours::ZERO;

        let charge_from_solar = |pv_left: &mut KilowattHours, limit: KilowattHours| {
            let terminal = (*pv_left * battery.solar_charge_efficiency()).min(limit);
            *pv_left -= terminal / battery.solar_charge_efficiency();
            terminal
        };

        let mode = match directive {
            Directive::Freeze => SimulationMode::Freeze,

            Directive::Charge { target, remaining_slots } if soc < target - ENERGY_EPSILON => {
                let needed = (target - soc) / battery.charge_efficiency();
                solar_in = charge_from_solar(&mut pv_left, max_in);
                let mut limit = (max_in.min(needed) - solar_in).max(KilowattHours::ZERO);
                if battery.low_power_charging {
                    #[expect(clippy::cast_precision_loss)]
                    let per_slot = needed / remaining_slots.max(1) as f64;
                    limit = limit.min((per_slot - solar_in).max(KilowattHours::ZERO));
                }
                grid_in = limit;
                SimulationMode::Charge
            }

            Directive::Charge { .. } => {
                solar_in = charge_from_solar(&mut pv_left, max_in);
                SimulationMode::Hold
            }

            Directive::Export { target } if soc > target + ENERGY_EPSILON => {
                let floor = target.max(battery.reserve);
                out = max_out.min((soc - floor).max(KilowattHours::ZERO));
                let delivered = out * battery.discharge_efficiency();
                let covered = delivered.min(deficit);
                deficit -= covered;
                battery_export = delivered - covered;
                SimulationMode::Export
            }

            Directive::Export { target } => {
                let floor = target.max(battery.reserve);
                solar_in = charge_from_solar(&mut pv_left, max_in);
                out = self.cover_deficit(deficit, soc, floor, max_out);
                deficit -= out * battery.discharge_efficiency();
                SimulationMode::Eco
            }

            Directive::None => {
                solar_in = charge_from_solar(&mut pv_left, max_in);
                out = self.cover_deficit(deficit, soc, battery.reserve, max_out);
                deficit -= out * battery.discharge_efficiency();
                SimulationMode::Eco
            }
        };

        let mut export = pv_left + battery_export;
        if let Some(export_limit) = battery.export_limit {
            let excess = export - export_limit * duration;
            if excess > KilowattHours::ZERO {
                // Hold back the battery first, then curtail solar:
                let held_back = excess.min(battery_export);
                out -= held_back / battery.discharge_efficiency();
                let curtailed = excess - held_back;
                pv -= curtailed;
                clipped += curtailed;
                export -= excess;
            }
        }

        let grid_for_charge = grid_in / battery.grid_charge_efficiency();
        let import = deficit.max(KilowattHours::ZERO) + grid_for_charge;
        let terminal_in = solar_in + grid_in;
        let battery_in = terminal_in * battery.charge_efficiency();
        let losses = (solar_in / battery.solar_charge_efficiency() - solar_in)
            + (grid_for_charge - grid_in)
            + (terminal_in - battery_in)
            + out * (1.0 - battery.discharge_efficiency());

        let cost = import * slot.import_rate - export * slot.export_rate
            + (battery_in + out) * battery.cycle_cost;

        SlotFlow {
            interval: slot.interval,
            mode,
            pv,
            clipped,
            load,
            import,
            export,
            battery_in,
            battery_out: out,
            losses,
            soc_before: soc,
            soc_after: soc + battery_in - out,
            cost,
        }
    }

    /// Energy to remove from the battery so that the deficit is covered, within the limits.
    fn cover_deficit(
        &self,
        deficit: KilowattHours,
        soc: KilowattHours,
        floor: KilowattHours,
        max_out: KilowattHours,
    ) -> KilowattHours {
        (deficit / self.battery.discharge_efficiency())
            .min(max_out)
            .min((soc - floor).max(KilowattHours::ZERO))
            .max(KilowattHours::ZERO)
    }
}

fn clamp_soc(soc: KilowattHours, capacity: KilowattHours) -> KilowattHours {
    if soc.is_finite() { soc.clamp_to(Quantity::ZERO, capacity) } else { Quantity::ZERO }
}

/// Linearly interpolate the recorded state of charge to one point per minute.
#[must_use]
pub fn minute_trajectory(flows: &[SlotFlow]) -> Vec<(DateTime<Local>, KilowattHours)> {
    let mut trajectory = Vec::new();
    for flow in flows {
        let n_minutes = flow.interval.minutes().max(1);
        for minute in 0..n_minutes {
            #[expect(clippy::cast_precision_loss)]
            let t = minute as f64 / n_minutes as f64;
            trajectory.push((
                flow.interval.start + TimeDelta::minutes(minute),
                flow.soc_before + (flow.soc_after - flow.soc_before) * t,
            ));
        }
    }
    if let Some(last) = flows.last() {
        trajectory.push((last.interval.end, last.soc_after));
    }
    trajectory
}
