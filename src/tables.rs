use chrono::{DateTime, DurationRound, Local, TimeDelta};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::Itertools;
use sundial::{
    battery::{Battery, SlotFlow},
    car::CarPlan,
    core::{
        aggregate::Aggregate,
        plan::{Plan, ScenarioTotals},
        scenario::PerScenario,
        slot::Slot,
    },
    forecast::{Forecast, rates::RatePeriod},
    materializer::{ControlSchedule, Instruction, OutputLimit},
};
use sundial_quantities::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn interval_start(time: DateTime<Local>, plan_interval: TimeDelta) -> DateTime<Local> {
    time.duration_trunc(plan_interval).unwrap_or(time)
}

fn rate_color(rate: KilowattHourRate, mean: KilowattHourRate) -> Color {
    if rate >= mean { Color::Red } else { Color::Green }
}

pub fn build_rates_table(periods: &[RatePeriod], title: &str) -> Table {
    let mean = periods
        .iter()
        .map(|period| (period.rate.into_inner(), period.interval.hours()))
        .weighted_mean()
        .map_or(KilowattHourRate::ZERO, KilowattHourRate::from);

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", title]);
    for period in periods {
        table.add_row(vec![
            Cell::new(period.interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(period.interval.start.format("%H:%M")),
            Cell::new(period.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(period.rate)
                .set_alignment(CellAlignment::Right)
                .fg(rate_color(period.rate, mean)),
        ]);
    }
    table
}

pub fn build_forecast_table(forecast: &Forecast) -> Table {
    let plan_interval = forecast.timing.plan_interval;
    let mean_rate = forecast
        .slots
        .iter()
        .map(|slot| slot.import_rate.into_inner())
        .collect_vec()
        .mean_deviation()
        .map_or(KilowattHourRate::ZERO, |(mean, _)| KilowattHourRate::from(mean));

    let mut table = new_table();
    table.set_header(vec![
        "Date", "Start", "End", "Load", "Load 10%", "PV", "PV 10%", "Import", "Export", "Car",
    ]);
    for (_, chunk) in &forecast
        .slots
        .iter()
        .chunk_by(|slot| interval_start(slot.interval.start, plan_interval))
    {
        let chunk = chunk.collect_vec();
        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            continue;
        };
        let sum = |energy: fn(&&Slot) -> KilowattHours| {
            chunk.iter().map(energy).sum::<KilowattHours>()
        };
        table.add_row(vec![
            Cell::new(first.interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(first.interval.start.format("%H:%M")),
            Cell::new(last.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(sum(|slot| slot.load)).set_alignment(CellAlignment::Right),
            Cell::new(sum(|slot| slot.load10))
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(sum(|slot| slot.pv)).set_alignment(CellAlignment::Right).fg(Color::Yellow),
            Cell::new(sum(|slot| slot.pv10))
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(first.import_rate)
                .set_alignment(CellAlignment::Right)
                .fg(rate_color(first.import_rate, mean_rate)),
            Cell::new(first.export_rate).set_alignment(CellAlignment::Right),
            Cell::new(sum(|slot| slot.car_load)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Simulated central scenario aggregated per plan interval.
pub fn build_flows_table(flows: &[SlotFlow], plan_interval: TimeDelta) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Date", "Start", "End", "Mode", "Before", "After", "PV", "Load", "Import", "Export", "Cost",
    ]);
    for (_, chunk) in &flows
        .iter()
        .chunk_by(|flow| interval_start(flow.interval.start, plan_interval))
    {
        let chunk = chunk.collect_vec();
        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            continue;
        };
        let sum = |energy: fn(&&SlotFlow) -> KilowattHours| {
            chunk.iter().map(energy).sum::<KilowattHours>()
        };
        let cost = chunk.iter().map(|flow| flow.cost).sum::<Cost>();
        let (import, export) = (sum(|flow| flow.import), sum(|flow| flow.export));
        table.add_row(vec![
            Cell::new(first.interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(first.interval.start.format("%H:%M")),
            Cell::new(last.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(first.mode).fg(first.mode.color()),
            Cell::new(first.soc_before)
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(last.soc_after).set_alignment(CellAlignment::Right),
            Cell::new(sum(|flow| flow.pv)).set_alignment(CellAlignment::Right).fg(Color::Yellow),
            Cell::new(sum(|flow| flow.load)).set_alignment(CellAlignment::Right),
            Cell::new(import).set_alignment(CellAlignment::Right).fg(
                if import >= KilowattHours::ONE_WATT_HOUR { Color::Red } else { Color::Reset },
            ),
            Cell::new(export).set_alignment(CellAlignment::Right).fg(
                if export >= KilowattHours::ONE_WATT_HOUR { Color::Green } else { Color::Reset },
            ),
            Cell::new(cost)
                .set_alignment(CellAlignment::Right)
                .fg(if cost > Cost::ZERO { Color::Red } else { Color::Green }),
        ]);
    }
    table
}

pub fn build_windows_table(plan: &Plan, battery: &Battery) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Kind", "Date", "Start", "End", "Target", "%", "Rate"]);
    for window in plan.active_windows(battery.reserve, battery.capacity) {
        table.add_row(vec![
            Cell::new(window.kind).fg(window.kind.color()),
            Cell::new(window.interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(window.interval.start.format("%H:%M")),
            Cell::new(window.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(window.target).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}%", window.target_percent(battery.capacity)))
                .set_alignment(CellAlignment::Right),
            Cell::new(window.average_rate).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_totals_table(totals: &PerScenario<ScenarioTotals>, battery: &Battery) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        "Scenario", "Cost", "Metric", "Import", "Export", "End", "Min", "At", "Carbon", "Clipped",
    ]);
    for (scenario, totals) in totals.iter() {
        table.add_row(vec![
            Cell::new(scenario).add_attribute(if scenario.uses_plan() {
                Attribute::Bold
            } else {
                Attribute::Dim
            }),
            Cell::new(totals.cost).set_alignment(CellAlignment::Right),
            Cell::new(totals.metric).set_alignment(CellAlignment::Right),
            Cell::new(totals.import).set_alignment(CellAlignment::Right),
            Cell::new(totals.export).set_alignment(CellAlignment::Right),
            Cell::new(totals.end_soc).set_alignment(CellAlignment::Right),
            Cell::new(totals.min_soc).set_alignment(CellAlignment::Right).fg(
                if totals.min_soc <= battery.reserve { Color::DarkYellow } else { Color::Reset },
            ),
            Cell::new(totals.min_soc_at.format("%b %d %H:%M")).add_attribute(Attribute::Dim),
            Cell::new(format!("{:.2} kg", totals.carbon_kg)).set_alignment(CellAlignment::Right),
            Cell::new(totals.clipped).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_cars_table(cars: &[CarPlan]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Car", "Source", "Plugged", "Needed", "Planned", "Cost", "Ready by"]);
    for car in cars {
        table.add_row(vec![
            Cell::new(&car.name),
            Cell::new(format!("{:?}", car.source)).add_attribute(Attribute::Dim),
            Cell::new(if car.plugged_in { "yes" } else { "no" }),
            Cell::new(car.needed).set_alignment(CellAlignment::Right),
            Cell::new(car.energy())
                .set_alignment(CellAlignment::Right)
                .fg(if car.is_short() { Color::Red } else { Color::Green }),
            Cell::new(car.cost()).set_alignment(CellAlignment::Right),
            Cell::new(car.ready_by.format("%b %d %H:%M")),
        ]);
    }
    table
}

pub fn build_instructions_table(schedule: &ControlSchedule) -> Table {
    let limit = |limit: &OutputLimit| match limit {
        OutputLimit::Power { kilowatts } => kilowatts.to_string(),
        OutputLimit::Current { amperes } => format!("{amperes:.0} A"),
    };
    let target = |target_percent: &Option<f64>| {
        target_percent.map_or_else(|| "full".to_owned(), |percent| format!("{percent:.0}%"))
    };

    let mut table = new_table();
    table.set_header(vec!["Instruction", "Interval", "Value"]);
    for instruction in &schedule.instructions {
        let (name, interval, value) = match instruction {
            Instruction::Charge { interval, target_percent } => {
                ("Charge", interval.to_string(), target(target_percent))
            }
            Instruction::Export { interval, target_percent } => {
                ("Export", interval.to_string(), target(target_percent))
            }
            Instruction::Hold { interval } => ("Hold", interval.to_string(), String::new()),
            Instruction::Reserve { percent } => {
                ("Reserve", String::new(), format!("{percent:.0}%"))
            }
            Instruction::ChargeLimit(charge) => ("Charge limit", String::new(), limit(charge)),
            Instruction::DischargeLimit(discharge) => {
                ("Discharge limit", String::new(), limit(discharge))
            }
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(interval).add_attribute(Attribute::Dim),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
