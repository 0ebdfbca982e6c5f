//! Translation of the chosen plan into inverter control instructions.

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use sundial_quantities::{energy::KilowattHours, power::Kilowatts};

use crate::{
    battery::Battery,
    core::{plan::Plan, window::WindowKind},
    error::Warning,
    ops::Interval,
    prelude::*,
    status::Status,
};

/// How far ahead timed windows are handed over to the inverter.
const LOOKAHEAD: TimeDelta = TimeDelta::hours(24);

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChargeControl {
    /// Charge and discharge limits are set in kilowatts.
    Power,

    /// Charge and discharge limits are set in amperes at the battery voltage.
    Current,

    #[default]
    None,
}

/// What the inverter integration is able to do.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InverterCapabilities {
    /// Timed charge and export windows accept a target state of charge.
    pub has_target_soc: bool,

    /// The reserve state of charge can be changed, which is how the battery is held.
    pub has_reserve_soc: bool,

    pub has_timed_export: bool,
    pub output_charge_control: OutputChargeControl,

    /// Nominal battery voltage for the current-based control.
    pub battery_voltage: f64,

    /// Number of timed windows the inverter can store.
    pub max_windows: usize,
}

impl Default for InverterCapabilities {
    fn default() -> Self {
        Self {
            has_target_soc: true,
            has_reserve_soc: true,
            has_timed_export: true,
            output_charge_control: OutputChargeControl::None,
            battery_voltage: 52.0,
            max_windows: 8,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum OutputLimit {
    Power { kilowatts: Kilowatts },
    Current { amperes: f64 },
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Timed grid charge, to full when the target is not supported.
    Charge { interval: Interval, target_percent: Option<f64> },

    /// Timed forced export.
    Export { interval: Interval, target_percent: Option<f64> },

    /// Timed state of charge hold.
    Hold { interval: Interval },

    /// Reserve state of charge to apply now.
    Reserve { percent: f64 },

    ChargeLimit(OutputLimit),
    DischargeLimit(OutputLimit),
}

#[must_use]
#[derive(Clone, Debug, Default, Serialize)]
pub struct ControlSchedule {
    pub instructions: Vec<Instruction>,
    pub warnings: Vec<Warning>,
}

#[derive(Builder)]
#[builder(finish_fn(vis = ""))]
pub struct Materializer<'a> {
    capabilities: &'a InverterCapabilities,
    battery: &'a Battery,
    plan: &'a Plan,
    status: Status,
    now: DateTime<Local>,
    soc: KilowattHours,
}

impl<S: materializer_builder::IsComplete> MaterializerBuilder<'_, S> {
    pub fn materialize(self) -> ControlSchedule {
        self.build().materialize()
    }
}

impl Materializer<'_> {
    #[instrument(skip_all, fields(status = %self.status))]
    fn materialize(self) -> ControlSchedule {
        let mut schedule = ControlSchedule::default();
        if !self.status.is_executable() {
            info!("control suspended");
            return schedule;
        }
        self.push_windows(&mut schedule);
        self.push_reserve(&mut schedule);
        self.push_limits(&mut schedule);
        debug!(
            n_instructions = schedule.instructions.len(),
            n_warnings = schedule.warnings.len(),
            "materialized",
        );
        schedule
    }

    fn push_windows(&self, schedule: &mut ControlSchedule) {
        let horizon = Interval::from_std(self.now..self.now + LOOKAHEAD);
        let target_percent = |target: KilowattHours| {
            self.capabilities
                .has_target_soc
                .then(|| self.battery.percent(target).round().clamp(0.0, 100.0))
        };
        let mut n_windows = 0;
        for window in self.plan.active_windows(self.battery.reserve, self.battery.capacity) {
            if !window.interval.overlaps(horizon) {
                continue;
            }
            if n_windows == self.capabilities.max_windows {
                warn!(max_windows = self.capabilities.max_windows, "window limit reached");
                break;
            }
            let interval = Interval::from_std(
                window.interval.start.max(horizon.start)..window.interval.end.min(horizon.end),
            );
            let instruction = match window.kind {
                WindowKind::Charge => {
                    Instruction::Charge { interval, target_percent: target_percent(window.target) }
                }
                WindowKind::Export if self.capabilities.has_timed_export => {
                    Instruction::Export { interval, target_percent: target_percent(window.target) }
                }
                WindowKind::ChargeFreeze | WindowKind::ExportFreeze
                    if self.capabilities.has_reserve_soc =>
                {
                    Instruction::Hold { interval }
                }
                kind => {
                    let kind = kind.to_string().to_lowercase();
                    schedule.warnings.push(Warning::Unsupported {
                        action: format!("schedule {kind} at {interval}"),
                    });
                    continue;
                }
            };
            schedule.instructions.push(instruction);
            n_windows += 1;
        }
    }

    /// Hold the current level while holding, otherwise restore the configured reserve.
    fn push_reserve(&self, schedule: &mut ControlSchedule) {
        if !self.capabilities.has_reserve_soc {
            return;
        }
        let reserve = if self.status.is_holding() { self.soc } else { self.battery.reserve };
        let percent = self.battery.percent(reserve).round().clamp(0.0, 100.0);
        schedule.instructions.push(Instruction::Reserve { percent });
    }

    fn push_limits(&self, schedule: &mut ControlSchedule) {
        let (charge, discharge) = match self.status {
            Status::Charging => (self.charge_power(), Kilowatts::ZERO),
            Status::HoldCharging | Status::HoldExporting => {
                (self.battery.charge_rate, Kilowatts::ZERO)
            }
            Status::FreezeCharging => (Kilowatts::ZERO, Kilowatts::ZERO),
            Status::FreezeExporting => (Kilowatts::ZERO, self.battery.discharge_rate),
            _ => (self.battery.charge_rate, self.battery.discharge_rate),
        };
        let limit = |power: Kilowatts| match self.capabilities.output_charge_control {
            OutputChargeControl::Power => Some(OutputLimit::Power { kilowatts: power }),
            OutputChargeControl::Current => Some(OutputLimit::Current {
                amperes: (power.into_inner() * 1000.0 / self.capabilities.battery_voltage).round(),
            }),
            OutputChargeControl::None => None,
        };
        if let Some(charge) = limit(charge) {
            schedule.instructions.push(Instruction::ChargeLimit(charge));
        }
        if let Some(discharge) = limit(discharge) {
            schedule.instructions.push(Instruction::DischargeLimit(discharge));
        }
    }

    /// Charge power for the current window, the lowest one reaching the target in low-power mode.
    fn charge_power(&self) -> Kilowatts {
        if !self.battery.low_power_charging {
            return self.battery.charge_rate;
        }
        let Some(window) =
            self.plan.window_at(self.now, self.battery.reserve, self.battery.capacity)
        else {
            return self.battery.charge_rate;
        };
        let remaining = window.interval.end - self.now;
        if remaining <= TimeDelta::zero() {
            return self.battery.charge_rate;
        }
        let needed = (window.target - self.soc).max(KilowattHours::ZERO)
            / (self.battery.charge_efficiency() * self.battery.grid_charge_efficiency());
        (needed / remaining).clamp_to(Kilowatts::ZERO, self.battery.charge_rate)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use sundial_quantities::rate::KilowattHourRate;

    use super::*;
    use crate::{battery::PowerCurve, config::BatteryConfig, core::window::Window};

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 1, 15, 0).unwrap()
    }

    fn battery(low_power_charging: bool) -> Battery {
        let config = BatteryConfig {
            reserve_percent: 10.0,
            loss: 0.0,
            inverter_loss: 0.0,
            low_power_charging,
            ..BatteryConfig::default()
        };
        Battery::new(&config, PowerCurve::FLAT, PowerCurve::FLAT)
    }

    fn window(kind: WindowKind, hours: std::ops::Range<i64>, target: f64) -> Window {
        let midnight = Local.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        Window {
            kind,
            interval: Interval::from_std(
                midnight + TimeDelta::hours(hours.start)..midnight + TimeDelta::hours(hours.end),
            ),
            target: KilowattHours::from(target),
            average_rate: KilowattHourRate::ZERO,
        }
    }

    fn materialize(
        capabilities: &InverterCapabilities,
        battery: &Battery,
        plan: &Plan,
        soc: f64,
    ) -> ControlSchedule {
        let status = Status::resolve(plan, battery, now(), KilowattHours::from(soc));
        Materializer::builder()
            .capabilities(capabilities)
            .battery(battery)
            .plan(plan)
            .status(status)
            .now(now())
            .soc(KilowattHours::from(soc))
            .materialize()
    }

    #[test]
    fn test_windows_are_clipped() {
        let plan = Plan::new(
            vec![
                window(WindowKind::Charge, 0..3, 8.0),
                window(WindowKind::Export, 17..19, 2.0),
                window(WindowKind::Charge, 25..28, 9.0),
            ],
            true,
        );
        let schedule =
            materialize(&InverterCapabilities::default(), &battery(false), &plan, 5.0);
        let windows = schedule
            .instructions
            .iter()
            .filter(|instruction| {
                matches!(instruction, Instruction::Charge { .. } | Instruction::Export { .. })
            })
            .collect::<Vec<_>>();
        assert_eq!(windows.len(), 3);
        let end = window(WindowKind::Charge, 0..3, 8.0).interval.end;
        assert_eq!(
            *windows[0],
            Instruction::Charge {
                interval: Interval::from_std(now()..end),
                target_percent: Some(80.0),
            },
        );
        assert!(matches!(
            windows[2],
            Instruction::Charge { interval, .. } if interval.end == now() + LOOKAHEAD
        ));
        assert!(schedule.warnings.is_empty());
    }

    #[test]
    fn test_window_limit() {
        let plan = Plan::new(
            (2..6).map(|hour| window(WindowKind::Charge, hour..hour + 1, 8.0)).collect(),
            true,
        );
        let capabilities =
            InverterCapabilities { max_windows: 2, ..InverterCapabilities::default() };
        let schedule = materialize(&capabilities, &battery(false), &plan, 5.0);
        let n_windows = schedule
            .instructions
            .iter()
            .filter(|instruction| matches!(instruction, Instruction::Charge { .. }))
            .count();
        assert_eq!(n_windows, 2);
    }

    #[test]
    fn test_unsupported_export() {
        let plan = Plan::new(vec![window(WindowKind::Export, 3..4, 2.0)], true);
        let capabilities = InverterCapabilities {
            has_timed_export: false,
            has_target_soc: false,
            ..InverterCapabilities::default()
        };
        let schedule = materialize(&capabilities, &battery(false), &plan, 5.0);
        assert_eq!(schedule.warnings.len(), 1);
        assert!(matches!(schedule.warnings[0], Warning::Unsupported { .. }));
        assert_eq!(schedule.instructions, [Instruction::Reserve { percent: 10.0 }]);
    }

    #[test]
    fn test_hold_sets_reserve_to_current_soc() {
        let plan = Plan::new(vec![window(WindowKind::ChargeFreeze, 1..2, 0.0)], true);
        let capabilities = InverterCapabilities {
            output_charge_control: OutputChargeControl::Current,
            ..InverterCapabilities::default()
        };
        let schedule = materialize(&capabilities, &battery(false), &plan, 6.0);
        assert!(schedule.instructions.contains(&Instruction::Reserve { percent: 60.0 }));
        assert!(
            schedule
                .instructions
                .contains(&Instruction::ChargeLimit(OutputLimit::Current { amperes: 0.0 }))
        );
    }

    #[test]
    fn test_low_power_charging() {
        let plan = Plan::new(vec![window(WindowKind::Charge, 1..2, 8.0)], true);
        let capabilities = InverterCapabilities {
            output_charge_control: OutputChargeControl::Power,
            ..InverterCapabilities::default()
        };
        let schedule = materialize(&capabilities, &battery(true), &plan, 7.0);
        let charge = schedule.instructions.iter().find_map(|instruction| match instruction {
            Instruction::ChargeLimit(OutputLimit::Power { kilowatts }) => Some(*kilowatts),
            _ => None,
        });
        // 1 kWh in the remaining 45 minutes:
        assert_abs_diff_eq!(charge.unwrap().into_inner(), 4.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_calibration_suspends_control() {
        let plan = Plan::new(vec![window(WindowKind::Charge, 1..2, 8.0)], true);
        let battery = battery(false);
        let schedule = Materializer::builder()
            .capabilities(&InverterCapabilities::default())
            .battery(&battery)
            .plan(&plan)
            .status(Status::Calibration)
            .now(now())
            .soc(KilowattHours::from(5.0))
            .materialize();
        assert!(schedule.instructions.is_empty());
    }
}
