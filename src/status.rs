//! Battery control status derived from the plan.

use chrono::{DateTime, Local};
use comfy_table::Color;
use serde::Serialize;
use sundial_quantities::energy::KilowattHours;

use crate::{
    battery::Battery,
    core::{plan::Plan, window::WindowKind},
    prelude::*,
};

/// Fraction of the capacity within which the state of charge counts as at the target.
const HOLD_TOLERANCE: f64 = 0.01;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No window is active, the battery follows the house demand.
    #[default]
    Demand,

    Charging,

    /// Charge window active with the target reached.
    #[display("Hold charging")]
    HoldCharging,

    /// Charge window active with the battery already above the target.
    #[display("No charge")]
    NoCharge,

    #[display("Freeze charging")]
    FreezeCharging,
    Exporting,

    /// Export window active with the battery at or below the target.
    #[display("Hold exporting")]
    HoldExporting,

    #[display("Freeze exporting")]
    FreezeExporting,

    /// The battery is being calibrated, the plan must not be executed.
    Calibration,

    /// The last planning cycle failed.
    Error,
}

impl Status {
    /// Status implied by the window covering `now`.
    #[must_use]
    pub fn resolve(
        plan: &Plan,
        battery: &Battery,
        now: DateTime<Local>,
        soc: KilowattHours,
    ) -> Self {
        let Some(window) = plan.window_at(now, battery.reserve, battery.capacity) else {
            return Self::Demand;
        };
        let tolerance = battery.capacity * HOLD_TOLERANCE;
        match window.kind {
            WindowKind::Charge if soc < window.target - tolerance => Self::Charging,
            WindowKind::Charge if soc <= window.target + tolerance => Self::HoldCharging,
            WindowKind::Charge => Self::NoCharge,
            WindowKind::ChargeFreeze => Self::FreezeCharging,
            WindowKind::Export if soc > window.target + tolerance => Self::Exporting,
            WindowKind::Export => Self::HoldExporting,
            WindowKind::ExportFreeze => Self::FreezeExporting,
        }
    }

    /// Control instructions may be issued in this status.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        !matches!(self, Self::Calibration | Self::Error)
    }

    /// The battery must neither charge nor discharge beyond servicing the house.
    #[must_use]
    pub const fn is_holding(self) -> bool {
        matches!(
            self,
            Self::HoldCharging | Self::FreezeCharging | Self::HoldExporting | Self::FreezeExporting
        )
    }

    pub const fn color(self) -> Color {
        match self {
            Self::Demand | Self::NoCharge => Color::Reset,
            Self::Charging => Color::Green,
            Self::HoldCharging => Color::DarkGreen,
            Self::FreezeCharging => Color::Cyan,
            Self::Exporting => Color::Blue,
            Self::HoldExporting => Color::DarkBlue,
            Self::FreezeExporting => Color::DarkYellow,
            Self::Calibration => Color::Magenta,
            Self::Error => Color::Red,
        }
    }
}

/// Current status, logging every change.
#[derive(Debug, Default)]
pub struct StatusMachine {
    status: Status,
}

impl StatusMachine {
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Move to the next status, returning whether it changed.
    pub fn advance(&mut self, next: Status) -> bool {
        if next == self.status {
            return false;
        }
        info!(from = %self.status, to = %next, "status changed");
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use sundial_quantities::rate::KilowattHourRate;

    use super::*;
    use crate::{
        battery::PowerCurve,
        config::BatteryConfig,
        core::window::Window,
        ops::Interval,
    };

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 1, 15, 0).unwrap()
    }

    fn battery() -> Battery {
        Battery::new(&BatteryConfig::default(), PowerCurve::FLAT, PowerCurve::FLAT)
    }

    fn plan(kind: WindowKind, target: f64) -> Plan {
        let start = Local.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap();
        Plan::new(
            vec![Window {
                kind,
                interval: Interval::from_std(start..start + TimeDelta::hours(1)),
                target: KilowattHours::from(target),
                average_rate: KilowattHourRate::ZERO,
            }],
            true,
        )
    }

    fn resolve(plan: &Plan, soc: f64) -> Status {
        Status::resolve(plan, &battery(), now(), KilowattHours::from(soc))
    }

    #[test]
    fn test_no_window() {
        assert_eq!(resolve(&Plan::empty(), 5.0), Status::Demand);
        let later = now() + TimeDelta::hours(1);
        let plan = plan(WindowKind::Charge, 8.0);
        assert_eq!(Status::resolve(&plan, &battery(), later, 5.0.into()), Status::Demand);
    }

    #[test]
    fn test_charge_statuses() {
        let plan = plan(WindowKind::Charge, 8.0);
        assert_eq!(resolve(&plan, 5.0), Status::Charging);
        assert_eq!(resolve(&plan, 8.05), Status::HoldCharging);
        assert_eq!(resolve(&plan, 9.0), Status::NoCharge);
        let plan = self::plan(WindowKind::ChargeFreeze, 0.0);
        assert_eq!(resolve(&plan, 5.0), Status::FreezeCharging);
    }

    #[test]
    fn test_export_statuses() {
        let plan = plan(WindowKind::Export, 4.0);
        assert_eq!(resolve(&plan, 6.0), Status::Exporting);
        assert_eq!(resolve(&plan, 4.0), Status::HoldExporting);
        let plan = self::plan(WindowKind::ExportFreeze, 4.0);
        assert_eq!(resolve(&plan, 6.0), Status::FreezeExporting);
    }

    #[test]
    fn test_machine_transitions() {
        let mut machine = StatusMachine::default();
        assert_eq!(machine.status(), Status::Demand);
        assert!(!machine.advance(Status::Demand));
        assert!(machine.advance(Status::Charging));
        assert!(machine.advance(Status::Calibration));
        assert!(!machine.status().is_executable());
        assert!(machine.advance(Status::Demand));
        assert!(machine.status().is_executable());
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::HoldCharging.to_string(), "Hold charging");
        assert_eq!(Status::Demand.to_string(), "Demand");
    }
}
