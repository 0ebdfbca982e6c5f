use std::fmt::{Display, Formatter};

use comfy_table::Color;
use serde::Serialize;
use sundial_quantities::{energy::KilowattHours, rate::KilowattHourRate};

use crate::ops::Interval;

/// Tolerance used when comparing battery energy levels.
pub const ENERGY_EPSILON: KilowattHours = KilowattHours::new(1e-6);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Force charging from the grid up to the target.
    Charge,

    /// Hold the state of charge while the charge window is active.
    ChargeFreeze,

    /// Force discharging to the grid down to the target.
    Export,

    /// Hold the state of charge while the export window is active.
    ExportFreeze,
}

impl WindowKind {
    #[must_use]
    pub const fn is_charge(self) -> bool {
        matches!(self, Self::Charge | Self::ChargeFreeze)
    }

    #[must_use]
    pub const fn is_freeze(self) -> bool {
        matches!(self, Self::ChargeFreeze | Self::ExportFreeze)
    }

    pub const fn color(self) -> Color {
        match self {
            Self::Charge => Color::Green,
            Self::ChargeFreeze => Color::Cyan,
            Self::Export => Color::Blue,
            Self::ExportFreeze => Color::DarkYellow,
        }
    }
}

impl Display for WindowKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Charge => write!(f, "Charge"),
            Self::ChargeFreeze => write!(f, "Charge freeze"),
            Self::Export => write!(f, "Export"),
            Self::ExportFreeze => write!(f, "Export freeze"),
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Window {
    pub kind: WindowKind,
    pub interval: Interval,

    /// Target state of charge.
    ///
    /// A charge window at or below the reserve does nothing, and so does an export window at the
    /// full capacity.
    pub target: KilowattHours,

    /// Duration-weighted average of the rate that made this window a candidate.
    pub average_rate: KilowattHourRate,
}

impl Window {
    #[must_use]
    pub fn target_percent(&self, capacity: KilowattHours) -> f64 {
        100.0 * (self.target / capacity)
    }

    /// Whether the window affects the battery at all.
    #[must_use]
    pub fn is_active(&self, reserve: KilowattHours, capacity: KilowattHours) -> bool {
        match self.kind {
            WindowKind::Charge => self.target > reserve + ENERGY_EPSILON,
            WindowKind::Export => self.target < capacity - ENERGY_EPSILON,
            WindowKind::ChargeFreeze | WindowKind::ExportFreeze => true,
        }
    }
}
