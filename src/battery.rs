//! Battery model and its slot-by-slot simulator.

mod curve;
mod simulator;

use std::fmt::{Display, Formatter};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use sundial_quantities::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate};

pub use self::{
    curve::PowerCurve,
    simulator::{Simulation, SimulationMode, Simulator, SlotFlow, minute_trajectory},
};
use crate::config::BatteryConfig;

/// Battery energy flow direction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Charge,
    Discharge,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Charge => write!(f, "charge"),
            Self::Discharge => write!(f, "discharge"),
        }
    }
}

/// Physical battery and inverter parameters for one planning cycle.
#[must_use]
#[derive(Clone, Debug)]
pub struct Battery {
    pub capacity: KilowattHours,
    pub reserve: KilowattHours,

    /// Maximum charge power at the battery terminals.
    pub charge_rate: Kilowatts,

    /// Maximum discharge power at the battery terminals.
    pub discharge_rate: Kilowatts,

    pub inverter_limit: Kilowatts,
    pub export_limit: Option<Kilowatts>,
    pub hybrid: bool,
    pub loss: f64,
    pub loss_discharge: f64,
    pub inverter_loss: f64,
    pub charge_curve: PowerCurve,
    pub discharge_curve: PowerCurve,
    pub low_power_charging: bool,
    pub cycle_cost: KilowattHourRate,
    pub value_scaling: f64,
}

impl Battery {
    pub fn new(
        config: &BatteryConfig,
        charge_curve: PowerCurve,
        discharge_curve: PowerCurve,
    ) -> Self {
        Self {
            capacity: config.soc_max,
            reserve: config.reserve(),
            charge_rate: config.charge_rate * config.rate_max_scaling,
            discharge_rate: config.discharge_rate * config.rate_max_scaling,
            inverter_limit: config.inverter_limit,
            export_limit: config.export_limit,
            hybrid: config.hybrid,
            loss: config.loss,
            loss_discharge: config.loss_discharge,
            inverter_loss: config.inverter_loss,
            charge_curve,
            discharge_curve,
            low_power_charging: config.low_power_charging,
            cycle_cost: config.cycle_cost,
            value_scaling: config.value_scaling,
        }
    }

    #[must_use]
    pub fn percent(&self, soc: KilowattHours) -> f64 {
        100.0 * (soc / self.capacity)
    }

    /// Fraction of terminal energy that ends up stored.
    #[must_use]
    pub fn charge_efficiency(&self) -> f64 {
        1.0 - self.loss
    }

    /// Fraction of removed energy that reaches the AC side.
    #[must_use]
    pub fn discharge_efficiency(&self) -> f64 {
        (1.0 - self.loss_discharge) * (1.0 - self.inverter_loss)
    }

    /// Fraction of solar energy that reaches the battery terminals.
    #[must_use]
    pub fn solar_charge_efficiency(&self) -> f64 {
        if self.hybrid { 1.0 } else { 1.0 - self.inverter_loss }
    }

    /// Fraction of grid energy that reaches the battery terminals.
    #[must_use]
    pub fn grid_charge_efficiency(&self) -> f64 {
        1.0 - self.inverter_loss
    }

    /// Grid-to-grid round trip efficiency.
    #[must_use]
    pub fn round_trip_efficiency(&self) -> f64 {
        self.grid_charge_efficiency() * self.charge_efficiency() * self.discharge_efficiency()
    }

    /// Terminal energy the battery accepts at the given state of charge.
    pub fn max_charge(&self, soc: KilowattHours, duration: TimeDelta) -> KilowattHours {
        self.charge_rate * duration * self.charge_curve.fraction(self.percent(soc))
    }

    /// Energy the battery releases at the given state of charge.
    pub fn max_discharge(&self, soc: KilowattHours, duration: TimeDelta) -> KilowattHours {
        self.discharge_rate * duration * self.discharge_curve.fraction(self.percent(soc))
    }
}
