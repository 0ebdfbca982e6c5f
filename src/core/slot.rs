use serde::Serialize;
use sundial_quantities::{energy::KilowattHours, rate::KilowattHourRate};

use crate::{core::scenario::Scenario, ops::Interval};

/// Atomic simulation time step with everything known about it in advance.
#[derive(Copy, Clone, Debug, Serialize)]
pub struct Slot {
    pub interval: Interval,

    /// Central house load, excluding car charging.
    pub load: KilowattHours,

    /// Pessimistic house load.
    pub load10: KilowattHours,

    /// Central solar generation.
    pub pv: KilowattHours,

    /// Solar generation in the 10% scenario.
    pub pv10: KilowattHours,

    /// Solar generation in the 90% scenario, reported only.
    pub pv90: Option<KilowattHours>,

    pub import_rate: KilowattHourRate,
    pub export_rate: KilowattHourRate,

    /// Grid carbon intensity in g/kWh.
    pub carbon_intensity: Option<f64>,

    /// Planned car charging energy.
    pub car_load: KilowattHours,
}

impl Slot {
    /// House load for the scenario, including planned car charging.
    pub fn load_for(&self, scenario: Scenario) -> KilowattHours {
        let house = if scenario.is_pessimistic() { self.load10 } else { self.load };
        house + self.car_load
    }

    pub const fn pv_for(&self, scenario: Scenario) -> KilowattHours {
        if scenario.is_pessimistic() { self.pv10 } else { self.pv }
    }

    #[must_use]
    pub fn is_car_charging(&self) -> bool {
        self.car_load > KilowattHours::ZERO
    }
}
