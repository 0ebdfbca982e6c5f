use chrono::{DateTime, Local};
use serde::Serialize;
use sundial_quantities::{cost::Cost, energy::KilowattHours};

use crate::core::window::{Window, WindowKind};

/// Ordered set of windows chosen for one planning cycle.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Plan {
    pub windows: Vec<Window>,

    /// On overlap, an active export window overrides a charge window.
    pub discharge_on_charge: bool,
}

impl Plan {
    pub fn new(mut windows: Vec<Window>, discharge_on_charge: bool) -> Self {
        windows.sort_by_key(|window| (window.interval.start, window.kind.is_charge()));
        Self { windows, discharge_on_charge }
    }

    /// Plan without any intervention.
    pub const fn empty() -> Self {
        Self { windows: Vec::new(), discharge_on_charge: true }
    }

    /// Windows that affect the battery.
    pub fn active_windows(
        &self,
        reserve: KilowattHours,
        capacity: KilowattHours,
    ) -> impl Iterator<Item = &Window> {
        self.windows.iter().filter(move |window| window.is_active(reserve, capacity))
    }

    /// Window in effect at the given time, taking overlap precedence into account.
    #[must_use]
    pub fn window_at(
        &self,
        time: DateTime<Local>,
        reserve: KilowattHours,
        capacity: KilowattHours,
    ) -> Option<&Window> {
        let mut charge = None;
        let mut export = None;
        for window in self.active_windows(reserve, capacity) {
            if window.interval.contains(time) {
                if window.kind.is_charge() {
                    charge = charge.or(Some(window));
                } else {
                    export = export.or(Some(window));
                }
            }
        }
        if self.discharge_on_charge { export.or(charge) } else { charge.or(export) }
    }

    pub fn count(&self, kind: WindowKind) -> usize {
        self.windows.iter().filter(|window| window.kind == kind).count()
    }
}

/// Simulation totals of one scenario.
#[derive(Copy, Clone, Debug, Serialize)]
pub struct ScenarioTotals {
    /// Import minus export cost, including the virtual cycle cost and the standing charge.
    pub cost: Cost,

    /// Optimized value: cost adjusted for carbon, the keep penalty and the terminal battery value.
    pub metric: Cost,

    pub import: KilowattHours,
    pub export: KilowattHours,
    pub end_soc: KilowattHours,
    pub min_soc: KilowattHours,
    pub min_soc_at: DateTime<Local>,
    pub carbon_kg: f64,

    /// Solar clipped at the inverter plus export curtailed at the grid limit.
    pub clipped: KilowattHours,

    /// The simulator had to clamp an invalid state.
    pub degraded: bool,
}
