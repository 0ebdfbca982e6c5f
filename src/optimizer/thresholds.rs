use serde::Serialize;
use sundial_quantities::rate::KilowattHourRate;

use crate::{
    config::OptimizerConfig,
    core::{aggregate::Aggregate, slot::Slot},
    prelude::*,
};

/// Rates that make a plan interval a charge or an export candidate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    /// Intervals importing at or below this rate may charge.
    pub charge: KilowattHourRate,

    /// Intervals exporting at or above this rate may export.
    pub export: KilowattHourRate,
}

impl Thresholds {
    /// Configured thresholds, where a zero one is derived from the rate distribution over the
    /// horizon: half a standard deviation below the mean import rate for charging and half a
    /// standard deviation above the mean export rate for exporting.
    #[instrument(skip_all)]
    pub fn select(config: &OptimizerConfig, slots: &[Slot]) -> Self {
        let auto = |rates: Vec<f64>, sign: f64| {
            rates.mean_deviation().map_or(KilowattHourRate::ZERO, |(mean, deviation)| {
                KilowattHourRate::from(mean + sign * 0.5 * deviation)
            })
        };
        let charge = if config.threshold_charge == KilowattHourRate::ZERO {
            auto(slots.iter().map(|slot| slot.import_rate.into_inner()).collect(), -1.0)
        } else {
            config.threshold_charge
        };
        let export = if config.threshold_export == KilowattHourRate::ZERO {
            auto(slots.iter().map(|slot| slot.export_rate.into_inner()).collect(), 1.0)
        } else {
            config.threshold_export
        };
        debug!(%charge, %export, "selected thresholds");
        Self { charge, export }
    }
}
