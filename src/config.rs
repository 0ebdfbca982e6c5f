//! Planner configuration.
//!
//! A [`PlanConfig`] is deserialized once per cycle, validated and then passed around by reference.
//! Every field has a default so that a configuration file only needs to name what differs.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use sundial_quantities::{
    cost::Cost,
    energy::KilowattHours,
    power::Kilowatts,
    rate::KilowattHourRate,
};

use crate::{error::PlanError, materializer::InverterCapabilities, optimizer::Threads, prelude::*};

#[must_use]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanConfig {
    pub timing: TimingConfig,
    pub battery: BatteryConfig,
    pub forecast: ForecastConfig,
    pub rates: RateConfig,
    pub optimizer: OptimizerConfig,
    pub cars: Vec<CarConfig>,

    /// Allow the home battery to supply the car charger.
    pub car_charging_from_battery: bool,

    pub inverter: InverterCapabilities,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Simulation slot length.
    #[serde_as(as = "DisplayFromStr")]
    pub slot: humantime::Duration,

    /// Granularity that charge windows are aligned to.
    #[serde_as(as = "DisplayFromStr")]
    pub plan_interval: humantime::Duration,

    /// Planning horizon length.
    #[serde_as(as = "DisplayFromStr")]
    pub horizon: humantime::Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            slot: Duration::from_secs(5 * 60).into(),
            plan_interval: Duration::from_secs(30 * 60).into(),
            horizon: Duration::from_secs(48 * 3600).into(),
        }
    }
}

/// Validated slot and window granularity.
#[derive(Copy, Clone, Debug)]
pub struct Timing {
    pub slot: TimeDelta,
    pub plan_interval: TimeDelta,
    pub horizon: TimeDelta,
}

impl Timing {
    /// Number of slots in one plan interval.
    #[must_use]
    pub fn slots_per_interval(&self) -> usize {
        usize::try_from(self.plan_interval.num_seconds() / self.slot.num_seconds()).unwrap_or(1)
    }

    #[must_use]
    pub fn n_slots(&self) -> usize {
        usize::try_from(self.horizon.num_seconds() / self.slot.num_seconds()).unwrap_or(0)
    }

    #[must_use]
    pub fn slot_hours(&self) -> f64 {
        self.slot.as_seconds_f64() / 3600.0
    }
}

impl TryFrom<&TimingConfig> for Timing {
    type Error = PlanError;

    fn try_from(config: &TimingConfig) -> Result<Self, Self::Error> {
        let timing = Self {
            slot: to_time_delta(config.slot, "timing.slot")?,
            plan_interval: to_time_delta(config.plan_interval, "timing.plan_interval")?,
            horizon: to_time_delta(config.horizon, "timing.horizon")?,
        };
        if timing.slot < TimeDelta::minutes(1) || timing.slot.num_seconds() % 60 != 0 {
            return Err(PlanError::configuration("timing.slot must be a whole number of minutes"));
        }
        if timing.plan_interval < timing.slot
            || timing.plan_interval.num_seconds() % timing.slot.num_seconds() != 0
        {
            return Err(PlanError::configuration(
                "timing.plan_interval must be a positive multiple of timing.slot",
            ));
        }
        if timing.horizon < timing.plan_interval {
            return Err(PlanError::configuration(
                "timing.horizon must cover at least one plan interval",
            ));
        }
        Ok(timing)
    }
}

pub fn to_time_delta(duration: humantime::Duration, name: &str) -> Result<TimeDelta, PlanError> {
    TimeDelta::from_std(duration.into())
        .map_err(|_| PlanError::configuration(format!("{name} is out of range")))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Usable capacity.
    pub soc_max: KilowattHours,

    /// Inverter-enforced minimum state of charge.
    pub reserve_percent: f64,

    pub charge_rate: Kilowatts,
    pub discharge_rate: Kilowatts,

    /// Multiplier applied to both the charge and discharge rates.
    pub rate_max_scaling: f64,

    /// AC output limit, solar above it is clipped.
    pub inverter_limit: Kilowatts,

    /// Grid export limit, export above it is curtailed.
    pub export_limit: Option<Kilowatts>,

    /// DC-coupled solar bypasses the inverter when charging the battery.
    pub hybrid: bool,

    /// Fraction of energy lost when charging.
    pub loss: f64,

    /// Fraction of energy lost when discharging.
    pub loss_discharge: f64,

    /// Fraction of energy lost on each pass through the inverter.
    pub inverter_loss: f64,

    /// Charge power curve as `(soc_percent, fraction_of_max_rate)` points.
    pub charge_curve: Vec<CurvePoint>,

    /// Discharge power curve as `(soc_percent, fraction_of_max_rate)` points.
    pub discharge_curve: Vec<CurvePoint>,

    /// Throttle forced charging to the lowest rate that still reaches the target.
    pub low_power_charging: bool,

    /// Virtual cost applied to every kilowatt-hour that goes into or out of the battery.
    pub cycle_cost: KilowattHourRate,

    /// Factor applied to the value of the energy left in the battery at the end of the horizon.
    pub value_scaling: f64,

    /// Minimum number of distinct SoC buckets required to trust a calibrated curve.
    pub calibration_min_buckets: usize,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            soc_max: KilowattHours::from(10.0),
            reserve_percent: 4.0,
            charge_rate: Kilowatts::from(3.0),
            discharge_rate: Kilowatts::from(3.0),
            rate_max_scaling: 1.0,
            inverter_limit: Kilowatts::from(3.6),
            export_limit: None,
            hybrid: true,
            loss: 0.05,
            loss_discharge: 0.05,
            inverter_loss: 0.04,
            charge_curve: Vec::new(),
            discharge_curve: Vec::new(),
            low_power_charging: false,
            cycle_cost: KilowattHourRate::ZERO,
            value_scaling: 1.0,
            calibration_min_buckets: 20,
        }
    }
}

impl BatteryConfig {
    pub fn reserve(&self) -> KilowattHours {
        self.soc_max * (self.reserve_percent / 100.0)
    }
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
pub struct CurvePoint {
    pub soc_percent: u8,
    pub fraction: f64,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Lookback offsets in days.
    pub days_previous: Vec<u32>,

    /// Weight per lookback offset, missing entries default to `1.0`.
    pub days_previous_weight: Vec<f64>,

    pub load_scaling: f64,

    /// Load multiplier for the pessimistic scenarios.
    pub load_scaling10: f64,

    pub pv_scaling: f64,

    /// Blend weight of the 10% solar scenario into the central forecast.
    pub pv_weight10: f64,

    /// Spread the solar energy of each plan interval across its slots to emulate passing clouds.
    pub cloud_variance: bool,

    /// Zero-load runs shorter than this are treated as missing data.
    #[serde_as(as = "DisplayFromStr")]
    pub gap_fill: humantime::Duration,

    /// Drop the lowest-consumption lookback day from the average.
    pub modal_filter: bool,

    /// Load above this power is assumed to be car charging when no car energy series is supplied.
    pub car_charging_threshold: Kilowatts,

    /// Power subtracted from the load above the threshold.
    pub car_charging_rate: Kilowatts,

    /// Blend today's actual-to-predicted load ratio into the next hours.
    pub in_day_correction: bool,

    pub in_day_ratio_min: f64,
    pub in_day_ratio_max: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            days_previous: vec![7],
            days_previous_weight: Vec::new(),
            load_scaling: 1.0,
            load_scaling10: 1.1,
            pv_scaling: 1.0,
            pv_weight10: 0.0,
            cloud_variance: true,
            gap_fill: Duration::from_secs(30 * 60).into(),
            modal_filter: false,
            car_charging_threshold: Kilowatts::from(6.0),
            car_charging_rate: Kilowatts::from(7.4),
            in_day_correction: true,
            in_day_ratio_min: 0.5,
            in_day_ratio_max: 2.0,
        }
    }
}

impl ForecastConfig {
    /// Lookback offsets zipped with their weights.
    pub fn weighted_days(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.days_previous
            .iter()
            .enumerate()
            .map(|(i, days)| (*days, self.days_previous_weight.get(i).copied().unwrap_or(1.0)))
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateConfig {
    pub import: Vec<ManualRate>,
    pub export: Vec<ManualRate>,
    pub import_overrides: Vec<ManualRate>,
    pub export_overrides: Vec<ManualRate>,

    /// Flat rate used where nothing else applies.
    pub fallback_import: Option<KilowattHourRate>,
    pub fallback_export: Option<KilowattHourRate>,

    /// Standing charge per day.
    pub standing_charge: Cost,
}

/// Daily-repeating rate range, `end <= start` crosses midnight.
#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManualRate {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub rate: KilowattHourRate,

    /// Restrict the range to a single date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Import rate at or below which a plan interval is a charge candidate.
    ///
    /// `0` selects the threshold automatically.
    pub threshold_charge: KilowattHourRate,

    /// Export rate at or above which a plan interval is an export candidate.
    ///
    /// `0` selects the threshold automatically.
    pub threshold_export: KilowattHourRate,

    pub combine_charge_slots: bool,
    pub combine_export_slots: bool,
    pub combine_rate_threshold: KilowattHourRate,

    /// Maximum window length when combining is disabled.
    pub window_split_minutes: i64,

    pub soc_step: KilowattHours,
    pub metric_min_improvement: Cost,

    /// Minimum export improvement per 30 minutes of window.
    pub metric_min_improvement_export: Cost,

    /// Weight of the 10% scenario in the optimized metric.
    pub pv_metric10_weight: f64,

    /// Carbon price in pence per kilogram.
    pub metric_carbon: f64,

    /// On overlap, export windows override charge windows.
    pub calculate_discharge_oncharge: bool,

    pub calculate_export: bool,
    pub calculate_regions: bool,
    pub fast_plan: bool,
    pub tweak_plan: bool,
    pub second_pass: bool,
    pub set_charge_freeze: bool,
    pub set_export_freeze: bool,

    pub best_soc_min: KilowattHours,
    pub best_soc_max: Option<KilowattHours>,

    /// Soft floor, falling below it is penalized.
    pub best_soc_keep: KilowattHours,
    pub best_soc_keep_weight: f64,

    pub threads: Threads,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            threshold_charge: KilowattHourRate::ZERO,
            threshold_export: KilowattHourRate::ZERO,
            combine_charge_slots: true,
            combine_export_slots: false,
            combine_rate_threshold: KilowattHourRate::from(1.0),
            window_split_minutes: 60,
            soc_step: KilowattHours::from(0.5),
            metric_min_improvement: Cost::ZERO,
            metric_min_improvement_export: Cost::from(5.0),
            pv_metric10_weight: 0.15,
            metric_carbon: 0.0,
            calculate_discharge_oncharge: true,
            calculate_export: true,
            calculate_regions: true,
            fast_plan: false,
            tweak_plan: true,
            second_pass: false,
            set_charge_freeze: false,
            set_export_freeze: false,
            best_soc_min: KilowattHours::ZERO,
            best_soc_max: None,
            best_soc_keep: KilowattHours::ZERO,
            best_soc_keep_weight: 0.5,
            threads: Threads::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarConfig {
    pub name: String,
    pub battery_size: KilowattHours,
    pub rate: Kilowatts,

    /// Fraction of energy lost when charging.
    #[serde(default = "CarConfig::default_loss")]
    pub loss: f64,

    #[serde(default = "CarConfig::default_target_percent")]
    pub target_percent: f64,

    /// Time of day the car must be charged by.
    #[serde(default = "CarConfig::default_ready_time")]
    pub ready_time: NaiveTime,

    /// Never charge above this import rate.
    #[serde(default)]
    pub max_price: Option<KilowattHourRate>,

    /// Plan charging even while the car is unplugged.
    #[serde(default)]
    pub plan_unplugged: bool,

    /// Rate applied to slots supplied by the dispatch feed.
    #[serde(default)]
    pub dispatch_rate: Option<KilowattHourRate>,
}

impl CarConfig {
    const fn default_loss() -> f64 {
        0.1
    }

    const fn default_target_percent() -> f64 {
        100.0
    }

    fn default_ready_time() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 30, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl PlanConfig {
    /// Validate the configuration and resolve the slot timing.
    pub fn validate(&self) -> Result<Timing, PlanError> {
        let timing = Timing::try_from(&self.timing)?;

        let battery = &self.battery;
        if battery.soc_max <= KilowattHours::ZERO {
            return Err(PlanError::configuration("battery.soc_max must be positive"));
        }
        if !(0.0..100.0).contains(&battery.reserve_percent) {
            return Err(PlanError::configuration("battery.reserve_percent must be within [0, 100)"));
        }
        for (name, loss) in [
            ("battery.loss", battery.loss),
            ("battery.loss_discharge", battery.loss_discharge),
            ("battery.inverter_loss", battery.inverter_loss),
        ] {
            if !(0.0..1.0).contains(&loss) {
                return Err(PlanError::configuration(format!("{name} must be within [0, 1)")));
            }
        }
        if battery.charge_rate < Kilowatts::ZERO || battery.discharge_rate < Kilowatts::ZERO {
            return Err(PlanError::configuration("battery rates must not be negative"));
        }
        for point in battery.charge_curve.iter().chain(&battery.discharge_curve) {
            if point.soc_percent > 100 || !(0.0..=1.0).contains(&point.fraction) {
                return Err(PlanError::configuration(format!(
                    "invalid curve point at {}%: fraction {}",
                    point.soc_percent, point.fraction,
                )));
            }
        }

        let forecast = &self.forecast;
        if forecast.days_previous.is_empty() || forecast.days_previous.contains(&0) {
            return Err(PlanError::configuration(
                "forecast.days_previous must list at least one positive offset",
            ));
        }
        if forecast.days_previous_weight.iter().any(|weight| *weight < 0.0)
            || forecast.weighted_days().map(|(_, weight)| weight).sum::<f64>() <= 0.0
        {
            return Err(PlanError::configuration(
                "forecast.days_previous_weight must be non-negative and not all zero",
            ));
        }
        if forecast.in_day_ratio_min > forecast.in_day_ratio_max {
            return Err(PlanError::configuration("forecast.in_day_ratio_min exceeds the maximum"));
        }
        to_time_delta(forecast.gap_fill, "forecast.gap_fill")?;

        let optimizer = &self.optimizer;
        if optimizer.soc_step <= KilowattHours::ZERO {
            return Err(PlanError::configuration("optimizer.soc_step must be positive"));
        }
        if !(0.0..=1.0).contains(&optimizer.pv_metric10_weight) {
            return Err(PlanError::configuration(
                "optimizer.pv_metric10_weight must be within [0, 1]",
            ));
        }
        if optimizer.window_split_minutes < timing.plan_interval.num_minutes() {
            return Err(PlanError::configuration(
                "optimizer.window_split_minutes must cover at least one plan interval",
            ));
        }

        for car in &self.cars {
            if car.battery_size <= KilowattHours::ZERO || car.rate <= Kilowatts::ZERO {
                return Err(PlanError::configuration(format!(
                    "car `{}` needs a positive battery size and rate",
                    car.name,
                )));
            }
            if !(0.0..1.0).contains(&car.loss) {
                return Err(PlanError::configuration(format!(
                    "car `{}` loss must be within [0, 1)",
                    car.name,
                )));
            }
        }

        Ok(timing)
    }
}
