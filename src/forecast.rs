//! Per-slot load, solar, rate and carbon series for one planning cycle.

pub mod calibration;
pub mod load;
pub mod rates;
pub mod solar;

use bon::Builder;
use chrono::{DateTime, DurationRound, Local};
use itertools::{Itertools, izip};
use serde::Serialize;
use sundial_quantities::{cost::Cost, energy::KilowattHours};

use self::{
    calibration::resolve_curve,
    load::LoadForecaster,
    rates::{Flow, RatePeriod, RateSources},
    solar::{forecast_solar, held},
};
use crate::{
    battery::{Battery, Direction},
    config::{PlanConfig, Timing, to_time_delta},
    core::slot::Slot,
    error::{PlanError, Series, Warning},
    input::PlanInputs,
    ops::Interval,
    prelude::*,
};

/// Everything known in advance about the horizon.
#[must_use]
#[derive(Clone, Debug, Serialize)]
pub struct Forecast {
    /// Slot-aligned start of the horizon.
    pub now: DateTime<Local>,

    pub slots: Vec<Slot>,

    #[serde(skip)]
    pub timing: Timing,

    /// Battery model with the resolved power curves.
    #[serde(skip)]
    pub battery: Battery,

    pub standing_charge: Cost,
    pub warnings: Vec<Warning>,
}

impl Forecast {
    #[must_use]
    pub fn intervals(&self) -> Vec<Interval> {
        self.slots.iter().map(|slot| slot.interval).collect()
    }

    /// Import or export rates merged into periods of equal rate.
    #[must_use]
    pub fn rate_timeline(&self, flow: Flow) -> Vec<RatePeriod> {
        let rates = self
            .slots
            .iter()
            .map(|slot| match flow {
                Flow::Import => slot.import_rate,
                Flow::Export => slot.export_rate,
            })
            .collect_vec();
        rates::timeline(&self.intervals(), &rates)
    }

    #[must_use]
    pub fn total_load(&self) -> KilowattHours {
        self.slots.iter().map(|slot| slot.load).sum()
    }

    #[must_use]
    pub fn total_pv(&self) -> KilowattHours {
        self.slots.iter().map(|slot| slot.pv).sum()
    }
}

#[derive(Builder)]
pub struct ForecastAssembler<'a> {
    config: &'a PlanConfig,
    inputs: &'a PlanInputs,
    timing: Timing,
}

impl ForecastAssembler<'_> {
    #[instrument(skip_all)]
    pub fn assemble(&self) -> Result<Forecast, PlanError> {
        let timing = self.timing;
        let now = self
            .inputs
            .now
            .duration_trunc(timing.slot)
            .map_err(|error| PlanError::configuration(format!("cannot align `now`: {error}")))?;
        let intervals =
            Interval::from_std(now..now + timing.horizon).steps(timing.slot).collect_vec();
        let mut warnings = Vec::new();

        let rates = &self.config.rates;
        let import_rates = RateSources {
            flow: Flow::Import,
            overrides: &rates.import_overrides,
            integration: &self.inputs.import_rates,
            manual: &rates.import,
            fallback: rates.fallback_import,
        }
        .resolve(&intervals)?;
        let export_rates = RateSources {
            flow: Flow::Export,
            overrides: &rates.export_overrides,
            integration: &self.inputs.export_rates,
            manual: &rates.export,
            fallback: rates.fallback_export,
        }
        .resolve(&intervals)?;

        let forecast_config = &self.config.forecast;
        let load = LoadForecaster::builder()
            .config(forecast_config)
            .history(&self.inputs.load_history)
            .maybe_car_energy(self.inputs.car_energy.as_ref())
            .now(now)
            .slot(timing.slot)
            .gap_fill(to_time_delta(forecast_config.gap_fill, "forecast.gap_fill")?)
            .build()
            .forecast(&intervals);
        if load.n_missing != 0 {
            warn!(n_missing = load.n_missing, "load history has gaps");
            warnings.push(Warning::ForecastGap { series: Series::Load, n_missing: load.n_missing });
        }

        let solar =
            forecast_solar(forecast_config, &self.inputs.solar, &intervals, timing.plan_interval);
        if solar.n_missing != 0 {
            warn!(n_missing = solar.n_missing, "solar forecast does not cover the horizon");
            let n_missing = solar.n_missing;
            warnings.push(Warning::ForecastGap { series: Series::Solar, n_missing });
        }

        let carbon = self.carbon_intensities(&intervals, timing, &mut warnings);
        let battery = self.battery(&mut warnings);

        let slots = izip!(
            &intervals,
            &load.energy,
            &solar.pv,
            &solar.pv10,
            &solar.pv90,
            &import_rates,
            &export_rates,
            &carbon,
        )
        .map(|(interval, load, pv, pv10, pv90, import_rate, export_rate, carbon_intensity)| {
            let load = *load * forecast_config.load_scaling;
            Slot {
                interval: *interval,
                load,
                load10: load * forecast_config.load_scaling10,
                pv: *pv,
                pv10: *pv10,
                pv90: *pv90,
                import_rate: *import_rate,
                export_rate: *export_rate,
                carbon_intensity: *carbon_intensity,
                car_load: KilowattHours::ZERO,
            }
        })
        .collect_vec();

        info!(
            n_slots = slots.len(),
            load = slots.iter().map(|slot| slot.load).sum::<KilowattHours>().into_inner(),
            pv = slots.iter().map(|slot| slot.pv).sum::<KilowattHours>().into_inner(),
            "assembled",
        );
        Ok(Forecast {
            now,
            slots,
            timing,
            battery,
            standing_charge: rates.standing_charge,
            warnings,
        })
    }

    fn carbon_intensities(
        &self,
        intervals: &[Interval],
        timing: Timing,
        warnings: &mut Vec<Warning>,
    ) -> Vec<Option<f64>> {
        if self.inputs.carbon.is_empty() {
            return vec![None; intervals.len()];
        }
        let points = self
            .inputs
            .carbon
            .iter()
            .map(|point| (point.start, point.intensity))
            .sorted_by_key(|(start, _)| *start)
            .collect_vec();
        let intensities = intervals
            .iter()
            .map(|interval| held(&points, interval.start, timing.plan_interval))
            .collect_vec();
        let n_missing = intensities.iter().filter(|intensity| intensity.is_none()).count();
        if n_missing != 0 {
            warn!(n_missing, "carbon intensity does not cover the horizon");
            warnings.push(Warning::ForecastGap { series: Series::Carbon, n_missing });
        }
        intensities
    }

    fn battery(&self, warnings: &mut Vec<Warning>) -> Battery {
        let config = &self.config.battery;
        let [charge_curve, discharge_curve] = [
            (Direction::Charge, &config.charge_curve, config.charge_rate),
            (Direction::Discharge, &config.discharge_curve, config.discharge_rate),
        ]
        .map(|(direction, configured, max_rate)| {
            let (curve, warning) = resolve_curve(
                direction,
                configured,
                &self.inputs.calibration,
                max_rate * config.rate_max_scaling,
                config.calibration_min_buckets,
            );
            warnings.extend(warning);
            curve
        });
        Battery::new(config, charge_curve, discharge_curve)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{NaiveTime, TimeDelta, TimeZone};
    use sundial_quantities::rate::KilowattHourRate;

    use super::*;
    use crate::{
        config::ManualRate,
        input::{CarbonPoint, EnergySeries, RateRange, SolarPoint},
    };

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 12, 2, 30).unwrap()
    }

    fn config() -> PlanConfig {
        let mut config = PlanConfig::default();
        config.rates.fallback_import = Some(KilowattHourRate::from(30.0));
        config.rates.fallback_export = Some(KilowattHourRate::from(15.0));
        config.forecast.days_previous = vec![1];
        config.forecast.in_day_correction = false;
        config.forecast.cloud_variance = false;
        config
    }

    fn inputs() -> PlanInputs {
        let midnight = Local.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap();
        let n_slots = usize::try_from((now() - midnight).num_minutes() / 5).unwrap();
        PlanInputs {
            now: now(),
            soc: KilowattHours::from(5.0),
            load_history: EnergySeries::regular(
                midnight,
                TimeDelta::minutes(5),
                vec![KilowattHours::from(0.05); n_slots],
            ),
            car_energy: None,
            solar: vec![SolarPoint {
                start: Local.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
                pv50: 1.2.into(),
                pv10: 0.6.into(),
                pv90: None,
            }],
            import_rates: Vec::new(),
            export_rates: Vec::new(),
            carbon: Vec::new(),
            cars: Vec::new(),
            calibration: Vec::new(),
            calibrating: false,
        }
    }

    fn assemble(config: &PlanConfig, inputs: &PlanInputs) -> Result<Forecast, PlanError> {
        let timing = config.validate()?;
        ForecastAssembler::builder().config(config).inputs(inputs).timing(timing).build().assemble()
    }

    #[test]
    fn test_assemble() {
        let mut config = config();
        config.forecast.load_scaling10 = 1.5;
        let forecast = assemble(&config, &inputs()).unwrap();

        assert_eq!(forecast.now, Local.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
        assert_eq!(forecast.slots.len(), 576);
        assert_eq!(forecast.slots[0].interval.start, forecast.now);
        assert!(
            forecast
                .slots
                .iter()
                .tuple_windows()
                .all(|(lhs, rhs)| lhs.interval.end == rhs.interval.start)
        );

        let slot = &forecast.slots[0];
        assert_abs_diff_eq!(slot.load.into_inner(), 0.05, epsilon = 1e-9);
        assert_abs_diff_eq!(slot.load10.into_inner(), 0.075, epsilon = 1e-9);
        assert_abs_diff_eq!(slot.pv.into_inner(), 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(slot.pv10.into_inner(), 0.05, epsilon = 1e-9);
        assert_eq!(slot.import_rate, KilowattHourRate::from(30.0));
        assert!(forecast.battery.charge_curve.is_flat());
    }

    #[test]
    fn test_solar_gap_is_a_warning() {
        let forecast = assemble(&config(), &inputs()).unwrap();
        assert!(forecast.warnings.iter().any(|warning| matches!(
            warning,
            Warning::ForecastGap { series: Series::Solar, .. }
        )));
    }

    #[test]
    fn test_missing_rates_is_a_configuration_error() {
        let mut config = config();
        config.rates.fallback_export = None;
        config.rates.export = vec![ManualRate {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            rate: KilowattHourRate::from(15.0),
            date: None,
        }];
        let error = assemble(&config, &inputs()).unwrap_err();
        assert!(matches!(error, PlanError::Configuration(_)));
    }

    #[test]
    fn test_carbon_is_held() {
        let mut inputs = inputs();
        inputs.carbon = vec![CarbonPoint { start: now(), intensity: 150.0 }];
        let forecast = assemble(&config(), &inputs).unwrap();
        assert_eq!(forecast.slots[0].carbon_intensity, None);
        assert_eq!(forecast.slots[1].carbon_intensity, Some(150.0));
        assert_eq!(forecast.slots[6].carbon_intensity, Some(150.0));
        assert_eq!(forecast.slots[7].carbon_intensity, None);
    }

    #[test]
    fn test_timeline() {
        let mut inputs = inputs();
        let start = Local.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap();
        inputs.import_rates =
            vec![RateRange { start, end: start + TimeDelta::hours(2), rate: 7.5.into() }];
        let forecast = assemble(&config(), &inputs).unwrap();
        let timeline = forecast.rate_timeline(Flow::Import);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[1].interval, Interval::from_std(start..start + TimeDelta::hours(2)));
        assert_eq!(timeline[1].rate, KilowattHourRate::from(7.5));
    }
}
