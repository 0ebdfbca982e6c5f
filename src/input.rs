//! Observed state and external forecasts for one planning cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use sundial_quantities::{energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate};

use crate::{battery::Direction, error::PlanError, ops::Interval};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanInputs {
    pub now: DateTime<Local>,

    /// Current battery state of charge.
    pub soc: KilowattHours,

    /// Historical house consumption.
    #[serde(default)]
    pub load_history: EnergySeries,

    /// Car charging energy to subtract from the load history.
    #[serde(default)]
    pub car_energy: Option<EnergySeries>,

    #[serde(default)]
    pub solar: Vec<SolarPoint>,

    /// Import rates from the tariff integration.
    #[serde(default)]
    pub import_rates: Vec<RateRange>,

    /// Export rates from the tariff integration.
    #[serde(default)]
    pub export_rates: Vec<RateRange>,

    #[serde(default)]
    pub carbon: Vec<CarbonPoint>,

    #[serde(default)]
    pub cars: Vec<CarState>,

    /// Power samples taken while the battery was running at its full rate.
    #[serde(default)]
    pub calibration: Vec<CalibrationSample>,

    /// The battery is being calibrated and must not be controlled.
    #[serde(default)]
    pub calibrating: bool,
}

/// Energy time series, each sample covering its own interval.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(try_from = "EnergySeriesRepr", into = "Vec<EnergySample>")]
pub struct EnergySeries(BTreeMap<DateTime<Local>, EnergySample>);

#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnergySample {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub energy: KilowattHours,
}

#[serde_as]
#[derive(Deserialize)]
#[serde(untagged)]
enum EnergySeriesRepr {
    Samples(Vec<EnergySample>),
    Regular {
        start: DateTime<Local>,
        #[serde_as(as = "DisplayFromStr")]
        step: humantime::Duration,
        values: Vec<KilowattHours>,
    },
}

impl TryFrom<EnergySeriesRepr> for EnergySeries {
    type Error = PlanError;

    fn try_from(repr: EnergySeriesRepr) -> Result<Self, Self::Error> {
        match repr {
            EnergySeriesRepr::Samples(samples) => Ok(samples.into_iter().collect()),
            EnergySeriesRepr::Regular { start, step, values } => {
                let step = TimeDelta::from_std(step.into())
                    .ok()
                    .filter(|step| *step > TimeDelta::zero())
                    .ok_or_else(|| {
                        PlanError::configuration(format!("series step `{step}` is out of range"))
                    })?;
                Ok(Self::regular(start, step, values))
            }
        }
    }
}

impl From<EnergySeries> for Vec<EnergySample> {
    fn from(series: EnergySeries) -> Self {
        series.0.into_values().collect()
    }
}

impl FromIterator<EnergySample> for EnergySeries {
    fn from_iter<T: IntoIterator<Item = EnergySample>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .filter(|sample| sample.start < sample.end)
                .map(|sample| (sample.start, sample))
                .collect(),
        )
    }
}

impl EnergySeries {
    /// Series of consecutive samples of equal length.
    pub fn regular(
        start: DateTime<Local>,
        step: TimeDelta,
        values: impl IntoIterator<Item = KilowattHours>,
    ) -> Self {
        values
            .into_iter()
            .zip(0..)
            .map(|(energy, index)| {
                let sample_start = start + step * index;
                EnergySample { start: sample_start, end: sample_start + step, energy }
            })
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Energy within the interval, prorating partially overlapping samples.
    ///
    /// Returns [`None`] when no sample overlaps the interval.
    #[must_use]
    pub fn energy_in(&self, interval: Interval) -> Option<KilowattHours> {
        let mut total: Option<KilowattHours> = None;
        for sample in self
            .0
            .range(..interval.end)
            .rev()
            .map(|(_, sample)| sample)
            .take_while(|sample| sample.end > interval.start)
        {
            let overlap = sample.end.min(interval.end) - sample.start.max(interval.start);
            let fraction = overlap.as_seconds_f64() / (sample.end - sample.start).as_seconds_f64();
            *total.get_or_insert(KilowattHours::ZERO) += sample.energy * fraction;
        }
        total
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnergySample> {
        self.0.values()
    }
}

/// Solar forecast point, held until the next point starts.
#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SolarPoint {
    pub start: DateTime<Local>,

    /// Median estimate.
    pub pv50: Kilowatts,

    /// 10th percentile estimate.
    pub pv10: Kilowatts,

    /// 90th percentile estimate.
    #[serde(default)]
    pub pv90: Option<Kilowatts>,
}

/// Rate valid over an absolute time range.
#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub rate: KilowattHourRate,
}

impl RateRange {
    pub const fn interval(&self) -> Interval {
        Interval { start: self.start, end: self.end }
    }
}

/// Grid carbon intensity in g/kWh, held until the next point starts.
#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarbonPoint {
    pub start: DateTime<Local>,
    pub intensity: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarState {
    pub name: String,

    #[serde(default)]
    pub plugged_in: bool,

    pub soc_percent: f64,

    /// Slots assigned by an intelligent-dispatch feed, authoritative when present.
    #[serde(default)]
    pub dispatch: Vec<Interval>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationSample {
    pub soc_percent: u8,
    pub power: Kilowatts,
    pub direction: Direction,
}
