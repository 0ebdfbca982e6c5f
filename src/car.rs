//! Car charging slot assignment.
//!
//! Cars are planned before the home battery, their charging is then a fixed extra slot load.

use bon::Builder;
use chrono::{DateTime, Days, Local, TimeDelta};
use itertools::Itertools;
use serde::Serialize;
use sundial_quantities::{cost::Cost, energy::KilowattHours};

use crate::{
    config::CarConfig,
    core::{slot::Slot, window::ENERGY_EPSILON},
    input::CarState,
    ops::Interval,
    prelude::*,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CarPlanSource {
    /// Slots supplied by the intelligent-dispatch feed.
    Dispatch,

    /// Cheapest slots before the ready time.
    Cheapest,
}

#[derive(Copy, Clone, Debug, Serialize)]
pub struct CarSlot {
    pub interval: Interval,

    /// Energy drawn from the grid.
    pub energy: KilowattHours,

    pub cost: Cost,
}

#[derive(Clone, Debug, Serialize)]
pub struct CarPlan {
    pub name: String,
    pub source: CarPlanSource,
    pub plugged_in: bool,

    /// Grid energy still needed to reach the target.
    pub needed: KilowattHours,

    pub ready_by: DateTime<Local>,
    pub slots: Vec<CarSlot>,
}

impl CarPlan {
    #[must_use]
    pub fn energy(&self) -> KilowattHours {
        self.slots.iter().map(|slot| slot.energy).sum()
    }

    #[must_use]
    pub fn cost(&self) -> Cost {
        self.slots.iter().map(|slot| slot.cost).sum()
    }

    /// Whether the planned energy falls short of the need.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.energy() + ENERGY_EPSILON < self.needed
    }
}

#[derive(Builder)]
pub struct CarPlanner<'a> {
    cars: &'a [CarConfig],
    states: &'a [CarState],
}

impl CarPlanner<'_> {
    /// Assign charging slots to the cars and add the charging energy to the slot load.
    ///
    /// Plugged-in cars go first, in configuration order. A slot serves at most one car.
    #[instrument(skip_all, fields(n_cars = self.cars.len()))]
    pub fn plan(&self, slots: &mut [Slot]) -> Vec<CarPlan> {
        let (Some(first), Some(last)) = (slots.first(), slots.last()) else {
            return Vec::new();
        };
        let (now, horizon_end) = (first.interval.start, last.interval.end);
        let cars = self
            .cars
            .iter()
            .filter_map(|config| {
                let state = self.states.iter().find(|state| state.name == config.name);
                if state.is_none() {
                    debug!(name = %config.name, "no state reported for the car");
                }
                Some((config, state?))
            })
            .filter(|(config, state)| state.plugged_in || config.plan_unplugged)
            .sorted_by_key(|(_, state)| !state.plugged_in)
            .collect_vec();

        let mut taken = vec![false; slots.len()];
        let mut plans = Vec::with_capacity(cars.len());
        for (config, state) in cars {
            let ready_by = next_ready_time(config, now).min(horizon_end);
            let needed = needed_energy(config, state);
            let (source, car_slots) = if state.dispatch.is_empty() {
                let car_slots = cheapest_slots(config, slots, &mut taken, ready_by, needed);
                (CarPlanSource::Cheapest, car_slots)
            } else {
                (CarPlanSource::Dispatch, dispatch_slots(config, state, slots, &mut taken, needed))
            };
            let plan = CarPlan {
                name: config.name.clone(),
                source,
                plugged_in: state.plugged_in,
                needed,
                ready_by,
                slots: car_slots,
            };
            info!(
                name = %plan.name,
                source = ?plan.source,
                n_slots = plan.slots.len(),
                energy = %plan.energy(),
                cost = %plan.cost(),
                "planned car charging",
            );
            if plan.is_short() {
                warn!(name = %plan.name, needed = %plan.needed, "car will not reach its target");
            }
            plans.push(plan);
        }
        plans
    }
}

/// Grid energy needed to bring the car to its target.
fn needed_energy(config: &CarConfig, state: &CarState) -> KilowattHours {
    let missing = (config.target_percent - state.soc_percent).max(0.0) / 100.0;
    config.battery_size * missing / (1.0 - config.loss)
}

/// Next occurrence of the ready time strictly after `now`.
fn next_ready_time(config: &CarConfig, now: DateTime<Local>) -> DateTime<Local> {
    let today = now.date_naive().and_time(config.ready_time);
    [today, today + Days::new(1)]
        .into_iter()
        .filter_map(|naive| naive.and_local_timezone(Local).earliest())
        .find(|ready_by| *ready_by > now)
        .unwrap_or(now + TimeDelta::days(1))
}

fn cheapest_slots(
    config: &CarConfig,
    slots: &mut [Slot],
    taken: &mut [bool],
    ready_by: DateTime<Local>,
    needed: KilowattHours,
) -> Vec<CarSlot> {
    let candidates = slots
        .iter()
        .enumerate()
        .filter(|(index, slot)| !taken[*index] && slot.interval.end <= ready_by)
        .filter(|(_, slot)| config.max_price.is_none_or(|max_price| slot.import_rate <= max_price))
        .sorted_by_key(|(_, slot)| (slot.import_rate, slot.interval.start))
        .map(|(index, _)| index)
        .collect_vec();

    let mut remaining = needed;
    let mut car_slots = Vec::new();
    for index in candidates {
        if remaining <= ENERGY_EPSILON {
            break;
        }
        let slot = &mut slots[index];
        let energy = (config.rate * slot.interval.len()).min(remaining);
        remaining -= energy;
        taken[index] = true;
        slot.car_load += energy;
        let cost = energy * slot.import_rate;
        car_slots.push(CarSlot { interval: slot.interval, energy, cost });
    }
    car_slots.sort_by_key(|slot| slot.interval.start);
    car_slots
}

/// Follow the dispatch feed, optionally re-rating the dispatched slots.
fn dispatch_slots(
    config: &CarConfig,
    state: &CarState,
    slots: &mut [Slot],
    taken: &mut [bool],
    needed: KilowattHours,
) -> Vec<CarSlot> {
    let mut remaining = needed;
    let mut car_slots = Vec::new();
    for (slot, taken) in slots.iter_mut().zip(taken) {
        let overlap = state
            .dispatch
            .iter()
            .filter(|dispatch| dispatch.overlaps(slot.interval))
            .map(|dispatch| {
                dispatch.end.min(slot.interval.end) - dispatch.start.max(slot.interval.start)
            })
            .fold(TimeDelta::zero(), |total, overlap| total + overlap);
        if overlap <= TimeDelta::zero() || *taken {
            continue;
        }
        if let Some(dispatch_rate) = config.dispatch_rate {
            slot.import_rate = dispatch_rate;
        }
        let energy = (config.rate * overlap).min(remaining);
        if energy <= KilowattHours::ZERO {
            continue;
        }
        remaining -= energy;
        *taken = true;
        slot.car_load += energy;
        let cost = energy * slot.import_rate;
        car_slots.push(CarSlot { interval: slot.interval, energy, cost });
    }
    car_slots
}
