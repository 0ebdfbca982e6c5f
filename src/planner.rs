//! One planning cycle end to end, and the supervisor publishing its outcome.

use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    RwLock,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Local};
use serde::Serialize;
use sundial_quantities::energy::KilowattHours;

use crate::{
    battery::minute_trajectory,
    car::{CarPlan, CarPlanner},
    config::PlanConfig,
    error::{PlanError, Warning},
    forecast::{Forecast, ForecastAssembler},
    input::PlanInputs,
    materializer::{ControlSchedule, Materializer},
    optimizer::{Optimization, Optimizer},
    prelude::*,
    status::{Status, StatusMachine},
};

#[must_use]
#[derive(Clone, Debug, Serialize)]
pub struct PlanOutcome {
    pub forecast: Forecast,
    pub cars: Vec<CarPlan>,
    pub optimization: Optimization,
    pub status: Status,
    pub schedule: ControlSchedule,

    /// Central scenario state of charge at minute resolution.
    pub trajectory: Vec<(DateTime<Local>, KilowattHours)>,

    /// Every warning raised during the cycle.
    pub warnings: Vec<Warning>,
}

/// Run one planning cycle.
///
/// This is a pure function of the configuration and the inputs, failing only on a configuration
/// error.
#[instrument(skip_all, fields(now = %inputs.now))]
pub fn compute_plan(config: &PlanConfig, inputs: &PlanInputs) -> Result<PlanOutcome, PlanError> {
    let timing = config.validate()?;
    let mut forecast = ForecastAssembler::builder()
        .config(config)
        .inputs(inputs)
        .timing(timing)
        .build()
        .assemble()?;
    let cars = CarPlanner::builder()
        .cars(&config.cars)
        .states(&inputs.cars)
        .build()
        .plan(&mut forecast.slots);

    let optimization = Optimizer::builder()
        .config(&config.optimizer)
        .forecast(&forecast)
        .initial_soc(inputs.soc)
        .car_from_battery(config.car_charging_from_battery)
        .optimize();

    let status = if inputs.calibrating {
        Status::Calibration
    } else {
        Status::resolve(&optimization.plan, &forecast.battery, inputs.now, inputs.soc)
    };
    let schedule = Materializer::builder()
        .capabilities(&config.inverter)
        .battery(&forecast.battery)
        .plan(&optimization.plan)
        .status(status)
        .now(inputs.now)
        .soc(inputs.soc)
        .materialize();
    let trajectory = minute_trajectory(&optimization.flows);

    let warnings = forecast
        .warnings
        .iter()
        .chain(&optimization.warnings)
        .chain(&schedule.warnings)
        .cloned()
        .collect::<Vec<_>>();
    for warning in &warnings {
        warn!(%warning, "recovered");
    }
    info!(%status, n_windows = optimization.plan.windows.len(), "planned");

    Ok(PlanOutcome { forecast, cars, optimization, status, schedule, trajectory, warnings })
}

/// Keeps the most recently completed plan published across cycles.
///
/// A trigger arriving while a cycle is running is queued, the running cycle completes and then
/// the latest queued inputs are planned. Older queued inputs are dropped.
pub struct PlanningCycle {
    config: PlanConfig,
    active: AtomicBool,
    pending: Mutex<Option<PlanInputs>>,
    published: RwLock<Option<Arc<PlanOutcome>>>,
    last_error: Mutex<Option<PlanError>>,
    status: Mutex<StatusMachine>,
}

impl PlanningCycle {
    pub fn new(config: PlanConfig) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
            pending: Mutex::new(None),
            published: RwLock::new(None),
            last_error: Mutex::new(None),
            status: Mutex::new(StatusMachine::default()),
        }
    }

    /// Plan the inputs, or queue them when a cycle is already running.
    ///
    /// Returns the published outcome once this call has completed all queued cycles, and [`None`]
    /// when the inputs were queued for the running cycle.
    pub fn trigger(&self, mut inputs: PlanInputs) -> Option<Arc<PlanOutcome>> {
        {
            let mut pending = lock(&self.pending);
            if self.active.swap(true, Ordering::AcqRel) {
                if pending.replace(inputs).is_some() {
                    debug!("superseded queued inputs");
                }
                return None;
            }
        }

        loop {
            self.run(&inputs);
            let mut pending = lock(&self.pending);
            match pending.take() {
                Some(next) => inputs = next,
                None => {
                    self.active.store(false, Ordering::Release);
                    break;
                }
            }
        }
        self.published()
    }

    fn run(&self, inputs: &PlanInputs) {
        match compute_plan(&self.config, inputs) {
            Ok(outcome) => {
                lock(&self.status).advance(outcome.status);
                *self.published.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(outcome));
                *lock(&self.last_error) = None;
            }
            Err(error) => {
                error!(%error, "planning failed, keeping the previous plan");
                lock(&self.status).advance(Status::Error);
                *lock(&self.last_error) = Some(error);
            }
        }
    }

    /// A cycle is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Most recently completed outcome.
    #[must_use]
    pub fn published(&self) -> Option<Arc<PlanOutcome>> {
        self.published.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        lock(&self.status).status()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<PlanError> {
        lock(&self.last_error).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
