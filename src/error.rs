use std::fmt::{Display, Formatter};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::battery::Direction;

/// Fatal planning failure: the cycle is aborted and the previously published plan stays in effect.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PlanError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Non-fatal condition recovered from during a planning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    #[error("{series} forecast has {n_missing} missing samples, filled with defaults")]
    ForecastGap { series: Series, n_missing: usize },

    #[error("{direction} curve calibration pending ({n_buckets}/{n_required} buckets)")]
    CalibrationPending { direction: Direction, n_buckets: usize, n_required: usize },

    #[error("simulation diverged at {at}, state clamped: {reason}")]
    SimulationDivergence { at: DateTime<Local>, reason: String },

    #[error("inverter cannot {action}, instruction skipped")]
    Unsupported { action: String },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Load,
    Solar,
    Carbon,
}

impl Display for Series {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Solar => write!(f, "solar"),
            Self::Carbon => write!(f, "carbon"),
        }
    }
}
