#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

pub mod battery;
pub mod car;
pub mod config;
pub mod core;
pub mod error;
pub mod forecast;
pub mod input;
pub mod materializer;
pub mod ops;
pub mod optimizer;
pub mod planner;
pub mod prelude;
pub mod status;

pub use self::planner::{PlanOutcome, PlanningCycle, compute_plan};
