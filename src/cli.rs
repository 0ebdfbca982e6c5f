use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use sundial::{
    config::PlanConfig,
    forecast::{Forecast, ForecastAssembler},
    input::PlanInputs,
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: plan the battery windows for the given inputs.
    #[clap(name = "plan")]
    Plan(Box<PlanArgs>),

    /// Show the resolved import and export rates.
    #[clap(name = "rates")]
    Rates(Box<SourceArgs>),

    /// Show the assembled forecast per plan interval.
    #[clap(name = "forecast")]
    Forecast(Box<SourceArgs>),
}

#[derive(Parser)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    /// Print the whole outcome as JSON instead of tables.
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct SourceArgs {
    /// Planner configuration, the defaults are used when omitted.
    #[clap(long, env = "SUNDIAL_CONFIG")]
    config: Option<PathBuf>,

    /// Observed state and external forecasts.
    #[clap(long, env = "SUNDIAL_INPUTS")]
    inputs: PathBuf,

    /// Override the configured planning horizon.
    #[clap(long, env = "SUNDIAL_HORIZON")]
    horizon: Option<humantime::Duration>,
}

impl SourceArgs {
    pub fn load(&self) -> Result<(PlanConfig, PlanInputs)> {
        let mut config: PlanConfig = match &self.config {
            Some(path) => read_toml(path)?,
            None => PlanConfig::default(),
        };
        if let Some(horizon) = self.horizon {
            config.timing.horizon = horizon;
        }
        let inputs = read_toml(&self.inputs)?;
        Ok((config, inputs))
    }

    /// Assemble the forecast without optimizing.
    pub fn forecast(&self) -> Result<Forecast> {
        let (config, inputs) = self.load()?;
        let timing = config.validate()?;
        let forecast = ForecastAssembler::builder()
            .config(&config)
            .inputs(&inputs)
            .timing(timing)
            .build()
            .assemble()?;
        Ok(forecast)
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse `{}`", path.display()))
}
