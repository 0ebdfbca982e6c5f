#![allow(clippy::doc_markdown)]

mod cli;
mod tables;

use clap::{Parser, crate_version};
use sundial::{compute_plan, forecast::rates::Flow, prelude::*};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Args, Command, PlanArgs},
    tables::{
        build_cars_table,
        build_flows_table,
        build_forecast_table,
        build_instructions_table,
        build_rates_table,
        build_totals_table,
        build_windows_table,
    },
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Plan(args) => {
            plan(&args)?;
        }
        Command::Rates(args) => {
            let forecast = args.forecast()?;
            println!("{}", build_rates_table(&forecast.rate_timeline(Flow::Import), "Import"));
            println!("{}", build_rates_table(&forecast.rate_timeline(Flow::Export), "Export"));
        }
        Command::Forecast(args) => {
            let forecast = args.forecast()?;
            println!("{}", build_forecast_table(&forecast));
            info!(load = %forecast.total_load(), pv = %forecast.total_pv(), "totals");
        }
    }

    info!("done!");
    Ok(())
}

#[instrument(skip_all)]
fn plan(args: &PlanArgs) -> Result {
    let (config, inputs) = args.source.load()?;
    let outcome = compute_plan(&config, &inputs)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let battery = &outcome.forecast.battery;
    let optimization = &outcome.optimization;
    let plan_interval = outcome.forecast.timing.plan_interval;
    println!("{}", build_flows_table(&optimization.flows, plan_interval));
    println!("{}", build_windows_table(&optimization.plan, battery));
    println!("{}", build_totals_table(&optimization.totals, battery));
    if !outcome.cars.is_empty() {
        println!("{}", build_cars_table(&outcome.cars));
    }
    println!("{}", build_instructions_table(&outcome.schedule));
    info!(
        status = %outcome.status,
        metric = %optimization.metric,
        n_evaluations = optimization.n_evaluations,
        n_warnings = outcome.warnings.len(),
        "planned",
    );
    Ok(())
}
