use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

use station_core::forecast::{DailyForecast, OpenMeteo};
use station_core::{logging, StationConfig};

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:>8.1}", v),
        None => format!("{:>8}", "-"),
    }
}

fn daily_row(day: &DailyForecast) -> String {
    // daylight comes in seconds
    format!(
        "{} {} {} {} {}",
        day.date.format("%a %d.%m"),
        cell(day.temperature_2m_min),
        cell(day.temperature_2m_max),
        cell(day.daylight_duration.map(|s| s / 3600.0)),
        cell(day.uv_index_max),
    )
}

fn main() -> Result<()> {
    logging::init();
    let args: Vec<String> = env::args().collect();
    let config_path = match args.len() {
        1 => None,
        3 if args[1] == "--config" => Some(PathBuf::from(&args[2])),
        _ => bail!("Usage: station-forecast [--config FILE]"),
    };
    let config = StationConfig::load(config_path.as_deref())?;

    let meteo = OpenMeteo::connect(config.forecast, &config.forecast_cache)?;
    println!("Outside temperature: {}", cell(meteo.temperature()).trim());
    println!("Outside humidity:    {}", cell(meteo.humidity()).trim());
    println!();
    println!("{:9} {:>8} {:>8} {:>8} {:>8}", "day", "min", "max", "light h", "uv");
    for day in meteo.daily_forecast() {
        println!("{}", daily_row(day));
    }
    Ok(())
}
