use anyhow::{bail, Context, Result};
use log::{error, info};
use std::env;
use std::path::PathBuf;

use station_core::{logging, StationConfig, StationContext};

const USAGE: &str = "Usage: station-recorder [--db PATH] [--factor F] [--config FILE] [--dry-run]";

#[derive(Debug, Default, PartialEq)]
struct Options {
    db: Option<PathBuf>,
    factor: Option<f64>,
    config: Option<PathBuf>,
    dry_run: bool,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--db" => options.db = Some(PathBuf::from(value(&mut it, arg)?)),
            "--config" => options.config = Some(PathBuf::from(value(&mut it, arg)?)),
            "--factor" => {
                let raw = value(&mut it, arg)?;
                options.factor = Some(raw.parse().with_context(|| format!("bad factor: {}", raw))?);
            }
            "--dry-run" => options.dry_run = true,
            "-h" | "--help" => bail!(USAGE),
            _ => bail!("Unknown arg: {}\n{}", arg, USAGE),
        }
    }
    Ok(options)
}

fn value<'a>(it: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a String> {
    match it.next() {
        Some(v) => Ok(v),
        None => bail!("{} needs a value\n{}", flag, USAGE),
    }
}

fn main() -> Result<()> {
    logging::init();
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args[1..])?;

    let mut config = StationConfig::load(options.config.as_deref())?;
    if let Some(db) = options.db {
        config.db_path = db;
    }
    if let Some(factor) = options.factor {
        config.factor = factor;
    }
    config.validate()?;

    let mut context = StationContext::open(config).context("failed to set up station")?;
    match context.run_cycle(options.dry_run) {
        Ok(record) => {
            info!("added new record on {}", record.record_date.format("%c"));
            Ok(())
        }
        Err(e) => {
            error!("cycle aborted, nothing written: {}", e);
            Err(e.into())
        }
    }
}
