pub mod web;

use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use station_core::{logging, StationConfig};

use crate::web::{create_web_server, WebState};

const USAGE: &str = "Usage: station-dashboard [--db PATH] [--bind ADDR] [--config FILE]";

#[derive(Debug, Default, PartialEq)]
struct Options {
    db: Option<PathBuf>,
    bind: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let mut next = || match it.next() {
            Some(v) => Ok(v.clone()),
            None => Err(anyhow::anyhow!("{} needs a value\n{}", arg, USAGE)),
        };
        match arg.as_str() {
            "--db" => options.db = Some(PathBuf::from(next()?)),
            "--bind" => options.bind = Some(next()?),
            "--config" => options.config = Some(PathBuf::from(next()?)),
            "-h" | "--help" => bail!(USAGE),
            _ => bail!("Unknown arg: {}\n{}", arg, USAGE),
        }
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args[1..])?;

    let mut config = StationConfig::load(options.config.as_deref())?;
    if let Some(db) = options.db {
        config.db_path = db;
    }
    let bind = options.bind.unwrap_or_else(|| config.dashboard.bind.clone());

    let state = WebState {
        db_path: Arc::new(config.db_path.clone()),
        baseline_days: config.dashboard.baseline_days,
        table_rows: config.dashboard.table_rows,
    };
    create_web_server(state, &bind).await
}
