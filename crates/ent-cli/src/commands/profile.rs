use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use ent_io::load_catalog;
use tracing::info;

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// YAML catalog of experiments.
    #[arg(long)]
    pub catalog: PathBuf,
    /// Experiment whose log sets the number of SOCs.
    #[arg(long)]
    pub experiment: String,
    /// CSV destination.
    #[arg(long)]
    pub out: PathBuf,
}

pub fn run(args: &ProfileArgs) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(&args.catalog)?;
    let experiment = catalog.experiment(&args.experiment)?;
    let log = experiment.load_log()?;
    let profile = experiment.expected_temperature_profile(&log);

    if let Some(parent) = args.out.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(&args.out)?;
    wtr.write_record(["time_h", "temperature_c"])?;
    for point in &profile {
        wtr.write_record([point.time_h.to_string(), point.temperature_c.to_string()])?;
    }
    wtr.flush()?;
    info!(points = profile.len(), out = %args.out.display(), "temperature profile written");
    Ok(())
}
