use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ent_io::{load_catalog, BatteryGroup};
use serde_json::json;
use tracing::warn;

use crate::emit_json;

#[derive(Args, Debug)]
pub struct GroupArgs {
    /// YAML catalog of batteries.
    #[arg(long)]
    pub catalog: PathBuf,
    /// Members of the group.
    #[arg(long = "battery", value_name = "NAME", required = true)]
    pub batteries: Vec<String>,
    /// Write the JSON here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &GroupArgs) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(&args.catalog)?;
    let group = BatteryGroup::new(catalog.batteries_named(&args.batteries)?)?;

    let stats = group.capacity_stats()?;
    let regression = match group.capacity_mass_regression() {
        Ok(fit) => Some(fit),
        Err(err) => {
            warn!(error = %err, "capacity-mass regression unavailable");
            None
        }
    };
    let impedance = if group.batteries().iter().all(|b| b.impedance_file.is_some()) {
        Some(group.mean_impedance()?)
    } else {
        None
    };

    let payload = json!({
        "batteries": args.batteries,
        "masses_g": group.masses(),
        "capacity": stats,
        "capacity_mass_regression": regression,
        "mean_impedance": impedance,
    });
    emit_json(args.out.as_deref(), &payload)
}
