use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ent_io::{load_catalog, rpt_capacity};
use serde_json::json;

use crate::emit_json;

#[derive(Args, Debug)]
pub struct CapacityArgs {
    /// YAML catalog of batteries.
    #[arg(long)]
    pub catalog: PathBuf,
    /// Batteries to measure; every battery with an RPT file when omitted.
    #[arg(long = "battery", value_name = "NAME")]
    pub batteries: Vec<String>,
    /// Write the JSON here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &CapacityArgs) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(&args.catalog)?;
    let batteries = if args.batteries.is_empty() {
        catalog
            .batteries
            .iter()
            .filter(|b| b.rpt_file.is_some())
            .cloned()
            .collect()
    } else {
        catalog.batteries_named(&args.batteries)?
    };

    let mut rows = Vec::with_capacity(batteries.len());
    for battery in &batteries {
        let capacity = rpt_capacity(battery)?;
        rows.push(json!({
            "battery": battery.name,
            "capacity_ah": capacity,
            "nominal_capacity_ah": battery.nominal_capacity_mah / 1000.0,
        }));
    }
    emit_json(args.out.as_deref(), &rows)
}
