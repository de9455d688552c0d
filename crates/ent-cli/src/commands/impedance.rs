use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ent_io::{battery_impedance, load_catalog, load_spectrum, resistances};
use serde_json::json;

use crate::emit_json;

#[derive(Args, Debug)]
pub struct ImpedanceArgs {
    /// YAML catalog of batteries.
    #[arg(long, required_unless_present = "spectrum")]
    pub catalog: Option<PathBuf>,
    /// Batteries to evaluate; every battery with a spectrum when omitted.
    #[arg(long = "battery", value_name = "NAME")]
    pub batteries: Vec<String>,
    /// Evaluate a single EIS export instead of catalog batteries.
    #[arg(long, conflicts_with = "catalog")]
    pub spectrum: Option<PathBuf>,
    /// Write the JSON here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &ImpedanceArgs) -> Result<(), Box<dyn Error>> {
    if let Some(path) = &args.spectrum {
        let impedance = resistances(&load_spectrum(path)?)?;
        return emit_json(args.out.as_deref(), &impedance);
    }
    let Some(catalog_path) = &args.catalog else {
        return Err("either --catalog or --spectrum is required".into());
    };
    let catalog = load_catalog(catalog_path)?;
    let batteries = if args.batteries.is_empty() {
        catalog
            .batteries
            .iter()
            .filter(|b| b.impedance_file.is_some())
            .cloned()
            .collect()
    } else {
        catalog.batteries_named(&args.batteries)?
    };

    let mut rows = Vec::with_capacity(batteries.len());
    for battery in &batteries {
        let impedance = battery_impedance(battery)?;
        rows.push(json!({
            "battery": battery.name,
            "impedance": impedance,
            "hioki_resistance_mohm": battery.hioki_resistance_mohm,
        }));
    }
    emit_json(args.out.as_deref(), &rows)
}
