use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use ent_io::{export_experiment, load_catalog};
use serde_json::json;
use tracing::{info, warn};

use crate::write_json;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// YAML catalog of batteries, channels and experiments.
    #[arg(long)]
    pub catalog: PathBuf,
    /// Experiments to analyse; every catalog experiment when omitted.
    #[arg(long = "experiment", value_name = "NAME")]
    pub experiments: Vec<String>,
    /// Output directory for entropy tables and reports.
    #[arg(long)]
    pub out: PathBuf,
    /// Worker threads, overriding the catalog's run settings.
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Also write one CSV per SOC window.
    #[arg(long)]
    pub export_soc: bool,
}

pub fn run(args: &AnalyzeArgs) -> Result<(), Box<dyn Error>> {
    let catalog = load_catalog(&args.catalog)?;
    let mut run_opts = catalog.run.clone();
    if let Some(concurrency) = args.concurrency {
        run_opts.concurrency = concurrency;
    }
    run_opts.export_soc_windows |= args.export_soc;

    let names: Vec<String> = if args.experiments.is_empty() {
        catalog.experiments.iter().map(|e| e.name.clone()).collect()
    } else {
        args.experiments.clone()
    };

    let mut summaries = Vec::with_capacity(names.len());
    for name in &names {
        let experiment = catalog.experiment(name)?;
        let outcome = experiment.analyze(&catalog.fitting, &run_opts)?;
        for skipped in &outcome.report.skipped {
            warn!(experiment = %name, soc = skipped.soc_index, error = %skipped.error, "SOC skipped");
        }
        let files = export_experiment(&args.out, &outcome, run_opts.export_soc_windows)?;
        info!(
            experiment = %name,
            rows = outcome.report.rows.len(),
            table = %files.entropy_table.display(),
            "experiment exported"
        );
        summaries.push(json!({
            "experiment": name,
            "title": outcome.report.title,
            "rows": outcome.report.rows.len(),
            "skipped": outcome.report.skipped.len(),
            "model_failures": outcome.report.model_failures.len(),
            "table_hash": outcome.report.provenance.table_hash,
            "files": files,
        }));
    }

    let summary = json!({
        "catalog": args.catalog.display().to_string(),
        "config_hash": catalog.config_hash()?,
        "experiments": summaries,
    });
    write_json(args.out.join("summary.json"), &summary)?;
    Ok(())
}
