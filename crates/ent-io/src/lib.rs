#![deny(missing_docs)]
#![doc = "Log parsers, catalog loading and CSV/JSON export for entropy profiling."]

/// Cell characterisation: RPT capacity, impedance and group statistics.
pub mod battery;
/// Typed YAML catalog of batteries, channels and experiments.
pub mod config;
/// Resolved experiments and their pipeline driver.
pub mod experiment;
/// CSV and JSON exporters.
pub mod export;
/// EIS spectrum reader and resistance extraction.
pub mod impedance;
/// Vendor log parsers.
pub mod parser;
/// YAML and JSON helpers.
pub mod serde;

pub use battery::{
    battery_impedance, capacity_mass_regression, capacity_stats, mean_impedance, rpt_capacity,
    BatteryGroup, CapacityStats,
};
pub use config::{load_catalog, BatterySpec, Catalog, Channel, ExperimentSpec, Setup};
pub use experiment::{max_capacity, Experiment, ExperimentOutcome, ProfilePoint};
pub use export::{
    entropy_table_file_name, export_experiment, read_entropy_table, read_soc_csv,
    report_file_name, soc_file_name, soc_rows, write_entropy_table, write_soc_csv, ExportedFiles,
    SocRow,
};
pub use impedance::{load_spectrum, parse_spectrum, resistances, Impedance, ImpedancePoint};
pub use parser::{
    decode_text, load_log, parser_for, BasytecParser, BiologicParser, LoadOptions, LogFormat,
    LogParser, NovonixParser, Table,
};
