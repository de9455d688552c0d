use std::fs;
use std::path::{Path, PathBuf};

use ent_core::{EntError, ErrorInfo, Sample};
use ent_fit::{ExperimentReport, ModelKind, SocAnalysis, ENTROPY_TABLE_HEADER};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::experiment::ExperimentOutcome;
use crate::serde::{io_error, write_json};

/// Raw columns written before the fitted ones in a SOC export.
pub const SOC_RAW_COLUMNS: usize = 8;

fn export_error(code: &str, path: &Path, err: impl ToString) -> EntError {
    EntError::Serde(ErrorInfo::new(code, err.to_string()).with_context("path", path.display()))
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_cell(text: &str, path: &Path, row: usize) -> Result<Option<f64>, EntError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>().map(Some).map_err(|err| {
        export_error("export.number", path, err)
            .with_context("row", row)
            .with_context("cell", text)
    })
}

/// `SOC{index}_{title}.csv`.
pub fn soc_file_name(index: usize, title: &str) -> String {
    format!("SOC{index}_{title}.csv")
}

/// `{title}_entropycoeff.csv`.
pub fn entropy_table_file_name(title: &str) -> String {
    format!("{title}_entropycoeff.csv")
}

/// `{title}_report.json`.
pub fn report_file_name(title: &str) -> String {
    format!("{title}_report.json")
}

/// One row of a SOC export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocRow {
    /// Raw sample.
    pub sample: Sample,
    /// Predicted voltage per model; empty outside relaxation or for failed models.
    pub estimates: [Option<f64>; 4],
    /// Raw minus predicted voltage per model.
    pub residuals: [Option<f64>; 4],
}

/// Joins the raw SOC rows with the per-model predictions of its relaxation rows.
pub fn soc_rows(analysis: &SocAnalysis) -> Vec<SocRow> {
    let mut rows: Vec<SocRow> = analysis
        .window
        .rows
        .samples()
        .iter()
        .map(|sample| SocRow {
            sample: *sample,
            estimates: [None; 4],
            residuals: [None; 4],
        })
        .collect();
    for (slot, kind) in ModelKind::ALL.iter().enumerate() {
        let Some(fit) = analysis.fit(*kind) else {
            continue;
        };
        for (position, offset) in analysis.relaxation.soc_offsets.iter().enumerate() {
            if let Some(row) = rows.get_mut(*offset) {
                row.estimates[slot] = fit.predicted.get(position).copied();
                row.residuals[slot] = fit.residual.get(position).copied();
            }
        }
    }
    rows
}

/// Writes a SOC window without a header row.
pub fn write_soc_csv(path: &Path, rows: &[SocRow]) -> Result<(), EntError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| export_error("export.soc_open", path, err))?;
    for row in rows {
        let s = &row.sample;
        let mut record = vec![
            s.elapsed_time_h.to_string(),
            s.current_a.to_string(),
            s.voltage_v.to_string(),
            s.temperature_c.to_string(),
            s.capacity_ah.to_string(),
            s.cycle_count.to_string(),
            s.cyc_count.to_string(),
            s.plateau_marker.to_string(),
        ];
        for slot in 0..4 {
            record.push(cell(row.estimates[slot]));
            record.push(cell(row.residuals[slot]));
        }
        wtr.write_record(&record)
            .map_err(|err| export_error("export.soc_write", path, err))?;
    }
    wtr.flush().map_err(|err| io_error("export.soc_flush", path, err))
}

/// Reads a file written by [`write_soc_csv`].
pub fn read_soc_csv(path: &Path) -> Result<Vec<SocRow>, EntError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| export_error("export.soc_open", path, err))?;
    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|err| export_error("export.soc_read", path, err))?;
        if record.len() != SOC_RAW_COLUMNS + 8 {
            return Err(export_error("export.soc_width", path, "unexpected column count")
                .with_context("row", idx)
                .with_context("columns", record.len()));
        }
        let mut values = Vec::with_capacity(record.len());
        for field in record.iter() {
            values.push(parse_cell(field, path, idx)?);
        }
        let raw = |col: usize| -> Result<f64, EntError> {
            values[col].ok_or_else(|| {
                export_error("export.soc_missing", path, "raw column is empty")
                    .with_context("row", idx)
                    .with_context("column", col)
            })
        };
        let sample = Sample {
            elapsed_time_h: raw(0)?,
            current_a: raw(1)?,
            voltage_v: raw(2)?,
            temperature_c: raw(3)?,
            capacity_ah: raw(4)?,
            cycle_count: raw(5)? as i64,
            cyc_count: raw(6)? as i64,
            plateau_marker: raw(7)? as i64,
        };
        let mut estimates = [None; 4];
        let mut residuals = [None; 4];
        for slot in 0..4 {
            estimates[slot] = values[SOC_RAW_COLUMNS + 2 * slot];
            residuals[slot] = values[SOC_RAW_COLUMNS + 2 * slot + 1];
        }
        rows.push(SocRow {
            sample,
            estimates,
            residuals,
        });
    }
    Ok(rows)
}

/// Writes the entropy table with its header row.
pub fn write_entropy_table(path: &Path, report: &ExperimentReport) -> Result<(), EntError> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|err| export_error("export.table_open", path, err))?;
    wtr.write_record(ENTROPY_TABLE_HEADER)
        .map_err(|err| export_error("export.table_write", path, err))?;
    for row in &report.rows {
        let record: Vec<String> = row.values().into_iter().map(cell).collect();
        wtr.write_record(&record)
            .map_err(|err| export_error("export.table_write", path, err))?;
    }
    wtr.flush().map_err(|err| io_error("export.table_flush", path, err))
}

/// Reads an entropy table back as rows of optional values.
pub fn read_entropy_table(path: &Path) -> Result<Vec<Vec<Option<f64>>>, EntError> {
    let mut rdr =
        csv::Reader::from_path(path).map_err(|err| export_error("export.table_open", path, err))?;
    let headers = rdr
        .headers()
        .map_err(|err| export_error("export.table_read", path, err))?
        .clone();
    if headers.iter().ne(ENTROPY_TABLE_HEADER.iter().copied()) {
        return Err(EntError::Config(
            ErrorInfo::new("export.table_header", "entropy table header does not match")
                .with_context("path", path.display()),
        ));
    }
    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|err| export_error("export.table_read", path, err))?;
        let row = record
            .iter()
            .map(|field| parse_cell(field, path, idx))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Paths written by [`export_experiment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFiles {
    /// Entropy table.
    pub entropy_table: PathBuf,
    /// JSON report.
    pub report: PathBuf,
    /// Per-SOC exports, in SOC order.
    pub soc_windows: Vec<PathBuf>,
}

/// Writes the entropy table, the JSON report and optionally one CSV per SOC.
pub fn export_experiment(
    out: &Path,
    outcome: &ExperimentOutcome,
    export_soc_windows: bool,
) -> Result<ExportedFiles, EntError> {
    fs::create_dir_all(out).map_err(|err| io_error("export.out_dir", out, err))?;
    let title = &outcome.report.title;
    let entropy_table = out.join(entropy_table_file_name(title));
    write_entropy_table(&entropy_table, &outcome.report)?;
    let report = out.join(report_file_name(title));
    write_json(&report, &outcome.report)?;

    let mut soc_windows = Vec::new();
    if export_soc_windows {
        for analysis in &outcome.run.analyses {
            let path = out.join(soc_file_name(analysis.window.index, title));
            write_soc_csv(&path, &soc_rows(analysis))?;
            soc_windows.push(path);
        }
    }
    info!(
        out = %out.display(),
        rows = outcome.report.rows.len(),
        soc_files = soc_windows.len(),
        "exported experiment"
    );
    Ok(ExportedFiles {
        entropy_table,
        report,
        soc_windows,
    })
}
