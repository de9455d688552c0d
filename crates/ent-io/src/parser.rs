use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use csv::StringRecord;
use ent_core::{EntError, ErrorInfo, RawLog, Sample};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Channel, Setup};
use crate::serde::io_error;

fn parse_error(code: &str, message: impl Into<String>) -> EntError {
    EntError::Config(ErrorInfo::new(code, message))
}

/// Decodes file contents as UTF-8, falling back to Latin-1 byte-for-byte.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().iter().map(|b| char::from(*b)).collect(),
    }
}

/// Reads a text file with [`decode_text`].
pub fn read_text(path: &Path) -> Result<String, EntError> {
    let bytes = fs::read(path).map_err(|err| io_error("log_read", path, err))?;
    Ok(decode_text(bytes))
}

/// Delimited table whose header row was located by a signature column.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
    header_row: usize,
    decimal_comma: bool,
}

fn line_has_cell(line: &str, delimiter: u8, name: &str) -> bool {
    line.split(char::from(delimiter))
        .any(|cell| cell.trim().trim_matches('"') == name)
}

impl Table {
    /// Parses `text`, taking the header from `header_row` (zero-based line) or
    /// from the first line that contains `signature` as a cell.
    pub fn parse(
        text: &str,
        delimiter: u8,
        signature: &str,
        header_row: Option<usize>,
    ) -> Result<Self, EntError> {
        let mut offset = 0;
        let mut header = None;
        for (idx, line) in text.split_inclusive('\n').enumerate() {
            let found = match header_row {
                Some(row) => idx == row,
                None => line_has_cell(line, delimiter, signature),
            };
            if found {
                header = Some((idx, offset));
                break;
            }
            offset += line.len();
        }
        let (header_row, offset) = header.ok_or_else(|| {
            parse_error("table.header", "header row not found")
                .with_context("signature", signature)
                .with_context("header_row", format!("{header_row:?}"))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text[offset..].as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| parse_error("table.header", err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| {
                EntError::Serde(ErrorInfo::new("table.record", err.to_string()))
            })?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(record);
        }
        debug!(header_row, rows = rows.len(), signature, "parsed table");
        Ok(Self {
            headers,
            rows,
            header_row,
            decimal_comma: delimiter != b',',
        })
    }

    /// Column names as read from the header row.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Zero-based line of the header row.
    pub fn header_row(&self) -> usize {
        self.header_row
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true when `name` is one of the columns.
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Position of column `name`.
    pub fn column(&self, name: &str) -> Result<usize, EntError> {
        self.headers.iter().position(|h| h == name).ok_or_else(|| {
            parse_error("table.missing_column", "column not found in log")
                .with_context("column", name)
                .with_hint("check the channel mapping or the header row")
        })
    }

    /// Every cell of column `name` parsed as a number and multiplied by `scale`.
    pub fn numbers(&self, name: &str, scale: f64) -> Result<Vec<f64>, EntError> {
        let col = self.column(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let cell = record.get(col).unwrap_or("");
                self.parse_cell(cell)
                    .map(|value| value * scale)
                    .ok_or_else(|| {
                        EntError::Serde(
                            ErrorInfo::new("table.number", "cell is not a number")
                                .with_context("column", name)
                                .with_context("row", self.header_row + 1 + idx)
                                .with_context("cell", cell),
                        )
                    })
            })
            .collect()
    }

    /// Like [`Table::numbers`] but rounds to integers; absent columns read as zero.
    pub fn counters(&self, name: &str) -> Result<Vec<i64>, EntError> {
        if !self.has_column(name) {
            return Ok(vec![0; self.rows.len()]);
        }
        Ok(self
            .numbers(name, 1.0)?
            .into_iter()
            .map(|value| value.round() as i64)
            .collect())
    }

    fn parse_cell(&self, cell: &str) -> Option<f64> {
        let cell = cell.trim().trim_matches('"');
        let parsed = cell.parse::<f64>().ok().or_else(|| {
            if self.decimal_comma {
                cell.replace(',', ".").parse::<f64>().ok()
            } else {
                None
            }
        });
        parsed.filter(|value| value.is_finite())
    }
}

/// Supported bench-test log layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Biologic EC-Lab `.mpt` export (tab separated).
    Biologic,
    /// Novonix `.csv` export.
    Novonix,
    /// Basytec `.txt` export (comma separated).
    Basytec,
}

impl LogFormat {
    /// Every format, in sniffing priority.
    pub const ALL: [LogFormat; 3] = [LogFormat::Biologic, LogFormat::Novonix, LogFormat::Basytec];

    /// Column whose presence identifies the header row.
    pub fn signature_column(&self) -> &'static str {
        match self {
            LogFormat::Biologic => "time/s",
            LogFormat::Novonix => "Run Time (h)",
            LogFormat::Basytec => "~Time[h]",
        }
    }

    /// Field delimiter.
    pub fn delimiter(&self) -> u8 {
        match self {
            LogFormat::Biologic => b'\t',
            LogFormat::Novonix | LogFormat::Basytec => b',',
        }
    }

    /// Detects the format from the first line that carries a signature column.
    pub fn sniff(text: &str) -> Option<LogFormat> {
        text.lines().find_map(|line| {
            Self::ALL
                .into_iter()
                .find(|format| line_has_cell(line, format.delimiter(), format.signature_column()))
        })
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Biologic => "biologic",
            LogFormat::Novonix => "novonix",
            LogFormat::Basytec => "basytec",
        };
        f.write_str(name)
    }
}

impl FromStr for LogFormat {
    type Err = EntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "biologic" | "mpt" => Ok(LogFormat::Biologic),
            "novonix" => Ok(LogFormat::Novonix),
            "basytec" => Ok(LogFormat::Basytec),
            other => Err(parse_error("log_format.unknown", "unknown log format")
                .with_context("format", other)),
        }
    }
}

/// Loads one vendor layout into the canonical [`RawLog`].
pub trait LogParser: Send + Sync {
    /// Layout handled by the parser.
    fn format(&self) -> LogFormat;

    /// Parses decoded file contents.
    fn parse_str(&self, text: &str) -> Result<RawLog, EntError>;

    /// Reads and parses a file.
    fn load(&self, path: &Path) -> Result<RawLog, EntError> {
        let text = read_text(path)?;
        self.parse_str(&text)
            .map_err(|err| err.with_context("path", path.display()))
    }
}

struct Columns {
    time_h: Vec<f64>,
    current_a: Vec<f64>,
    voltage_v: Vec<f64>,
    temperature_c: Vec<f64>,
    capacity_ah: Vec<f64>,
    cycle_count: Vec<i64>,
    cyc_count: Vec<i64>,
    plateau_marker: Vec<i64>,
}

impl Columns {
    fn into_log(self) -> Result<RawLog, EntError> {
        let samples = (0..self.time_h.len())
            .map(|idx| Sample {
                elapsed_time_h: self.time_h[idx],
                current_a: self.current_a[idx],
                voltage_v: self.voltage_v[idx],
                temperature_c: self.temperature_c[idx],
                capacity_ah: self.capacity_ah[idx],
                cycle_count: self.cycle_count[idx],
                cyc_count: self.cyc_count[idx],
                plateau_marker: self.plateau_marker[idx],
            })
            .collect();
        RawLog::from_ordered(samples)
    }
}

/// Biologic EC-Lab `.mpt` files: seconds, milliamperes and mAh are rescaled.
#[derive(Debug, Clone, Default)]
pub struct BiologicParser {
    /// Header line override.
    pub header_row: Option<usize>,
}

impl LogParser for BiologicParser {
    fn format(&self) -> LogFormat {
        LogFormat::Biologic
    }

    fn parse_str(&self, text: &str) -> Result<RawLog, EntError> {
        let format = self.format();
        let table = Table::parse(text, format.delimiter(), format.signature_column(), self.header_row)?;
        Columns {
            time_h: table.numbers("time/s", 1.0 / 3600.0)?,
            current_a: table.numbers("I/mA", 1e-3)?,
            voltage_v: table.numbers("Ecell/V", 1.0)?,
            temperature_c: table.numbers("Temperature/°C", 1.0)?,
            capacity_ah: table.numbers("Capacity/mA.h", 1e-3)?,
            cycle_count: vec![0; table.len()],
            cyc_count: vec![0; table.len()],
            plateau_marker: vec![0; table.len()],
        }
        .into_log()
    }
}

/// Novonix `.csv` files, already in hours, amperes and Ah.
#[derive(Debug, Clone, Default)]
pub struct NovonixParser {
    /// Header line override.
    pub header_row: Option<usize>,
}

impl LogParser for NovonixParser {
    fn format(&self) -> LogFormat {
        LogFormat::Novonix
    }

    fn parse_str(&self, text: &str) -> Result<RawLog, EntError> {
        let format = self.format();
        let table = Table::parse(text, format.delimiter(), format.signature_column(), self.header_row)?;
        Columns {
            time_h: table.numbers("Run Time (h)", 1.0)?,
            current_a: table.numbers("Current (A)", 1.0)?,
            voltage_v: table.numbers("Potential (V)", 1.0)?,
            temperature_c: table.numbers("Temperature (°C)", 1.0)?,
            capacity_ah: table.numbers("Capacity (Ah)", 1.0)?,
            cycle_count: vec![0; table.len()],
            cyc_count: vec![0; table.len()],
            plateau_marker: vec![0; table.len()],
        }
        .into_log()
    }
}

/// Basytec `.txt` files with channel-specific voltage and temperature columns.
#[derive(Debug, Clone, Default)]
pub struct BasytecParser {
    /// Voltage/temperature columns; without one both read as NaN (capacity-only logs).
    pub channel: Option<Channel>,
    /// Rig the log was recorded on; decides the voltage unit.
    pub setup: Setup,
    /// Header line override.
    pub header_row: Option<usize>,
}

impl LogParser for BasytecParser {
    fn format(&self) -> LogFormat {
        LogFormat::Basytec
    }

    fn parse_str(&self, text: &str) -> Result<RawLog, EntError> {
        let format = self.format();
        let table = Table::parse(text, format.delimiter(), format.signature_column(), self.header_row)?;
        let (voltage_v, temperature_c) = match &self.channel {
            Some(channel) => (
                table.numbers(&channel.voltage_column, self.setup.voltage_scale())?,
                table.numbers(&channel.temperature_column, 1.0)?,
            ),
            None => (vec![f64::NAN; table.len()], vec![f64::NAN; table.len()]),
        };
        Columns {
            time_h: table.numbers("~Time[h]", 1.0)?,
            current_a: table.numbers("I[A]", 1.0)?,
            voltage_v,
            temperature_c,
            capacity_ah: table.numbers("Ah[Ah]", 1.0)?,
            cycle_count: table.counters("Count")?,
            cyc_count: table.counters("Cyc-Count")?,
            plateau_marker: table.counters("State")?,
        }
        .into_log()
    }
}

/// How to read a log file.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit layout; sniffed from the contents when absent.
    pub format: Option<LogFormat>,
    /// Header line override.
    pub header_row: Option<usize>,
    /// Basytec channel mapping.
    pub channel: Option<Channel>,
    /// Basytec rig.
    pub setup: Setup,
}

/// Builds the parser for `format`.
pub fn parser_for(format: LogFormat, opts: &LoadOptions) -> Box<dyn LogParser> {
    match format {
        LogFormat::Biologic => Box::new(BiologicParser {
            header_row: opts.header_row,
        }),
        LogFormat::Novonix => Box::new(NovonixParser {
            header_row: opts.header_row,
        }),
        LogFormat::Basytec => Box::new(BasytecParser {
            channel: opts.channel.clone(),
            setup: opts.setup,
            header_row: opts.header_row,
        }),
    }
}

/// Reads `path` with the explicit or sniffed format.
pub fn load_log(path: &Path, opts: &LoadOptions) -> Result<RawLog, EntError> {
    let text = read_text(path)?;
    let format = match opts.format {
        Some(format) => format,
        None => LogFormat::sniff(&text).ok_or_else(|| {
            parse_error("log_format.sniff", "no known signature column found")
                .with_context("path", path.display())
                .with_hint("set the format explicitly")
        })?,
    };
    debug!(path = %path.display(), %format, "loading log");
    parser_for(format, opts)
        .parse_str(&text)
        .map_err(|err| err.with_context("path", path.display()))
}
