use ent_core::{EntError, ErrorInfo, RawLog};
use serde::{Deserialize, Serialize};
use tracing::warn;

fn segmentation_error(code: &str, message: impl Into<String>) -> EntError {
    EntError::Segmentation(ErrorInfo::new(code, message))
}

/// Contiguous block of log rows sharing one `cycle_count` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocWindow {
    /// Zero-based SOC number in log order.
    pub index: usize,
    /// Row offset of the first sample within the source log.
    pub start_row: usize,
    /// Samples belonging to the SOC.
    pub rows: RawLog,
}

impl SocWindow {
    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rows where a new SOC begins.
///
/// A row `i > 0` is a boundary when `cycle_count != cyc_count` and the previous
/// row was not already differing; runs of differing rows collapse to their
/// first row.
pub fn find_boundaries(log: &RawLog) -> Vec<usize> {
    let samples = log.samples();
    let mut boundaries = Vec::new();
    let mut previous_differs = true;
    for (idx, sample) in samples.iter().enumerate() {
        let differs = sample.cycle_count != sample.cyc_count;
        if differs && !previous_differs && idx > 0 {
            boundaries.push(idx);
        }
        previous_differs = differs;
    }
    boundaries
}

/// Splits a log into sequential SOC windows.
///
/// The number of SOCs is the final `cycle_count`; `N` windows use the first
/// `N - 1` boundaries and later ones are ignored. The first window starts at
/// row 0 and the last one runs to the final row, so the windows concatenate
/// back to the input.
pub fn segment_socs(log: &RawLog) -> Result<Vec<SocWindow>, EntError> {
    let total = log
        .final_cycle_count()
        .ok_or_else(|| segmentation_error("segment.empty_log", "log holds no samples"))?;
    if total <= 0 {
        return Err(EntError::Segmentation(
            ErrorInfo::new("segment.soc_count", "final cycle count must be positive")
                .with_context("cycle_count", total),
        ));
    }
    let boundaries = find_boundaries(log);
    if boundaries.is_empty() {
        return Err(EntError::Segmentation(
            ErrorInfo::new("segment.no_boundaries", "no SOC transitions found")
                .with_context("rows", log.len())
                .with_hint("a SOC starts where cycle_count and cyc_count differ"),
        ));
    }
    let soc_total = total as usize;
    if boundaries.len() < soc_total - 1 {
        return Err(EntError::Segmentation(
            ErrorInfo::new(
                "segment.missing_boundaries",
                "fewer SOC transitions than the final cycle count implies",
            )
            .with_context("boundaries", boundaries.len())
            .with_context("expected", soc_total - 1),
        ));
    }
    if boundaries.len() > soc_total - 1 {
        warn!(
            boundaries = boundaries.len(),
            socs = soc_total,
            "ignoring transitions beyond the final cycle count"
        );
    }

    let mut starts = Vec::with_capacity(soc_total);
    starts.push(0);
    starts.extend(boundaries.iter().take(soc_total - 1).copied());
    let mut windows = Vec::with_capacity(soc_total);
    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(log.len());
        windows.push(SocWindow {
            index,
            start_row: start,
            rows: log.slice(start..end),
        });
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ent_core::Sample;

    fn row(cycle: i64, cyc: i64) -> Sample {
        Sample {
            cycle_count: cycle,
            cyc_count: cyc,
            ..Sample::default()
        }
    }

    #[test]
    fn differing_runs_collapse_to_first_row() {
        let log = RawLog::new(vec![
            row(1, 1),
            row(1, 1),
            row(2, 1),
            row(2, 1),
            row(2, 2),
            row(3, 2),
            row(3, 3),
        ]);
        assert_eq!(find_boundaries(&log), vec![2, 5]);
    }

    #[test]
    fn transitions_past_the_final_cycle_are_ignored() {
        let log = RawLog::new(vec![
            row(1, 1),
            row(1, 1),
            row(1, 1),
            row(2, 1),
            row(2, 2),
            row(2, 2),
            row(3, 2),
            row(3, 3),
            row(3, 3),
            row(3, 2),
        ]);
        assert_eq!(find_boundaries(&log), vec![3, 6, 9]);
        let windows = segment_socs(&log).expect("segment");
        let lengths: Vec<usize> = windows.iter().map(SocWindow::len).collect();
        assert_eq!(lengths, vec![3, 3, 4]);
        assert_eq!(windows[2].start_row, 6);
    }

    #[test]
    fn leading_differing_row_is_not_a_boundary() {
        let log = RawLog::new(vec![row(1, 0), row(1, 1), row(2, 1), row(2, 2)]);
        assert_eq!(find_boundaries(&log), vec![2]);
    }
}
