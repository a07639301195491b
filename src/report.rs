use std::io::Write;

use statrs::statistics::Statistics;

use crate::error::Result;
use crate::q_learning::EpochRecord;

/// Writes the reward trace as CSV, one row per epoch.
pub fn write_trace_csv<W: Write>(writer: W, trace: &[EpochRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in trace {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Summary statistics of per-episode rewards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSummary {
    pub epochs: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub cumulative: f64,
    pub mean_steps: f64,
}

impl TraceSummary {
    /// `None` for an empty trace.
    pub fn from_trace(trace: &[EpochRecord]) -> Option<TraceSummary> {
        let last = trace.last()?;
        let rewards: Vec<f64> = trace.iter().map(|r| r.reward).collect();
        let steps: Vec<f64> = trace.iter().map(|r| r.steps as f64).collect();
        Some(TraceSummary {
            epochs: trace.len(),
            mean: Statistics::mean(&rewards),
            std_dev: Statistics::std_dev(&rewards),
            min: Statistics::min(&rewards),
            max: Statistics::max(&rewards),
            cumulative: last.cumulative,
            mean_steps: Statistics::mean(&steps),
        })
    }
}
