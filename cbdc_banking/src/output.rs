//! Export of collected tables and run summaries.
//!
//! Writes the model and agent reporter tables as CSV and the run summary
//! with its metadata as JSON, for analysis outside the simulation.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::collector::DataCollector;
use crate::config::ModelConfig;
use crate::error::OutputError;
use crate::model::{CbdcBankingModel, SimulationSummary};
use crate::SimulationStats;

/// Metadata for reproducibility
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetadata {
    pub config: ModelConfig,
    pub seed: u64,
    pub steps: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutput {
    pub metadata: SimulationMetadata,
    pub summary: SimulationSummary,
}

impl SimulationOutput {
    pub fn from_model(model: &CbdcBankingModel) -> Self {
        SimulationOutput {
            metadata: SimulationMetadata {
                config: model.config().clone(),
                seed: model.config().seed,
                steps: model.current_step(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            summary: model.simulation_summary(),
        }
    }

    pub fn write_summary_json<P: AsRef<Path>>(&self, path: P) -> Result<(), OutputError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Write the collected tables and this summary into `dir`.
    ///
    /// Creates:
    /// - model_timeseries.csv
    /// - agent_timeseries.csv (only when agent reporters are registered)
    /// - summary.json
    pub fn write_all<P: AsRef<Path>>(
        &self,
        collector: &DataCollector,
        dir: P,
    ) -> Result<(), OutputError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        write_model_csv(collector, dir.join("model_timeseries.csv"))?;
        if !collector.agent_reporter_names().is_empty() {
            write_agent_csv(collector, dir.join("agent_timeseries.csv"))?;
        }
        self.write_summary_json(dir.join("summary.json"))?;

        Ok(())
    }
}

/// One row per collected tick, one column per model reporter.
/// The default reporters start with `step`.
pub fn write_model_csv<P: AsRef<Path>>(
    collector: &DataCollector,
    path: P,
) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(collector.model_reporter_names())?;
    for row in collector.model_rows() {
        wtr.write_record(row.values.iter().map(f64::to_string))?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_agent_csv<P: AsRef<Path>>(
    collector: &DataCollector,
    path: P,
) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["step", "agent"];
    header.extend(collector.agent_reporter_names());
    wtr.write_record(&header)?;

    for row in collector.agent_rows() {
        let mut record = vec![row.step.to_string(), row.agent.to_string()];
        record.extend(row.values.iter().map(f64::to_string));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Per-seed outcome of a sweep, one row per run
pub fn write_sweep_csv<P: AsRef<Path>>(
    runs: &[SimulationStats],
    path: P,
) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "seed",
        "steps",
        "final_cbdc_adoption_rate",
        "peak_cbdc_adoption_rate",
        "cbdc_adopters",
        "final_cbdc_holdings",
        "initial_bank_deposits",
        "final_bank_deposits",
        "deposit_reduction_rate",
        "average_final_liquidity",
    ])?;

    for stats in runs {
        let summary = &stats.summary;
        wtr.write_record(&[
            stats.seed.to_string(),
            stats.steps_completed.to_string(),
            summary.final_cbdc_adoption_rate.to_string(),
            stats.peak_adoption().to_string(),
            summary.cbdc_adopters.to_string(),
            summary.final_cbdc_holdings.to_string(),
            summary.initial_bank_deposits.to_string(),
            summary.final_bank_deposits.to_string(),
            summary.deposit_reduction_rate.to_string(),
            summary.average_final_liquidity.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cbdc_banking_output_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn finished_model() -> CbdcBankingModel {
        let mut model = CbdcBankingModel::new(ModelConfig::small()).unwrap();
        model.run(8);
        model
    }

    #[test]
    fn write_all_creates_tables_and_summary() {
        let model = finished_model();
        let dir = scratch_dir("all");

        SimulationOutput::from_model(&model)
            .write_all(model.collector(), &dir)
            .unwrap();

        let model_csv = fs::read_to_string(dir.join("model_timeseries.csv")).unwrap();
        let lines: Vec<&str> = model_csv.lines().collect();
        // header + initial row + 8 ticks
        assert_eq!(lines.len(), 10);
        assert!(lines[0].starts_with("step,cbdc_adoption_rate"));

        let agent_csv = fs::read_to_string(dir.join("agent_timeseries.csv")).unwrap();
        assert_eq!(agent_csv.lines().count(), 1 + 9 * 15);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["metadata"]["seed"], 42);
        assert_eq!(summary["summary"]["steps"], 8);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn sweep_csv_has_one_row_per_run() {
        let dir = scratch_dir("sweep");
        fs::create_dir_all(&dir).unwrap();
        let runs = vec![
            finished_model().simulation_stats(),
            finished_model().simulation_stats(),
        ];

        let path = dir.join("sweep.csv");
        write_sweep_csv(&runs, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.records().count(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let model = finished_model();
        let path = scratch_dir("missing").join("nested").join("model.csv");
        assert!(write_model_csv(model.collector(), path).is_err());
    }
}
