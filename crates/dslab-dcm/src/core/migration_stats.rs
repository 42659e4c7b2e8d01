//! Migration counters and per-run history.

use std::fs::File;

use serde::Serialize;

/// Outcome of a single migration controller run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ControlRunRecord {
    pub time: f64,
    pub migrations: u64,
    pub failed_migrations: u64,
    pub share_updates: u64,
    pub new_placements: u64,
    /// VMs left without machine after the run.
    pub unplaced_vms: u64,
    pub active_machines: u64,
    /// Power consumption of machines at the allocated shares.
    pub power: f64,
    pub decision_failed: bool,
}

/// Accumulates migration controller statistics.
#[derive(Clone, Debug, Default)]
pub struct MigrationStats {
    runs: u64,
    total_migrations: u64,
    last_run_migrations: u64,
    failed_migrations: u64,
    failed_decisions: u64,
    share_updates: u64,
    history: Vec<ControlRunRecord>,
}

impl MigrationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&mut self, record: ControlRunRecord) {
        self.runs += 1;
        self.last_run_migrations = record.migrations;
        self.total_migrations += record.migrations;
        self.failed_migrations += record.failed_migrations;
        self.share_updates += record.share_updates;
        if record.decision_failed {
            self.failed_decisions += 1;
        }
        self.history.push(record);
    }

    /// Number of controller runs.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn total_migrations(&self) -> u64 {
        self.total_migrations
    }

    /// Number of migrations performed in the last run.
    pub fn last_run_migrations(&self) -> u64 {
        self.last_run_migrations
    }

    pub fn failed_migrations(&self) -> u64 {
        self.failed_migrations
    }

    /// Number of runs in which the strategy produced no placement.
    pub fn failed_decisions(&self) -> u64 {
        self.failed_decisions
    }

    pub fn share_updates(&self) -> u64 {
        self.share_updates
    }

    /// Mean number of migrations per controller run.
    pub fn migration_rate(&self) -> f64 {
        if self.runs == 0 {
            0.
        } else {
            self.total_migrations as f64 / self.runs as f64
        }
    }

    pub fn history(&self) -> &[ControlRunRecord] {
        &self.history
    }

    /// Writes run history to CSV file.
    pub fn save_csv(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for record in &self.history {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
