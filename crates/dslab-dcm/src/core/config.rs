//! Data center configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::common::ResourceCategory;

/// Errors in data center configuration. They are fatal and reported before the simulation starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read file {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("can't parse YAML from {0}: {1}")]
    Parse(String, #[source] serde_yaml::Error),
    #[error("invalid capacity {0}")]
    InvalidCapacity(f64),
    #[error("invalid utilization threshold {0}")]
    InvalidThreshold(f64),
    #[error("invalid {category} resource of {owner}: {reason}")]
    InvalidResource {
        owner: String,
        category: ResourceCategory,
        reason: String,
    },
    #[error("application {0} has no reference resource for {1}")]
    MissingReference(u32, ResourceCategory),
    #[error("unknown application {0}")]
    UnknownApplication(u32),
    #[error("invalid value of {0}: {1}")]
    InvalidValue(String, String),
    #[error("{vms} vms cannot be placed on {machines} machines, one vm per machine")]
    InsufficientMachines { vms: usize, machines: usize },
}

/// Weights of the optimal placement objective terms.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ObjectiveWeights {
    pub power: f64,
    pub migration: f64,
    pub sla: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            power: 1.,
            migration: 1.,
            sla: 1.,
        }
    }
}

/// External mathematical programming system used to solve the optimal placement problem.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum SolverBackendConfig {
    /// AMPL driven solver, reads the run script and prints the result block to stdout.
    Ampl {
        #[serde(default = "default_ampl_command")]
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Path to AMPL model file.
        model: String,
        /// Solver used by AMPL.
        #[serde(default = "default_ampl_solver")]
        solver: String,
    },
    /// GAMS driven solver, writes the result block to a put file.
    Gams {
        #[serde(default = "default_gams_command")]
        command: String,
        /// Arguments passed before the run file.
        #[serde(default)]
        args: Vec<String>,
        /// GAMS options passed after the run file.
        #[serde(default)]
        options: Vec<String>,
        /// Path to GAMS model file.
        model: String,
        /// MIP solver used by GAMS.
        #[serde(default = "default_gams_solver")]
        solver: String,
    },
    /// AMPL model submitted to NEOS server through a proxy program, which receives the job file path
    /// as its last argument and prints the job output to stdout.
    NeosProxy {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Path to AMPL model file.
        model: String,
        /// NEOS solver name.
        #[serde(default = "default_neos_solver")]
        solver: String,
        /// NEOS solver category.
        #[serde(default = "default_neos_category")]
        category: String,
        email: Option<String>,
    },
}

fn default_ampl_command() -> String {
    "ampl".to_string()
}

fn default_ampl_solver() -> String {
    "cplex".to_string()
}

fn default_gams_command() -> String {
    "gams".to_string()
}

fn default_gams_solver() -> String {
    "CPLEX".to_string()
}

fn default_neos_solver() -> String {
    "CPLEX".to_string()
}

fn default_neos_category() -> String {
    "milp".to_string()
}

/// Configuration of solver invocation.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SolverConfig {
    pub backend: SolverBackendConfig,
    #[serde(default)]
    pub weights: ObjectiveWeights,
    /// Wall-clock timeout in seconds, after which the solver process is killed.
    pub timeout: Option<f64>,
    /// Overrides the number of status lines the backend prints before results.
    pub status_lines: Option<usize>,
    /// Keep solver input and output files instead of removing them.
    #[serde(default)]
    pub keep_files: bool,
    /// Apply solutions which the solver reports as solved with some doubts.
    #[serde(default)]
    pub accept_suspect: bool,
}

/// Placement strategy and its parameters.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum PlacementStrategyConfig {
    BestFit,
    BestFitDecreasing,
    FirstFit {
        /// Also require the measured VM utilization to fit the machine.
        #[serde(default)]
        check_utilization: bool,
    },
    FirstFitScaleOut,
    Optimal {
        solver: SolverConfig,
    },
}

/// Kind of migration controller.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Copy)]
pub enum MigrationControllerKind {
    /// Applies the placement computed by the migration strategy.
    Default,
    /// Samples utilization but never migrates.
    Dummy,
}

/// Holds migration control settings.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct MigrationConfig {
    pub controller: MigrationControllerKind,
    pub strategy: PlacementStrategyConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            controller: MigrationControllerKind::Default,
            strategy: PlacementStrategyConfig::BestFitDecreasing,
        }
    }
}

/// Capacity and utilization threshold of a single resource.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ResourceConfig {
    pub capacity: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    1.
}

/// Linear power model of machine CPU.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct PowerConfig {
    pub idle: f64,
    pub max: f64,
}

/// Holds configuration of a single physical machine or a set of identical machines.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct MachineConfig {
    /// Machine name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Machine name prefix.
    /// Full name is produced by appending machine instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    pub resources: BTreeMap<ResourceCategory, ResourceConfig>,
    pub power: Option<PowerConfig>,
    /// Number of such machines.
    pub count: Option<u32>,
}

/// Holds configuration of an application tier.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct TierConfig {
    pub name: String,
    /// Demanded shares of the application reference resources.
    pub shares: BTreeMap<ResourceCategory, f64>,
    /// Constant load relative to the demanded shares, 1 if not set.
    #[serde(default)]
    pub load: BTreeMap<ResourceCategory, f64>,
}

/// Holds configuration of a multi-tier application.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ApplicationConfig {
    pub name: String,
    pub reference: BTreeMap<ResourceCategory, ResourceConfig>,
    pub tiers: Vec<TierConfig>,
    /// Number of instances started with the system.
    pub instances: Option<u32>,
}

/// Holds raw data center config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawDataCenterConfig {
    pub sampling_time: Option<f64>,
    pub reference_share_penalty: Option<f64>,
    pub switch_off_idle_machines: Option<bool>,
    pub initial_placement: Option<PlacementStrategyConfig>,
    pub incremental_placement: Option<PlacementStrategyConfig>,
    pub migration: Option<MigrationConfig>,
    pub machines: Option<Vec<MachineConfig>>,
    pub applications: Option<Vec<ApplicationConfig>>,
}

/// Represents data center configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DataCenterConfig {
    /// Period in seconds between migration controller runs.
    pub sampling_time: f64,
    /// Relative increase of demanded shares applied before placement.
    pub reference_share_penalty: f64,
    /// Whether to switch off machines left without VMs.
    pub switch_off_idle_machines: bool,
    /// Strategy placing all VMs at system start.
    pub initial_placement: PlacementStrategyConfig,
    /// Strategy placing VMs of instances started later.
    pub incremental_placement: PlacementStrategyConfig,
    pub migration: MigrationConfig,
    pub machines: Vec<MachineConfig>,
    pub applications: Vec<ApplicationConfig>,
}

impl DataCenterConfig {
    /// Creates config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(file_name).map_err(|e| ConfigError::Io(file_name.to_string(), e))?;
        Self::parse(&data, file_name)
    }

    /// Creates config from YAML string.
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        Self::parse(data, "string")
    }

    fn parse(data: &str, source: &str) -> Result<Self, ConfigError> {
        let raw: RawDataCenterConfig =
            serde_yaml::from_str(data).map_err(|e| ConfigError::Parse(source.to_string(), e))?;
        let config = Self {
            sampling_time: raw.sampling_time.unwrap_or(10.),
            reference_share_penalty: raw.reference_share_penalty.unwrap_or(0.),
            switch_off_idle_machines: raw.switch_off_idle_machines.unwrap_or(false),
            initial_placement: raw
                .initial_placement
                .unwrap_or(PlacementStrategyConfig::BestFitDecreasing),
            incremental_placement: raw.incremental_placement.unwrap_or(PlacementStrategyConfig::FirstFit {
                check_utilization: false,
            }),
            migration: raw.migration.unwrap_or_default(),
            machines: raw.machines.unwrap_or_default(),
            applications: raw.applications.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values which can be checked without building the data center.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling_time > 0.) {
            return Err(ConfigError::InvalidValue(
                "sampling_time".to_string(),
                self.sampling_time.to_string(),
            ));
        }
        if !(self.reference_share_penalty >= 0.) {
            return Err(ConfigError::InvalidValue(
                "reference_share_penalty".to_string(),
                self.reference_share_penalty.to_string(),
            ));
        }
        for strategy in [
            &self.initial_placement,
            &self.incremental_placement,
            &self.migration.strategy,
        ] {
            if let PlacementStrategyConfig::Optimal { solver } = strategy {
                if let Some(timeout) = solver.timeout {
                    if !(timeout > 0.) {
                        return Err(ConfigError::InvalidValue("solver timeout".to_string(), timeout.to_string()));
                    }
                }
                if solver.status_lines == Some(0) {
                    return Err(ConfigError::InvalidValue("solver status_lines".to_string(), "0".to_string()));
                }
            }
        }
        for machine in self.machines.iter() {
            if machine.name.is_none() && machine.name_prefix.is_none() {
                return Err(ConfigError::InvalidValue(
                    "machine name".to_string(),
                    "either name or name_prefix should be set".to_string(),
                ));
            }
        }
        Ok(())
    }
}
