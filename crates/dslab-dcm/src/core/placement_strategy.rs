//! Virtual machine placement strategies.

use thiserror::Error;

use crate::core::common::UtilizationMap;
use crate::core::config::{ConfigError, PlacementStrategyConfig};
use crate::core::data_center::DataCenter;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategies::best_fit::BestFit;
use crate::core::placement_strategies::best_fit_decreasing::BestFitDecreasing;
use crate::core::placement_strategies::first_fit::FirstFit;
use crate::core::placement_strategies::first_fit_scale_out::FirstFitScaleOut;
use crate::core::placement_strategies::optimal::Optimal;
use crate::solver::SolverError;

/// Input of a placement strategy invocation.
pub struct PlacementRequest<'a> {
    pub data_center: &'a DataCenter,
    /// VMs to place, all VMs for initial placement and a subset for incremental placement.
    pub vms: &'a [u32],
    /// Latest sampled VM utilization, may be empty.
    pub utilization: &'a UtilizationMap,
    /// Live placement, when the strategy computes a new placement from scratch to decide on migrations.
    pub current: Option<&'a VirtualMachinesPlacement>,
    /// Relative increase of demanded shares applied before placement.
    pub reference_share_penalty: f64,
}

/// Outcome of a placement strategy invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementReport {
    pub placed: Vec<u32>,
    /// VMs no machine could accept, they are left out of the placement.
    pub unplaced: Vec<u32>,
}

impl PlacementReport {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }
}

/// Errors which make a strategy produce no placement at all.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("{vms} vms cannot be placed on {machines} machines, one vm per machine")]
    InsufficientMachines { vms: usize, machines: usize },
    #[error("unknown vm {0}")]
    UnknownVm(u32),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no solution available: {0}")]
    Solver(#[from] SolverError),
}

/// Trait for implementation of VM placement strategies.
///
/// A strategy places the requested VMs into the given placement, which may already contain other VMs.
/// Each invocation is independent and deterministic given its inputs. VMs already present in the placement
/// are reported as placed and left untouched.
pub trait VmPlacementStrategy {
    fn name(&self) -> &str;

    fn place(
        &mut self,
        request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError>;
}

/// Creates placement strategy from its configuration.
pub fn placement_strategy_resolver(config: &PlacementStrategyConfig) -> Box<dyn VmPlacementStrategy> {
    match config {
        PlacementStrategyConfig::BestFit => Box::new(BestFit::new()),
        PlacementStrategyConfig::BestFitDecreasing => Box::new(BestFitDecreasing::new()),
        PlacementStrategyConfig::FirstFit { check_utilization } => Box::new(FirstFit::new(*check_utilization)),
        PlacementStrategyConfig::FirstFitScaleOut => Box::new(FirstFitScaleOut::new()),
        PlacementStrategyConfig::Optimal { solver } => Box::new(Optimal::from_config(solver)),
    }
}
