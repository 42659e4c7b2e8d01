//! Optimal strategy backed by an external solver.

use crate::core::common::ResourceCategory;
use crate::core::config::{ObjectiveWeights, SolverConfig};
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategies::requested_vms;
use crate::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest, VmPlacementStrategy};
use crate::solver::problem::OptimalPlacementProblem;
use crate::solver::Solver;

const SHARE_SCALE: f64 = 1e6;

/// Computes placement minimizing the weighted sum of power consumption, migrations and SLA penalty
/// by solving a mixed integer program.
///
/// The solver decides machine and CPU share of each VM, shares of other resources are derived from
/// the VM reference demands and bounded by the machine capacity in the model. Solver failure makes
/// the whole invocation fail, so that the caller can keep the current placement.
pub struct Optimal {
    solver: Solver,
    weights: ObjectiveWeights,
}

impl Optimal {
    pub fn new(solver: Solver, weights: ObjectiveWeights) -> Self {
        Self { solver, weights }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(Solver::from_config(config), config.weights.clone())
    }
}

impl VmPlacementStrategy for Optimal {
    fn name(&self) -> &str {
        "Optimal"
    }

    fn place(
        &mut self,
        request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError> {
        let mut report = PlacementReport::default();
        let vms = requested_vms(request)?;
        let pending: Vec<u32> = vms
            .iter()
            .filter(|vm| {
                if placement.is_placed(vm.id) {
                    report.placed.push(vm.id);
                    false
                } else {
                    true
                }
            })
            .map(|vm| vm.id)
            .collect();
        if pending.is_empty() {
            return Ok(report);
        }
        if request.data_center.machine_count() == 0 {
            report.unplaced.extend(pending);
            return Ok(report);
        }

        let problem = OptimalPlacementProblem::build(
            request.data_center,
            &pending,
            request.utilization,
            request.current,
            placement,
            &self.weights,
            request.reference_share_penalty,
        )?;
        let result = self.solver.solve(&problem)?;
        log::debug!(
            "{} solver found placement of {} vms with cost {}",
            self.solver.backend_name(),
            pending.len(),
            result.cost
        );

        for (i, vm_data) in problem.vms.iter().enumerate() {
            let Some(column) = result.placement[i].iter().position(|placed| *placed) else {
                log::warn!("solver left vm {} without machine", vm_data.id);
                report.unplaced.push(vm_data.id);
                continue;
            };
            let machine_id = problem.machines[column].id;
            let (Some(vm), Some(machine)) = (
                request.data_center.vm(vm_data.id),
                request.data_center.machine(machine_id),
            ) else {
                report.unplaced.push(vm_data.id);
                continue;
            };
            let mut shares = vm.shares_on(machine, request.reference_share_penalty)?;
            // solver output is rounded, truncation keeps the machine sum within capacity
            let cpu_share = (result.shares[i][column].clamp(0., 1.) * SHARE_SCALE).floor() / SHARE_SCALE;
            shares.insert(ResourceCategory::Cpu, cpu_share);
            if placement.try_place(vm.id, machine_id, shares) {
                report.placed.push(vm.id);
            } else {
                log::warn!("solver placement of vm {} on machine {} does not fit", vm.id, machine_id);
                report.unplaced.push(vm.id);
            }
        }
        Ok(report)
    }
}
