//! Optimal placement problem passed to solver backends.

use crate::core::common::{ResourceCategory, ResourceShares, UtilizationMap};
use crate::core::config::{ConfigError, ObjectiveWeights};
use crate::core::data_center::DataCenter;
use crate::core::physical_machine::PhysicalMachine;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategy::PlacementError;
use crate::core::resource::apply_reference_penalty;

/// Demand written for a VM which can never fit the machine, e.g. because the machine lacks the resource.
pub const UNFIT_DEMAND: f64 = 2.;

/// Machine parameters of the problem.
#[derive(Clone, Debug, PartialEq)]
pub struct MachineData {
    pub id: u32,
    pub capacity: f64,
    pub threshold: f64,
    pub idle_power: f64,
    pub max_power: f64,
    /// Share of each resource left free by VMs which are already placed on the machine.
    pub free_shares: ResourceShares,
}

/// VM parameters of the problem.
#[derive(Clone, Debug, PartialEq)]
pub struct VmData {
    pub id: u32,
    /// Estimated CPU utilization as a share of the reference resource.
    pub utilization: f64,
    /// CPU share needed on each machine (in problem machine order) to serve the estimated utilization.
    pub min_shares: Vec<f64>,
    /// Shares of non-CPU resources needed on each machine (in problem machine order).
    pub demands: Vec<ResourceShares>,
    /// Index of the machine currently hosting the VM.
    pub current_machine: Option<usize>,
}

/// Weighted placement problem: minimize `wp * power + wm * migrations + ws * sla_penalty`
/// subject to one machine per VM and per-machine capacity of every resource.
///
/// Only CPU shares are decided by the solver, shares of other resources are fixed demands derived from
/// the VM reference shares.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimalPlacementProblem {
    pub machines: Vec<MachineData>,
    pub vms: Vec<VmData>,
    /// Non-CPU resource categories demanded by the VMs.
    pub categories: Vec<ResourceCategory>,
    pub weights: ObjectiveWeights,
}

impl OptimalPlacementProblem {
    /// Builds problem for the given VMs over all data center machines.
    ///
    /// The utilization estimate of a VM is its sampled CPU utilization, or its reference CPU share if the VM
    /// was not sampled yet. `current` is the live placement used for migration costs, while `occupied` holds
    /// the VMs already placed into the ledger being filled.
    pub fn build(
        data_center: &DataCenter,
        vm_ids: &[u32],
        utilization: &UtilizationMap,
        current: Option<&VirtualMachinesPlacement>,
        occupied: &VirtualMachinesPlacement,
        weights: &ObjectiveWeights,
        reference_share_penalty: f64,
    ) -> Result<Self, PlacementError> {
        let machines: Vec<&PhysicalMachine> = data_center.machines().collect();
        let machine_data = machines
            .iter()
            .map(|machine| {
                let cpu = machine.resource(ResourceCategory::Cpu);
                let free_shares = ResourceCategory::ALL
                    .iter()
                    .map(|category| (*category, (1. - occupied.share_sum(machine.id, *category)).max(0.)))
                    .collect();
                MachineData {
                    id: machine.id,
                    capacity: machine.capacity(ResourceCategory::Cpu),
                    threshold: machine.threshold(ResourceCategory::Cpu),
                    idle_power: cpu.map_or(0., |r| r.power_model().idle_power()),
                    max_power: cpu.map_or(0., |r| r.power_model().max_power()),
                    free_shares,
                }
            })
            .collect();
        let mut categories = Vec::new();

        let mut vm_data = Vec::with_capacity(vm_ids.len());
        for vm_id in vm_ids {
            let vm = data_center.vm(*vm_id).ok_or(PlacementError::UnknownVm(*vm_id))?;
            let estimate = utilization
                .get(vm_id)
                .and_then(|usage| usage.get(&ResourceCategory::Cpu))
                .or_else(|| vm.reference_shares().get(&ResourceCategory::Cpu))
                .copied()
                .unwrap_or(0.);
            let min_shares = machines
                .iter()
                .map(|machine| {
                    vm.scale_to_machine(ResourceCategory::Cpu, estimate, machine)
                        .map(|share| apply_reference_penalty(share, reference_share_penalty))
                })
                .collect::<Result<Vec<f64>, ConfigError>>()?;
            let mut demands = Vec::with_capacity(machines.len());
            for machine in machines.iter() {
                let mut shares = vm.shares_on(machine, reference_share_penalty)?;
                shares.remove(&ResourceCategory::Cpu);
                for (category, share) in shares.iter_mut() {
                    *share = share.min(UNFIT_DEMAND);
                    if !categories.contains(category) {
                        categories.push(*category);
                    }
                }
                demands.push(shares);
            }
            let current_machine = current
                .and_then(|placement| placement.machine_of(*vm_id))
                .and_then(|machine_id| machines.iter().position(|m| m.id == machine_id));
            vm_data.push(VmData {
                id: *vm_id,
                utilization: estimate,
                min_shares,
                demands,
                current_machine,
            });
        }
        categories.sort();

        Ok(Self {
            machines: machine_data,
            vms: vm_data,
            categories,
            weights: weights.clone(),
        })
    }

    /// Returns the symbolic name of the machine used in solver input.
    pub fn machine_label(&self, index: usize) -> String {
        format!("pm{}", self.machines[index].id)
    }

    /// Returns the symbolic name of the VM used in solver input.
    pub fn vm_label(&self, index: usize) -> String {
        format!("vm{}", self.vms[index].id)
    }

    /// Returns the demand of the VM for the resource on the machine, given by their problem indices.
    pub fn demand(&self, vm: usize, machine: usize, category: ResourceCategory) -> f64 {
        self.vms[vm].demands[machine].get(&category).copied().unwrap_or(0.)
    }

    /// Returns the free share of the resource on the machine, given by its problem index.
    pub fn free_share(&self, machine: usize, category: ResourceCategory) -> f64 {
        self.machines[machine].free_shares.get(&category).copied().unwrap_or(0.)
    }
}
