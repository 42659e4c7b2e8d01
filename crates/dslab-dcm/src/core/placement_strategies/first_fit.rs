//! First Fit strategy.

use crate::core::common::EPSILON;
use crate::core::physical_machine::PhysicalMachine;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategies::{place_greedily, requested_vms};
use crate::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest, VmPlacementStrategy};

/// Uses the first machine in data center enumeration order which accepts the VM.
///
/// With `check_utilization` enabled, the measured utilization of the VM scaled to the candidate machine must also
/// fit into the capacity left on the machine, so that an already overloaded tier is not packed into a tight spot.
pub struct FirstFit {
    check_utilization: bool,
}

impl FirstFit {
    pub fn new(check_utilization: bool) -> Self {
        Self { check_utilization }
    }
}

impl VmPlacementStrategy for FirstFit {
    fn name(&self) -> &str {
        "FirstFit"
    }

    fn place(
        &mut self,
        request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError> {
        let machines: Vec<&PhysicalMachine> = request.data_center.machines().collect();
        let vms = requested_vms(request)?;
        let check_utilization = self.check_utilization;
        place_greedily(request, &machines, &vms, placement, |vm, machine, _, placement| {
            if !check_utilization {
                return Ok(true);
            }
            let Some(usage) = request.utilization.get(&vm.id) else {
                return Ok(true);
            };
            for (category, utilization) in usage.iter() {
                let scaled = vm.scale_to_machine(*category, *utilization, machine)?;
                if placement.share_sum(machine.id, *category) + scaled > 1. + EPSILON {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }
}
