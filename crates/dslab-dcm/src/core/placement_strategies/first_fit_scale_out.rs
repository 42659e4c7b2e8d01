//! First Fit scale-out strategy.

use crate::core::physical_machine::PhysicalMachine;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategies::{place_greedily, requested_vms};
use crate::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest, VmPlacementStrategy};

/// Places at most one VM per machine, using the first empty machine which accepts the VM.
///
/// Requesting more VMs than there are machines is a configuration error and nothing is placed.
pub struct FirstFitScaleOut;

impl FirstFitScaleOut {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmPlacementStrategy for FirstFitScaleOut {
    fn name(&self) -> &str {
        "FirstFitScaleOut"
    }

    fn place(
        &mut self,
        request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError> {
        let machine_count = request.data_center.machine_count();
        if request.vms.len() > machine_count {
            return Err(PlacementError::InsufficientMachines {
                vms: request.vms.len(),
                machines: machine_count,
            });
        }
        let machines: Vec<&PhysicalMachine> = request.data_center.machines().collect();
        let vms = requested_vms(request)?;
        place_greedily(request, &machines, &vms, placement, |_, machine, _, placement| {
            Ok(placement.is_empty_machine(machine.id))
        })
    }
}
