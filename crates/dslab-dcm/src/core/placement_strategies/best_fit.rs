//! Best Fit strategy.

use crate::core::common::ResourceCategory;
use crate::core::physical_machine::PhysicalMachine;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategies::{place_greedily, requested_vms};
use crate::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest, VmPlacementStrategy};

/// Scans machines from the largest to the smallest (by CPU capacity) and uses the first one which accepts the VM.
///
/// Machines with equal capacity keep their enumeration order.
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self {}
    }
}

/// Returns data center machines sorted by descending CPU capacity.
pub(crate) fn machines_by_capacity<'a>(request: &PlacementRequest<'a>) -> Vec<&'a PhysicalMachine> {
    let mut machines: Vec<&PhysicalMachine> = request.data_center.machines().collect();
    machines.sort_by(|a, b| {
        b.capacity(ResourceCategory::Cpu)
            .total_cmp(&a.capacity(ResourceCategory::Cpu))
    });
    machines
}

impl VmPlacementStrategy for BestFit {
    fn name(&self) -> &str {
        "BestFit"
    }

    fn place(
        &mut self,
        request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError> {
        let machines = machines_by_capacity(request);
        let vms = requested_vms(request)?;
        place_greedily(request, &machines, &vms, placement, |_, _, _, _| Ok(true))
    }
}
