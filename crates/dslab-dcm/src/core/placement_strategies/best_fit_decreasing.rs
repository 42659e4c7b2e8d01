//! Best Fit Decreasing strategy.

use crate::core::common::ResourceCategory;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategies::best_fit::machines_by_capacity;
use crate::core::placement_strategies::{place_greedily, requested_vms};
use crate::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest, VmPlacementStrategy};

/// Best Fit which first sorts VMs by descending reference CPU demand.
pub struct BestFitDecreasing;

impl BestFitDecreasing {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmPlacementStrategy for BestFitDecreasing {
    fn name(&self) -> &str {
        "BestFitDecreasing"
    }

    fn place(
        &mut self,
        request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError> {
        let machines = machines_by_capacity(request);
        let mut vms = requested_vms(request)?;
        vms.sort_by(|a, b| {
            b.reference_demand(ResourceCategory::Cpu)
                .total_cmp(&a.reference_demand(ResourceCategory::Cpu))
        });
        place_greedily(request, &machines, &vms, placement, |_, _, _, _| Ok(true))
    }
}
