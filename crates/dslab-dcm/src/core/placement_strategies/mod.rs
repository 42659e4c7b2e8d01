//! Implementations of placement strategies.

pub mod best_fit;
pub mod best_fit_decreasing;
pub mod first_fit;
pub mod first_fit_scale_out;
pub mod optimal;

use crate::core::common::ResourceShares;
use crate::core::physical_machine::PhysicalMachine;
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest};
use crate::core::vm::VirtualMachine;

/// Places each VM on the first machine (in the given order) which passes the `accept` check and has enough
/// free capacity. VMs which fit nowhere are reported as unplaced, VMs placed earlier stay placed.
pub(crate) fn place_greedily<F>(
    request: &PlacementRequest,
    machines: &[&PhysicalMachine],
    vms: &[&VirtualMachine],
    placement: &mut VirtualMachinesPlacement,
    mut accept: F,
) -> Result<PlacementReport, PlacementError>
where
    F: FnMut(&VirtualMachine, &PhysicalMachine, &ResourceShares, &VirtualMachinesPlacement) -> Result<bool, PlacementError>,
{
    let mut report = PlacementReport::default();
    for vm in vms {
        if placement.is_placed(vm.id) {
            report.placed.push(vm.id);
            continue;
        }
        let mut selected = None;
        for machine in machines {
            let shares = vm.shares_on(machine, request.reference_share_penalty)?;
            if !accept(*vm, *machine, &shares, &*placement)? {
                continue;
            }
            if placement.try_place(vm.id, machine.id, shares) {
                selected = Some(machine.id);
                break;
            }
        }
        match selected {
            Some(machine_id) => {
                log::debug!("placed vm {} on machine {}", vm.id, machine_id);
                report.placed.push(vm.id);
            }
            None => {
                log::debug!("no machine can accept vm {}", vm.id);
                report.unplaced.push(vm.id);
            }
        }
    }
    Ok(report)
}

/// Resolves the requested VM IDs, keeping the request order.
pub(crate) fn requested_vms<'a>(request: &PlacementRequest<'a>) -> Result<Vec<&'a VirtualMachine>, PlacementError> {
    request
        .vms
        .iter()
        .map(|vm_id| request.data_center.vm(*vm_id).ok_or(PlacementError::UnknownVm(*vm_id)))
        .collect()
}
