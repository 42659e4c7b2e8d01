//! Placement ledger: which VM runs on which physical machine and with which resource shares.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::common::{PlacementVerdict, ResourceCategory, ResourceShares, EPSILON};

/// Machine and shares assigned to a single VM.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementEntry {
    pub machine_id: u32,
    pub shares: ResourceShares,
}

/// Assignment table of VMs to physical machines.
///
/// The ledger maintains two invariants:
///
/// - each VM is assigned to at most one machine;
/// - for each machine and resource category, the sum of assigned shares does not exceed 1.
///
/// [`try_place`](Self::try_place) is the only way to add an assignment, it either commits the whole assignment
/// or leaves the ledger untouched. The ledger knows nothing about machines beyond their IDs.
#[derive(Clone, Debug, Default)]
pub struct VirtualMachinesPlacement {
    entries: BTreeMap<u32, PlacementEntry>,
    machine_vms: BTreeMap<u32, BTreeSet<u32>>,
}

impl VirtualMachinesPlacement {
    /// Creates empty placement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether the VM can be placed on the machine with the given shares.
    pub fn can_place(&self, vm_id: u32, machine_id: u32, shares: &ResourceShares) -> PlacementVerdict {
        if self.entries.contains_key(&vm_id) {
            return PlacementVerdict::AlreadyPlaced;
        }
        // infinite share comes from a machine lacking the resource and never fits
        for (category, share) in shares.iter() {
            if share.is_nan() || *share < 0. {
                return PlacementVerdict::InvalidShare(*category);
            }
        }
        for (category, share) in shares.iter() {
            if self.share_sum(machine_id, *category) + share > 1. + EPSILON {
                return PlacementVerdict::CapacityExceeded(*category);
            }
        }
        PlacementVerdict::Success
    }

    /// Places the VM on the machine if all capacity invariants hold, returns whether the placement was committed.
    pub fn try_place(&mut self, vm_id: u32, machine_id: u32, shares: ResourceShares) -> bool {
        match self.can_place(vm_id, machine_id, &shares) {
            PlacementVerdict::Success => {
                self.machine_vms.entry(machine_id).or_default().insert(vm_id);
                self.entries.insert(vm_id, PlacementEntry { machine_id, shares });
                true
            }
            PlacementVerdict::AlreadyPlaced => {
                log::error!(
                    "rejected placement of vm {} on machine {}: vm is already placed on machine {}",
                    vm_id,
                    machine_id,
                    self.entries[&vm_id].machine_id
                );
                false
            }
            PlacementVerdict::InvalidShare(category) => {
                log::error!(
                    "rejected placement of vm {} on machine {}: invalid {} share {:?}",
                    vm_id,
                    machine_id,
                    category,
                    shares.get(&category)
                );
                false
            }
            PlacementVerdict::CapacityExceeded(_) => false,
        }
    }

    /// Detaches VM from its machine, freeing its shares. Removing a VM which is not placed is a no-op.
    pub fn remove(&mut self, vm_id: u32) -> Option<PlacementEntry> {
        let entry = self.entries.remove(&vm_id)?;
        if let Some(vms) = self.machine_vms.get_mut(&entry.machine_id) {
            vms.remove(&vm_id);
            if vms.is_empty() {
                self.machine_vms.remove(&entry.machine_id);
            }
        }
        debug_assert!(self.machine_vms.values().all(|vms| !vms.contains(&vm_id)));
        Some(entry)
    }

    /// Returns the machine hosting the VM.
    pub fn machine_of(&self, vm_id: u32) -> Option<u32> {
        self.entries.get(&vm_id).map(|entry| entry.machine_id)
    }

    /// Returns the shares assigned to the VM.
    pub fn shares_of(&self, vm_id: u32) -> Option<&ResourceShares> {
        self.entries.get(&vm_id).map(|entry| &entry.shares)
    }

    pub fn entry(&self, vm_id: u32) -> Option<&PlacementEntry> {
        self.entries.get(&vm_id)
    }

    /// Returns IDs of VMs placed on the machine.
    pub fn vms_on(&self, machine_id: u32) -> Vec<u32> {
        self.machine_vms
            .get(&machine_id)
            .map(|vms| vms.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the sum of shares of the given resource assigned on the machine.
    pub fn share_sum(&self, machine_id: u32, category: ResourceCategory) -> f64 {
        self.machine_vms.get(&machine_id).map_or(0., |vms| {
            vms.iter()
                .filter_map(|vm_id| self.entries[vm_id].shares.get(&category))
                .sum()
        })
    }

    pub fn is_placed(&self, vm_id: u32) -> bool {
        self.entries.contains_key(&vm_id)
    }

    pub fn is_empty_machine(&self, machine_id: u32) -> bool {
        !self.machine_vms.contains_key(&machine_id)
    }

    /// Returns IDs of machines hosting at least one VM.
    pub fn used_machines(&self) -> Vec<u32> {
        self.machine_vms.keys().copied().collect()
    }

    /// Returns all assignments as a VM to machine map.
    pub fn assignments(&self) -> BTreeMap<u32, u32> {
        self.entries
            .iter()
            .map(|(vm_id, entry)| (*vm_id, entry.machine_id))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&u32, &PlacementEntry)> {
        self.entries.iter()
    }

    pub fn vm_count(&self) -> usize {
        self.entries.len()
    }
}

impl PartialEq for VirtualMachinesPlacement {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
