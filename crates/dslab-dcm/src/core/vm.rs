//! Representations of virtual machine and its status.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::{ResourceCategory, ResourceShares};
use crate::core::config::ConfigError;
use crate::core::physical_machine::PhysicalMachine;
use crate::core::resource::{apply_reference_penalty, scale_share, ReferenceResource};

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum VmStatus {
    Created,
    Running,
    Migrating,
    Unplaced,
    Destroyed,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Created => write!(f, "created"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::Migrating => write!(f, "migrating"),
            VmStatus::Unplaced => write!(f, "unplaced"),
            VmStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Represents virtual machine (VM) running a single tier of an application instance.
///
// The resource demand of VM is machine-independent: it is a share of the reference resource declared by the
// application. It is translated into a concrete share each time the VM is considered for some machine.
#[derive(Clone)]
pub struct VirtualMachine {
    pub id: u32,
    pub application_id: u32,
    pub instance_id: u32,
    pub tier: usize,
    reference_resources: BTreeMap<ResourceCategory, ReferenceResource>,
    reference_shares: ResourceShares,
    status: VmStatus,
}

impl VirtualMachine {
    pub fn new(
        id: u32,
        application_id: u32,
        instance_id: u32,
        tier: usize,
        reference_resources: BTreeMap<ResourceCategory, ReferenceResource>,
        reference_shares: ResourceShares,
    ) -> Self {
        Self {
            id,
            application_id,
            instance_id,
            tier,
            reference_resources,
            reference_shares,
            status: VmStatus::Created,
        }
    }

    pub fn status(&self) -> VmStatus {
        self.status
    }

    pub fn set_status(&mut self, status: VmStatus) {
        self.status = status;
    }

    /// Returns true if VM was not destroyed yet.
    pub fn is_active(&self) -> bool {
        self.status != VmStatus::Destroyed
    }

    pub fn reference_resource(&self, category: ResourceCategory) -> Option<&ReferenceResource> {
        self.reference_resources.get(&category)
    }

    pub fn reference_shares(&self) -> &ResourceShares {
        &self.reference_shares
    }

    /// Returns the demand in absolute reference units (share times reference capacity).
    pub fn reference_demand(&self, category: ResourceCategory) -> f64 {
        match (self.reference_shares.get(&category), self.reference_resources.get(&category)) {
            (Some(share), Some(reference)) => share * reference.capacity,
            _ => 0.,
        }
    }

    /// Translates a share of the reference resource into a share of the machine resource.
    pub fn scale_to_machine(
        &self,
        category: ResourceCategory,
        reference_share: f64,
        machine: &PhysicalMachine,
    ) -> Result<f64, ConfigError> {
        let reference = self
            .reference_resources
            .get(&category)
            .ok_or(ConfigError::MissingReference(self.application_id, category))?;
        scale_share(
            reference.capacity,
            reference.threshold,
            machine.capacity(category),
            machine.threshold(category),
            reference_share,
        )
    }

    /// Computes the shares this VM needs on the given machine, inflated by the reference-share penalty.
    pub fn shares_on(&self, machine: &PhysicalMachine, penalty: f64) -> Result<ResourceShares, ConfigError> {
        let mut shares = ResourceShares::new();
        for (category, share) in self.reference_shares.iter() {
            let scaled = self.scale_to_machine(*category, *share, machine)?;
            shares.insert(*category, apply_reference_penalty(scaled, penalty));
        }
        Ok(shares)
    }
}
