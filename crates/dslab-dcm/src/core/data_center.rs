//! Data center: physical machines, applications and the VMs running their instances.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::core::application::{Application, ApplicationInstance, ApplicationTier};
use crate::core::common::ResourceCategory;
use crate::core::config::ConfigError;
use crate::core::physical_machine::{PhysicalMachine, PowerState};
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::resource::{ReferenceResource, ResourceView};
use crate::core::vm::{VirtualMachine, VmStatus};

/// Stores the data center entities.
///
/// Machines keep their insertion order, which is the enumeration order seen by placement strategies.
#[derive(Clone, Default)]
pub struct DataCenter {
    machines: IndexMap<u32, PhysicalMachine>,
    applications: BTreeMap<u32, Application>,
    instances: BTreeMap<u32, ApplicationInstance>,
    vms: BTreeMap<u32, VirtualMachine>,
    next_machine_id: u32,
    next_application_id: u32,
    next_instance_id: u32,
    next_vm_id: u32,
}

impl DataCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds physical machine and returns its ID.
    pub fn add_physical_machine(
        &mut self,
        name: &str,
        resources: BTreeMap<ResourceCategory, ResourceView>,
    ) -> Result<u32, ConfigError> {
        let id = self.next_machine_id;
        let machine = PhysicalMachine::new(id, name, resources)?;
        self.machines.insert(id, machine);
        self.next_machine_id += 1;
        Ok(id)
    }

    /// Adds application and returns its ID.
    pub fn add_application(
        &mut self,
        name: &str,
        reference_resources: BTreeMap<ResourceCategory, ReferenceResource>,
        tiers: Vec<ApplicationTier>,
    ) -> Result<u32, ConfigError> {
        let id = self.next_application_id;
        let application = Application::new(id, name, reference_resources, tiers)?;
        self.applications.insert(id, application);
        self.next_application_id += 1;
        Ok(id)
    }

    /// Starts new instance of application by creating one VM per tier, returns the instance ID.
    pub fn create_instance(&mut self, application_id: u32, time: f64) -> Result<u32, ConfigError> {
        let application = self
            .applications
            .get(&application_id)
            .ok_or(ConfigError::UnknownApplication(application_id))?;
        let instance_id = self.next_instance_id;
        let vms = application.build_instance_vms(instance_id, self.next_vm_id);
        self.next_vm_id += vms.len() as u32;
        self.next_instance_id += 1;

        let vm_ids = vms.iter().map(|vm| vm.id).collect();
        for vm in vms {
            self.vms.insert(vm.id, vm);
        }
        self.instances.insert(
            instance_id,
            ApplicationInstance {
                id: instance_id,
                application_id,
                start_time: time,
                vms: vm_ids,
            },
        );
        Ok(instance_id)
    }

    /// Marks VMs of the instance as destroyed and forgets the instance, returns IDs of its VMs.
    pub fn destroy_instance(&mut self, instance_id: u32) -> Vec<u32> {
        let Some(instance) = self.instances.remove(&instance_id) else {
            return Vec::new();
        };
        for vm_id in instance.vms.iter() {
            if let Some(vm) = self.vms.get_mut(vm_id) {
                vm.set_status(VmStatus::Destroyed);
            }
        }
        instance.vms
    }

    /// Drops application instance together with its VMs, as if it was never created.
    pub fn discard_instance(&mut self, instance_id: u32) -> Vec<u32> {
        let Some(instance) = self.instances.remove(&instance_id) else {
            return Vec::new();
        };
        for vm_id in instance.vms.iter() {
            self.vms.remove(vm_id);
        }
        instance.vms
    }

    pub fn machine(&self, id: u32) -> Option<&PhysicalMachine> {
        self.machines.get(&id)
    }

    pub fn machine_mut(&mut self, id: u32) -> Option<&mut PhysicalMachine> {
        self.machines.get_mut(&id)
    }

    /// Returns machines in enumeration order.
    pub fn machines(&self) -> impl Iterator<Item = &PhysicalMachine> {
        self.machines.values()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn application(&self, id: u32) -> Option<&Application> {
        self.applications.get(&id)
    }

    pub fn instance(&self, id: u32) -> Option<&ApplicationInstance> {
        self.instances.get(&id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ApplicationInstance> {
        self.instances.values()
    }

    pub fn vm(&self, id: u32) -> Option<&VirtualMachine> {
        self.vms.get(&id)
    }

    pub fn vm_mut(&mut self, id: u32) -> Option<&mut VirtualMachine> {
        self.vms.get_mut(&id)
    }

    /// Returns IDs of VMs which were not destroyed, in ascending order.
    pub fn active_vm_ids(&self) -> Vec<u32> {
        self.vms.values().filter(|vm| vm.is_active()).map(|vm| vm.id).collect()
    }

    /// Returns the start time of the instance the VM belongs to.
    pub fn vm_start_time(&self, vm_id: u32) -> f64 {
        self.vms
            .get(&vm_id)
            .and_then(|vm| self.instances.get(&vm.instance_id))
            .map_or(0., |instance| instance.start_time)
    }

    /// Switches on machines hosting VMs and switches off empty machines.
    pub fn update_power_states(&mut self, placement: &VirtualMachinesPlacement) -> usize {
        let mut changed = 0;
        for machine in self.machines.values_mut() {
            let state = if placement.is_empty_machine(machine.id) {
                PowerState::Off
            } else {
                PowerState::On
            };
            if machine.power_state() != state {
                machine.set_power_state(state);
                changed += 1;
            }
        }
        changed
    }

    /// Returns the total power consumption when machine utilization equals the allocated shares.
    pub fn power_consumption(&self, placement: &VirtualMachinesPlacement) -> f64 {
        self.machines
            .values()
            .map(|machine| {
                let utilization = ResourceCategory::ALL
                    .iter()
                    .map(|category| (*category, placement.share_sum(machine.id, *category)))
                    .collect();
                machine.power(&utilization)
            })
            .sum()
    }
}
