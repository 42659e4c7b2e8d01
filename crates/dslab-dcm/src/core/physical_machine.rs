//! Physical machine representation.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::core::common::ResourceCategory;
use crate::core::config::ConfigError;
use crate::core::resource::ResourceView;

/// Power state of physical machine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum PowerState {
    On,
    Off,
    Suspended,
}

impl Display for PowerState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Suspended => write!(f, "suspended"),
        }
    }
}

/// Physical machine (PM) with a fixed set of resources.
///
/// Resource capacities are immutable after the machine is built, only its power state can change.
#[derive(Clone)]
pub struct PhysicalMachine {
    pub id: u32,
    pub name: String,
    resources: BTreeMap<ResourceCategory, ResourceView>,
    power_state: PowerState,
}

impl PhysicalMachine {
    /// Creates machine after validating its resources.
    pub fn new(
        id: u32,
        name: &str,
        resources: BTreeMap<ResourceCategory, ResourceView>,
    ) -> Result<Self, ConfigError> {
        for (category, view) in resources.iter() {
            view.validate().map_err(|e| ConfigError::InvalidResource {
                owner: name.to_string(),
                category: *category,
                reason: e.to_string(),
            })?;
        }
        Ok(Self {
            id,
            name: name.to_string(),
            resources,
            power_state: PowerState::On,
        })
    }

    pub fn resource(&self, category: ResourceCategory) -> Option<&ResourceView> {
        self.resources.get(&category)
    }

    pub fn resources(&self) -> &BTreeMap<ResourceCategory, ResourceView> {
        &self.resources
    }

    /// Returns the capacity of the given resource, or zero if the machine has no such resource.
    pub fn capacity(&self, category: ResourceCategory) -> f64 {
        self.resources.get(&category).map_or(0., |r| r.capacity)
    }

    pub fn threshold(&self, category: ResourceCategory) -> f64 {
        self.resources.get(&category).map_or(0., |r| r.threshold)
    }

    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    pub fn set_power_state(&mut self, state: PowerState) {
        self.power_state = state;
    }

    /// Returns the machine power consumption given the utilization of each resource.
    ///
    /// Machines which are not powered on consume nothing.
    pub fn power(&self, utilization: &BTreeMap<ResourceCategory, f64>) -> f64 {
        if self.power_state != PowerState::On {
            return 0.;
        }
        self.resources
            .iter()
            .map(|(category, view)| view.power(utilization.get(category).copied().unwrap_or(0.)))
            .sum()
    }
}
