//! Multi-tier applications and their running instances.

use std::collections::BTreeMap;

use crate::core::common::{ResourceCategory, ResourceShares};
use crate::core::config::ConfigError;
use crate::core::load_model::LoadModel;
use crate::core::resource::ReferenceResource;
use crate::core::vm::VirtualMachine;

/// Single tier of an application, each instance of the tier runs in its own VM.
#[derive(Clone)]
pub struct ApplicationTier {
    pub name: String,
    /// Demanded shares of the application reference resources.
    pub shares: ResourceShares,
    load_models: BTreeMap<ResourceCategory, Box<dyn LoadModel>>,
}

impl ApplicationTier {
    /// Creates tier which fully uses its shares.
    pub fn new(name: &str, shares: ResourceShares) -> Self {
        Self {
            name: name.to_string(),
            shares,
            load_models: BTreeMap::new(),
        }
    }

    /// Sets the load model used for the given resource.
    pub fn with_load_model(mut self, category: ResourceCategory, model: Box<dyn LoadModel>) -> Self {
        self.load_models.insert(category, model);
        self
    }

    /// Returns the current load of the given resource relative to the tier share (1 if no load model was set).
    pub fn resource_load(&self, category: ResourceCategory, time: f64, time_from_start: f64) -> f64 {
        self.load_models
            .get(&category)
            .map_or(1., |model| model.get_resource_load(time, time_from_start))
    }
}

/// Multi-tier application which declares the reference resources its tier demands are expressed against.
#[derive(Clone)]
pub struct Application {
    pub id: u32,
    pub name: String,
    reference_resources: BTreeMap<ResourceCategory, ReferenceResource>,
    tiers: Vec<ApplicationTier>,
}

impl Application {
    /// Creates application after checking that each demanded resource has a valid reference.
    pub fn new(
        id: u32,
        name: &str,
        reference_resources: BTreeMap<ResourceCategory, ReferenceResource>,
        tiers: Vec<ApplicationTier>,
    ) -> Result<Self, ConfigError> {
        for (category, reference) in reference_resources.iter() {
            reference.validate().map_err(|e| ConfigError::InvalidResource {
                owner: name.to_string(),
                category: *category,
                reason: e.to_string(),
            })?;
        }
        for tier in tiers.iter() {
            for (category, share) in tier.shares.iter() {
                if !reference_resources.contains_key(category) {
                    return Err(ConfigError::MissingReference(id, *category));
                }
                if !(0. ..=1.).contains(share) {
                    return Err(ConfigError::InvalidValue(
                        format!("share of {} in tier {} of {}", category, tier.name, name),
                        share.to_string(),
                    ));
                }
            }
        }
        Ok(Self {
            id,
            name: name.to_string(),
            reference_resources,
            tiers,
        })
    }

    pub fn tiers(&self) -> &[ApplicationTier] {
        &self.tiers
    }

    pub fn tier(&self, index: usize) -> &ApplicationTier {
        &self.tiers[index]
    }

    pub fn reference_resources(&self) -> &BTreeMap<ResourceCategory, ReferenceResource> {
        &self.reference_resources
    }

    /// Builds VMs of a new instance, one per tier, with consecutive IDs starting from `first_vm_id`.
    pub fn build_instance_vms(&self, instance_id: u32, first_vm_id: u32) -> Vec<VirtualMachine> {
        self.tiers
            .iter()
            .enumerate()
            .map(|(index, tier)| {
                VirtualMachine::new(
                    first_vm_id + index as u32,
                    self.id,
                    instance_id,
                    index,
                    self.reference_resources.clone(),
                    tier.shares.clone(),
                )
            })
            .collect()
    }
}

/// Running instance of an application.
#[derive(Clone, Debug)]
pub struct ApplicationInstance {
    pub id: u32,
    pub application_id: u32,
    pub start_time: f64,
    pub vms: Vec<u32>,
}

/// Describes how many instances of an application are started together with the system.
#[derive(Clone, Debug)]
pub struct InstanceBuilder {
    pub application_id: u32,
    pub count: u32,
}
