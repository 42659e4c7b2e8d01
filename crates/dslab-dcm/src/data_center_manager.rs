//! Main entry point for data center simulation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use dslab_core::context::SimulationContext;
use dslab_core::simulation::Simulation;
use dslab_core::{log_debug, log_error, log_info, log_warn};

use crate::core::application::{ApplicationTier, InstanceBuilder};
use crate::core::common::{ResourceCategory, UtilizationMap};
use crate::core::config::{ApplicationConfig, ConfigError, DataCenterConfig, MachineConfig};
use crate::core::data_center::DataCenter;
use crate::core::load_model::ConstLoadModel;
use crate::core::migration_controller::MigrationController;
use crate::core::migration_stats::MigrationStats;
use crate::core::performance_model::{LoadModelPerformanceModel, PerformanceModel};
use crate::core::placement::VirtualMachinesPlacement;
use crate::core::placement_strategy::{
    placement_strategy_resolver, PlacementError, PlacementRequest, VmPlacementStrategy,
};
use crate::core::power_model::LinearPowerModel;
use crate::core::resource::{ReferenceResource, ResourceView};
use crate::core::vm::VmStatus;

/// Owns the data center model, the placement ledger, placement strategies and the migration controller,
/// and drives them with the injected simulation.
pub struct DataCenterManager {
    data_center: Rc<RefCell<DataCenter>>,
    placement: Rc<RefCell<VirtualMachinesPlacement>>,
    performance_model: Rc<dyn PerformanceModel>,
    initial_strategy: Box<dyn VmPlacementStrategy>,
    incremental_strategy: Box<dyn VmPlacementStrategy>,
    controller: Rc<RefCell<MigrationController>>,
    instance_builders: Vec<InstanceBuilder>,
    reference_share_penalty: f64,
    switch_off_idle_machines: bool,
    initialized: bool,
    sim: Simulation,
    ctx: SimulationContext,
}

impl DataCenterManager {
    /// Builds data center from config, tier utilization follows the tier load models.
    pub fn new(sim: Simulation, config: DataCenterConfig) -> Result<Self, ConfigError> {
        Self::with_performance_model(sim, config, rc!(LoadModelPerformanceModel::new()))
    }

    /// Reads config from YAML file and builds data center.
    pub fn from_config(sim: Simulation, config_file: &str) -> Result<Self, ConfigError> {
        Self::new(sim, DataCenterConfig::from_file(config_file)?)
    }

    pub fn with_performance_model(
        mut sim: Simulation,
        config: DataCenterConfig,
        performance_model: Rc<dyn PerformanceModel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let data_center = rc!(refcell!(DataCenter::new()));
        let placement = rc!(refcell!(VirtualMachinesPlacement::new()));

        let controller = rc!(refcell!(MigrationController::new(
            config.migration.controller,
            placement_strategy_resolver(&config.migration.strategy),
            data_center.clone(),
            placement.clone(),
            performance_model.clone(),
            config.sampling_time,
            sim.create_context("migration_controller"),
        )
        .with_reference_share_penalty(config.reference_share_penalty)
        .with_switch_off_idle_machines(config.switch_off_idle_machines)));
        sim.add_handler("migration_controller", controller.clone());

        let ctx = sim.create_context("data_center_manager");
        let mut manager = Self {
            data_center,
            placement,
            performance_model,
            initial_strategy: placement_strategy_resolver(&config.initial_placement),
            incremental_strategy: placement_strategy_resolver(&config.incremental_placement),
            controller,
            instance_builders: Vec::new(),
            reference_share_penalty: config.reference_share_penalty,
            switch_off_idle_machines: config.switch_off_idle_machines,
            initialized: false,
            sim,
            ctx,
        };

        for machine in config.machines.iter() {
            manager.add_machines_from_config(machine)?;
        }
        for application in config.applications.iter() {
            let application_id = manager.add_application_from_config(application)?;
            if let Some(count) = application.instances {
                manager.instance_builders.push(InstanceBuilder { application_id, count });
            }
        }
        Ok(manager)
    }

    fn add_machines_from_config(&mut self, config: &MachineConfig) -> Result<(), ConfigError> {
        let count = config.count.unwrap_or(1);
        for i in 1..=count {
            let name = match (&config.name, &config.name_prefix) {
                (Some(name), _) if count == 1 => name.clone(),
                (_, Some(prefix)) => format!("{}{}", prefix, i),
                (Some(name), None) => format!("{}{}", name, i),
                (None, None) => format!("pm{}", i),
            };
            let mut resources = BTreeMap::new();
            for (category, resource) in config.resources.iter() {
                let view = match (category, &config.power) {
                    (ResourceCategory::Cpu, Some(power)) => ResourceView::new(
                        resource.capacity,
                        resource.threshold,
                        Box::new(LinearPowerModel::new(power.idle, power.max)),
                    ),
                    _ => ResourceView::without_power(resource.capacity, resource.threshold),
                };
                resources.insert(*category, view);
            }
            self.add_physical_machine(&name, resources)?;
        }
        Ok(())
    }

    fn add_application_from_config(&mut self, config: &ApplicationConfig) -> Result<u32, ConfigError> {
        let reference_resources = config
            .reference
            .iter()
            .map(|(category, resource)| (*category, ReferenceResource::new(resource.capacity, resource.threshold)))
            .collect();
        let tiers = config
            .tiers
            .iter()
            .map(|tier| {
                tier.load.iter().fold(
                    ApplicationTier::new(&tier.name, tier.shares.clone()),
                    |tier, (category, load)| tier.with_load_model(*category, Box::new(ConstLoadModel::new(*load))),
                )
            })
            .collect();
        self.add_application(&config.name, reference_resources, tiers)
    }

    /// Adds physical machine and returns its ID.
    pub fn add_physical_machine(
        &mut self,
        name: &str,
        resources: BTreeMap<ResourceCategory, ResourceView>,
    ) -> Result<u32, ConfigError> {
        let id = self.data_center.borrow_mut().add_physical_machine(name, resources)?;
        log_debug!(self.ctx, "added machine {} with id {}", name, id);
        Ok(id)
    }

    /// Adds application and returns its ID.
    pub fn add_application(
        &mut self,
        name: &str,
        reference_resources: BTreeMap<ResourceCategory, ReferenceResource>,
        tiers: Vec<ApplicationTier>,
    ) -> Result<u32, ConfigError> {
        let id = self
            .data_center
            .borrow_mut()
            .add_application(name, reference_resources, tiers)?;
        log_debug!(self.ctx, "added application {} with id {}", name, id);
        Ok(id)
    }

    /// Registers instances of application started by [`on_system_init`](Self::on_system_init).
    pub fn add_instance_builder(&mut self, application_id: u32, count: u32) {
        self.instance_builders.push(InstanceBuilder { application_id, count });
    }

    /// Starts the configured application instances, places all VMs with the initial strategy
    /// and starts the migration controller.
    ///
    /// Configuration errors raised by the initial strategy are fatal: the created instances are discarded
    /// and the system stays uninitialized.
    pub fn on_system_init(&mut self) -> Result<(), ConfigError> {
        if self.initialized {
            log_warn!(self.ctx, "system is already initialized");
            return Ok(());
        }
        let time = self.ctx.time();
        let mut instance_ids = Vec::new();
        for builder in self.instance_builders.clone() {
            for _ in 0..builder.count {
                let created = self.data_center.borrow_mut().create_instance(builder.application_id, time);
                match created {
                    Ok(instance_id) => instance_ids.push(instance_id),
                    Err(e) => {
                        self.discard_instances(&instance_ids);
                        return Err(e);
                    }
                }
            }
        }

        let vm_ids = self.data_center.borrow().active_vm_ids();
        let utilization = self
            .performance_model
            .sample(&self.data_center.borrow(), &vm_ids, time);
        if let Err(e) = self.place_vms(&vm_ids, &utilization, true) {
            let mut placement = self.placement.borrow_mut();
            for vm_id in vm_ids.iter() {
                placement.remove(*vm_id);
            }
            drop(placement);
            self.discard_instances(&instance_ids);
            return Err(e);
        }
        self.initialized = true;
        log_info!(
            self.ctx,
            "placed {} of {} vms on {} machines",
            self.placement.borrow().vm_count(),
            vm_ids.len(),
            self.placement.borrow().used_machines().len()
        );

        self.controller.borrow_mut().start();
        Ok(())
    }

    /// Stops the migration controller and logs the summary.
    pub fn on_system_finalize(&mut self) {
        self.controller.borrow_mut().stop();
        let controller = self.controller.borrow();
        let stats = controller.stats();
        log_info!(
            self.ctx,
            "finished: {} control runs, {} migrations ({} failed), migration rate {:.3}",
            stats.runs(),
            stats.total_migrations(),
            stats.failed_migrations(),
            stats.migration_rate()
        );
    }

    /// Starts new application instance and returns its ID.
    ///
    /// After the system is initialized, the instance VMs are placed right away with the incremental strategy.
    /// If the strategy reports a configuration error, the instance is discarded.
    pub fn start_application_instance(&mut self, application_id: u32) -> Result<u32, ConfigError> {
        let time = self.ctx.time();
        let instance_id = self.data_center.borrow_mut().create_instance(application_id, time)?;
        if self.initialized {
            let vm_ids = self
                .data_center
                .borrow()
                .instance(instance_id)
                .map(|instance| instance.vms.clone())
                .unwrap_or_default();
            let utilization = self
                .performance_model
                .sample(&self.data_center.borrow(), &vm_ids, time);
            if let Err(e) = self.place_vms(&vm_ids, &utilization, false) {
                self.discard_instances(&[instance_id]);
                return Err(e);
            }
        }
        log_debug!(self.ctx, "started instance {} of application {}", instance_id, application_id);
        Ok(instance_id)
    }

    /// Destroys VMs of application instance and frees their shares.
    pub fn stop_application_instance(&mut self, instance_id: u32) {
        let vm_ids = self.data_center.borrow_mut().destroy_instance(instance_id);
        let mut placement = self.placement.borrow_mut();
        for vm_id in vm_ids.iter() {
            placement.remove(*vm_id);
        }
        if self.switch_off_idle_machines {
            self.data_center.borrow_mut().update_power_states(&placement);
        }
        log_debug!(self.ctx, "stopped instance {} with {} vms", instance_id, vm_ids.len());
    }

    fn discard_instances(&mut self, instance_ids: &[u32]) {
        let mut data_center = self.data_center.borrow_mut();
        let mut placement = self.placement.borrow_mut();
        for instance_id in instance_ids {
            for vm_id in data_center.discard_instance(*instance_id) {
                placement.remove(vm_id);
            }
        }
        if self.switch_off_idle_machines {
            data_center.update_power_states(&placement);
        }
    }

    /// Places VMs with the initial or incremental strategy and updates their status.
    ///
    /// Infeasibility and solver failures leave VMs unplaced, while configuration errors are returned.
    fn place_vms(
        &mut self,
        vm_ids: &[u32],
        utilization: &UtilizationMap,
        initial: bool,
    ) -> Result<(), ConfigError> {
        let mut data_center = self.data_center.borrow_mut();
        let mut placement = self.placement.borrow_mut();
        let strategy = if initial {
            &mut self.initial_strategy
        } else {
            &mut self.incremental_strategy
        };
        let request = PlacementRequest {
            data_center: &data_center,
            vms: vm_ids,
            utilization,
            current: None,
            reference_share_penalty: self.reference_share_penalty,
        };
        let result = strategy.place(&request, &mut placement);
        let unplaced = match result {
            Ok(report) => {
                if !report.is_complete() {
                    log_warn!(
                        self.ctx,
                        "{} strategy could not place vms {:?}",
                        strategy.name(),
                        report.unplaced
                    );
                }
                report.unplaced
            }
            Err(PlacementError::InsufficientMachines { vms, machines }) => {
                log_error!(self.ctx, "{} strategy rejected {} vms on {} machines", strategy.name(), vms, machines);
                return Err(ConfigError::InsufficientMachines { vms, machines });
            }
            Err(PlacementError::Config(e)) => {
                log_error!(self.ctx, "{} strategy failed: {}", strategy.name(), e);
                return Err(e);
            }
            Err(e) => {
                log_warn!(self.ctx, "{} strategy failed: {}", strategy.name(), e);
                vm_ids.iter().filter(|vm_id| !placement.is_placed(**vm_id)).copied().collect()
            }
        };
        for vm_id in vm_ids {
            let status = if unplaced.contains(vm_id) || !placement.is_placed(*vm_id) {
                VmStatus::Unplaced
            } else {
                VmStatus::Running
            };
            if let Some(vm) = data_center.vm_mut(*vm_id) {
                vm.set_status(status);
            }
        }
        if self.switch_off_idle_machines {
            data_center.update_power_states(&placement);
        }
        Ok(())
    }

    /// Performs the specified number of steps through the simulation.
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Steps through the simulation with duration limit.
    pub fn step_for_duration(&mut self, duration: f64) {
        self.sim.step_for_duration(duration);
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn data_center(&self) -> Rc<RefCell<DataCenter>> {
        self.data_center.clone()
    }

    pub fn placement(&self) -> Rc<RefCell<VirtualMachinesPlacement>> {
        self.placement.clone()
    }

    pub fn migration_controller(&self) -> Rc<RefCell<MigrationController>> {
        self.controller.clone()
    }

    /// Returns a snapshot of migration statistics.
    pub fn migration_stats(&self) -> MigrationStats {
        self.controller.borrow().stats().clone()
    }

    /// Returns the total power consumption at the allocated shares.
    pub fn power_consumption(&self) -> f64 {
        self.data_center.borrow().power_consumption(&self.placement.borrow())
    }
}
