use dslab_core::simulation::Simulation;

use dslab_dcm::core::common::ResourceCategory;
use dslab_dcm::core::config::{ConfigError, DataCenterConfig, PlacementStrategyConfig};
use dslab_dcm::core::physical_machine::PowerState;
use dslab_dcm::core::vm::VmStatus;
use dslab_dcm::data_center_manager::DataCenterManager;

const SCALE_OUT: &str = "
initial_placement:
  type: FirstFitScaleOut
incremental_placement:
  type: FirstFitScaleOut
machines:
  - name: pm
    resources:
      cpu:
        capacity: 10
applications:
  - name: app
    reference:
      cpu:
        capacity: 10
    tiers:
      - name: t1
        shares:
          cpu: 0.2
      - name: t2
        shares:
          cpu: 0.2
    instances: 1
";

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn manager() -> DataCenterManager {
    DataCenterManager::from_config(Simulation::new(123), &name_wrapper("config.yaml")).unwrap()
}

#[test]
// Defaults are used for absent parameters.
fn test_config_defaults() {
    let config = DataCenterConfig::from_file(&name_wrapper("minimal.yaml")).unwrap();
    assert_eq!(config.sampling_time, 10.);
    assert_eq!(config.reference_share_penalty, 0.);
    assert!(!config.switch_off_idle_machines);
    assert_eq!(config.initial_placement, PlacementStrategyConfig::BestFitDecreasing);
    assert_eq!(config.machines.len(), 1);
    assert!(config.applications.is_empty());
}

#[test]
fn test_config_errors() {
    assert!(matches!(
        DataCenterConfig::from_file(&name_wrapper("invalid_sampling.yaml")),
        Err(ConfigError::InvalidValue(_, _))
    ));
    assert!(matches!(
        DataCenterConfig::from_file(&name_wrapper("missing.yaml")),
        Err(ConfigError::Io(_, _))
    ));
    assert!(matches!(
        DataCenterConfig::from_yaml("sampling_time: [1, 2]"),
        Err(ConfigError::Parse(_, _))
    ));

    let config = DataCenterConfig::from_file(&name_wrapper("invalid_threshold.yaml")).unwrap();
    assert!(matches!(
        DataCenterManager::new(Simulation::new(123), config),
        Err(ConfigError::InvalidResource {
            category: ResourceCategory::Cpu,
            ..
        })
    ));
}

#[test]
// Machines and applications are built from config, instances are created at system start.
fn test_build_from_config() {
    let manager = manager();
    let data_center = manager.data_center();
    let data_center = data_center.borrow();
    let names: Vec<&str> = data_center.machines().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["big", "small1", "small2"]);
    assert_eq!(data_center.machine(1).unwrap().capacity(ResourceCategory::Memory), 32.);
    assert!(data_center.active_vm_ids().is_empty());
    assert!(!manager.is_initialized());
}

#[test]
// Initial placement packs the backend tiers on the big machine.
fn test_initial_placement() {
    let mut manager = manager();
    manager.on_system_init().unwrap();
    assert!(manager.is_initialized());

    let placement = manager.placement();
    let placement = placement.borrow();
    assert_eq!(placement.vms_on(0), vec![1, 3]);
    assert_eq!(placement.vms_on(1), vec![0]);
    assert_eq!(placement.vms_on(2), vec![2]);
    assert_eq!(placement.shares_of(0).unwrap()[&ResourceCategory::Memory], 0.25);
    assert_eq!(placement.shares_of(1).unwrap()[&ResourceCategory::Memory], 0.25);
    assert!((manager.power_consumption() - 372.).abs() < 1e-6);

    let data_center = manager.data_center();
    for vm_id in 0..4 {
        assert_eq!(data_center.borrow().vm(vm_id).unwrap().status(), VmStatus::Running);
    }
}

#[test]
// Repeated initialization does nothing.
fn test_repeated_init() {
    let mut manager = manager();
    manager.on_system_init().unwrap();
    manager.on_system_init().unwrap();
    assert_eq!(manager.data_center().borrow().active_vm_ids().len(), 4);
}

#[test]
// Instances started and stopped at runtime are handled by incremental placement and the migration controller.
fn test_instance_lifecycle() {
    let mut manager = manager();
    manager.on_system_init().unwrap();
    manager.step_for_duration(15.);
    assert_eq!(manager.migration_stats().runs(), 1);
    assert_eq!(manager.migration_stats().total_migrations(), 0);

    // no room for another instance
    let instance_id = manager.start_application_instance(0).unwrap();
    assert_eq!(instance_id, 2);
    {
        let data_center = manager.data_center();
        let data_center = data_center.borrow();
        assert_eq!(data_center.vm(4).unwrap().status(), VmStatus::Unplaced);
        assert_eq!(data_center.vm(5).unwrap().status(), VmStatus::Unplaced);
    }
    assert!(!manager.placement().borrow().is_placed(4));

    manager.stop_application_instance(0);
    {
        let data_center = manager.data_center();
        let data_center = data_center.borrow();
        assert_eq!(data_center.vm(0).unwrap().status(), VmStatus::Destroyed);
        assert_eq!(data_center.vm(1).unwrap().status(), VmStatus::Destroyed);
        assert_eq!(data_center.machine(1).unwrap().power_state(), PowerState::Off);
        assert_eq!(data_center.active_vm_ids(), vec![2, 3, 4, 5]);
    }
    assert_eq!(manager.placement().borrow().vms_on(0), vec![3]);
    assert!(manager.placement().borrow().is_empty_machine(1));

    // the next control step places the pending VMs
    manager.step_for_duration(10.);
    let stats = manager.migration_stats();
    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.total_migrations(), 1);
    assert_eq!(stats.history()[1].new_placements, 2);
    assert_eq!(stats.history()[1].unplaced_vms, 0);

    let placement = manager.placement();
    let placement = placement.borrow();
    assert_eq!(placement.vms_on(0), vec![3, 5]);
    assert_eq!(placement.vms_on(1), vec![2]);
    assert_eq!(placement.vms_on(2), vec![4]);
    let data_center = manager.data_center();
    assert_eq!(data_center.borrow().machine(1).unwrap().power_state(), PowerState::On);
    assert_eq!(data_center.borrow().vm(4).unwrap().status(), VmStatus::Running);
}

#[test]
// Stopping unknown instance changes nothing.
fn test_stop_unknown_instance() {
    let mut manager = manager();
    manager.on_system_init().unwrap();
    manager.stop_application_instance(42);
    assert_eq!(manager.placement().borrow().vm_count(), 4);
}

#[test]
fn test_unknown_application() {
    let mut manager = manager();
    assert!(matches!(
        manager.start_application_instance(7),
        Err(ConfigError::UnknownApplication(7))
    ));
}

#[test]
// Scale-out with more VMs than machines fails the initialization and leaves nothing behind.
fn test_scale_out_insufficient_machines() {
    let config = DataCenterConfig::from_yaml(SCALE_OUT).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    assert!(matches!(
        manager.on_system_init(),
        Err(ConfigError::InsufficientMachines { vms: 2, machines: 1 })
    ));
    assert!(!manager.is_initialized());
    assert_eq!(manager.placement().borrow().vm_count(), 0);
    assert!(manager.data_center().borrow().active_vm_ids().is_empty());
    assert!(manager.data_center().borrow().vm(0).is_none());
    assert!(!manager.migration_controller().borrow().is_running());
}

#[test]
// Instance which does not fit the scale-out strategy is discarded.
fn test_scale_out_instance_discarded() {
    let config = DataCenterConfig::from_yaml(&SCALE_OUT.replace("    instances: 1\n", "")).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    manager.on_system_init().unwrap();
    assert!(matches!(
        manager.start_application_instance(0),
        Err(ConfigError::InsufficientMachines { vms: 2, machines: 1 })
    ));
    assert!(manager.data_center().borrow().active_vm_ids().is_empty());
    assert_eq!(manager.placement().borrow().vm_count(), 0);
    assert!(manager.migration_controller().borrow().is_running());
}
