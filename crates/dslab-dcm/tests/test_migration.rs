use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use dslab_core::simulation::Simulation;

use dslab_dcm::core::application::ApplicationTier;
use dslab_dcm::core::common::{ResourceCategory, ResourceShares};
use dslab_dcm::core::config::{DataCenterConfig, MigrationControllerKind};
use dslab_dcm::core::data_center::DataCenter;
use dslab_dcm::core::load_model::StepLoadModel;
use dslab_dcm::core::migration_controller::{ControllerState, MigrationController};
use dslab_dcm::core::migration_stats::MigrationStats;
use dslab_dcm::core::performance_model::LoadModelPerformanceModel;
use dslab_dcm::core::placement::VirtualMachinesPlacement;
use dslab_dcm::core::placement_strategy::{PlacementError, PlacementReport, PlacementRequest, VmPlacementStrategy};
use dslab_dcm::core::resource::{ReferenceResource, ResourceView};
use dslab_dcm::core::vm::VmStatus;
use dslab_dcm::data_center_manager::DataCenterManager;

const CONSOLIDATION: &str = "
sampling_time: 5
initial_placement:
  type: FirstFit
migration:
  controller: Default
  strategy:
    type: BestFitDecreasing
machines:
  - name: small
    resources:
      cpu:
        capacity: 5
  - name: big
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
          cpu: 0.3
    instances: 1
";

fn cpu(share: f64) -> ResourceShares {
    BTreeMap::from([(ResourceCategory::Cpu, share)])
}

/// Strategy which always proposes the same placement.
struct FixedTarget {
    target: Vec<(u32, u32, f64)>,
}

impl VmPlacementStrategy for FixedTarget {
    fn name(&self) -> &str {
        "FixedTarget"
    }

    fn place(
        &mut self,
        _request: &PlacementRequest,
        placement: &mut VirtualMachinesPlacement,
    ) -> Result<PlacementReport, PlacementError> {
        let mut report = PlacementReport::default();
        for (vm_id, machine_id, share) in self.target.iter() {
            if placement.try_place(*vm_id, *machine_id, cpu(*share)) {
                report.placed.push(*vm_id);
            } else {
                report.unplaced.push(*vm_id);
            }
        }
        Ok(report)
    }
}

/// Three machines with CPU capacity 10 and two VMs demanding 0.6 of reference capacity 10.
fn data_center() -> DataCenter {
    let mut dc = DataCenter::new();
    for name in ["a", "b", "c"] {
        dc.add_physical_machine(
            name,
            BTreeMap::from([(ResourceCategory::Cpu, ResourceView::without_power(10., 1.))]),
        )
        .unwrap();
    }
    let app = dc
        .add_application(
            "app",
            BTreeMap::from([(ResourceCategory::Cpu, ReferenceResource::new(10., 1.))]),
            vec![
                ApplicationTier::new("t1", cpu(0.6)),
                ApplicationTier::new("t2", cpu(0.6)),
            ],
        )
        .unwrap();
    dc.create_instance(app, 0.).unwrap();
    dc
}

/// Runs controller with fixed target for the given duration, VM 0 starts on machine 0 and VM 1 on machine 1.
/// Control steps happen every 5 seconds.
fn run_fixed_target(
    target: Vec<(u32, u32, f64)>,
    duration: f64,
) -> (MigrationStats, Rc<RefCell<VirtualMachinesPlacement>>) {
    let mut sim = Simulation::new(123);
    let data_center = rc!(refcell!(data_center()));
    let placement = rc!(refcell!(VirtualMachinesPlacement::new()));
    placement.borrow_mut().try_place(0, 0, cpu(0.6));
    placement.borrow_mut().try_place(1, 1, cpu(0.6));

    let controller = rc!(refcell!(MigrationController::new(
        MigrationControllerKind::Default,
        Box::new(FixedTarget { target }),
        data_center,
        placement.clone(),
        rc!(LoadModelPerformanceModel::new()),
        5.,
        sim.create_context("migration_controller"),
    )));
    sim.add_handler("migration_controller", controller.clone());
    controller.borrow_mut().start();
    sim.step_for_duration(duration);
    controller.borrow_mut().stop();

    let stats = controller.borrow().stats().clone();
    (stats, placement)
}

#[test]
// VMs from the small machine are consolidated on the big one at the first control step.
fn test_consolidation() {
    let config = DataCenterConfig::from_yaml(CONSOLIDATION).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    manager.on_system_init().unwrap();
    assert_eq!(manager.placement().borrow().vms_on(0), vec![0, 1]);

    manager.step_for_duration(12.);
    let placement = manager.placement();
    assert_eq!(placement.borrow().vms_on(1), vec![0, 1]);
    assert!(placement.borrow().is_empty_machine(0));
    assert_eq!(placement.borrow().shares_of(1).unwrap()[&ResourceCategory::Cpu], 0.3);

    let stats = manager.migration_stats();
    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.total_migrations(), 2);
    assert_eq!(stats.last_run_migrations(), 0);
    assert_eq!(stats.migration_rate(), 1.);
    assert_eq!(stats.history()[0].time, 5.);
    assert_eq!(stats.history()[0].active_machines, 1);

    let data_center = manager.data_center();
    assert_eq!(data_center.borrow().vm(0).unwrap().status(), VmStatus::Running);
    let controller = manager.migration_controller();
    assert_eq!(controller.borrow().state(), ControllerState::Idle);
    assert!(controller.borrow().is_running());
}

#[test]
// Dummy controller samples the utilization but never migrates.
fn test_dummy_controller() {
    let config = CONSOLIDATION.replace("controller: Default", "controller: Dummy");
    let config = DataCenterConfig::from_yaml(&config).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    manager.on_system_init().unwrap();
    manager.step_for_duration(12.);

    let stats = manager.migration_stats();
    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.total_migrations(), 0);
    assert_eq!(manager.placement().borrow().vms_on(0), vec![0, 1]);

    let controller = manager.migration_controller();
    let controller = controller.borrow();
    assert_eq!(controller.kind(), MigrationControllerKind::Dummy);
    assert_eq!(controller.last_utilization().len(), 2);
    assert_eq!(controller.last_utilization()[&1][&ResourceCategory::Cpu], 0.3);
}

#[test]
// Stopped controller ignores the pending control step.
fn test_stopped_controller() {
    let config = DataCenterConfig::from_yaml(CONSOLIDATION).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    manager.on_system_init().unwrap();
    manager.on_system_finalize();
    manager.step_for_duration(12.);

    assert_eq!(manager.migration_stats().runs(), 0);
    assert_eq!(manager.placement().borrow().vms_on(0), vec![0, 1]);
    assert!(!manager.migration_controller().borrow().is_running());
}

#[test]
// Restarted controller keeps a single chain of control steps.
fn test_controller_restart() {
    let config = DataCenterConfig::from_yaml(CONSOLIDATION).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    manager.on_system_init().unwrap();
    manager.step_for_duration(7.);
    assert_eq!(manager.current_time(), 5.);

    let controller = manager.migration_controller();
    controller.borrow_mut().stop();
    controller.borrow_mut().start();
    controller.borrow_mut().start();
    manager.step_for_duration(15.);

    let stats = manager.migration_stats();
    let times: Vec<f64> = stats.history().iter().map(|record| record.time).collect();
    assert_eq!(times, vec![5., 10., 15., 20.]);
    assert_eq!(stats.runs(), 4);
    assert_eq!(stats.migration_rate(), 0.5);
}

#[test]
// Load growth detected by sampling makes the controller move a VM to another machine.
fn test_migration_on_load_growth() {
    let config = DataCenterConfig::from_yaml(
        "
sampling_time: 5
initial_placement:
  type: FirstFit
  check_utilization: true
migration:
  controller: Default
  strategy:
    type: FirstFit
    check_utilization: true
",
    )
    .unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    for name in ["m0", "m1"] {
        manager
            .add_physical_machine(
                name,
                BTreeMap::from([(ResourceCategory::Cpu, ResourceView::without_power(10., 1.))]),
            )
            .unwrap();
    }
    let tiers = ["t1", "t2"]
        .iter()
        .map(|name| {
            ApplicationTier::new(name, cpu(0.4)).with_load_model(
                ResourceCategory::Cpu,
                Box::new(StepLoadModel::new(0.5, vec![(10., 2.)])),
            )
        })
        .collect();
    let app = manager
        .add_application(
            "app",
            BTreeMap::from([(ResourceCategory::Cpu, ReferenceResource::new(10., 1.))]),
            tiers,
        )
        .unwrap();
    manager.add_instance_builder(app, 1);
    manager.on_system_init().unwrap();
    assert_eq!(manager.placement().borrow().vms_on(0), vec![0, 1]);

    manager.step_for_duration(7.);
    assert_eq!(manager.migration_stats().total_migrations(), 0);
    assert_eq!(manager.placement().borrow().vms_on(0), vec![0, 1]);

    manager.step_for_duration(10.);
    assert_eq!(manager.placement().borrow().machine_of(0), Some(0));
    assert_eq!(manager.placement().borrow().machine_of(1), Some(1));
    let stats = manager.migration_stats();
    assert_eq!(stats.runs(), 3);
    assert_eq!(stats.total_migrations(), 1);
    assert_eq!(stats.last_run_migrations(), 0);
}

#[test]
// Migration blocked by another VM fails and is not retried until the next control step.
fn test_dependent_migrations() {
    let target = vec![(0, 1, 0.6), (1, 2, 0.6)];
    let (stats, placement) = run_fixed_target(target.clone(), 6.);
    assert_eq!(placement.borrow().machine_of(0), Some(0));
    assert_eq!(placement.borrow().machine_of(1), Some(2));
    assert_eq!(stats.runs(), 1);
    assert_eq!(stats.total_migrations(), 1);
    assert_eq!(stats.failed_migrations(), 1);

    let (stats, placement) = run_fixed_target(target, 11.);
    assert_eq!(placement.borrow().machine_of(0), Some(1));
    assert_eq!(placement.borrow().machine_of(1), Some(2));
    assert!(placement.borrow().is_empty_machine(0));
    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.total_migrations(), 2);
    assert_eq!(stats.failed_migrations(), 1);
    assert_eq!(stats.history()[1].migrations, 1);
    assert_eq!(stats.history()[1].failed_migrations, 0);
}

#[test]
// Swap of two VMs which do not fit together is not possible, both VMs stay in place.
fn test_deadlocked_swap() {
    let (stats, placement) = run_fixed_target(vec![(0, 1, 0.6), (1, 0, 0.6)], 6.);
    assert_eq!(placement.borrow().machine_of(0), Some(0));
    assert_eq!(placement.borrow().machine_of(1), Some(1));
    assert_eq!(placement.borrow().share_sum(0, ResourceCategory::Cpu), 0.6);
    assert_eq!(stats.total_migrations(), 0);
    assert_eq!(stats.failed_migrations(), 2);
}

#[test]
// Changed share on the same machine is applied without migration.
fn test_share_update() {
    let (stats, placement) = run_fixed_target(vec![(0, 0, 0.8), (1, 1, 0.6)], 6.);
    assert_eq!(placement.borrow().shares_of(0).unwrap()[&ResourceCategory::Cpu], 0.8);
    assert_eq!(stats.total_migrations(), 0);
    assert_eq!(stats.share_updates(), 1);
}

#[test]
// Controller history can be exported to CSV.
fn test_stats_export() {
    let config = DataCenterConfig::from_yaml(CONSOLIDATION).unwrap();
    let mut manager = DataCenterManager::new(Simulation::new(123), config).unwrap();
    manager.on_system_init().unwrap();
    manager.step_for_duration(12.);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    manager.migration_stats().save_csv(path.to_str().unwrap()).unwrap();
    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("time,migrations,failed_migrations"));
}
