use std::collections::BTreeMap;

use dslab_dcm::core::application::ApplicationTier;
use dslab_dcm::core::common::{ResourceCategory, UtilizationMap};
use dslab_dcm::core::config::PlacementStrategyConfig;
use dslab_dcm::core::data_center::DataCenter;
use dslab_dcm::core::placement::VirtualMachinesPlacement;
use dslab_dcm::core::placement_strategies::best_fit::BestFit;
use dslab_dcm::core::placement_strategies::best_fit_decreasing::BestFitDecreasing;
use dslab_dcm::core::placement_strategies::first_fit::FirstFit;
use dslab_dcm::core::placement_strategies::first_fit_scale_out::FirstFitScaleOut;
use dslab_dcm::core::placement_strategy::{
    placement_strategy_resolver, PlacementError, PlacementRequest, VmPlacementStrategy,
};
use dslab_dcm::core::resource::{ReferenceResource, ResourceView};

fn cpu_machine(capacity: f64) -> BTreeMap<ResourceCategory, ResourceView> {
    BTreeMap::from([(ResourceCategory::Cpu, ResourceView::without_power(capacity, 1.))])
}

fn cpu_reference(capacity: f64) -> BTreeMap<ResourceCategory, ReferenceResource> {
    BTreeMap::from([(ResourceCategory::Cpu, ReferenceResource::new(capacity, 1.))])
}

fn cpu_tier(name: &str, share: f64) -> ApplicationTier {
    ApplicationTier::new(name, BTreeMap::from([(ResourceCategory::Cpu, share)]))
}

/// Builds data center with machines of the given CPU capacities and a single instance of application
/// with tiers demanding the given CPU shares of reference capacity 10.
fn data_center(machines: &[f64], shares: &[f64]) -> DataCenter {
    let mut dc = DataCenter::new();
    for (i, capacity) in machines.iter().enumerate() {
        dc.add_physical_machine(&format!("pm{}", i), cpu_machine(*capacity)).unwrap();
    }
    let tiers = shares
        .iter()
        .enumerate()
        .map(|(i, share)| cpu_tier(&format!("tier{}", i), *share))
        .collect();
    let app = dc.add_application("app", cpu_reference(10.), tiers).unwrap();
    dc.create_instance(app, 0.).unwrap();
    dc
}

fn place(
    strategy: &mut dyn VmPlacementStrategy,
    dc: &DataCenter,
    utilization: &UtilizationMap,
    penalty: f64,
) -> Result<VirtualMachinesPlacement, PlacementError> {
    let vms = dc.active_vm_ids();
    let request = PlacementRequest {
        data_center: dc,
        vms: &vms,
        utilization,
        current: None,
        reference_share_penalty: penalty,
    };
    let mut placement = VirtualMachinesPlacement::new();
    strategy.place(&request, &mut placement)?;
    Ok(placement)
}

#[test]
// Machines with capacities 10 and 5, VMs demanding 6, 3 and 4 units of reference capacity 10.
// Best Fit Decreasing places the largest VMs first on the largest machine.
fn test_best_fit_decreasing() {
    let dc = data_center(&[10., 5.], &[0.6, 0.3, 0.4]);
    let placement = place(&mut BestFitDecreasing::new(), &dc, &UtilizationMap::new(), 0.).unwrap();

    assert_eq!(placement.vms_on(0), vec![0, 2]);
    assert_eq!(placement.vms_on(1), vec![1]);
    assert_eq!(placement.shares_of(0).unwrap()[&ResourceCategory::Cpu], 0.6);
    assert_eq!(placement.shares_of(2).unwrap()[&ResourceCategory::Cpu], 0.4);
    assert_eq!(placement.shares_of(1).unwrap()[&ResourceCategory::Cpu], 0.6);
    assert_eq!(placement.share_sum(0, ResourceCategory::Cpu), 1.);
}

#[test]
// Best Fit keeps the VM order and tries the largest machine first.
fn test_best_fit() {
    let dc = data_center(&[5., 10.], &[0.6, 0.3, 0.4]);
    let placement = place(&mut BestFit::new(), &dc, &UtilizationMap::new(), 0.).unwrap();

    assert_eq!(placement.machine_of(0), Some(1));
    assert_eq!(placement.machine_of(1), Some(1));
    assert_eq!(placement.machine_of(2), Some(0));
    assert_eq!(placement.shares_of(2).unwrap()[&ResourceCategory::Cpu], 0.8);
}

#[test]
// First Fit uses machines in enumeration order.
fn test_first_fit() {
    let dc = data_center(&[5., 10.], &[0.3, 0.3, 0.4]);
    let placement = place(&mut FirstFit::new(false), &dc, &UtilizationMap::new(), 0.).unwrap();

    assert_eq!(placement.vms_on(0), vec![0]);
    assert_eq!(placement.vms_on(1), vec![1, 2]);
}

#[test]
// VMs which fit nowhere are reported and left out of the placement.
fn test_unplaced_vms_are_reported() {
    let dc = data_center(&[5.], &[0.4, 0.4]);
    let vms = dc.active_vm_ids();
    let utilization = UtilizationMap::new();
    let request = PlacementRequest {
        data_center: &dc,
        vms: &vms,
        utilization: &utilization,
        current: None,
        reference_share_penalty: 0.,
    };
    let mut placement = VirtualMachinesPlacement::new();
    let report = FirstFit::new(false).place(&request, &mut placement).unwrap();

    assert_eq!(report.placed, vec![0]);
    assert_eq!(report.unplaced, vec![1]);
    assert!(!report.is_complete());
    assert!(!placement.is_placed(1));
}

#[test]
// With utilization check, First Fit skips machines where the measured load does not fit.
fn test_first_fit_with_utilization_check() {
    let dc = data_center(&[10., 10.], &[0.3, 0.3]);
    let mut utilization = UtilizationMap::new();
    utilization.insert(0, BTreeMap::from([(ResourceCategory::Cpu, 0.3)]));
    utilization.insert(1, BTreeMap::from([(ResourceCategory::Cpu, 0.8)]));

    let placement = place(&mut FirstFit::new(false), &dc, &utilization, 0.).unwrap();
    assert_eq!(placement.vms_on(0), vec![0, 1]);

    let placement = place(&mut FirstFit::new(true), &dc, &utilization, 0.).unwrap();
    assert_eq!(placement.vms_on(0), vec![0]);
    assert_eq!(placement.vms_on(1), vec![1]);
}

#[test]
// Scale-out strategy puts each VM on its own machine.
fn test_first_fit_scale_out() {
    let dc = data_center(&[10., 10., 10.], &[0.1, 0.1]);
    let placement = place(&mut FirstFitScaleOut::new(), &dc, &UtilizationMap::new(), 0.).unwrap();
    assert_eq!(placement.machine_of(0), Some(0));
    assert_eq!(placement.machine_of(1), Some(1));
    assert!(placement.is_empty_machine(2));

    let dc = data_center(&[10.], &[0.1, 0.1]);
    let result = place(&mut FirstFitScaleOut::new(), &dc, &UtilizationMap::new(), 0.);
    assert!(matches!(
        result,
        Err(PlacementError::InsufficientMachines { vms: 2, machines: 1 })
    ));
}

#[test]
// Penalty inflates the shares before placement.
fn test_reference_share_penalty() {
    let dc = data_center(&[10.], &[0.5, 0.4]);
    let placement = place(&mut FirstFit::new(false), &dc, &UtilizationMap::new(), 0.2).unwrap();

    assert_eq!(placement.shares_of(0).unwrap()[&ResourceCategory::Cpu], 0.6);
    assert!(!placement.is_placed(1));
}

#[test]
// Strategies are deterministic given their inputs.
fn test_strategies_are_deterministic() {
    let dc = data_center(&[8., 4., 8., 2.], &[0.3, 0.1, 0.25, 0.2, 0.15, 0.35]);
    for config in [
        PlacementStrategyConfig::BestFit,
        PlacementStrategyConfig::BestFitDecreasing,
        PlacementStrategyConfig::FirstFit {
            check_utilization: false,
        },
    ] {
        let first = place(
            placement_strategy_resolver(&config).as_mut(),
            &dc,
            &UtilizationMap::new(),
            0.1,
        )
        .unwrap();
        let second = place(
            placement_strategy_resolver(&config).as_mut(),
            &dc,
            &UtilizationMap::new(),
            0.1,
        )
        .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.vm_count(), 6);
    }
}

#[test]
// VMs already present in the placement are left untouched.
fn test_placed_vms_are_kept() {
    let dc = data_center(&[10., 10.], &[0.5, 0.5]);
    let vms = dc.active_vm_ids();
    let utilization = UtilizationMap::new();
    let request = PlacementRequest {
        data_center: &dc,
        vms: &vms,
        utilization: &utilization,
        current: None,
        reference_share_penalty: 0.,
    };
    let mut placement = VirtualMachinesPlacement::new();
    placement.try_place(0, 1, BTreeMap::from([(ResourceCategory::Cpu, 0.5)]));
    let report = FirstFit::new(false).place(&request, &mut placement).unwrap();

    assert_eq!(report.placed, vec![0, 1]);
    assert_eq!(placement.machine_of(0), Some(1));
    assert_eq!(placement.machine_of(1), Some(0));
}
