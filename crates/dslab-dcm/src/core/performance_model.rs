//! Source of per-VM resource utilization measurements.

use std::collections::BTreeMap;

use crate::core::common::{ResourceCategory, UtilizationMap};
use crate::core::data_center::DataCenter;

/// Performance model provides the current utilization of application tiers.
///
/// The utilization is expressed as a fraction of the application reference resource, so it can be compared
/// with the VM reference shares and scaled onto machines in the same way.
pub trait PerformanceModel {
    fn utilization(&self, data_center: &DataCenter, vm_id: u32, category: ResourceCategory, time: f64) -> f64;

    /// Samples utilization of all resources demanded by the given VMs.
    fn sample(&self, data_center: &DataCenter, vm_ids: &[u32], time: f64) -> UtilizationMap {
        let mut result = UtilizationMap::new();
        for vm_id in vm_ids {
            let Some(vm) = data_center.vm(*vm_id) else {
                continue;
            };
            let usage: BTreeMap<ResourceCategory, f64> = vm
                .reference_shares()
                .keys()
                .map(|category| (*category, self.utilization(data_center, *vm_id, *category, time)))
                .collect();
            result.insert(*vm_id, usage);
        }
        result
    }
}

/// Computes utilization as the tier share multiplied by the load given by the tier load model.
#[derive(Clone, Default)]
pub struct LoadModelPerformanceModel;

impl LoadModelPerformanceModel {
    pub fn new() -> Self {
        Self {}
    }
}

impl PerformanceModel for LoadModelPerformanceModel {
    fn utilization(&self, data_center: &DataCenter, vm_id: u32, category: ResourceCategory, time: f64) -> f64 {
        let Some(vm) = data_center.vm(vm_id) else {
            return 0.;
        };
        let Some(application) = data_center.application(vm.application_id) else {
            return 0.;
        };
        let share = vm.reference_shares().get(&category).copied().unwrap_or(0.);
        let time_from_start = time - data_center.vm_start_time(vm_id);
        share * application.tier(vm.tier).resource_load(category, time, time_from_start)
    }
}
