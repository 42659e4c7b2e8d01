//! Periodic migration control.

use std::cell::RefCell;
use std::rc::Rc;

use dslab_core::cast;
use dslab_core::context::SimulationContext;
use dslab_core::event::{Event, EventId};
use dslab_core::handler::EventHandler;
use dslab_core::{log_debug, log_error, log_info, log_trace, log_warn};

use crate::core::common::UtilizationMap;
use crate::core::config::MigrationControllerKind;
use crate::core::data_center::DataCenter;
use crate::core::events::ControlTick;
use crate::core::migration_stats::{ControlRunRecord, MigrationStats};
use crate::core::performance_model::PerformanceModel;
use crate::core::placement::{PlacementEntry, VirtualMachinesPlacement};
use crate::core::placement_strategy::{PlacementError, PlacementRequest, VmPlacementStrategy};
use crate::core::vm::VmStatus;

/// Phase of the controller run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Sampling,
    Deciding,
    Applying,
}

/// Samples VM utilization every `sampling_time` seconds, computes a new placement with the migration strategy
/// and migrates VMs whose machine has changed.
///
/// The dummy controller only samples utilization and never changes the placement.
pub struct MigrationController {
    kind: MigrationControllerKind,
    strategy: Box<dyn VmPlacementStrategy>,
    data_center: Rc<RefCell<DataCenter>>,
    placement: Rc<RefCell<VirtualMachinesPlacement>>,
    performance_model: Rc<dyn PerformanceModel>,
    sampling_time: f64,
    reference_share_penalty: f64,
    switch_off_idle_machines: bool,
    state: ControllerState,
    running: bool,
    pending_tick: Option<EventId>,
    utilization: UtilizationMap,
    stats: MigrationStats,
    ctx: SimulationContext,
}

impl MigrationController {
    pub fn new(
        kind: MigrationControllerKind,
        strategy: Box<dyn VmPlacementStrategy>,
        data_center: Rc<RefCell<DataCenter>>,
        placement: Rc<RefCell<VirtualMachinesPlacement>>,
        performance_model: Rc<dyn PerformanceModel>,
        sampling_time: f64,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            kind,
            strategy,
            data_center,
            placement,
            performance_model,
            sampling_time,
            reference_share_penalty: 0.,
            switch_off_idle_machines: false,
            state: ControllerState::Idle,
            running: false,
            pending_tick: None,
            utilization: UtilizationMap::new(),
            stats: MigrationStats::new(),
            ctx,
        }
    }

    pub fn with_reference_share_penalty(mut self, penalty: f64) -> Self {
        self.reference_share_penalty = penalty;
        self
    }

    pub fn with_switch_off_idle_machines(mut self, enabled: bool) -> Self {
        self.switch_off_idle_machines = enabled;
        self
    }

    pub fn id(&self) -> u32 {
        self.ctx.id()
    }

    pub fn kind(&self) -> MigrationControllerKind {
        self.kind
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> &MigrationStats {
        &self.stats
    }

    /// Returns the utilization sampled in the last run.
    pub fn last_utilization(&self) -> &UtilizationMap {
        &self.utilization
    }

    /// Schedules the first run after one sampling period.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        log_info!(
            self.ctx,
            "started {:?} controller with {} strategy, sampling time {}",
            self.kind,
            self.strategy.name(),
            self.sampling_time
        );
        self.pending_tick = Some(self.ctx.emit_self(ControlTick {}, self.sampling_time));
    }

    /// Stops the periodic runs and cancels the pending run.
    pub fn stop(&mut self) {
        if let Some(event_id) = self.pending_tick.take() {
            self.ctx.cancel_event(event_id);
        }
        if self.running {
            self.running = false;
            log_info!(self.ctx, "stopped after {} runs", self.stats.runs());
        }
    }

    fn run(&mut self, event_id: EventId) {
        if self.pending_tick != Some(event_id) {
            log_trace!(self.ctx, "ignoring stale control tick {}", event_id);
            return;
        }
        self.pending_tick = None;
        let time = self.ctx.time();

        self.state = ControllerState::Sampling;
        let vm_ids = self.data_center.borrow().active_vm_ids();
        self.utilization = self
            .performance_model
            .sample(&self.data_center.borrow(), &vm_ids, time);
        log_debug!(self.ctx, "sampled utilization of {} vms", vm_ids.len());

        let mut record = ControlRunRecord {
            time,
            ..Default::default()
        };
        if self.kind == MigrationControllerKind::Default {
            self.state = ControllerState::Deciding;
            match self.decide(&vm_ids) {
                Ok(target) => {
                    self.state = ControllerState::Applying;
                    self.apply(&target, &mut record);
                }
                Err(e) => {
                    log_warn!(self.ctx, "keeping current placement, {} strategy failed: {}", self.strategy.name(), e);
                    record.decision_failed = true;
                }
            }
        }
        self.summarize(&vm_ids, &mut record);
        if record.migrations > 0 || record.failed_migrations > 0 {
            log_info!(
                self.ctx,
                "performed {} migrations, {} failed",
                record.migrations,
                record.failed_migrations
            );
        }
        self.stats.record_run(record);
        self.state = ControllerState::Idle;

        self.pending_tick = Some(self.ctx.emit_self(ControlTick {}, self.sampling_time));
    }

    /// Computes target placement of all active VMs from scratch.
    fn decide(&mut self, vm_ids: &[u32]) -> Result<VirtualMachinesPlacement, PlacementError> {
        let data_center = self.data_center.borrow();
        let current = self.placement.borrow();
        let request = PlacementRequest {
            data_center: &data_center,
            vms: vm_ids,
            utilization: &self.utilization,
            current: Some(&current),
            reference_share_penalty: self.reference_share_penalty,
        };
        let mut target = VirtualMachinesPlacement::new();
        let report = self.strategy.place(&request, &mut target)?;
        if !report.is_complete() {
            log_debug!(
                self.ctx,
                "{} strategy left {} vms without machine",
                self.strategy.name(),
                report.unplaced.len()
            );
        }
        Ok(target)
    }

    /// Moves the live placement towards the target one.
    ///
    /// Relocations are applied once in VM order. A relocation that does not fit leaves the VM on its machine
    /// until the next run. VMs missing in the target keep their current placement.
    fn apply(&mut self, target: &VirtualMachinesPlacement, record: &mut ControlRunRecord) {
        let mut data_center = self.data_center.borrow_mut();
        let mut placement = self.placement.borrow_mut();

        let mut relocations = Vec::new();
        let mut additions = Vec::new();
        for (vm_id, entry) in target.entries() {
            match placement.entry(*vm_id) {
                Some(current) if current == entry => {}
                Some(_) => relocations.push((*vm_id, entry.clone())),
                None => additions.push((*vm_id, entry.clone())),
            }
        }

        for (vm_id, entry) in relocations {
            let migrating = placement.machine_of(vm_id) != Some(entry.machine_id);
            if migrating {
                if let Some(vm) = data_center.vm_mut(vm_id) {
                    vm.set_status(VmStatus::Migrating);
                }
            }
            match relocate(&mut placement, vm_id, &entry) {
                Ok(previous) if previous == entry.machine_id => {
                    record.share_updates += 1;
                }
                Ok(previous) => {
                    log_debug!(
                        self.ctx,
                        "migrated vm {} from machine {} to machine {}",
                        vm_id,
                        previous,
                        entry.machine_id
                    );
                    record.migrations += 1;
                }
                Err(RelocationError::NotPlaced) => continue,
                Err(RelocationError::DoesNotFit(previous)) if !migrating => {
                    log_debug!(self.ctx, "kept previous shares of vm {} on machine {}", vm_id, previous);
                }
                Err(RelocationError::DoesNotFit(previous)) => {
                    log_warn!(
                        self.ctx,
                        "migration of vm {} to machine {} failed, vm stays on machine {}",
                        vm_id,
                        entry.machine_id,
                        previous
                    );
                    record.failed_migrations += 1;
                }
                Err(RelocationError::RestoreFailed(previous)) => {
                    log_error!(self.ctx, "vm {} lost its place on machine {}", vm_id, previous.machine_id);
                    if let Some(vm) = data_center.vm_mut(vm_id) {
                        vm.set_status(VmStatus::Unplaced);
                    }
                    continue;
                }
            }
            if let Some(vm) = data_center.vm_mut(vm_id) {
                vm.set_status(VmStatus::Running);
            }
        }

        for (vm_id, entry) in additions {
            if placement.try_place(vm_id, entry.machine_id, entry.shares) {
                log_debug!(self.ctx, "placed vm {} on machine {}", vm_id, entry.machine_id);
                record.new_placements += 1;
                if let Some(vm) = data_center.vm_mut(vm_id) {
                    vm.set_status(VmStatus::Running);
                }
            }
        }

        if self.switch_off_idle_machines {
            let changed = data_center.update_power_states(&placement);
            if changed > 0 {
                log_debug!(self.ctx, "changed power state of {} machines", changed);
            }
        }
    }

    fn summarize(&self, vm_ids: &[u32], record: &mut ControlRunRecord) {
        let data_center = self.data_center.borrow();
        let placement = self.placement.borrow();
        record.unplaced_vms = vm_ids.iter().filter(|vm_id| !placement.is_placed(**vm_id)).count() as u64;
        record.active_machines = placement.used_machines().len() as u64;
        record.power = data_center.power_consumption(&placement);
    }
}

enum RelocationError {
    NotPlaced,
    DoesNotFit(u32),
    RestoreFailed(PlacementEntry),
}

/// Moves VM to the target machine and shares, returns the previous machine.
/// If the target does not fit, the previous placement is restored.
fn relocate(
    placement: &mut VirtualMachinesPlacement,
    vm_id: u32,
    target: &PlacementEntry,
) -> Result<u32, RelocationError> {
    let previous = placement.remove(vm_id).ok_or(RelocationError::NotPlaced)?;
    if placement.try_place(vm_id, target.machine_id, target.shares.clone()) {
        return Ok(previous.machine_id);
    }
    if placement.try_place(vm_id, previous.machine_id, previous.shares.clone()) {
        Err(RelocationError::DoesNotFit(previous.machine_id))
    } else {
        Err(RelocationError::RestoreFailed(previous))
    }
}

impl EventHandler for MigrationController {
    fn on(&mut self, event: Event) {
        let event_id = event.id;
        cast!(match event.data {
            ControlTick {} => {
                self.run(event_id);
            }
        })
    }
}
