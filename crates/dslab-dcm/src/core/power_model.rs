//! Energy consumption models of machine resources.

use dyn_clone::{clone_trait_object, DynClone};

/// Power model is a function of resource utilization, which computes the power consumed by a resource.
pub trait PowerModel: DynClone {
    /// Returns the power consumption for utilization in the 0.0-1.0 range.
    fn get_power(&self, utilization: f64) -> f64;

    /// Returns the power consumed by an idle, powered on resource.
    fn idle_power(&self) -> f64 {
        self.get_power(0.)
    }

    /// Returns the power consumed by a fully loaded resource.
    fn max_power(&self) -> f64 {
        self.get_power(1.)
    }
}

clone_trait_object!(PowerModel);

/// Linear interpolation between idle and maximum power.
#[derive(Clone)]
pub struct LinearPowerModel {
    idle_power: f64,
    max_power: f64,
}

impl LinearPowerModel {
    pub fn new(idle_power: f64, max_power: f64) -> Self {
        Self { idle_power, max_power }
    }
}

impl PowerModel for LinearPowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        self.idle_power + (self.max_power - self.idle_power) * utilization.clamp(0., 1.)
    }
}

/// Power consumption that does not depend on utilization.
#[derive(Clone)]
pub struct ConstantPowerModel {
    power: f64,
}

impl ConstantPowerModel {
    pub fn new(power: f64) -> Self {
        Self { power }
    }
}

impl PowerModel for ConstantPowerModel {
    fn get_power(&self, _utilization: f64) -> f64 {
        self.power
    }
}
