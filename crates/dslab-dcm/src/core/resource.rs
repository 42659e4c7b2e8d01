//! Resource capacities, utilization thresholds and share scaling between machines.
//!
//! A VM demand is expressed as a share of an abstract *reference* resource declared by its application.
//! Before the VM can be placed on a concrete machine, this share is translated into a share of the machine
//! resource using the ratio of the two capacities.

use crate::core::config::ConfigError;
use crate::core::power_model::{ConstantPowerModel, PowerModel};

/// Capacity and utilization threshold of the reference resource against which VM demands are expressed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceResource {
    pub capacity: f64,
    pub threshold: f64,
}

impl ReferenceResource {
    pub fn new(capacity: f64, threshold: f64) -> Self {
        Self { capacity, threshold }
    }

    /// Checks that the capacity is positive and the threshold lies in [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.capacity > 0.) {
            return Err(ConfigError::InvalidCapacity(self.capacity));
        }
        check_threshold(self.threshold)
    }
}

/// A view of one resource category of a physical machine.
#[derive(Clone)]
pub struct ResourceView {
    pub capacity: f64,
    pub threshold: f64,
    power_model: Box<dyn PowerModel>,
}

impl ResourceView {
    pub fn new(capacity: f64, threshold: f64, power_model: Box<dyn PowerModel>) -> Self {
        Self {
            capacity,
            threshold,
            power_model,
        }
    }

    /// Creates a resource view which does not contribute to machine power consumption.
    pub fn without_power(capacity: f64, threshold: f64) -> Self {
        Self::new(capacity, threshold, Box::new(ConstantPowerModel::new(0.)))
    }

    /// Checks that the capacity is non-negative and the threshold lies in [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_capacity(self.capacity)?;
        check_threshold(self.threshold)
    }

    /// Returns the power consumed by the resource at the given utilization.
    pub fn power(&self, utilization: f64) -> f64 {
        self.power_model.get_power(utilization)
    }

    pub fn power_model(&self) -> &dyn PowerModel {
        self.power_model.as_ref()
    }
}

fn check_capacity(capacity: f64) -> Result<(), ConfigError> {
    if capacity.is_finite() && capacity >= 0. {
        Ok(())
    } else {
        Err(ConfigError::InvalidCapacity(capacity))
    }
}

fn check_threshold(threshold: f64) -> Result<(), ConfigError> {
    if (0. ..=1.).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(threshold))
    }
}

/// Returns the ratio of target to source capacity.
///
/// Utilization thresholds are validated but do not take part in the ratio.
pub fn scaling_factor(
    source_capacity: f64,
    source_threshold: f64,
    target_capacity: f64,
    target_threshold: f64,
) -> Result<f64, ConfigError> {
    check_capacity(source_capacity)?;
    check_capacity(target_capacity)?;
    check_threshold(source_threshold)?;
    check_threshold(target_threshold)?;
    if source_capacity == 0. {
        return Err(ConfigError::InvalidCapacity(source_capacity));
    }
    Ok(target_capacity / source_capacity)
}

/// Translates a share of the source resource into a share of the target resource.
///
/// A target with zero capacity can host only zero shares, so any positive share becomes infinite
/// and is rejected by the placement ledger.
pub fn scale_share(
    source_capacity: f64,
    source_threshold: f64,
    target_capacity: f64,
    target_threshold: f64,
    source_share: f64,
) -> Result<f64, ConfigError> {
    let factor = scaling_factor(source_capacity, source_threshold, target_capacity, target_threshold)?;
    if factor == 0. {
        return Ok(if source_share == 0. { 0. } else { f64::INFINITY });
    }
    Ok(source_share / factor)
}

/// Inflates a share by the reference-share penalty, leaving headroom for demand spikes.
///
/// The inflated share is capped at 1, while shares which already exceed 1 are kept as is.
pub fn apply_reference_penalty(share: f64, penalty: f64) -> f64 {
    if share > 1. {
        return share;
    }
    (share * (1. + penalty)).min(1.)
}
