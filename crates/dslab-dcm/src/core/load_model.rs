//! Resource load models of application tiers.

use dyn_clone::{clone_trait_object, DynClone};

/// A load model defines the load of a tier resource at the moment, relative to the tier's reference share.
///
/// `time` is the current simulation time and `time_from_start` is the time elapsed since the application
/// instance was started, which allows to model load peaks at the beginning of instance lifecycle.
pub trait LoadModel: DynClone {
    fn get_resource_load(&self, time: f64, time_from_start: f64) -> f64;
}

clone_trait_object!(LoadModel);

/// The simplest load model, the constant load.
#[derive(Clone)]
pub struct ConstLoadModel {
    load: f64,
}

impl ConstLoadModel {
    pub fn new(load: f64) -> Self {
        Self { load }
    }
}

impl LoadModel for ConstLoadModel {
    fn get_resource_load(&self, _time: f64, _time_from_start: f64) -> f64 {
        self.load
    }
}

/// Load which switches between levels at given simulation times.
///
/// Each step `(time, load)` sets the load from `time` onwards, the load before the first step is `initial`.
#[derive(Clone)]
pub struct StepLoadModel {
    initial: f64,
    steps: Vec<(f64, f64)>,
}

impl StepLoadModel {
    pub fn new(initial: f64, mut steps: Vec<(f64, f64)>) -> Self {
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { initial, steps }
    }
}

impl LoadModel for StepLoadModel {
    fn get_resource_load(&self, time: f64, _time_from_start: f64) -> f64 {
        self.steps
            .iter()
            .take_while(|(from, _)| *from <= time)
            .last()
            .map_or(self.initial, |(_, load)| *load)
    }
}
