//! Events exchanged by data center components.

use serde::Serialize;

/// Starts the next migration controller run.
#[derive(Clone, Serialize)]
pub struct ControlTick {}

