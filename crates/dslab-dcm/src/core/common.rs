use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing share sums against the unit capacity.
pub const EPSILON: f64 = 1e-9;

/// Category of a physical machine resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Cpu,
    Memory,
    Disk,
    Nic,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 4] = [
        ResourceCategory::Cpu,
        ResourceCategory::Memory,
        ResourceCategory::Disk,
        ResourceCategory::Nic,
    ];
}

impl Display for ResourceCategory {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ResourceCategory::Cpu => write!(f, "cpu"),
            ResourceCategory::Memory => write!(f, "memory"),
            ResourceCategory::Disk => write!(f, "disk"),
            ResourceCategory::Nic => write!(f, "nic"),
        }
    }
}

/// Fractions of machine capacity assigned to a VM, per resource category.
pub type ResourceShares = BTreeMap<ResourceCategory, f64>;

/// Sampled utilization of each VM, per resource category.
///
/// Values are expressed in the same unit as the reference shares, i.e. as a fraction of the
/// application's reference resource.
pub type UtilizationMap = BTreeMap<u32, BTreeMap<ResourceCategory, f64>>;

/// Result of checking a placement against the ledger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlacementVerdict {
    Success,
    AlreadyPlaced,
    InvalidShare(ResourceCategory),
    CapacityExceeded(ResourceCategory),
}
