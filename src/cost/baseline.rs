use std::collections::BTreeMap;
use std::fmt;

use inkwell::module::Module;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CostFunction, NUM_COST_FUNCTIONS, compute_cost};
use crate::error::{GymError, Result};
use crate::session::WorkingArea;
use crate::target::CodegenTarget;

pub const NUM_BASELINE_POLICIES: usize = 3;
pub const NUM_BASELINE_COSTS: usize = NUM_BASELINE_POLICIES * NUM_COST_FUNCTIONS;

/// A standard optimization level used as a point of comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaselinePolicy {
    O0,
    O3,
    Oz,
}

impl BaselinePolicy {
    pub const ALL: [Self; NUM_BASELINE_POLICIES] = [Self::O0, Self::O3, Self::Oz];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The new-pass-manager pipeline for this policy, `None` for no passes.
    pub fn pipeline(self) -> Option<&'static str> {
        match self {
            Self::O0 => None,
            Self::O3 => Some("default<O3>"),
            Self::Oz => Some("default<Oz>"),
        }
    }
}

impl fmt::Display for BaselinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = match self {
            Self::O0 => "-O0",
            Self::O3 => "-O3",
            Self::Oz => "-Oz",
        };
        f.write_str(flag)
    }
}

/// Dense (policy, cost function) matrix of baseline costs.
///
/// Only [`compute_baselines`] and deserialization produce one, and both fill
/// every cell, so lookups cannot fail.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineCosts {
    costs: [f64; NUM_BASELINE_COSTS],
}

impl BaselineCosts {
    const fn index(policy: BaselinePolicy, cost_function: CostFunction) -> usize {
        policy as usize * NUM_COST_FUNCTIONS + cost_function as usize
    }

    pub fn get(&self, policy: BaselinePolicy, cost_function: CostFunction) -> f64 {
        self.costs[Self::index(policy, cost_function)]
    }

    /// Baseline value of `cost_function` under every policy.
    pub fn for_cost_function(&self, cost_function: CostFunction) -> BTreeMap<BaselinePolicy, f64> {
        BaselinePolicy::ALL
            .into_iter()
            .map(|policy| (policy, self.get(policy, cost_function)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BaselinePolicy, CostFunction, f64)> + '_ {
        BaselinePolicy::ALL.into_iter().flat_map(move |policy| {
            CostFunction::ALL
                .into_iter()
                .map(move |cost| (policy, cost, self.get(policy, cost)))
        })
    }
}

/// Measure every cost function under every baseline policy.
///
/// Each policy runs on its own clone of `module`, which is left untouched.
pub fn compute_baselines(
    module: &Module<'_>,
    working_area: &WorkingArea,
    target: &CodegenTarget,
) -> Result<BaselineCosts> {
    let mut costs = [0.0; NUM_BASELINE_COSTS];

    for policy in BaselinePolicy::ALL {
        let failed = |reason: String| GymError::BaselineComputationFailed { policy, reason };

        let optimized = module.clone();
        if let Some(pipeline) = policy.pipeline() {
            target.prepare(&optimized);
            target
                .run_passes(&optimized, pipeline)
                .map_err(|err| failed(format!("`{pipeline}` failed: {err}")))?;
        }

        for cost_function in CostFunction::ALL {
            let value = compute_cost(cost_function, &optimized, working_area, target)
                .map_err(|err| failed(err.to_string()))?;
            debug!(%policy, %cost_function, value, "computed baseline cost");
            costs[BaselineCosts::index(policy, cost_function)] = value;
        }
    }

    Ok(BaselineCosts { costs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_laid_out_policy_major() {
        let mut costs = [0.0; NUM_BASELINE_COSTS];
        for (slot, value) in costs.iter_mut().zip(0..) {
            *slot = f64::from(value);
        }
        let baselines = BaselineCosts { costs };

        assert_eq!(baselines.get(BaselinePolicy::O0, CostFunction::IrInstructionCount), 0.0);
        assert_eq!(baselines.get(BaselinePolicy::O0, CostFunction::ObjectTextSizeBytes), 1.0);
        assert_eq!(baselines.get(BaselinePolicy::Oz, CostFunction::IrInstructionCount), 4.0);
        assert_eq!(baselines.iter().count(), NUM_BASELINE_COSTS);

        let sizes = baselines.for_cost_function(CostFunction::ObjectTextSizeBytes);
        assert_eq!(sizes[&BaselinePolicy::O3], 3.0);
    }

    #[test]
    fn policies_display_as_flags() {
        assert_eq!(BaselinePolicy::Oz.to_string(), "-Oz");
        assert!(BaselinePolicy::O0.pipeline().is_none());
        assert_eq!(BaselinePolicy::O3.pipeline(), Some("default<O3>"));
    }
}
