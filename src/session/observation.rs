use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cost::{BaselinePolicy, CostFunction};

/// How a cost is reported to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "policy")]
pub enum CostRepresentation {
    #[default]
    Absolute,
    /// Improvement since the last observation (or since `-O0`).
    DeltaFromPrevious,
    /// Improvement relative to a baseline policy.
    DeltaFromBaseline(BaselinePolicy),
}

/// One cost function's value for the current module, with everything needed
/// to derive the other representations without recomputing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostObservation {
    pub cost_function: CostFunction,
    pub value: f64,
    pub previous: Option<f64>,
    pub baselines: BTreeMap<BaselinePolicy, f64>,
    /// Served from the previous-cost cache without recomputation.
    pub cached: bool,
}

impl CostObservation {
    /// Positive when the module got cheaper since the previous observation.
    pub fn delta(&self) -> f64 {
        let reference = self
            .previous
            .or_else(|| self.baselines.get(&BaselinePolicy::O0).copied())
            .unwrap_or(self.value);
        reference - self.value
    }

    /// Positive when the module is cheaper than `policy` would make it.
    pub fn delta_from(&self, policy: BaselinePolicy) -> f64 {
        self.baselines
            .get(&policy)
            .map_or(0.0, |baseline| baseline - self.value)
    }

    pub fn scalar(&self, representation: CostRepresentation) -> f64 {
        match representation {
            CostRepresentation::Absolute => self.value,
            CostRepresentation::DeltaFromPrevious => self.delta(),
            CostRepresentation::DeltaFromBaseline(policy) => self.delta_from(policy),
        }
    }
}

/// The result of one observe request, in request order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub costs: Vec<CostObservation>,
}

impl Observation {
    pub fn get(&self, cost_function: CostFunction) -> Option<&CostObservation> {
        self.costs
            .iter()
            .find(|cost| cost.cost_function == cost_function)
    }

    pub fn value(&self, cost_function: CostFunction) -> Option<f64> {
        self.get(cost_function).map(|cost| cost.value)
    }

    pub fn scalars(&self, representation: CostRepresentation) -> BTreeMap<CostFunction, f64> {
        self.costs
            .iter()
            .map(|cost| (cost.cost_function, cost.scalar(representation)))
            .collect()
    }
}
