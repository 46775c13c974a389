use crate::cost::{CostFunction, NUM_COST_FUNCTIONS};

#[derive(Clone, Copy, Debug, PartialEq)]
struct CachedCost {
    value: f64,
    revision: u64,
}

/// Last observed value per cost function, tagged with the module revision it
/// was computed at.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreviousCosts {
    entries: [Option<CachedCost>; NUM_COST_FUNCTIONS],
    revision: u64,
}

impl PreviousCosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// The module revision the cache currently describes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The last value observed for `cost_function`, at any revision.
    pub fn get(&self, cost_function: CostFunction) -> Option<f64> {
        self.entries[cost_function.index()].map(|entry| entry.value)
    }

    /// The last value if it was computed against the current module.
    pub fn fresh(&self, cost_function: CostFunction) -> Option<f64> {
        self.entries[cost_function.index()]
            .filter(|entry| entry.revision == self.revision)
            .map(|entry| entry.value)
    }

    /// Store `value` for the current revision, returning what it replaces.
    pub fn record(&mut self, cost_function: CostFunction, value: f64) -> Option<f64> {
        let previous = self.get(cost_function);
        self.entries[cost_function.index()] = Some(CachedCost {
            value,
            revision: self.revision,
        });
        previous
    }

    /// Mark every cached value stale. Called when the module changes.
    pub fn invalidate(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_go_stale_on_invalidate() {
        let mut cache = PreviousCosts::new();
        let cost = CostFunction::IrInstructionCount;
        assert_eq!(cache.get(cost), None);

        assert_eq!(cache.record(cost, 12.0), None);
        assert_eq!(cache.fresh(cost), Some(12.0));

        cache.invalidate();
        assert_eq!(cache.revision(), 1);
        assert_eq!(cache.fresh(cost), None);
        assert_eq!(cache.get(cost), Some(12.0));

        assert_eq!(cache.record(cost, 9.0), Some(12.0));
        assert_eq!(cache.fresh(cost), Some(9.0));
        assert_eq!(cache.get(CostFunction::ObjectTextSizeBytes), None);
    }
}
