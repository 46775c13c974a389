//! Cost functions over LLVM modules.
//!
//! Every cost is a non-negative `f64` where lower is better. Values are only
//! ever compared within the same cost function, against a baseline or an
//! earlier observation of the same module.

mod baseline;
mod text_size;

use std::fmt;
use std::str::FromStr;

use inkwell::module::Module;
use serde::{Deserialize, Serialize};

use crate::error::{GymError, Result};
use crate::session::WorkingArea;
use crate::target::CodegenTarget;

pub use baseline::{
    BaselineCosts, BaselinePolicy, NUM_BASELINE_COSTS, NUM_BASELINE_POLICIES, compute_baselines,
};

pub const NUM_COST_FUNCTIONS: usize = 2;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CostFunction {
    /// Number of instructions in the IR module. Cheap and deterministic.
    IrInstructionCount,
    /// Size in bytes of the code sections of the module's object file.
    ObjectTextSizeBytes,
}

impl CostFunction {
    pub const ALL: [Self; NUM_COST_FUNCTIONS] = [Self::IrInstructionCount, Self::ObjectTextSizeBytes];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::IrInstructionCount => "ir_instruction_count",
            Self::ObjectTextSizeBytes => "object_text_size_bytes",
        }
    }

    /// Whether computing this cost lowers the module through the backend.
    pub fn requires_backend(self) -> bool {
        matches!(self, Self::ObjectTextSizeBytes)
    }
}

impl fmt::Display for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CostFunction {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalised = raw.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|cost| cost.name() == normalised || cost.name().replace('_', "") == normalised)
            .ok_or_else(|| format!("unknown cost function `{raw}`"))
    }
}

/// Compute `cost_function` for `module`.
///
/// The module is only read. Backend costs lower a clone of it, and any
/// artifacts they write live in a scratch directory of `working_area` that is
/// removed before this returns.
pub fn compute_cost(
    cost_function: CostFunction,
    module: &Module<'_>,
    working_area: &WorkingArea,
    target: &CodegenTarget,
) -> Result<f64> {
    let cost = match cost_function {
        CostFunction::IrInstructionCount => ir_instruction_count(module)?,
        CostFunction::ObjectTextSizeBytes => {
            text_size::object_text_size(module, working_area, target)?
        }
    };
    Ok(cost as f64)
}

fn ir_instruction_count(module: &Module<'_>) -> Result<u64> {
    module.verify().map_err(|err| GymError::InvalidModule {
        reason: err.to_string(),
    })?;

    let mut count = 0;
    for function in module.get_functions() {
        for block in function.get_basic_blocks() {
            let mut instruction = block.get_first_instruction();
            while let Some(current) = instruction {
                count += 1;
                instruction = current.get_next_instruction();
            }
        }
    }
    Ok(count)
}
