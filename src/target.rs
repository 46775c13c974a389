use inkwell::OptimizationLevel;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine};
use once_cell::sync::Lazy;

use crate::error::{GymError, Result};

static NATIVE_TARGET: Lazy<std::result::Result<(), String>> =
    Lazy::new(|| Target::initialize_native(&InitializationConfig::default()));

/// The host code generator: a target machine plus the helpers every session
/// needs to run pass pipelines and emit object code.
///
/// A `CodegenTarget` is owned by the thread that owns the session's context.
pub struct CodegenTarget {
    machine: TargetMachine,
}

impl CodegenTarget {
    pub fn host() -> Result<Self> {
        NATIVE_TARGET
            .as_ref()
            .map_err(|err| GymError::TargetUnavailable(format!("failed to initialise LLVM target: {err}")))?;

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).map_err(|err| {
            GymError::TargetUnavailable(format!("failed to create target from triple: {err}"))
        })?;

        let machine = target
            .create_target_machine(
                &triple,
                "generic",
                "",
                OptimizationLevel::Default,
                RelocMode::Default,
                CodeModel::Default,
            )
            .ok_or_else(|| GymError::TargetUnavailable("failed to create target machine".into()))?;

        Ok(Self { machine })
    }

    pub fn machine(&self) -> &TargetMachine {
        &self.machine
    }

    /// Stamp the host triple and data layout onto `module`.
    pub fn prepare(&self, module: &Module<'_>) {
        module.set_triple(&self.machine.get_triple());
        module.set_data_layout(&self.machine.get_target_data().get_data_layout());
    }

    /// Give a freshly loaded module the host triple if it was built without one.
    pub fn adopt(&self, module: &Module<'_>) {
        if module.get_triple().as_str().to_bytes().is_empty() {
            self.prepare(module);
        }
    }

    /// Run a textual new-pass-manager pipeline, e.g. `default<Oz>` or `function(sroa)`.
    pub fn run_passes(&self, module: &Module<'_>, pipeline: &str) -> std::result::Result<(), String> {
        module
            .run_passes(pipeline, &self.machine, PassBuilderOptions::create())
            .map_err(|err| err.to_string())
    }
}
