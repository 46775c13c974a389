//! A compilation session: one mutable module, its baseline costs and the
//! cache of previously observed costs.
//!
//! A session lives on the thread that owns its LLVM context and is driven by
//! exactly one caller at a time. The service layer provides both guarantees.

mod observation;
mod previous;
mod working_area;

use std::fmt;
use std::path::PathBuf;

use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use llgym_benchmark::{Benchmark, BenchmarkUri};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::{ActionId, LlvmAction};
use crate::cost::{BaselineCosts, CostFunction, compute_baselines, compute_cost};
use crate::error::{GymError, Result};
use crate::target::CodegenTarget;

pub use observation::{CostObservation, CostRepresentation, Observation};
pub use previous::PreviousCosts;
pub use working_area::WorkingArea;

/// Opaque handle naming a session for the lifetime of the host process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Parent directory for working areas. Defaults to the system temp dir.
    pub working_root: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Active,
    Terminated,
}

#[derive(Debug)]
pub struct ActionFailure {
    /// Position of the failing action within the batch.
    pub index: usize,
    pub action: ActionId,
    pub error: GymError,
}

/// Result of applying a batch. A failed batch commits nothing.
#[derive(Debug)]
pub struct ActionOutcome {
    pub applied_count: usize,
    pub failure: Option<ActionFailure>,
}

impl ActionOutcome {
    fn committed(applied_count: usize) -> Self {
        Self {
            applied_count,
            failure: None,
        }
    }

    fn rejected(index: usize, action: &ActionId, error: GymError) -> Self {
        Self {
            applied_count: 0,
            failure: Some(ActionFailure {
                index,
                action: action.clone(),
                error,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failed_action_index(&self) -> Option<usize> {
        self.failure.as_ref().map(|failure| failure.index)
    }

    pub fn error_detail(&self) -> Option<String> {
        self.failure.as_ref().map(|failure| failure.error.to_string())
    }
}

/// Everything needed to rebuild a session in another context.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub benchmark: BenchmarkUri,
    pub bitcode: Vec<u8>,
    pub baseline_costs: BaselineCosts,
    pub previous_costs: PreviousCosts,
    pub actions: Vec<LlvmAction>,
}

pub struct CompilationSession<'ctx> {
    id: SessionId,
    benchmark: BenchmarkUri,
    state: SessionState,
    module: Option<Module<'ctx>>,
    baseline_costs: Option<BaselineCosts>,
    previous_costs: PreviousCosts,
    actions: Vec<LlvmAction>,
    working_area: Option<WorkingArea>,
    target: CodegenTarget,
}

impl<'ctx> CompilationSession<'ctx> {
    /// Load `benchmark` into `context` and compute its baselines.
    ///
    /// A session that fails here is never observable; whatever was allocated
    /// for it is released before the error is returned.
    pub fn create(
        context: &'ctx Context,
        id: SessionId,
        benchmark: &Benchmark,
        options: &SessionOptions,
    ) -> Result<Self> {
        let target = CodegenTarget::host()?;
        let module = benchmark.load(context)?;
        target.adopt(&module);

        let working_area = WorkingArea::create(options.working_root.as_deref(), &id.to_string())?;
        let mut session = Self {
            id,
            benchmark: benchmark.uri().clone(),
            state: SessionState::Created,
            module: Some(module),
            baseline_costs: None,
            previous_costs: PreviousCosts::new(),
            actions: Vec::new(),
            working_area: Some(working_area),
            target,
        };
        session.activate()?;
        Ok(session)
    }

    /// Rebuild a session from a snapshot without recomputing its baselines.
    pub fn from_snapshot(
        context: &'ctx Context,
        id: SessionId,
        snapshot: SessionSnapshot,
        options: &SessionOptions,
    ) -> Result<Self> {
        let target = CodegenTarget::host()?;
        let buffer =
            MemoryBuffer::create_from_memory_range_copy(&snapshot.bitcode, &snapshot.benchmark.to_string());
        let module = Module::parse_bitcode_from_buffer(&buffer, context).map_err(|err| {
            GymError::InvalidModule {
                reason: format!("unreadable session snapshot: {err}"),
            }
        })?;
        let working_area = WorkingArea::create(options.working_root.as_deref(), &id.to_string())?;

        info!(session = %id, benchmark = %snapshot.benchmark, "restored session from snapshot");
        Ok(Self {
            id,
            benchmark: snapshot.benchmark,
            state: SessionState::Active,
            module: Some(module),
            baseline_costs: Some(snapshot.baseline_costs),
            previous_costs: snapshot.previous_costs,
            actions: snapshot.actions,
            working_area: Some(working_area),
            target,
        })
    }

    fn activate(&mut self) -> Result<()> {
        let (module, working_area) = self.parts()?;
        let baselines = compute_baselines(module, working_area, &self.target)?;
        self.baseline_costs = Some(baselines);
        self.state = SessionState::Active;
        info!(session = %self.id, benchmark = %self.benchmark, "session active");
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Created | SessionState::Terminated => Err(GymError::SessionTerminated(self.id)),
        }
    }

    fn parts(&self) -> Result<(&Module<'ctx>, &WorkingArea)> {
        match (&self.module, &self.working_area) {
            (Some(module), Some(working_area)) => Ok((module, working_area)),
            _ => Err(GymError::SessionTerminated(self.id)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn benchmark(&self) -> &BenchmarkUri {
        &self.benchmark
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Actions committed so far, oldest first.
    pub fn actions(&self) -> &[LlvmAction] {
        &self.actions
    }

    pub fn previous_costs(&self) -> &PreviousCosts {
        &self.previous_costs
    }

    pub fn baseline_costs(&self) -> Result<BaselineCosts> {
        self.ensure_active()?;
        self.baseline_costs
            .ok_or(GymError::SessionTerminated(self.id))
    }

    /// The module as it currently stands.
    pub fn module(&self) -> Result<&Module<'ctx>> {
        self.ensure_active()?;
        self.parts().map(|(module, _)| module)
    }

    /// The current module as textual IR.
    pub fn ir(&self) -> Result<String> {
        Ok(self.module()?.print_to_string().to_string())
    }

    /// Apply `actions` in order. Either every action commits or none does.
    ///
    /// Rejected actions are reported through the outcome; the `Err` path is
    /// reserved for requests the session cannot serve at all.
    pub fn apply_actions(&mut self, actions: &[ActionId]) -> Result<ActionOutcome> {
        let current = self.module()?;
        if actions.is_empty() {
            return Ok(ActionOutcome::committed(0));
        }

        let working = current.clone();
        let mut applied = Vec::with_capacity(actions.len());

        for (index, id) in actions.iter().enumerate() {
            let Some(action) = LlvmAction::resolve(id) else {
                let error = GymError::UnknownAction {
                    index,
                    action: id.to_string(),
                };
                debug!(session = %self.id, index, action = %id, "rejected batch");
                return Ok(ActionOutcome::rejected(index, id, error));
            };

            if let Err(reason) = self.target.run_passes(&working, action.pipeline()) {
                let error = GymError::ActionFailed {
                    index,
                    action: action.to_string(),
                    reason,
                };
                warn!(session = %self.id, index, %action, %error, "action failed");
                return Ok(ActionOutcome::rejected(index, id, error));
            }

            if let Err(err) = working.verify() {
                let error = GymError::InvalidModule {
                    reason: format!("{action} produced invalid IR: {err}"),
                };
                warn!(session = %self.id, index, %action, "verifier rejected module");
                return Ok(ActionOutcome::rejected(index, id, error));
            }

            applied.push(action);
        }

        self.module = Some(working);
        self.actions.extend_from_slice(&applied);
        self.previous_costs.invalidate();
        debug!(
            session = %self.id,
            applied = applied.len(),
            revision = self.previous_costs.revision(),
            "committed actions"
        );
        Ok(ActionOutcome::committed(applied.len()))
    }

    /// Current costs for `cost_functions`.
    ///
    /// Nothing is cached unless every requested cost could be computed.
    /// Duplicate requests are answered once.
    pub fn observe(&mut self, cost_functions: &[CostFunction]) -> Result<Observation> {
        self.ensure_active()?;
        let (module, working_area) = self.parts()?;
        let baselines = self.baseline_costs()?;

        let mut requested: Vec<CostFunction> = Vec::with_capacity(cost_functions.len());
        for cost_function in cost_functions {
            if !requested.contains(cost_function) {
                requested.push(*cost_function);
            }
        }

        let mut computed = Vec::with_capacity(requested.len());
        for cost_function in requested {
            let (value, cached) = match self.previous_costs.fresh(cost_function) {
                Some(value) => (value, true),
                None => (
                    compute_cost(cost_function, module, working_area, &self.target)?,
                    false,
                ),
            };
            computed.push((cost_function, value, cached));
        }

        let costs = computed
            .into_iter()
            .map(|(cost_function, value, cached)| CostObservation {
                cost_function,
                value,
                previous: self.previous_costs.record(cost_function, value),
                baselines: baselines.for_cost_function(cost_function),
                cached,
            })
            .collect();
        Ok(Observation { costs })
    }

    /// Capture the session so it can be rebuilt elsewhere.
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let module = self.module()?;
        Ok(SessionSnapshot {
            benchmark: self.benchmark.clone(),
            bitcode: module.write_bitcode_to_memory().as_slice().to_vec(),
            baseline_costs: self.baseline_costs()?,
            previous_costs: self.previous_costs.clone(),
            actions: self.actions.clone(),
        })
    }

    /// Release the module and working area. Calling this again does nothing.
    ///
    /// Returns whether an active session was ended; a session that never
    /// finished creation is released quietly.
    pub fn terminate(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.state, SessionState::Terminated);
        if previous == SessionState::Terminated {
            return false;
        }
        self.module = None;
        if let Some(working_area) = self.working_area.take() {
            if let Err(err) = working_area.close() {
                warn!(session = %self.id, error = %err, "failed to remove working area");
            }
        }
        let was_active = previous == SessionState::Active;
        if was_active {
            info!(session = %self.id, "session terminated");
        } else {
            debug!(session = %self.id, "released session that never became active");
        }
        was_active
    }
}

impl Drop for CompilationSession<'_> {
    fn drop(&mut self) {
        self.terminate();
    }
}
