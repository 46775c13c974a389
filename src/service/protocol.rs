//! Logical shape of the session protocol.
//!
//! Transports carry these as JSON objects tagged by `type`, e.g.
//! `{"type":"observe","session_id":1,"cost_functions":["ir_instruction_count"]}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionId, ActionInfo};
use crate::cost::{BaselineCosts, BaselinePolicy, CostFunction};
use crate::error::{ErrorKind, GymError};
use crate::session::{ActionOutcome, CostObservation, CostRepresentation, Observation, SessionId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    StartSession {
        benchmark: String,
    },
    ForkSession {
        session_id: SessionId,
    },
    ApplyActions {
        session_id: SessionId,
        actions: Vec<ActionId>,
    },
    Observe {
        session_id: SessionId,
        cost_functions: Vec<CostFunction>,
        #[serde(default)]
        representation: CostRepresentation,
    },
    GetIr {
        session_id: SessionId,
    },
    GetBaselines {
        session_id: SessionId,
    },
    GetActionHistory {
        session_id: SessionId,
    },
    ListActions,
    ListSessions,
    EndSession {
        session_id: SessionId,
    },
}

impl Request {
    /// The session a request targets, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::ForkSession { session_id }
            | Self::ApplyActions { session_id, .. }
            | Self::Observe { session_id, .. }
            | Self::GetIr { session_id }
            | Self::GetBaselines { session_id }
            | Self::GetActionHistory { session_id }
            | Self::EndSession { session_id } => Some(*session_id),
            Self::StartSession { .. } | Self::ListActions | Self::ListSessions => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub policy: BaselinePolicy,
    pub cost_function: CostFunction,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub benchmark: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    SessionStarted {
        session_id: SessionId,
    },
    ActionsApplied {
        applied_count: usize,
        failed_action_index: Option<usize>,
        error_detail: Option<String>,
    },
    Observation {
        /// The requested representation of each cost.
        scalars: BTreeMap<CostFunction, f64>,
        costs: Vec<CostObservation>,
    },
    Ir {
        ir: String,
    },
    Baselines {
        baselines: Vec<BaselineEntry>,
    },
    ActionHistory {
        actions: Vec<String>,
    },
    Actions {
        actions: Vec<ActionInfo>,
    },
    Sessions {
        sessions: Vec<SessionInfo>,
    },
    SessionEnded {
        session_id: SessionId,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Reply {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::Error {
            kind: ErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn observation(observation: Observation, representation: CostRepresentation) -> Self {
        Self::Observation {
            scalars: observation.scalars(representation),
            costs: observation.costs,
        }
    }

    pub fn baselines(costs: &BaselineCosts) -> Self {
        let baselines = costs
            .iter()
            .map(|(policy, cost_function, value)| BaselineEntry {
                policy,
                cost_function,
                value,
            })
            .collect();
        Self::Baselines { baselines }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<ActionOutcome> for Reply {
    fn from(outcome: ActionOutcome) -> Self {
        Self::ActionsApplied {
            applied_count: outcome.applied_count,
            failed_action_index: outcome.failed_action_index(),
            error_detail: outcome.error_detail(),
        }
    }
}

impl From<GymError> for Reply {
    fn from(err: GymError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
