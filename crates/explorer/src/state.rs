//! Operation phase state machine.
//!
//! A move or copy walks `Idle → SelectingDevice → SelectingCategory →
//! Confirming → Executing → Idle`; a delete skips straight from `Idle` to
//! `Confirming`. Every transition checks the current phase and leaves the
//! state untouched when it does not apply.

use kfe_transfer::{Operation, SourceItem};
use serde::Serialize;

/// Where a move or copy lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub device: String,
    /// Category folder name; empty for uncategorized.
    pub category: String,
}

/// A fully specified operation, ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub op: Operation,
    pub sources: Vec<SourceItem>,
    /// `None` for deletes.
    pub destination: Option<Destination>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum OperationState {
    #[default]
    Idle,
    SelectingDevice {
        op: Operation,
        sources: Vec<SourceItem>,
    },
    SelectingCategory {
        op: Operation,
        sources: Vec<SourceItem>,
        device: String,
    },
    Confirming(Plan),
    Executing(Plan),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} while {phase}")]
    Invalid {
        action: &'static str,
        phase: &'static str,
    },

    #[error("nothing selected")]
    NoSources,
}

impl OperationState {
    /// Short phase name for messages and logs.
    pub fn phase(&self) -> &'static str {
        match self {
            OperationState::Idle => "idle",
            OperationState::SelectingDevice { .. } => "selecting a device",
            OperationState::SelectingCategory { .. } => "selecting a category",
            OperationState::Confirming(_) => "confirming",
            OperationState::Executing(_) => "executing",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, OperationState::Idle)
    }

    /// Operation in progress, if any.
    pub fn op(&self) -> Option<Operation> {
        match self {
            OperationState::Idle => None,
            OperationState::SelectingDevice { op, .. } | OperationState::SelectingCategory { op, .. } => Some(*op),
            OperationState::Confirming(plan) | OperationState::Executing(plan) => Some(plan.op),
        }
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::Invalid {
            action,
            phase: self.phase(),
        }
    }

    /// Starts `op` on `sources`.
    pub fn begin(&mut self, op: Operation, sources: Vec<SourceItem>) -> Result<(), TransitionError> {
        if !self.is_idle() {
            return Err(self.invalid("begin an operation"));
        }
        if sources.is_empty() {
            return Err(TransitionError::NoSources);
        }
        *self = if op.needs_destination() {
            OperationState::SelectingDevice { op, sources }
        } else {
            OperationState::Confirming(Plan {
                op,
                sources,
                destination: None,
            })
        };
        Ok(())
    }

    pub fn pick_device(&mut self, device: &str) -> Result<(), TransitionError> {
        match std::mem::take(self) {
            OperationState::SelectingDevice { op, sources } => {
                *self = OperationState::SelectingCategory {
                    op,
                    sources,
                    device: device.to_string(),
                };
                Ok(())
            }
            other => {
                *self = other;
                Err(self.invalid("pick a device"))
            }
        }
    }

    pub fn pick_category(&mut self, category: &str) -> Result<(), TransitionError> {
        match std::mem::take(self) {
            OperationState::SelectingCategory { op, sources, device } => {
                *self = OperationState::Confirming(Plan {
                    op,
                    sources,
                    destination: Some(Destination {
                        device,
                        category: category.to_string(),
                    }),
                });
                Ok(())
            }
            other => {
                *self = other;
                Err(self.invalid("pick a category"))
            }
        }
    }

    /// Moves to `Executing` and returns the plan to run.
    pub fn confirm(&mut self) -> Result<Plan, TransitionError> {
        match std::mem::take(self) {
            OperationState::Confirming(plan) => {
                *self = OperationState::Executing(plan.clone());
                Ok(plan)
            }
            other => {
                *self = other;
                Err(self.invalid("confirm"))
            }
        }
    }

    /// Steps back one phase. Running operations cannot be backed out of.
    pub fn back(&mut self) -> Result<(), TransitionError> {
        match std::mem::take(self) {
            OperationState::SelectingDevice { .. } => Ok(()),
            OperationState::SelectingCategory { op, sources, .. } => {
                *self = OperationState::SelectingDevice { op, sources };
                Ok(())
            }
            OperationState::Confirming(Plan {
                op,
                sources,
                destination: Some(dest),
            }) => {
                *self = OperationState::SelectingCategory {
                    op,
                    sources,
                    device: dest.device,
                };
                Ok(())
            }
            OperationState::Confirming(Plan { destination: None, .. }) => Ok(()),
            other => {
                *self = other;
                Err(self.invalid("go back"))
            }
        }
    }

    /// Returns to `Idle` once execution is over.
    pub fn finish(&mut self) -> Result<(), TransitionError> {
        match self {
            OperationState::Executing(_) => {
                *self = OperationState::Idle;
                Ok(())
            }
            _ => Err(self.invalid("finish")),
        }
    }
}
