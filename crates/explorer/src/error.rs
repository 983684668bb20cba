//! Explorer error types.

use kfe_transfer::{Operation, PreflightError};

use crate::state::TransitionError;

/// Errors produced by the explorer controller.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("not in catalog: {0}")]
    NotInCatalog(String),

    #[error("{0:?} needs a destination")]
    MissingDestination(Operation),

    #[error("settings error: {0}")]
    Settings(#[from] kfe_settings::SettingsError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Preflight(#[from] PreflightError),
}
