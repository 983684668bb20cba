//! Explorer controller.
//!
//! Wires the scanner, snapshot cache, settings store, naming enforcer,
//! free-space probe and transfer engine into one foreground session. User
//! intent flows through an explicit [`OperationState`] machine; the sources
//! of an operation come from the [`Selection`].

mod error;
mod explorer;
mod selection;
mod state;

pub use error::ExplorerError;
pub use explorer::{Explorer, ExplorerOptions, SettingsChange};
pub use selection::Selection;
pub use state::{Destination, OperationState, Plan, TransitionError};
