//! Edit history and the state machine around it

#[allow(clippy::module_inception)]
mod edit;
pub mod events;
mod system;
mod transition;

pub use edit::{CommitOptions, Edit};
pub use events::{EditEvent, EventBus};
pub use system::{EditSystem, EditSystemBuilder};
pub use transition::Transition;
