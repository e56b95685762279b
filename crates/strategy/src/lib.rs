pub mod reference;
pub mod selector;

pub use reference::{ReferenceState, ReferenceStateMachine};
pub use selector::{SelectionOutcome, StrikeSelector};
