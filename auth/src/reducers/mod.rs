//! Flow reducers.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.

pub mod verification;

pub use verification::FlowReducer;
