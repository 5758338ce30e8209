//! Agent loop state

pub mod loop_state;
