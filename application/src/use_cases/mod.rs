//! Use cases - application orchestration logic

pub mod run_loop;

pub use run_loop::{LoopEvent, LoopOutcome, LoopRequest, RunLoopError, RunLoopUseCase};
