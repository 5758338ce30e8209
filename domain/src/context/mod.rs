//! Context-window management

pub mod trimming;
