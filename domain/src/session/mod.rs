//! Conversation session model

pub mod entities;
