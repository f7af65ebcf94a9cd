//! Core domain types: identifiers, job records, and state machines.

pub mod job;
pub mod state;
pub mod types;
