//! Intake Flow — multi-step intake wizard with draft and reload recovery.

pub mod config;
pub mod console;
pub mod error;
pub mod intake;
pub mod store;
