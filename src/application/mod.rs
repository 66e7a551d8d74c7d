//! Application layer - the cycle scheduler

pub mod scheduler;

pub use scheduler::{CycleSummary, Scheduler};
