//! Process lifecycle supervisor.
//!
//! Starts a fixed set of configured processes, watches fire-and-forget ones and restarts
//! them within a budget, runs run-and-wait ones against a deadline, and kills everything
//! still alive on shutdown.

pub mod cli;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod supervisor;

pub use supervisor::{ShutdownReport, Supervisor};
