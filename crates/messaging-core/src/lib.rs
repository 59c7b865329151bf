//! Configuration, scheduler kernel, and shared process state for the messaging scheduler.

pub mod app;
pub mod config;
pub mod scheduler;

pub use app::{App, AppState};
pub use config::Config;
pub use scheduler::SchedulerKernel;
