//! Process-wide shared state. Plain `Arc`-wrapped fields rather than the teacher's type-erased
//! `Extensions` map (`crates/cloudillo-core/src/app.rs`) — this process has a small, fixed set of
//! collaborators known at compile time, not a registry of optional platform features.

use std::sync::Arc;

use messaging_types::prelude::*;

use crate::config::Config;
use crate::scheduler::SchedulerKernel;

pub struct AppState {
	pub config: Config,
	pub scheduler: SchedulerKernel,
	pub message_store: Arc<dyn MessageStore>,
	pub user_directory: Arc<dyn UserDirectory>,
	pub study_service: Arc<dyn StudyService>,
	pub email_client: Arc<dyn EmailClient>,
	pub logging_service: Arc<dyn LoggingService>,
}

pub type App = Arc<AppState>;
