//! Eligibility Filter (§4.3), Outgoing Builder (§4.4), and the four Generator Loops plus schedule
//! advance (§4.5).

pub mod counters;
pub mod eligibility;
pub mod generator;
pub mod outgoing_builder;

pub use generator::{
	advance_schedule, dispatch_auto_message, generate_for_all_users, generate_for_study_participants,
	generate_researcher_notifications, generate_scheduled_participant_messages, tick_all_tenants_auto_messages,
	tick_all_tenants_participant_messages, tick_all_tenants_researcher_notifications, tick_tenant_auto_messages,
	tick_tenant_participant_messages, GeneratorContext, ScheduleAdvance,
};
