//! Out-of-scope external collaborators (§1, §6), modeled as `async_trait` interfaces only. No
//! concrete SMTP/gRPC/directory-streaming implementation lives in this workspace; these traits exist
//! so the Generator and Sender can be written, and unit-tested, against them.

use async_trait::async_trait;
use futures_core::stream::BoxStream;

use crate::error::MessagingResult;
use crate::types::{HeaderOverrides, InstanceId, StreamUsersFilters, SubscriptionUser};

/// User-directory streaming service (§6).
#[async_trait]
pub trait UserDirectory: Send + Sync {
	async fn stream_users(
		&self,
		instance: &InstanceId,
		filters: Option<StreamUsersFilters>,
	) -> MessagingResult<BoxStream<'static, MessagingResult<SubscriptionUser>>>;

	/// One-shot temp token, e.g. the `survey-login` purpose (§4.4).
	async fn generate_temp_token(
		&self,
		instance: &InstanceId,
		user_id: &str,
		purpose: &str,
		expires_in_secs: i64,
		info: std::collections::HashMap<String, String>,
	) -> MessagingResult<String>;

	/// Idempotent variant used for the long-lived unsubscribe token (§4.4).
	async fn get_or_create_temp_token(
		&self,
		instance: &InstanceId,
		user_id: &str,
		purpose: &str,
		expires_in_secs: i64,
	) -> MessagingResult<String>;
}

/// Study service: eligibility evaluation and the participant-message queue (§6).
#[async_trait]
pub trait StudyService: Send + Sync {
	async fn has_participant_state_with_condition(
		&self,
		instance: &InstanceId,
		profile_ids: &[String],
		study_key: &str,
		condition: &crate::types::Condition,
	) -> MessagingResult<bool>;

	async fn get_participant_messages(
		&self,
		instance: &InstanceId,
		study_key: &str,
		profile_id: &str,
	) -> MessagingResult<Vec<crate::types::ParticipantMessage>>;

	async fn delete_messages_from_participant(
		&self,
		instance: &InstanceId,
		study_key: &str,
		profile_id: &str,
		message_ids: &[String],
	) -> MessagingResult<()>;

	async fn get_researcher_messages(
		&self,
		instance: &InstanceId,
	) -> MessagingResult<Vec<crate::types::ResearcherMessage>>;

	async fn delete_researcher_messages(
		&self,
		instance: &InstanceId,
		study_key: &str,
		message_ids: &[String],
	) -> MessagingResult<()>;
}

/// SMTP-facing (or file-dump emulator) email client (§6).
#[async_trait]
pub trait EmailClient: Send + Sync {
	async fn send_email(
		&self,
		to: &[String],
		header_overrides: Option<&HeaderOverrides>,
		subject: &str,
		content: &str,
		high_prio: bool,
	) -> MessagingResult<()>;
}

/// Centralized audit-log sink (§6).
#[async_trait]
pub trait LoggingService: Send + Sync {
	async fn save_log_event(
		&self,
		instance: &InstanceId,
		user_id: &str,
		event_type: &str,
		event_name: &str,
		msg: &str,
	);
}
