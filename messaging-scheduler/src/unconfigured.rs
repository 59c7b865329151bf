//! Placeholder collaborator clients. `UserDirectory`, `StudyService`, `EmailClient`, and
//! `LoggingService` are out-of-scope external collaborators (§1, §6 of the design document):
//! concrete gRPC/HTTP/SMTP clients for them live in services this workspace does not own. These
//! stubs exist only so the binary links and the in-scope loops (Sender's lease/claim machinery,
//! the sqlite store) can actually be driven end to end; a real deployment replaces them with real
//! clients at the addresses `Config::service_urls` already resolves.

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use messaging_types::prelude::*;

pub struct UnconfiguredCollaborator {
	pub addr: String,
}

#[async_trait]
impl UserDirectory for UnconfiguredCollaborator {
	async fn stream_users(
		&self,
		_instance: &InstanceId,
		_filters: Option<StreamUsersFilters>,
	) -> MessagingResult<BoxStream<'static, MessagingResult<SubscriptionUser>>> {
		Err(Error::ServiceUnavailable(format!("user directory client not configured for {}", self.addr)))
	}

	async fn generate_temp_token(
		&self,
		_instance: &InstanceId,
		_user_id: &str,
		_purpose: &str,
		_expires_in_secs: i64,
		_info: std::collections::HashMap<String, String>,
	) -> MessagingResult<String> {
		Err(Error::ServiceUnavailable(format!("user directory client not configured for {}", self.addr)))
	}

	async fn get_or_create_temp_token(
		&self,
		_instance: &InstanceId,
		_user_id: &str,
		_purpose: &str,
		_expires_in_secs: i64,
	) -> MessagingResult<String> {
		Err(Error::ServiceUnavailable(format!("user directory client not configured for {}", self.addr)))
	}
}

#[async_trait]
impl StudyService for UnconfiguredCollaborator {
	async fn has_participant_state_with_condition(
		&self,
		_instance: &InstanceId,
		_profile_ids: &[String],
		_study_key: &str,
		_condition: &Condition,
	) -> MessagingResult<bool> {
		Err(Error::ServiceUnavailable(format!("study service client not configured for {}", self.addr)))
	}

	async fn get_participant_messages(
		&self,
		_instance: &InstanceId,
		_study_key: &str,
		_profile_id: &str,
	) -> MessagingResult<Vec<ParticipantMessage>> {
		Err(Error::ServiceUnavailable(format!("study service client not configured for {}", self.addr)))
	}

	async fn delete_messages_from_participant(
		&self,
		_instance: &InstanceId,
		_study_key: &str,
		_profile_id: &str,
		_message_ids: &[String],
	) -> MessagingResult<()> {
		Err(Error::ServiceUnavailable(format!("study service client not configured for {}", self.addr)))
	}

	async fn get_researcher_messages(&self, _instance: &InstanceId) -> MessagingResult<Vec<ResearcherMessage>> {
		Err(Error::ServiceUnavailable(format!("study service client not configured for {}", self.addr)))
	}

	async fn delete_researcher_messages(
		&self,
		_instance: &InstanceId,
		_study_key: &str,
		_message_ids: &[String],
	) -> MessagingResult<()> {
		Err(Error::ServiceUnavailable(format!("study service client not configured for {}", self.addr)))
	}
}

#[async_trait]
impl EmailClient for UnconfiguredCollaborator {
	async fn send_email(
		&self,
		_to: &[String],
		_header_overrides: Option<&HeaderOverrides>,
		_subject: &str,
		_content: &str,
		_high_prio: bool,
	) -> MessagingResult<()> {
		Err(Error::ServiceUnavailable(format!("email client not configured for {}", self.addr)))
	}
}

#[async_trait]
impl LoggingService for UnconfiguredCollaborator {
	async fn save_log_event(&self, instance: &InstanceId, user_id: &str, event_type: &str, event_name: &str, msg: &str) {
		warn!(
			instance = %instance,
			user_id,
			event_type,
			event_name,
			msg,
			addr = %self.addr,
			"logging service not configured, dropping log event"
		);
	}
}
