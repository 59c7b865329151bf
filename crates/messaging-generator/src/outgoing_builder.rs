//! Outgoing Builder (§4.4), grounded on `bulk_messages.go`'s `prepareOutgoingEmail`,
//! `getUnsubscribeToken`, `getTemploginToken`, and `getEmailsByIds`.

use std::collections::HashMap;

use messaging_template::TemplateEngine;
use messaging_types::prelude::*;

/// 5 years, matching the source's literal `157680000`.
pub const UNSUBSCRIBE_TOKEN_LIFETIME_SECS: i64 = 157_680_000;
/// 7 days, matching the source's `loginTokenLifeTime`.
pub const LOGIN_TOKEN_LIFETIME_SECS: i64 = 604_800;

const TOKEN_PURPOSE_SURVEY_LOGIN: &str = "survey-login";
const TOKEN_PURPOSE_UNSUBSCRIBE_NEWSLETTER: &str = "unsubscribe-newsletter";

/// Assembles one `OutgoingEmail` for `user` from `template`, minting the tokens the message type
/// requires and rendering subject/content. `content_infos` is mutated in place as tokens are
/// acquired, matching the source's single shared map threaded through token calls and the renderer.
#[allow(clippy::too_many_arguments)]
pub async fn prepare_outgoing_email(
	user_directory: &dyn UserDirectory,
	template_engine: &TemplateEngine,
	instance: &InstanceId,
	user: &SubscriptionUser,
	template: &EmailTemplate,
	mut content_infos: HashMap<String, String>,
	include_login_token: bool,
) -> MessagingResult<OutgoingEmail> {
	if user.account.account_type != "email" {
		return Err(Error::ValidationError(format!(
			"account type not supported yet: {}",
			user.account.account_type
		)));
	}

	let mut to = vec![user.account.account_id.clone()];

	if template.message_type == MessageType::Newsletter {
		to = emails_by_ids(&user.contact_infos, &user.contact_preferences.send_newsletter_to);
		let token = user_directory
			.get_or_create_temp_token(
				instance,
				&user.id,
				TOKEN_PURPOSE_UNSUBSCRIBE_NEWSLETTER,
				UNSUBSCRIBE_TOKEN_LIFETIME_SECS,
			)
			.await?;
		content_infos.insert("unsubscribeToken".into(), token);
	}

	if include_login_token {
		let mut info = HashMap::new();
		if let Some(study_key) = &template.study_key {
			info.insert("studyKey".into(), study_key.clone());
		}
		let token = user_directory
			.generate_temp_token(
				instance,
				&user.id,
				TOKEN_PURPOSE_SURVEY_LOGIN,
				LOGIN_TOKEN_LIFETIME_SECS,
				info,
			)
			.await?;
		content_infos.insert("loginToken".into(), token);
		content_infos.insert("studyKey".into(), template.study_key.clone().unwrap_or_default());
	}

	content_infos.insert("language".into(), user.account.preferred_language.clone());

	let rendered = template_engine.render_translation(
		&template.message_type.to_string(),
		template,
		&user.account.preferred_language,
		&content_infos,
	)?;

	Ok(OutgoingEmail {
		id: String::new(),
		message_type: template.message_type.clone(),
		to,
		subject: rendered.subject,
		header_overrides: template.header_overrides.clone(),
		content: rendered.content,
		added_at: Timestamp::now(),
		high_prio: false,
		last_send_attempt: None,
	})
}

/// Resolves `ids` against `contacts`' `email`-typed entries, matching `getEmailsByIds` (§8 S6).
#[must_use]
pub fn emails_by_ids(contacts: &[ContactInfo], ids: &[String]) -> Vec<String> {
	contacts
		.iter()
		.filter(|c| c.contact_type == "email")
		.filter(|c| ids.iter().any(|id| *id == c.id))
		.filter_map(|c| c.email.clone())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use futures_core::stream::BoxStream;
	use messaging_types::types::{Account, ContactPreferences, Translation};
	use std::sync::Mutex;

	struct FakeDirectory {
		temp_tokens: Mutex<Vec<(String, String)>>,
	}

	impl FakeDirectory {
		fn new() -> Self {
			Self { temp_tokens: Mutex::new(Vec::new()) }
		}
	}

	#[async_trait]
	impl UserDirectory for FakeDirectory {
		async fn stream_users(
			&self,
			_instance: &InstanceId,
			_filters: Option<StreamUsersFilters>,
		) -> MessagingResult<BoxStream<'static, MessagingResult<SubscriptionUser>>> {
			unimplemented!("not exercised in these tests")
		}

		async fn generate_temp_token(
			&self,
			_instance: &InstanceId,
			user_id: &str,
			purpose: &str,
			_expires_in_secs: i64,
			_info: HashMap<String, String>,
		) -> MessagingResult<String> {
			self.temp_tokens.lock().unwrap().push((user_id.into(), purpose.into()));
			Ok(format!("token-for-{user_id}"))
		}

		async fn get_or_create_temp_token(
			&self,
			_instance: &InstanceId,
			user_id: &str,
			purpose: &str,
			_expires_in_secs: i64,
		) -> MessagingResult<String> {
			self.temp_tokens.lock().unwrap().push((user_id.into(), purpose.into()));
			Ok(format!("unsub-for-{user_id}"))
		}
	}

	fn template(message_type: MessageType, body: &str) -> EmailTemplate {
		EmailTemplate {
			message_type,
			study_key: Some("study1".into()),
			default_language: "en".into(),
			translations: vec![Translation {
				lang: "en".into(),
				subject: "Hello".into(),
				template_def: base64_encode(body),
			}],
			header_overrides: None,
		}
	}

	fn base64_encode(s: &str) -> String {
		use base64::Engine as _;
		base64::engine::general_purpose::STANDARD.encode(s)
	}

	fn user() -> SubscriptionUser {
		SubscriptionUser {
			id: "u1".into(),
			account: Account {
				account_id: "u1@example.com".into(),
				account_type: "email".into(),
				preferred_language: "en".into(),
			},
			contact_infos: vec![
				ContactInfo { id: "e1".into(), contact_type: "email".into(), email: Some("a@x".into()) },
				ContactInfo { id: "e2".into(), contact_type: "email".into(), email: Some("b@x".into()) },
				ContactInfo { id: "e3".into(), contact_type: "email".into(), email: Some("c@x".into()) },
			],
			contact_preferences: ContactPreferences {
				subscribed_to_weekly: true,
				subscribed_to_newsletter: true,
				send_newsletter_to: vec!["e1".into(), "e3".into()],
			},
			profiles: vec![],
		}
	}

	#[tokio::test]
	async fn unsupported_account_type_fails() {
		let directory = FakeDirectory::new();
		let engine = TemplateEngine::new();
		let mut u = user();
		u.account.account_type = "phone".into();
		let err = prepare_outgoing_email(
			&directory,
			&engine,
			&InstanceId::from("t1"),
			&u,
			&template(MessageType::Weekly, "hi {{language}}"),
			HashMap::new(),
			false,
		)
		.await
		.unwrap_err();
		assert!(matches!(err, Error::ValidationError(_)));
	}

	#[tokio::test]
	async fn newsletter_expands_recipients_and_adds_unsubscribe_token() {
		// S6 Newsletter expansion.
		let directory = FakeDirectory::new();
		let engine = TemplateEngine::new();
		let out = prepare_outgoing_email(
			&directory,
			&engine,
			&InstanceId::from("t1"),
			&user(),
			&template(MessageType::Newsletter, "body {{unsubscribeToken}}"),
			HashMap::new(),
			false,
		)
		.await
		.unwrap();
		assert_eq!(out.to, vec!["a@x".to_string(), "c@x".to_string()]);
		assert!(out.content.contains("unsub-for-u1"));
	}

	#[tokio::test]
	async fn login_token_included_when_requested() {
		let directory = FakeDirectory::new();
		let engine = TemplateEngine::new();
		let out = prepare_outgoing_email(
			&directory,
			&engine,
			&InstanceId::from("t1"),
			&user(),
			&template(MessageType::StudyReminder, "login {{loginToken}} study {{studyKey}}"),
			HashMap::new(),
			true,
		)
		.await
		.unwrap();
		assert!(out.content.contains("token-for-u1"));
		assert!(out.content.contains("study1"));
	}

	#[tokio::test]
	async fn render_failure_is_propagated() {
		let directory = FakeDirectory::new();
		let engine = TemplateEngine::new();
		let err = prepare_outgoing_email(
			&directory,
			&engine,
			&InstanceId::from("t1"),
			&user(),
			&template(MessageType::Weekly, "missing {{doesNotExist}}"),
			HashMap::new(),
			false,
		)
		.await
		.unwrap_err();
		assert!(matches!(err, Error::ValidationError(_)));
	}
}
