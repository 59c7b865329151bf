//! In-memory `MessageStore` test double (§10.4). Mirrors the teacher's `InMemoryTaskStore`: kept for
//! tests, never constructed by the production binary. Gated behind the `testing` feature.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, MessagingResult};
use crate::message_store::{is_claimable, MessageStore};
use crate::types::{AutoMessage, EmailTemplate, InstanceId, OutgoingEmail, SentEmail, Timestamp};

#[derive(Default)]
struct TenantData {
	outgoing: Vec<OutgoingEmail>,
	sent: Vec<SentEmail>,
	auto_messages: Vec<AutoMessage>,
	templates: Vec<EmailTemplate>,
}

pub struct InMemoryMessageStore {
	instances: Mutex<Vec<InstanceId>>,
	tenants: Mutex<HashMap<InstanceId, TenantData>>,
}

impl InMemoryMessageStore {
	#[must_use]
	pub fn new(instances: Vec<InstanceId>) -> Self {
		Self { instances: Mutex::new(instances), tenants: Mutex::new(HashMap::new()) }
	}

	fn with_tenant<T>(&self, instance: &InstanceId, f: impl FnOnce(&mut TenantData) -> T) -> T {
		let mut tenants = self.tenants.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		f(tenants.entry(instance.clone()).or_default())
	}
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
	async fn fetch_outgoing_emails(
		&self,
		instance: &InstanceId,
		limit: u32,
		lease_older_than_secs: i64,
		only_high_prio: bool,
	) -> MessagingResult<Vec<OutgoingEmail>> {
		let now = Timestamp::now();
		Ok(self.with_tenant(instance, |tenant| {
			let mut claimed = Vec::new();
			for email in &mut tenant.outgoing {
				if claimed.len() as u32 >= limit {
					break;
				}
				if only_high_prio && !email.high_prio {
					continue;
				}
				if !is_claimable(email.last_send_attempt, now, lease_older_than_secs) {
					continue;
				}
				email.last_send_attempt = Some(now);
				claimed.push(email.clone());
			}
			claimed
		}))
	}

	async fn reset_last_send_attempt_for_outgoing(
		&self,
		instance: &InstanceId,
		id: &str,
	) -> MessagingResult<()> {
		self.with_tenant(instance, |tenant| {
			if let Some(email) = tenant.outgoing.iter_mut().find(|e| e.id == id) {
				email.last_send_attempt = None;
			}
		});
		Ok(())
	}

	async fn add_to_outgoing_emails(&self, instance: &InstanceId, email: OutgoingEmail) -> MessagingResult<()> {
		self.with_tenant(instance, |tenant| tenant.outgoing.push(email));
		Ok(())
	}

	async fn delete_outgoing_email(&self, instance: &InstanceId, id: &str) -> MessagingResult<()> {
		self.with_tenant(instance, |tenant| tenant.outgoing.retain(|e| e.id != id));
		Ok(())
	}

	async fn add_to_sent_emails(&self, instance: &InstanceId, email: SentEmail) -> MessagingResult<()> {
		self.with_tenant(instance, |tenant| tenant.sent.push(email));
		Ok(())
	}

	async fn find_auto_messages(
		&self,
		instance: &InstanceId,
		only_active: bool,
	) -> MessagingResult<Vec<AutoMessage>> {
		let now = Timestamp::now();
		Ok(self.with_tenant(instance, |tenant| {
			tenant
				.auto_messages
				.iter()
				.filter(|am| !only_active || am.next_time <= now)
				.cloned()
				.collect()
		}))
	}

	async fn save_auto_message(
		&self,
		instance: &InstanceId,
		auto_message: AutoMessage,
	) -> MessagingResult<AutoMessage> {
		auto_message.validate_until(Timestamp::now())?;
		self.with_tenant(instance, |tenant| {
			if let Some(existing) = tenant.auto_messages.iter_mut().find(|am| am.id == auto_message.id) {
				*existing = auto_message.clone();
			} else {
				tenant.auto_messages.push(auto_message.clone());
			}
		});
		Ok(auto_message)
	}

	async fn delete_auto_message(&self, instance: &InstanceId, id: &str) -> MessagingResult<()> {
		self.with_tenant(instance, |tenant| tenant.auto_messages.retain(|am| am.id != id));
		Ok(())
	}

	async fn find_email_template_by_type(
		&self,
		instance: &InstanceId,
		message_type: &str,
		study_key: Option<&str>,
	) -> MessagingResult<EmailTemplate> {
		self
			.with_tenant(instance, |tenant| {
				tenant
					.templates
					.iter()
					.find(|t| t.message_type.to_string() == message_type && t.study_key.as_deref() == study_key)
					.cloned()
			})
			.ok_or(Error::NotFound)
	}

	async fn get_all_instances(&self) -> MessagingResult<Vec<InstanceId>> {
		let instances = self.instances.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		if instances.is_empty() {
			return Err(Error::ValidationError("no instance is defined; did you forget to define one?".into()));
		}
		Ok(instances.clone())
	}
}

impl InMemoryMessageStore {
	/// Test helper: seed an outgoing record directly, bypassing `add_to_outgoing_emails`'s lease logic.
	pub fn seed_outgoing(&self, instance: &InstanceId, email: OutgoingEmail) {
		self.with_tenant(instance, |tenant| tenant.outgoing.push(email));
	}

	/// Test helper: seed a template directly.
	pub fn seed_template(&self, instance: &InstanceId, template: EmailTemplate) {
		self.with_tenant(instance, |tenant| tenant.templates.push(template));
	}

	/// Test helper: seed a schedule directly.
	pub fn seed_auto_message(&self, instance: &InstanceId, auto_message: AutoMessage) {
		self.with_tenant(instance, |tenant| tenant.auto_messages.push(auto_message));
	}

	#[must_use]
	pub fn outgoing_count(&self, instance: &InstanceId) -> usize {
		self.with_tenant(instance, |tenant| tenant.outgoing.len())
	}

	#[must_use]
	pub fn sent_count(&self, instance: &InstanceId) -> usize {
		self.with_tenant(instance, |tenant| tenant.sent.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn email(id: &str, high_prio: bool, last_send_attempt: Option<Timestamp>) -> OutgoingEmail {
		OutgoingEmail {
			id: id.into(),
			message_type: crate::types::MessageType::Other("test".into()),
			to: vec!["a@x".into()],
			subject: "s".into(),
			header_overrides: None,
			content: "c".into(),
			added_at: Timestamp::now(),
			high_prio,
			last_send_attempt,
		}
	}

	#[tokio::test]
	async fn fetch_stamps_and_excludes_leased() {
		let store = InMemoryMessageStore::new(vec![InstanceId::from("t1")]);
		let instance = InstanceId::from("t1");
		store.seed_outgoing(&instance, email("e1", false, None));
		store.seed_outgoing(&instance, email("e2", false, Some(Timestamp::now())));

		let batch = store.fetch_outgoing_emails(&instance, 20, 2, false).await.unwrap();
		assert_eq!(batch.len(), 1);
		assert_eq!(batch[0].id, "e1");
	}

	#[tokio::test]
	async fn empty_registry_is_an_error() {
		let store = InMemoryMessageStore::new(vec![]);
		assert!(store.get_all_instances().await.is_err());
	}
}
