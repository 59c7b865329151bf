//! Sender Loops (§4.6): two periodic drivers (high-prio, low-prio) draining the per-tenant outgoing
//! queue in bounded, leased batches. Grounded on `main.go`'s `runnerForHighPrioOutgoingEmails`,
//! `runnerForLowPrioOutgoingEmails`, and `handleOutgoingForInstanceID`.

use std::sync::Arc;
use std::time::Instant;

use messaging_types::prelude::*;

/// One batch fetch never asks for more than this many records (§4.6).
pub const BATCH_SIZE: u32 = 20;

/// A sender loop's fixed parameters and collaborators. `LEASE_MULTIPLIER` and
/// `BATCH_CUTOFF_FRACTION` are the two magic constants the design notes call out (§9): the lease
/// given to a claimed record is `period * LEASE_MULTIPLIER` seconds, and a worker stops claiming
/// more of its batch once it has used `BATCH_CUTOFF_FRACTION` of that lease.
pub struct SenderLoop {
	pub message_store: Arc<dyn MessageStore>,
	pub email_client: Arc<dyn EmailClient>,
	pub only_high_prio: bool,
	pub period_secs: i64,
}

impl SenderLoop {
	/// `leaseDuration = 2.5 x period` (§4.6, §9).
	pub const LEASE_MULTIPLIER: f64 = 2.5;
	/// A worker skips (and releases) the rest of its batch once elapsed time exceeds this fraction
	/// of the lease duration (§5 Batch-duration guard, §8 S3).
	pub const BATCH_CUTOFF_FRACTION: f64 = 0.9;

	#[must_use]
	pub fn lease_duration_secs(&self) -> i64 {
		lease_duration_secs(self.period_secs)
	}

	/// Drains `instance`'s outgoing queue in `BATCH_SIZE` batches until a batch comes back empty or
	/// the worker runs past its own cutoff, then logs the per-tenant totals (§4.6 steps 1-4).
	pub async fn drain_tenant(&self, instance: &InstanceId) {
		let lease_duration = self.lease_duration_secs();
		let cutoff = std::time::Duration::from_secs_f64(lease_duration as f64 * Self::BATCH_CUTOFF_FRACTION);
		let started_at = Instant::now();

		let mut sent = 0u64;
		let mut failed = 0u64;

		loop {
			let batch = match self
				.message_store
				.fetch_outgoing_emails(instance, BATCH_SIZE, lease_duration, self.only_high_prio)
				.await
			{
				Ok(batch) => batch,
				Err(err) => {
					warn!(instance = %instance, %err, "fetchOutgoingEmails failed");
					break;
				}
			};
			if batch.is_empty() {
				break;
			}

			let mut aborted = false;
			for email in batch {
				if started_at.elapsed() > cutoff {
					if let Err(err) = self.message_store.reset_last_send_attempt_for_outgoing(instance, &email.id).await {
						warn!(instance = %instance, email = %email.id, %err, "resetLastSendAttemptForOutgoing failed after batch cutoff");
					}
					aborted = true;
					continue;
				}

				match self
					.email_client
					.send_email(&email.to, email.header_overrides.as_ref(), &email.subject, &email.content, email.high_prio)
					.await
				{
					Ok(()) => {
						let sent_email = email.clone().into_sent(Timestamp::now());
						if let Err(err) = self.message_store.add_to_sent_emails(instance, sent_email).await {
							// §7: commit failure leaves the outgoing record in place; explicit
							// at-least-once, a future tick will retry the send.
							warn!(instance = %instance, email = %email.id, %err, "addToSentEmails failed, outgoing record retained for retry");
							continue;
						}
						if let Err(err) = self.message_store.delete_outgoing_email(instance, &email.id).await {
							warn!(instance = %instance, email = %email.id, %err, "deleteOutgoingEmail failed after commit");
						}
						sent += 1;
					}
					Err(err) => {
						warn!(instance = %instance, email = %email.id, %err, "sendEmail failed, lease released for retry");
						if let Err(reset_err) = self.message_store.reset_last_send_attempt_for_outgoing(instance, &email.id).await {
							warn!(instance = %instance, email = %email.id, err = %reset_err, "resetLastSendAttemptForOutgoing failed");
						}
						failed += 1;
					}
				}
			}

			if aborted {
				break;
			}
		}

		info!(
			instance = %instance,
			only_high_prio = self.only_high_prio,
			sent,
			failed,
			duration_secs = started_at.elapsed().as_secs(),
			"sender drain finished"
		);
	}

	/// Fans out across every tenant, one drain worker each, joined before the tick completes
	/// (§4.6: "for each tick, asynchronously: fetch all tenants; for each tenant spawn a drain
	/// worker").
	pub async fn tick(self: Arc<Self>) {
		let instances = match self.message_store.get_all_instances().await {
			Ok(v) => v,
			Err(err) => {
				warn!(%err, "getAllInstances failed for the sender tick");
				return;
			}
		};

		let mut workers = tokio::task::JoinSet::new();
		for instance in instances {
			let this = Arc::clone(&self);
			workers.spawn(async move { this.drain_tenant(&instance).await });
		}
		while workers.join_next().await.is_some() {}
	}
}

#[must_use]
pub fn lease_duration_secs(period_secs: i64) -> i64 {
	#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
	{
		(period_secs as f64 * SenderLoop::LEASE_MULTIPLIER).round() as i64
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use messaging_types::memory_store::InMemoryMessageStore;
	use messaging_types::types::{HeaderOverrides, MessageType, OutgoingEmail};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;

	struct FakeEmailClient {
		fail_these: Mutex<Vec<String>>,
		sent_count: AtomicUsize,
	}

	impl FakeEmailClient {
		fn new() -> Self {
			Self { fail_these: Mutex::new(Vec::new()), sent_count: AtomicUsize::new(0) }
		}
	}

	#[async_trait]
	impl EmailClient for FakeEmailClient {
		async fn send_email(
			&self,
			to: &[String],
			_header_overrides: Option<&HeaderOverrides>,
			_subject: &str,
			_content: &str,
			_high_prio: bool,
		) -> MessagingResult<()> {
			if self.fail_these.lock().unwrap().iter().any(|addr| to.contains(addr)) {
				return Err(Error::ServiceUnavailable("simulated transport failure".into()));
			}
			self.sent_count.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn email(id: &str, high_prio: bool) -> OutgoingEmail {
		OutgoingEmail {
			id: id.into(),
			message_type: MessageType::Other("test".into()),
			to: vec![format!("{id}@x")],
			subject: "s".into(),
			header_overrides: None,
			content: "c".into(),
			added_at: Timestamp::now(),
			high_prio,
			last_send_attempt: None,
		}
	}

	#[tokio::test]
	async fn successful_send_relocates_to_sent() {
		let store = Arc::new(InMemoryMessageStore::new(vec![InstanceId::from("t1")]));
		let instance = InstanceId::from("t1");
		store.seed_outgoing(&instance, email("e1", false));

		let sender = SenderLoop { message_store: store.clone(), email_client: Arc::new(FakeEmailClient::new()), only_high_prio: false, period_secs: 10 };
		sender.drain_tenant(&instance).await;

		assert_eq!(store.outgoing_count(&instance), 0);
		assert_eq!(store.sent_count(&instance), 1);
	}

	#[tokio::test]
	async fn transport_failure_releases_lease_for_retry() {
		let store = Arc::new(InMemoryMessageStore::new(vec![InstanceId::from("t1")]));
		let instance = InstanceId::from("t1");
		store.seed_outgoing(&instance, email("e1", false));

		let client = Arc::new(FakeEmailClient::new());
		client.fail_these.lock().unwrap().push("e1@x".into());

		let sender = SenderLoop { message_store: store.clone(), email_client: client, only_high_prio: false, period_secs: 10 };
		sender.drain_tenant(&instance).await;

		// Still in outgoing (failed send, lease released), not relocated to sent.
		assert_eq!(store.outgoing_count(&instance), 1);
		assert_eq!(store.sent_count(&instance), 0);

		// Lease was released: an immediate re-fetch with a generous lease window claims it again.
		let refetched = store.fetch_outgoing_emails(&instance, 20, 0, false).await.unwrap();
		assert_eq!(refetched.len(), 1);
	}

	#[tokio::test]
	async fn only_high_prio_skips_low_prio_records() {
		let store = Arc::new(InMemoryMessageStore::new(vec![InstanceId::from("t1")]));
		let instance = InstanceId::from("t1");
		store.seed_outgoing(&instance, email("low", false));
		store.seed_outgoing(&instance, email("high", true));

		let sender = SenderLoop { message_store: store.clone(), email_client: Arc::new(FakeEmailClient::new()), only_high_prio: true, period_secs: 10 };
		sender.drain_tenant(&instance).await;

		assert_eq!(store.outgoing_count(&instance), 1);
		assert_eq!(store.sent_count(&instance), 1);
	}

	#[test]
	fn lease_multiplier_matches_design_constant() {
		assert_eq!(lease_duration_secs(100), 250);
	}
}
