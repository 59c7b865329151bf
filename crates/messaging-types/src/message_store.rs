//! Message Store API (§4.2): typed, per-tenant operations on schedules, templates, the outgoing
//! queue, sent history, and the tenant registry. A single `async_trait` interface with exactly one
//! in-scope concrete implementation (the sqlite adapter, §11); an in-memory test double lives
//! alongside it behind the `testing` feature (§10.4), never wired into the production binary.

use async_trait::async_trait;

use crate::error::MessagingResult;
use crate::types::{AutoMessage, EmailTemplate, InstanceId, OutgoingEmail, SentEmail, Timestamp};

#[async_trait]
pub trait MessageStore: Send + Sync {
	/// Returns up to `limit` outgoing records for `instance` with
	/// `last_send_attempt < now - lease_older_than_secs` (or unset), filtered to `high_prio == true`
	/// when `only_high_prio`, and atomically stamps `last_send_attempt = now` on each returned record.
	async fn fetch_outgoing_emails(
		&self,
		instance: &InstanceId,
		limit: u32,
		lease_older_than_secs: i64,
		only_high_prio: bool,
	) -> MessagingResult<Vec<OutgoingEmail>>;

	/// Clears the lease on `id` so a failed send can be retried next cycle.
	async fn reset_last_send_attempt_for_outgoing(
		&self,
		instance: &InstanceId,
		id: &str,
	) -> MessagingResult<()>;

	async fn add_to_outgoing_emails(
		&self,
		instance: &InstanceId,
		email: OutgoingEmail,
	) -> MessagingResult<()>;

	async fn delete_outgoing_email(&self, instance: &InstanceId, id: &str) -> MessagingResult<()>;

	async fn add_to_sent_emails(&self, instance: &InstanceId, email: SentEmail) -> MessagingResult<()>;

	/// When `only_active`, returns only schedules with `next_time <= now`.
	async fn find_auto_messages(
		&self,
		instance: &InstanceId,
		only_active: bool,
	) -> MessagingResult<Vec<AutoMessage>>;

	/// Enforces `until == 0 ∨ (until > now ∧ until > nextTime)` (§8 Invariant 3) before persisting.
	async fn save_auto_message(
		&self,
		instance: &InstanceId,
		auto_message: AutoMessage,
	) -> MessagingResult<AutoMessage>;

	async fn delete_auto_message(&self, instance: &InstanceId, id: &str) -> MessagingResult<()>;

	async fn find_email_template_by_type(
		&self,
		instance: &InstanceId,
		message_type: &str,
		study_key: Option<&str>,
	) -> MessagingResult<EmailTemplate>;

	/// Returns the tenant list; an empty registry is a distinguishable error (§3), not a panic.
	async fn get_all_instances(&self) -> MessagingResult<Vec<InstanceId>>;
}

/// Helper shared by every `MessageStore` implementation for the lease-expiry comparison in
/// `fetch_outgoing_emails`: a record is claimable iff it has no lease or the lease predates the cutoff.
#[must_use]
pub fn is_claimable(last_send_attempt: Option<Timestamp>, now: Timestamp, lease_older_than_secs: i64) -> bool {
	match last_send_attempt {
		None => true,
		Some(ts) => ts.0 < now.0 - lease_older_than_secs,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unstamped_record_is_claimable() {
		assert!(is_claimable(None, Timestamp(1000), 2));
	}

	#[test]
	fn expired_lease_is_claimable() {
		// S1 Lease reclaim: last_send_attempt = now - 3s, lease = 2s.
		assert!(is_claimable(Some(Timestamp(997)), Timestamp(1000), 2));
	}

	#[test]
	fn fresh_lease_is_protected() {
		// S2 Lease protect: last_send_attempt = now - 1s, lease = 2s.
		assert!(!is_claimable(Some(Timestamp(999)), Timestamp(1000), 2));
	}
}
