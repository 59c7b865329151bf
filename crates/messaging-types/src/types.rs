//! Core value types shared across the messaging scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tenant identifier. Enumerated from the global `instances` registry (§3);
/// unlike the teacher's numeric `TnId`, tenants here are addressed by the
/// opaque string `instanceId` the directory/study/email services already key on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for InstanceId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

impl From<&str> for InstanceId {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}

/// Unix-second timestamp, serialized as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Self {
		#[allow(clippy::cast_possible_wrap)]
		let secs = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_secs() as i64)
			.unwrap_or(0);
		Self(secs)
	}

	pub fn from_now(delta_secs: i64) -> Self {
		Self(Self::now().0 + delta_secs)
	}

	#[must_use]
	pub fn add_seconds(self, secs: i64) -> Self {
		Self(self.0 + secs)
	}

	#[must_use]
	pub fn is_past(self) -> bool {
		self.0 < Self::now().0
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Weekday as used by the directory's reminder-weekday filter, 0 = Sunday .. 6 = Saturday,
/// matching the source's `time.Weekday` / protobuf `int32` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weekday(pub i32);

/// One `(lang, subject, body)` translation of an email template. `body` is base64-encoded at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
	pub lang: String,
	pub subject: String,
	pub template_def: String,
}

/// Header overrides forwarded verbatim to the email client (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderOverrides {
	pub from: Option<String>,
	pub sender: Option<String>,
	#[serde(default)]
	pub reply_to: Vec<String>,
	#[serde(default)]
	pub no_reply_to: bool,
}

/// `{messageType, studyKey?, defaultLanguage, translations[], headerOverrides?}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
	pub message_type: MessageType,
	pub study_key: Option<String>,
	pub default_language: String,
	pub translations: Vec<Translation>,
	pub header_overrides: Option<HeaderOverrides>,
}

/// The fixed set of message types the Eligibility Filter and Outgoing Builder branch on (§4.3, §4.4).
/// `Other` covers any additional type the admin surface may define — weekday gating and subscription
/// checks both fall back to permissive defaults for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
	Weekly,
	Newsletter,
	StudyReminder,
	#[serde(untagged)]
	Other(String),
}

impl fmt::Display for MessageType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			MessageType::Weekly => write!(f, "weekly"),
			MessageType::Newsletter => write!(f, "newsletter"),
			MessageType::StudyReminder => write!(f, "studyReminder"),
			MessageType::Other(s) => write!(f, "{}", s),
		}
	}
}

/// `type ∈ {all-users, study-participants, scheduled-participant-messages, researcher-notifications}` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoMessageType {
	AllUsers,
	StudyParticipants,
	ScheduledParticipantMessages,
	ResearcherNotifications,
}

/// An opaque expression tree evaluated by the study service; passed through unexamined (§4.4).
pub type Condition = serde_json::Value;

/// `{id, template, type, studyKey?, condition?, nextTime, period, until?, label}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMessage {
	pub id: String,
	pub template: EmailTemplate,
	#[serde(rename = "type")]
	pub kind: AutoMessageType,
	pub study_key: Option<String>,
	pub condition: Option<Condition>,
	pub next_time: Timestamp,
	pub period: i64,
	pub until: Option<Timestamp>,
	pub label: String,
}

impl AutoMessage {
	/// `until == 0 ∨ (until > now ∧ until > nextTime)` (§8 Invariant 3).
	pub fn validate_until(&self, now: Timestamp) -> crate::error::MessagingResult<()> {
		let Some(until) = self.until else { return Ok(()) };
		if until.0 <= 0 {
			return Ok(());
		}
		if until <= now {
			return Err(crate::error::Error::ValidationError(
				"until is in the past".into(),
			));
		}
		if until <= self.next_time {
			return Err(crate::error::Error::ValidationError(
				"until is earlier than nextTime".into(),
			));
		}
		Ok(())
	}
}

/// `{id, messageType, to[], subject, headerOverrides?, content, addedAt, highPrio, lastSendAttempt?}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingEmail {
	pub id: String,
	pub message_type: MessageType,
	pub to: Vec<String>,
	pub subject: String,
	pub header_overrides: Option<HeaderOverrides>,
	pub content: String,
	pub added_at: Timestamp,
	pub high_prio: bool,
	pub last_send_attempt: Option<Timestamp>,
}

/// Append-only audit copy of an `OutgoingEmail` with a send timestamp (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEmail {
	pub id: String,
	pub message_type: MessageType,
	pub to: Vec<String>,
	pub subject: String,
	pub header_overrides: Option<HeaderOverrides>,
	pub content: String,
	pub added_at: Timestamp,
	pub high_prio: bool,
	pub sent_at: Timestamp,
}

impl OutgoingEmail {
	#[must_use]
	pub fn into_sent(self, sent_at: Timestamp) -> SentEmail {
		SentEmail {
			id: self.id,
			message_type: self.message_type,
			to: self.to,
			subject: self.subject,
			header_overrides: self.header_overrides,
			content: self.content,
			added_at: self.added_at,
			high_prio: self.high_prio,
			sent_at,
		}
	}
}

/// `{id, type, accountId}` (account) — the fields the Outgoing Builder actually reads (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
	pub account_id: String,
	pub account_type: String,
	pub preferred_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
	pub id: String,
	pub contact_type: String,
	pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPreferences {
	pub subscribed_to_weekly: bool,
	pub subscribed_to_newsletter: bool,
	#[serde(default)]
	pub send_newsletter_to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
	pub id: String,
	pub alias: Option<String>,
}

/// Read-only subscription view of a directory user (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionUser {
	pub id: String,
	pub account: Account,
	#[serde(default)]
	pub contact_infos: Vec<ContactInfo>,
	#[serde(default)]
	pub contact_preferences: ContactPreferences,
	#[serde(default)]
	pub profiles: Vec<Profile>,
}

/// Filters passed to `streamUsers` (§6).
#[derive(Debug, Clone, Default)]
pub struct StreamUsersFilters {
	pub only_confirmed_accounts: bool,
	pub use_reminder_weekday_filter: bool,
	pub reminder_weekday: i32,
}

/// A queued participant message as returned by the study service (§4.5.3).
#[derive(Debug, Clone)]
pub struct ParticipantMessage {
	pub id: String,
	pub message_type: String,
	pub payload: std::collections::HashMap<String, String>,
}

/// A researcher-facing notification as returned by the study service (§4.5.4).
#[derive(Debug, Clone)]
pub struct ResearcherMessage {
	pub id: String,
	pub study_key: String,
	pub message_type: String,
	pub participant_id: String,
	pub payload: std::collections::HashMap<String, String>,
	pub send_to: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn until_zero_is_always_valid() {
		let am = sample_auto_message(Timestamp(0), None);
		assert!(am.validate_until(Timestamp(1000)).is_ok());
	}

	#[test]
	fn until_before_next_time_is_rejected() {
		let am = sample_auto_message(Timestamp(2000), Some(Timestamp(1500)));
		assert!(am.validate_until(Timestamp(100)).is_err());
	}

	#[test]
	fn until_in_the_past_is_rejected() {
		let am = sample_auto_message(Timestamp(50), Some(Timestamp(80)));
		assert!(am.validate_until(Timestamp(100)).is_err());
	}

	#[test]
	fn until_in_the_future_after_next_time_is_valid() {
		let am = sample_auto_message(Timestamp(100), Some(Timestamp(200)));
		assert!(am.validate_until(Timestamp(100)).is_ok());
	}

	fn sample_auto_message(next_time: Timestamp, until: Option<Timestamp>) -> AutoMessage {
		AutoMessage {
			id: "am1".into(),
			template: EmailTemplate {
				message_type: MessageType::Weekly,
				study_key: None,
				default_language: "en".into(),
				translations: vec![],
				header_overrides: None,
			},
			kind: AutoMessageType::AllUsers,
			study_key: None,
			condition: None,
			next_time,
			period: 60,
			until,
			label: "test".into(),
		}
	}
}
