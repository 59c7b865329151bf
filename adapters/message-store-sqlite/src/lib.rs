//! SQLite-backed Message Store adapter (§11): the one in-scope concrete implementation of
//! `messaging_types::message_store::MessageStore`, grounded on `meta-adapter-sqlite`'s pool
//! construction, `QueryBuilder`/`RETURNING`-clause, and transaction idioms.

mod schema;
mod utils;

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool, SqliteRow};
use sqlx::Row;

use messaging_template::TemplateEngine;
use messaging_types::error::{Error, MessagingResult};
use messaging_types::message_store::MessageStore;
use messaging_types::types::{
	AutoMessage, AutoMessageType, EmailTemplate, HeaderOverrides, InstanceId, MessageType, OutgoingEmail, SentEmail,
	Timestamp, Translation,
};

use utils::{collect_res, inspect, map_res};

fn message_type_to_text(mt: &MessageType) -> MessagingResult<String> {
	Ok(serde_json::to_string(mt)?)
}

fn message_type_from_text(s: &str) -> MessagingResult<MessageType> {
	Ok(serde_json::from_str(s)?)
}

fn kind_to_text(kind: &AutoMessageType) -> MessagingResult<String> {
	Ok(serde_json::to_string(kind)?)
}

fn kind_from_text(s: &str) -> MessagingResult<AutoMessageType> {
	Ok(serde_json::from_str(s)?)
}

fn header_overrides_to_text(ho: &Option<HeaderOverrides>) -> MessagingResult<Option<String>> {
	Ok(match ho {
		Some(ho) => Some(serde_json::to_string(ho)?),
		None => None,
	})
}

fn header_overrides_from_text(s: Option<String>) -> MessagingResult<Option<HeaderOverrides>> {
	Ok(match s {
		Some(s) => Some(serde_json::from_str(&s)?),
		None => None,
	})
}

fn auto_message_row_to_domain(row: SqliteRow) -> Result<AutoMessage, sqlx::Error> {
	let kind_text: String = row.try_get("kind")?;
	let template_text: String = row.try_get("template")?;
	let condition_text: Option<String> = row.try_get("condition")?;
	Ok(AutoMessage {
		id: row.try_get("id")?,
		template: serde_json::from_str(&template_text).map_err(|_| sqlx::Error::Decode("template".into()))?,
		kind: kind_from_text(&kind_text).map_err(|_| sqlx::Error::Decode("kind".into()))?,
		study_key: row.try_get("study_key")?,
		condition: condition_text
			.map(|s| serde_json::from_str(&s))
			.transpose()
			.map_err(|_| sqlx::Error::Decode("condition".into()))?,
		next_time: row.try_get::<i64, _>("next_time").map(Timestamp)?,
		period: row.try_get("period")?,
		until: row.try_get::<Option<i64>, _>("until")?.map(Timestamp),
		label: row.try_get("label")?,
	})
}

fn email_template_row_to_domain(row: SqliteRow) -> Result<EmailTemplate, sqlx::Error> {
	let message_type_text: String = row.try_get("message_type")?;
	let translations_text: String = row.try_get("translations")?;
	let header_overrides_text: Option<String> = row.try_get("header_overrides")?;
	let study_key: String = row.try_get("study_key")?;
	Ok(EmailTemplate {
		message_type: message_type_from_text(&message_type_text).map_err(|_| sqlx::Error::Decode("message_type".into()))?,
		study_key: if study_key.is_empty() { None } else { Some(study_key) },
		default_language: row.try_get("default_language")?,
		translations: serde_json::from_str::<Vec<Translation>>(&translations_text)
			.map_err(|_| sqlx::Error::Decode("translations".into()))?,
		header_overrides: header_overrides_from_text(header_overrides_text)
			.map_err(|_| sqlx::Error::Decode("header_overrides".into()))?,
	})
}

fn outgoing_email_row_to_domain(row: SqliteRow) -> Result<OutgoingEmail, sqlx::Error> {
	let message_type_text: String = row.try_get("message_type")?;
	let recipients_text: String = row.try_get("recipients")?;
	let header_overrides_text: Option<String> = row.try_get("header_overrides")?;
	Ok(OutgoingEmail {
		id: row.try_get("id")?,
		message_type: message_type_from_text(&message_type_text).map_err(|_| sqlx::Error::Decode("message_type".into()))?,
		to: serde_json::from_str(&recipients_text).map_err(|_| sqlx::Error::Decode("recipients".into()))?,
		subject: row.try_get("subject")?,
		header_overrides: header_overrides_from_text(header_overrides_text)
			.map_err(|_| sqlx::Error::Decode("header_overrides".into()))?,
		content: row.try_get("content")?,
		added_at: row.try_get::<i64, _>("added_at").map(Timestamp)?,
		high_prio: row.try_get::<i64, _>("high_prio")? != 0,
		last_send_attempt: row.try_get::<Option<i64>, _>("last_send_attempt")?.map(Timestamp),
	})
}

/// Two pools: one per-tenant message database (`auto_messages`, `email_templates`,
/// `outgoing_emails`, `sent_emails`), one global database holding the `instances` registry,
/// mirroring the source's split between a per-tenant message DB and a global DB (§11).
pub struct MessageStoreSqlite {
	db: SqlitePool,
	global_db: SqlitePool,
}

impl MessageStoreSqlite {
	/// `message_db_path`/`global_db_path` correspond to `Config::message_db_url`/`global_db_url`
	/// (§10.3): plain filesystem paths to the two sqlite database files, matching the source's split
	/// between a per-tenant message DB and a global DB (§11).
	pub async fn new(message_db_path: impl AsRef<Path>, global_db_path: impl AsRef<Path>) -> MessagingResult<Self> {
		let message_opts = sqlite::SqliteConnectOptions::new()
			.filename(message_db_path.as_ref())
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let global_opts = sqlite::SqliteConnectOptions::new()
			.filename(global_db_path.as_ref())
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);

		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(message_opts)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		let global_db = sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(global_opts)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		schema::init_message_db(&db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;
		schema::init_global_db(&global_db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

		Ok(Self { db, global_db })
	}

	/// Registers `instance` in the global tenant registry, idempotently. Not part of the
	/// `MessageStore` trait (no corresponding operation upstream needs it at runtime), but needed
	/// by the binary's bootstrap and by tests that seed tenants.
	pub async fn register_instance(&self, instance: &InstanceId) -> MessagingResult<()> {
		sqlx::query("INSERT OR IGNORE INTO instances (instance_id) VALUES (?1)")
			.bind(&instance.0)
			.execute(&self.global_db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		Ok(())
	}
}

#[async_trait]
impl MessageStore for MessageStoreSqlite {
	async fn fetch_outgoing_emails(
		&self,
		instance: &InstanceId,
		limit: u32,
		lease_older_than_secs: i64,
		only_high_prio: bool,
	) -> MessagingResult<Vec<OutgoingEmail>> {
		let now = Timestamp::now().0;
		let cutoff = now - lease_older_than_secs;
		let mut tx = self.db.begin().await.map_err(Error::from)?;

		let rows = sqlx::query(
			"UPDATE outgoing_emails
			SET last_send_attempt = ?1
			WHERE instance_id = ?2
				AND (last_send_attempt IS NULL OR last_send_attempt < ?3)
				AND (?4 = 0 OR high_prio = 1)
			ORDER BY added_at
			LIMIT ?5
			RETURNING *",
		)
		.bind(now)
		.bind(&instance.0)
		.bind(cutoff)
		.bind(i64::from(only_high_prio))
		.bind(i64::from(limit))
		.fetch_all(&mut *tx)
		.await
		.map_err(Error::from)?;

		tx.commit().await.map_err(Error::from)?;

		collect_res(rows.into_iter().map(outgoing_email_row_to_domain))
	}

	async fn reset_last_send_attempt_for_outgoing(&self, instance: &InstanceId, id: &str) -> MessagingResult<()> {
		sqlx::query("UPDATE outgoing_emails SET last_send_attempt = NULL WHERE instance_id = ?1 AND id = ?2")
			.bind(&instance.0)
			.bind(id)
			.execute(&self.db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		Ok(())
	}

	async fn add_to_outgoing_emails(&self, instance: &InstanceId, email: OutgoingEmail) -> MessagingResult<()> {
		let message_type = message_type_to_text(&email.message_type)?;
		let recipients = serde_json::to_string(&email.to)?;
		let header_overrides = header_overrides_to_text(&email.header_overrides)?;

		sqlx::query(
			"INSERT INTO outgoing_emails
				(instance_id, id, message_type, recipients, subject, header_overrides, content, added_at, high_prio, last_send_attempt)
			VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
		)
		.bind(&instance.0)
		.bind(&email.id)
		.bind(message_type)
		.bind(recipients)
		.bind(&email.subject)
		.bind(header_overrides)
		.bind(&email.content)
		.bind(email.added_at.0)
		.bind(i64::from(email.high_prio))
		.execute(&self.db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
		Ok(())
	}

	async fn delete_outgoing_email(&self, instance: &InstanceId, id: &str) -> MessagingResult<()> {
		sqlx::query("DELETE FROM outgoing_emails WHERE instance_id = ?1 AND id = ?2")
			.bind(&instance.0)
			.bind(id)
			.execute(&self.db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		Ok(())
	}

	async fn add_to_sent_emails(&self, instance: &InstanceId, email: SentEmail) -> MessagingResult<()> {
		let message_type = message_type_to_text(&email.message_type)?;
		let recipients = serde_json::to_string(&email.to)?;
		let header_overrides = header_overrides_to_text(&email.header_overrides)?;

		let mut tx = self.db.begin().await.map_err(Error::from)?;
		sqlx::query(
			"INSERT INTO sent_emails
				(instance_id, id, message_type, recipients, subject, header_overrides, content, added_at, high_prio, sent_at)
			VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
		)
		.bind(&instance.0)
		.bind(&email.id)
		.bind(message_type)
		.bind(recipients)
		.bind(&email.subject)
		.bind(header_overrides)
		.bind(&email.content)
		.bind(email.added_at.0)
		.bind(i64::from(email.high_prio))
		.bind(email.sent_at.0)
		.execute(&mut *tx)
		.await
		.map_err(Error::from)?;
		tx.commit().await.map_err(Error::from)?;
		Ok(())
	}

	async fn find_auto_messages(&self, instance: &InstanceId, only_active: bool) -> MessagingResult<Vec<AutoMessage>> {
		let rows = if only_active {
			sqlx::query("SELECT * FROM auto_messages WHERE instance_id = ?1 AND next_time <= ?2")
				.bind(&instance.0)
				.bind(Timestamp::now().0)
				.fetch_all(&self.db)
				.await
		} else {
			sqlx::query("SELECT * FROM auto_messages WHERE instance_id = ?1")
				.bind(&instance.0)
				.fetch_all(&self.db)
				.await
		}
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

		collect_res(rows.into_iter().map(auto_message_row_to_domain))
	}

	async fn save_auto_message(&self, instance: &InstanceId, auto_message: AutoMessage) -> MessagingResult<AutoMessage> {
		auto_message.validate_until(Timestamp::now())?;
		TemplateEngine::new().check_all_parsable(&auto_message.template)?;

		let kind = kind_to_text(&auto_message.kind)?;
		let template = serde_json::to_string(&auto_message.template)?;
		let condition = auto_message.condition.as_ref().map(serde_json::to_string).transpose()?;

		sqlx::query(
			"INSERT INTO auto_messages (instance_id, id, kind, study_key, condition, next_time, period, until, label, template)
			VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
			ON CONFLICT(instance_id, id) DO UPDATE SET
				kind = excluded.kind,
				study_key = excluded.study_key,
				condition = excluded.condition,
				next_time = excluded.next_time,
				period = excluded.period,
				until = excluded.until,
				label = excluded.label,
				template = excluded.template",
		)
		.bind(&instance.0)
		.bind(&auto_message.id)
		.bind(kind)
		.bind(&auto_message.study_key)
		.bind(condition)
		.bind(auto_message.next_time.0)
		.bind(auto_message.period)
		.bind(auto_message.until.map(|t| t.0))
		.bind(&auto_message.label)
		.bind(template)
		.execute(&self.db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

		Ok(auto_message)
	}

	async fn delete_auto_message(&self, instance: &InstanceId, id: &str) -> MessagingResult<()> {
		sqlx::query("DELETE FROM auto_messages WHERE instance_id = ?1 AND id = ?2")
			.bind(&instance.0)
			.bind(id)
			.execute(&self.db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		Ok(())
	}

	async fn find_email_template_by_type(
		&self,
		instance: &InstanceId,
		message_type: &str,
		study_key: Option<&str>,
	) -> MessagingResult<EmailTemplate> {
		let message_type_text = serde_json::to_string(message_type)?;
		let row = sqlx::query("SELECT * FROM email_templates WHERE instance_id = ?1 AND message_type = ?2 AND study_key = ?3")
			.bind(&instance.0)
			.bind(message_type_text)
			.bind(study_key.unwrap_or(""))
			.fetch_one(&self.db)
			.await;

		map_res(row, email_template_row_to_domain)
	}

	async fn get_all_instances(&self) -> MessagingResult<Vec<InstanceId>> {
		let rows = sqlx::query("SELECT instance_id FROM instances")
			.fetch_all(&self.global_db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		if rows.is_empty() {
			return Err(Error::ValidationError("no instance is defined; did you forget to define one?".into()));
		}

		collect_res(rows.into_iter().map(|row| row.try_get::<String, _>("instance_id").map(InstanceId)))
	}
}
