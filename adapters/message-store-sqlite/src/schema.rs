//! Database schema initialization for the per-tenant message database and the global tenant
//! registry database (§11).

use sqlx::SqlitePool;

/// Creates the four per-tenant tables if they don't already exist: schedules, templates, the
/// outgoing queue, and sent history, all keyed by `instance_id`.
pub(crate) async fn init_message_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS auto_messages (
			instance_id text NOT NULL,
			id text NOT NULL,
			kind text NOT NULL,
			study_key text,
			condition json,
			next_time integer NOT NULL,
			period integer NOT NULL,
			until integer,
			label text NOT NULL,
			template json NOT NULL,
			PRIMARY KEY(instance_id, id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_auto_messages_next_time
			ON auto_messages (instance_id, next_time)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS email_templates (
			instance_id text NOT NULL,
			message_type text NOT NULL,
			study_key text NOT NULL DEFAULT '',
			default_language text NOT NULL,
			translations json NOT NULL,
			header_overrides json,
			PRIMARY KEY(instance_id, message_type, study_key)
		)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS outgoing_emails (
			instance_id text NOT NULL,
			id text NOT NULL,
			message_type text NOT NULL,
			recipients json NOT NULL,
			subject text NOT NULL,
			header_overrides json,
			content text NOT NULL,
			added_at integer NOT NULL,
			high_prio integer NOT NULL DEFAULT 0,
			last_send_attempt integer,
			PRIMARY KEY(instance_id, id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_outgoing_emails_claim
			ON outgoing_emails (instance_id, high_prio, last_send_attempt, added_at)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS sent_emails (
			instance_id text NOT NULL,
			id text NOT NULL,
			message_type text NOT NULL,
			recipients json NOT NULL,
			subject text NOT NULL,
			header_overrides json,
			content text NOT NULL,
			added_at integer NOT NULL,
			high_prio integer NOT NULL DEFAULT 0,
			sent_at integer NOT NULL,
			PRIMARY KEY(instance_id, id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await
}

/// Creates the global `instances` table, the one table in the second database file, realizing
/// `getAllInstances` (§11).
pub(crate) async fn init_global_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS instances (
			instance_id text NOT NULL,
			PRIMARY KEY(instance_id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	tx.commit().await
}
