//! Generator Loops (§4.5), grounded on `bulk_messages.go`'s four `Generate*` functions and
//! `main.go`'s `handleAutoMessages`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use messaging_template::TemplateEngine;
use messaging_types::prelude::*;

use crate::counters::MessageCounters;
use crate::eligibility;
use crate::outgoing_builder;

/// The collaborators every generator job needs, cheaply `Clone`-able so a tenant worker can be
/// `tokio::spawn`ed without borrowing from its caller.
#[derive(Clone)]
pub struct GeneratorContext {
	pub message_store: Arc<dyn MessageStore>,
	pub user_directory: Arc<dyn UserDirectory>,
	pub study_service: Arc<dyn StudyService>,
	pub template_engine: Arc<TemplateEngine>,
}

fn new_outgoing_id() -> String {
	uuid::Uuid::new_v4().to_string()
}

/// §4.5.1: stream eligible users, check subscription, build and enqueue.
/// `includeLoginToken = (messageType == weekly || messageType == studyReminder)`.
pub async fn generate_for_all_users(
	ctx: &GeneratorContext,
	instance: &InstanceId,
	template: &EmailTemplate,
	ignore_weekday: bool,
	label: &str,
) {
	let weekday = eligibility::today_weekday();
	let filters = eligibility::stream_filters_for(&template.message_type, weekday, ignore_weekday);
	let include_login_token =
		matches!(template.message_type, MessageType::Weekly | MessageType::StudyReminder);

	let mut stream = match ctx.user_directory.stream_users(instance, filters).await {
		Ok(s) => s,
		Err(err) => {
			warn!(instance = %instance, %err, "generateForAllUsers: could not open user stream");
			return;
		}
	};

	let mut counters = MessageCounters::start();
	loop {
		let user = match stream.next().await {
			Some(Ok(user)) => user,
			Some(Err(err)) => {
				warn!(instance = %instance, %err, "generateForAllUsers: user stream error");
				break;
			}
			None => break,
		};

		if !eligibility::is_subscribed(&user, &template.message_type) {
			continue;
		}

		enqueue_one(ctx, instance, &user, template, HashMap::new(), include_login_token, &mut counters).await;
	}
	counters.finish(instance, &template.message_type.to_string(), label);
}

/// §4.5.2: stream eligible users, check subscription then study-condition membership, build with
/// `includeLoginToken=true`.
pub async fn generate_for_study_participants(
	ctx: &GeneratorContext,
	instance: &InstanceId,
	template: &EmailTemplate,
	condition: &Condition,
	ignore_weekday: bool,
	label: &str,
) {
	let weekday = eligibility::today_weekday();
	let filters = eligibility::stream_filters_for(&template.message_type, weekday, ignore_weekday);

	let mut stream = match ctx.user_directory.stream_users(instance, filters).await {
		Ok(s) => s,
		Err(err) => {
			warn!(instance = %instance, %err, "generateForStudyParticipants: could not open user stream");
			return;
		}
	};

	let Some(study_key) = template.study_key.as_deref() else {
		warn!(instance = %instance, "generateForStudyParticipants: template has no studyKey");
		return;
	};

	let mut counters = MessageCounters::start();
	loop {
		let user = match stream.next().await {
			Some(Ok(user)) => user,
			Some(Err(err)) => {
				warn!(instance = %instance, %err, "generateForStudyParticipants: user stream error");
				break;
			}
			None => break,
		};

		if !eligibility::is_subscribed(&user, &template.message_type) {
			continue;
		}

		match eligibility::check_study_state_for_user(
			ctx.study_service.as_ref(),
			instance,
			&user,
			study_key,
			condition,
		)
		.await
		{
			Ok(true) => {}
			Ok(false) => continue,
			Err(err) => {
				debug!(instance = %instance, user = %user.id, %err, "checkStudyStateForUser failed, skipping user");
				continue;
			}
		}

		enqueue_one(ctx, instance, &user, template, HashMap::new(), true, &mut counters).await;
	}
	counters.finish(instance, &template.message_type.to_string(), label);
}

/// §4.5.3: stream users under the `studyReminder` filter with weekday ignored; for each profile,
/// drain the study service's queued messages, render against a per-job template cache, and
/// acknowledge by deleting the delivered message IDs. Acknowledge failure does not undo the enqueue.
pub async fn generate_scheduled_participant_messages(ctx: &GeneratorContext, instance: &InstanceId, study_key: &str, label: &str) {
	let weekday = eligibility::today_weekday();
	let filters = eligibility::stream_filters_for(&MessageType::StudyReminder, weekday, true);

	let mut stream = match ctx.user_directory.stream_users(instance, filters).await {
		Ok(s) => s,
		Err(err) => {
			warn!(instance = %instance, %err, "generateScheduledParticipantMessages: could not open user stream");
			return;
		}
	};

	// Per-job template cache (§9): scoped to this single job, never shared across ticks.
	let mut template_cache: HashMap<String, EmailTemplate> = HashMap::new();
	let mut counters = MessageCounters::start();

	loop {
		let user = match stream.next().await {
			Some(Ok(user)) => user,
			Some(Err(err)) => {
				warn!(instance = %instance, %err, "generateScheduledParticipantMessages: user stream error");
				break;
			}
			None => break,
		};

		for profile in user.profiles.clone() {
			let messages = match ctx.study_service.get_participant_messages(instance, study_key, &profile.id).await {
				Ok(m) => m,
				Err(err) => {
					// Not a participant in most cases; debug-only to avoid log noise (source parity).
					debug!(instance = %instance, study_key, profile = %profile.id, %err, "getParticipantMessages failed");
					continue;
				}
			};

			let mut delivered_ids = Vec::new();
			for message in messages {
				let template = match template_cache.get(&message.message_type) {
					Some(t) => t.clone(),
					None => match ctx
						.message_store
						.find_email_template_by_type(instance, &message.message_type, Some(study_key))
						.await
					{
						Ok(t) => {
							template_cache.insert(message.message_type.clone(), t.clone());
							t
						}
						Err(err) => {
							warn!(instance = %instance, message_type = %message.message_type, study_key, %err, "template lookup failed");
							continue;
						}
					},
				};

				let mut content_infos = message.payload.clone();
				content_infos.insert("profileAlias".into(), profile.alias.clone().unwrap_or_default());

				enqueue_one(ctx, instance, &user, &template, content_infos, true, &mut counters).await;
				delivered_ids.push(message.id);
			}

			if !delivered_ids.is_empty() {
				if let Err(err) = ctx
					.study_service
					.delete_messages_from_participant(instance, study_key, &profile.id, &delivered_ids)
					.await
				{
					warn!(instance = %instance, study_key, profile = %profile.id, %err, "delete_messages_from_participant failed, duplicates possible on next tick");
				}
			}
		}
	}
	counters.finish(instance, "scheduled-participant-messages", label);
}

/// §4.5.4: poll researcher-facing messages once, fan out to each `sendTo` address as a synthetic
/// user, and delete the source message regardless of per-recipient failures (decided in
/// `DESIGN.md`: at-most-once for this one loop, unlike the rest of the system).
pub async fn generate_researcher_notifications(ctx: &GeneratorContext, instance: &InstanceId, label: &str) {
	let messages = match ctx.study_service.get_researcher_messages(instance).await {
		Ok(m) => m,
		Err(err) => {
			warn!(instance = %instance, %err, "generateResearcherNotifications: could not fetch researcher messages");
			return;
		}
	};

	let mut template_cache: HashMap<String, EmailTemplate> = HashMap::new();
	let mut counters = MessageCounters::start();

	for message in messages {
		let cache_key = format!("{}{}", message.message_type, message.study_key);
		let template = match template_cache.get(&cache_key) {
			Some(t) => t.clone(),
			None => match ctx
				.message_store
				.find_email_template_by_type(instance, &message.message_type, Some(&message.study_key))
				.await
			{
				Ok(t) => {
					template_cache.insert(cache_key, t.clone());
					t
				}
				Err(err) => {
					warn!(instance = %instance, message_type = %message.message_type, study_key = %message.study_key, %err, "template lookup failed");
					continue;
				}
			},
		};

		let mut content_infos = message.payload.clone();
		content_infos.insert("participantID".into(), message.participant_id.clone());

		for send_to in &message.send_to {
			let synthetic = SubscriptionUser {
				id: String::new(),
				account: Account { account_id: send_to.clone(), account_type: "email".into(), preferred_language: "en".into() },
				contact_infos: vec![],
				contact_preferences: ContactPreferences::default(),
				profiles: vec![],
			};
			enqueue_one(ctx, instance, &synthetic, &template, content_infos.clone(), false, &mut counters).await;
		}

		if let Err(err) = ctx
			.study_service
			.delete_researcher_messages(instance, &message.study_key, std::slice::from_ref(&message.id))
			.await
		{
			warn!(instance = %instance, message_id = %message.id, %err, "delete_researcher_messages failed");
		}
	}
	counters.finish(instance, "researcher-notifications", label);
}

async fn enqueue_one(
	ctx: &GeneratorContext,
	instance: &InstanceId,
	user: &SubscriptionUser,
	template: &EmailTemplate,
	content_infos: HashMap<String, String>,
	include_login_token: bool,
	counters: &mut MessageCounters,
) {
	let outgoing = match outgoing_builder::prepare_outgoing_email(
		ctx.user_directory.as_ref(),
		ctx.template_engine.as_ref(),
		instance,
		user,
		template,
		content_infos,
		include_login_token,
	)
	.await
	{
		Ok(mut outgoing) => {
			outgoing.id = new_outgoing_id();
			outgoing
		}
		Err(err) => {
			warn!(instance = %instance, user = %user.id, %err, "prepareOutgoingEmail failed, skipping recipient");
			counters.record(false);
			return;
		}
	};

	match ctx.message_store.add_to_outgoing_emails(instance, outgoing).await {
		Ok(()) => counters.record(true),
		Err(err) => {
			warn!(instance = %instance, user = %user.id, %err, "addToOutgoingEmails failed");
			counters.record(false);
		}
	}
}

/// `GenerateAutoMessages` (source's dispatch switch, §4.5): routes one active `AutoMessage` to the
/// loop matching its `kind`.
pub async fn dispatch_auto_message(ctx: &GeneratorContext, instance: &InstanceId, auto_message: &AutoMessage, ignore_weekday: bool) {
	match auto_message.kind {
		AutoMessageType::AllUsers => {
			generate_for_all_users(ctx, instance, &auto_message.template, ignore_weekday, &auto_message.label).await;
		}
		AutoMessageType::StudyParticipants => {
			let mut template = auto_message.template.clone();
			template.study_key = auto_message.study_key.clone();
			let condition = auto_message.condition.clone().unwrap_or(serde_json::Value::Null);
			generate_for_study_participants(ctx, instance, &template, &condition, ignore_weekday, &auto_message.label).await;
		}
		AutoMessageType::ScheduledParticipantMessages => match auto_message.study_key.as_deref() {
			Some(study_key) => {
				generate_scheduled_participant_messages(ctx, instance, study_key, &auto_message.label).await;
			}
			None => warn!(instance = %instance, auto_message = %auto_message.id, "scheduled-participant-messages auto-message has no studyKey"),
		},
		AutoMessageType::ResearcherNotifications => {
			generate_researcher_notifications(ctx, instance, &auto_message.label).await;
		}
	}
}

/// Outcome of `advance_schedule` (§4.5.5): either the schedule is persisted with its new `nextTime`,
/// or it has passed `until` and must be deleted.
pub enum ScheduleAdvance {
	Persist(AutoMessage),
	Terminate,
}

/// Advances `auto_message.nextTime` past `now`, implementing the catch-up loop as the O(1) ceiling
/// division the design notes call for (§9) rather than a literal `while` loop.
#[must_use]
pub fn advance_schedule(auto_message: &AutoMessage, now: Timestamp) -> ScheduleAdvance {
	let period = auto_message.period;
	debug_assert!(period > 0, "advance_schedule called for a non-positive period");

	let mut next_time = auto_message.next_time.0 + period;
	if next_time < now.0 {
		let gap = now.0 - next_time;
		let steps = (gap + period - 1) / period;
		next_time += steps * period;
		warn!(
			auto_message = %auto_message.id,
			label = %auto_message.label,
			"auto-message schedule fell behind and caught up to the current tick"
		);
	}

	let mut updated = auto_message.clone();
	updated.next_time = Timestamp(next_time);

	if let Some(until) = updated.until {
		if until.0 > 0 && until.0 < next_time {
			return ScheduleAdvance::Terminate;
		}
	}

	ScheduleAdvance::Persist(updated)
}

/// Per-tenant auto-message tick (`handleAutoMessages`'s per-instance body, §4.5.5): dispatch every
/// active schedule's generator job without waiting for it, then advance or terminate the schedule.
/// A schedule's termination does not stop its siblings in the same tick (decided in `DESIGN.md`).
pub async fn tick_tenant_auto_messages(ctx: &GeneratorContext, instance: &InstanceId) {
	let active = match ctx.message_store.find_auto_messages(instance, true).await {
		Ok(v) => v,
		Err(err) => {
			warn!(instance = %instance, %err, "findAutoMessages failed, skipping tenant for this tick");
			return;
		}
	};

	for auto_message in active {
		let tick_ctx = ctx.clone();
		let tick_instance = instance.clone();
		let tick_message = auto_message.clone();
		tokio::spawn(async move {
			dispatch_auto_message(&tick_ctx, &tick_instance, &tick_message, false).await;
		});

		match advance_schedule(&auto_message, Timestamp::now()) {
			ScheduleAdvance::Persist(updated) => {
				if let Err(err) = ctx.message_store.save_auto_message(instance, updated).await {
					warn!(instance = %instance, auto_message = %auto_message.id, %err, "saveAutoMessage failed");
				}
			}
			ScheduleAdvance::Terminate => {
				if let Err(err) = ctx.message_store.delete_auto_message(instance, &auto_message.id).await {
					warn!(instance = %instance, auto_message = %auto_message.id, %err, "deleteAutoMessage failed");
				}
			}
		}
	}
}

/// Top-level auto-message tick (`handleAutoMessages`, §4.5): fan out across every tenant, one
/// worker each, joined on a task set before the tick's job function returns.
pub async fn tick_all_tenants_auto_messages(ctx: GeneratorContext) {
	let instances = match ctx.message_store.get_all_instances().await {
		Ok(v) => v,
		Err(err) => {
			warn!(%err, "getAllInstances failed for the auto-message tick");
			return;
		}
	};

	let mut workers = tokio::task::JoinSet::new();
	for instance in instances {
		let ctx = ctx.clone();
		workers.spawn(async move { tick_tenant_auto_messages(&ctx, &instance).await });
	}
	while workers.join_next().await.is_some() {}
}

/// Per-tenant participant-message tick: unlike `generateForAllUsers`/`generateForStudyParticipants`,
/// which ride the auto-message schedule's own `nextTime`, this loop drains the study service's
/// queued participant messages on its own dedicated period (§4.5.3, §6). The set of study keys to
/// drain is taken from this tenant's `scheduled-participant-messages` auto-messages, used here only
/// as a study-key registry — this loop ignores their `nextTime`/`period` entirely.
pub async fn tick_tenant_participant_messages(ctx: &GeneratorContext, instance: &InstanceId) {
	let defs = match ctx.message_store.find_auto_messages(instance, false).await {
		Ok(v) => v,
		Err(err) => {
			warn!(instance = %instance, %err, "findAutoMessages failed, skipping tenant for this tick");
			return;
		}
	};

	for def in defs {
		let AutoMessageType::ScheduledParticipantMessages = def.kind else { continue };
		let Some(study_key) = def.study_key.as_deref() else {
			warn!(instance = %instance, auto_message = %def.id, "scheduled-participant-messages auto-message has no studyKey");
			continue;
		};
		generate_scheduled_participant_messages(ctx, instance, study_key, &def.label).await;
	}
}

/// Top-level participant-message tick: fan out across every tenant, one worker each.
pub async fn tick_all_tenants_participant_messages(ctx: GeneratorContext) {
	let instances = match ctx.message_store.get_all_instances().await {
		Ok(v) => v,
		Err(err) => {
			warn!(%err, "getAllInstances failed for the participant-message tick");
			return;
		}
	};

	let mut workers = tokio::task::JoinSet::new();
	for instance in instances {
		let ctx = ctx.clone();
		workers.spawn(async move { tick_tenant_participant_messages(&ctx, &instance).await });
	}
	while workers.join_next().await.is_some() {}
}

/// Top-level researcher-notification tick: fan out across every tenant, one worker each.
/// `generateResearcherNotifications` takes no studyKey — the study service returns whatever
/// researcher-facing messages are pending for the tenant (§4.5.4).
pub async fn tick_all_tenants_researcher_notifications(ctx: GeneratorContext) {
	let instances = match ctx.message_store.get_all_instances().await {
		Ok(v) => v,
		Err(err) => {
			warn!(%err, "getAllInstances failed for the researcher-notification tick");
			return;
		}
	};

	let mut workers = tokio::task::JoinSet::new();
	for instance in instances {
		let ctx = ctx.clone();
		workers.spawn(async move { generate_researcher_notifications(&ctx, &instance, "researcher-notifications").await });
	}
	while workers.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn schedule(next_time: i64, period: i64, until: Option<i64>) -> AutoMessage {
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
			next_time: Timestamp(next_time),
			period,
			until: until.map(Timestamp),
			label: "test".into(),
		}
	}

	#[test]
	fn s4_schedule_catch_up() {
		let now = Timestamp(1_000_000);
		let am = schedule(now.0 - 3600, 900, None);
		match advance_schedule(&am, now) {
			ScheduleAdvance::Persist(updated) => {
				assert!(updated.next_time.0 >= now.0);
				assert_eq!((updated.next_time.0 - (now.0 - 3600)) % 900, 0);
			}
			ScheduleAdvance::Terminate => panic!("expected persist"),
		}
	}

	#[test]
	fn s5_schedule_termination() {
		let now = Timestamp(1_000_000);
		let am = schedule(now.0 - 10, 60, Some(now.0 + 30));
		match advance_schedule(&am, now) {
			ScheduleAdvance::Terminate => {}
			ScheduleAdvance::Persist(_) => panic!("expected termination"),
		}
	}

	#[test]
	fn simple_advance_past_until_persists() {
		let now = Timestamp(1_000_000);
		let am = schedule(now.0 - 10, 60, Some(now.0 + 1000));
		match advance_schedule(&am, now) {
			ScheduleAdvance::Persist(updated) => assert_eq!(updated.next_time.0, now.0 - 10 + 60),
			ScheduleAdvance::Terminate => panic!("expected persist"),
		}
	}

	#[test]
	fn invariant_4_next_time_exceeds_tick_wall_time() {
		// §8 Invariant 4.
		let now = Timestamp(1_000_000);
		let am = schedule(now.0 - 1, 10, None);
		match advance_schedule(&am, now) {
			ScheduleAdvance::Persist(updated) => assert!(updated.next_time.0 > now.0),
			ScheduleAdvance::Terminate => panic!("expected persist"),
		}
	}
}
