//! Eligibility Filter (§4.3), grounded on `bulk_messages.go`'s `isSubscribed`,
//! `checkStudyStateForUser`, and `getFilteredUserStream`.

use messaging_types::prelude::*;

/// `isSubscribed(user, messageType)`: weekly/newsletter consult the matching preference flag,
/// everything else is permissive.
#[must_use]
pub fn is_subscribed(user: &SubscriptionUser, message_type: &MessageType) -> bool {
	match message_type {
		MessageType::Weekly => user.contact_preferences.subscribed_to_weekly,
		MessageType::Newsletter => user.contact_preferences.subscribed_to_newsletter,
		_ => true,
	}
}

/// Asks the study service whether any of the user's profiles satisfy `condition` under `study_key`.
/// A downstream error is treated as "skip this user" by the caller (debug-logged, not propagated).
pub async fn check_study_state_for_user(
	study_service: &dyn StudyService,
	instance: &InstanceId,
	user: &SubscriptionUser,
	study_key: &str,
	condition: &Condition,
) -> MessagingResult<bool> {
	let profile_ids: Vec<String> = user.profiles.iter().map(|p| p.id.clone()).collect();
	study_service
		.has_participant_state_with_condition(instance, &profile_ids, study_key, condition)
		.await
}

/// Builds the directory-stream filter for a given message type and today's weekday, per the rules
/// in §4.3. `ignoreWeekday` only has an effect for `newsletter`; it never affects `weekly` or
/// `studyReminder` (S7).
#[must_use]
pub fn stream_filters_for(message_type: &MessageType, weekday: i32, ignore_weekday: bool) -> Option<StreamUsersFilters> {
	match message_type {
		MessageType::Newsletter => Some(StreamUsersFilters {
			only_confirmed_accounts: true,
			use_reminder_weekday_filter: !ignore_weekday,
			reminder_weekday: weekday,
		}),
		MessageType::Weekly => Some(StreamUsersFilters {
			only_confirmed_accounts: true,
			use_reminder_weekday_filter: true,
			reminder_weekday: weekday,
		}),
		MessageType::StudyReminder => Some(StreamUsersFilters {
			only_confirmed_accounts: true,
			use_reminder_weekday_filter: false,
			reminder_weekday: weekday,
		}),
		MessageType::Other(_) => None,
	}
}

/// Today's weekday in the directory's `0=Sunday..6=Saturday` convention.
#[must_use]
pub fn today_weekday() -> i32 {
	use chrono::Datelike;
	chrono::Local::now().weekday().num_days_from_sunday() as i32
}

#[cfg(test)]
mod tests {
	use super::*;

	fn user(weekly: bool, newsletter: bool) -> SubscriptionUser {
		SubscriptionUser {
			id: "u1".into(),
			account: Account { account_id: "u1@x".into(), account_type: "email".into(), preferred_language: "en".into() },
			contact_infos: vec![],
			contact_preferences: ContactPreferences {
				subscribed_to_weekly: weekly,
				subscribed_to_newsletter: newsletter,
				send_newsletter_to: vec![],
			},
			profiles: vec![],
		}
	}

	#[test]
	fn weekly_checks_weekly_flag() {
		assert!(is_subscribed(&user(true, false), &MessageType::Weekly));
		assert!(!is_subscribed(&user(false, false), &MessageType::Weekly));
	}

	#[test]
	fn newsletter_checks_newsletter_flag() {
		assert!(is_subscribed(&user(false, true), &MessageType::Newsletter));
		assert!(!is_subscribed(&user(false, false), &MessageType::Newsletter));
	}

	#[test]
	fn other_types_are_always_subscribed() {
		assert!(is_subscribed(&user(false, false), &MessageType::StudyReminder));
		assert!(is_subscribed(&user(false, false), &MessageType::Other("x".into())));
	}

	#[test]
	fn weekly_gating_ignores_ignore_weekday_flag() {
		// S7: messageType weekly, weekday = Tue (2) -> filter always uses the weekday, regardless
		// of ignore_weekday.
		let f = stream_filters_for(&MessageType::Weekly, 2, true).unwrap();
		assert!(f.use_reminder_weekday_filter);
		assert_eq!(f.reminder_weekday, 2);

		let f = stream_filters_for(&MessageType::Weekly, 2, false).unwrap();
		assert!(f.use_reminder_weekday_filter);
	}

	#[test]
	fn newsletter_gating_respects_ignore_weekday_flag() {
		let f = stream_filters_for(&MessageType::Newsletter, 3, true).unwrap();
		assert!(!f.use_reminder_weekday_filter);

		let f = stream_filters_for(&MessageType::Newsletter, 3, false).unwrap();
		assert!(f.use_reminder_weekday_filter);
	}

	#[test]
	fn study_reminder_never_filters_by_weekday() {
		let f = stream_filters_for(&MessageType::StudyReminder, 5, false).unwrap();
		assert!(!f.use_reminder_weekday_filter);
	}

	#[test]
	fn other_type_has_no_filter() {
		assert!(stream_filters_for(&MessageType::Other("x".into()), 1, false).is_none());
	}
}
