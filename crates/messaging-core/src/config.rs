//! Environment-loaded configuration (§10.3). A fixed, known-at-startup set of values — five periods,
//! four service addresses, two database URLs, one optional JSON path — not a dynamic, admin-editable
//! settings registry.

use messaging_types::prelude::*;

/// The five periodic-loop intervals, in seconds. A non-positive value disables the corresponding
/// loop (§4.5, §4.7).
#[derive(Debug, Clone, Copy)]
pub struct Periods {
	pub high_prio_send: i64,
	pub low_prio_send: i64,
	pub auto_message_tick: i64,
	pub participant_message_tick: i64,
	pub researcher_notification_tick: i64,
}

#[derive(Debug, Clone)]
pub struct ServiceUrls {
	pub user_directory: String,
	pub study_service: String,
	pub email_client: String,
	pub logging_service: String,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub periods: Periods,
	pub service_urls: ServiceUrls,
	pub message_db_url: String,
	pub global_db_url: String,
	pub template_constants_path: Option<String>,
}

impl Config {
	/// Loads configuration from environment variables, matching the variable names the source
	/// binary reads (`cmd/message-scheduler/main.go`, `initConfig`).
	pub fn from_env() -> MessagingResult<Self> {
		Ok(Self {
			periods: Periods {
				high_prio_send: env_i64("MESSAGE_SCHEDULER_INTERVAL_HIGH_PRIO")?,
				low_prio_send: env_i64("MESSAGE_SCHEDULER_INTERVAL_LOW_PRIO")?,
				auto_message_tick: env_i64("MESSAGE_SCHEDULER_INTERVAL_AUTO_MESSAGE")?,
				participant_message_tick: env_i64("MESSAGE_SCHEDULER_INTERVAL_PARTICIPANT_MESSAGE")?,
				researcher_notification_tick: env_i64("MESSAGE_SCHEDULER_INTERVAL_RESEARCHER_NOTIFICATION")?,
			},
			service_urls: ServiceUrls {
				user_directory: env_str("ADDR_USER_MANAGEMENT_SERVICE")?,
				study_service: env_str("ADDR_STUDY_SERVICE")?,
				email_client: env_str("ADDR_EMAIL_CLIENT_SERVICE")?,
				logging_service: env_str("ADDR_LOGGING_SERVICE")?,
			},
			message_db_url: env_str("MESSAGE_DB_CONNSTR")?,
			global_db_url: env_str("GLOBAL_DB_CONNSTR")?,
			template_constants_path: std::env::var("TEMPLATE_CONSTANTS_PATH").ok(),
		})
	}
}

fn missing_var_error(key: &str) -> Error {
	Error::ConfigError(format!("missing environment variable: {key}"))
}

fn parse_i64(key: &str, raw: &str) -> MessagingResult<i64> {
	raw.parse::<i64>().map_err(|_| Error::ConfigError(format!("invalid integer for {key}: {raw}")))
}

fn env_str(key: &str) -> MessagingResult<String> {
	std::env::var(key).map_err(|_| missing_var_error(key))
}

fn env_i64(key: &str) -> MessagingResult<i64> {
	let raw = env_str(key)?;
	parse_i64(key, &raw)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_i64_rejects_non_numeric() {
		let err = parse_i64("MC_TEST_BAD_INT", "not-a-number").unwrap_err();
		assert!(matches!(err, Error::ConfigError(_)));
	}

	#[test]
	fn parse_i64_accepts_numeric() {
		assert_eq!(parse_i64("MC_TEST_OK", "42").unwrap(), 42);
	}

	#[test]
	fn missing_var_error_reports_var_by_name() {
		match missing_var_error("MC_TEST_MISSING") {
			Error::ConfigError(msg) => assert!(msg.contains("MC_TEST_MISSING")),
			_ => panic!("expected ConfigError"),
		}
	}
}
