//! Error handling subsystem. Implements a custom Error type.

use tracing::warn;

pub type MessagingResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	DbError,
	Parse,

	// Input validation and constraints
	ValidationError(String), // e.g. AutoMessage until/nextTime invariant violation
	Conflict(String),

	// Network and external services
	ServiceUnavailable(String), // downstream RPC failure (directory, study, email, logging)
	Timeout,

	// System and configuration
	ConfigError(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		warn!("json error: {}", err);
		Error::Parse
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", err);
		Error::Parse
	}
}

impl From<base64::DecodeError> for Error {
	fn from(err: base64::DecodeError) -> Self {
		warn!("base64 decode error: {}", err);
		Error::Parse
	}
}

impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		match err {
			sqlx::Error::RowNotFound => Error::NotFound,
			err => {
				warn!("db error: {}", err);
				Error::DbError
			}
		}
	}
}

impl From<handlebars::RenderError> for Error {
	fn from(err: handlebars::RenderError) -> Self {
		warn!("template render error: {}", err);
		Error::Parse
	}
}

impl From<handlebars::TemplateError> for Error {
	fn from(err: handlebars::TemplateError) -> Self {
		warn!("template parse error: {}", err);
		Error::Parse
	}
}

/// Helper macro for locking mutexes with automatic internal error handling.
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex.lock().map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $context:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("mutex poisoned: {}", $context)))
	};
}
