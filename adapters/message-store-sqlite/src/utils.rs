//! Error-mapping helpers shared by every query in this adapter, carried over from the teacher's
//! `meta-adapter-sqlite::utils` idiom but targeting `messaging_types::error::Error` directly.

use messaging_types::error::{Error, MessagingResult};
use sqlx::sqlite::SqliteRow;
use tracing::warn;

pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("db error: {:#?}", err);
}

/// Maps a single-row query result, translating `RowNotFound` to `Error::NotFound` and anything
/// else to `Error::DbError`.
pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> MessagingResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::DbError),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

/// Collects an iterator of per-row conversion results, translating errors the same way `map_res`
/// does for a single row.
pub(crate) fn collect_res<T>(iter: impl Iterator<Item = Result<T, sqlx::Error>>) -> MessagingResult<Vec<T>> {
	let mut items = Vec::new();
	for item in iter {
		items.push(item.inspect_err(inspect).map_err(|_| Error::DbError)?);
	}
	Ok(items)
}
