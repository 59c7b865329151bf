fn main() {
	if !std::env::var("LIBSQLITE3_FLAGS").unwrap_or_default().contains("SQLITE_ENABLE_UPDATE_DELETE_LIMIT") {
		println!(
			"cargo:warning=LIBSQLITE3_FLAGS does not contain -DSQLITE_ENABLE_UPDATE_DELETE_LIMIT. The claim-on-read lease query's ORDER BY/LIMIT on UPDATE will fail to compile at the SQL layer."
		);
	}
}
