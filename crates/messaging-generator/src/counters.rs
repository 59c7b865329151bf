//! Per-job success/failure counters, grounded on the source's `types.MessageCounter`
//! (`InitMessageCounter`/`IncreaseCounter`/`Stop`), logged once the job's stream is exhausted.

use std::time::Instant;

use messaging_types::prelude::*;

pub struct MessageCounters {
	total: u64,
	success: u64,
	failed: u64,
	started_at: Instant,
}

impl MessageCounters {
	#[must_use]
	pub fn start() -> Self {
		Self { total: 0, success: 0, failed: 0, started_at: Instant::now() }
	}

	pub fn record(&mut self, ok: bool) {
		self.total += 1;
		if ok {
			self.success += 1;
		} else {
			self.failed += 1;
		}
	}

	/// Logs the job's totals at `info`, matching the source's per-job summary line.
	pub fn finish(self, instance: &InstanceId, message_type: &str, label: &str) {
		info!(
			instance = %instance,
			message_type,
			label,
			total = self.total,
			success = self.success,
			failed = self.failed,
			duration_secs = self.started_at.elapsed().as_secs(),
			"generator job finished"
		);
	}
}
