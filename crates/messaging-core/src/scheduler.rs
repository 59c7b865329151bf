//! Scheduler Kernel (§4.7): one independent periodic loop per configured interval. No retry, no
//! cron, no dependency graph — deduplication across overlapping ticks is handled entirely by the
//! persisted lease (§5), not by anything this kernel tracks in-process.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across every `PeriodicDriver` started under it. Cloning is cheap;
/// every loop holds a clone and watches it between ticks.
#[derive(Clone, Default)]
pub struct SchedulerKernel {
	shutdown: CancellationToken,
}

impl SchedulerKernel {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts a periodic loop under label `label` with period `period_secs`. A non-positive period
	/// disables the loop entirely (logged, no task spawned) rather than being special-cased on every
	/// tick. On each tick a fresh task runs `make_tick()` without the driver waiting for it to finish;
	/// shutdown stops new ticks but never aborts an in-flight one.
	pub fn spawn<F, Fut>(&self, label: &'static str, period_secs: i64, make_tick: F) -> Option<JoinHandle<()>>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		if period_secs <= 0 {
			info!(loop_name = label, "loop disabled (non-positive period)");
			return None;
		}

		#[allow(clippy::cast_sign_loss)]
		let period = std::time::Duration::from_secs(period_secs as u64);
		let shutdown = self.shutdown.clone();
		let make_tick = Arc::new(make_tick);

		Some(tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				tokio::select! {
					() = shutdown.cancelled() => {
						info!(loop_name = label, "shutdown requested, no further ticks");
						break;
					}
					_ = interval.tick() => {
						let tick = Arc::clone(&make_tick);
						tokio::spawn(async move { (tick)().await; });
					}
				}
			}
		}))
	}

	/// Signals every loop started under this kernel to stop accepting new ticks.
	pub fn shutdown(&self) {
		warn!("scheduler kernel shutdown requested");
		self.shutdown.cancel();
	}

	#[must_use]
	pub fn is_shutting_down(&self) -> bool {
		self.shutdown.is_cancelled()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[tokio::test]
	async fn disabled_loop_never_spawns() {
		let kernel = SchedulerKernel::new();
		let handle = kernel.spawn("disabled", 0, || async {});
		assert!(handle.is_none());
	}

	#[tokio::test]
	async fn loop_ticks_until_shutdown() {
		let kernel = SchedulerKernel::new();
		let ticks = Arc::new(AtomicUsize::new(0));
		let ticks_clone = Arc::clone(&ticks);
		let handle = kernel
			.spawn("counter", 1, move || {
				let ticks = Arc::clone(&ticks_clone);
				async move {
					ticks.fetch_add(1, Ordering::SeqCst);
				}
			})
			.unwrap();

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		kernel.shutdown();
		handle.await.unwrap();

		// tokio::time::interval fires once immediately on the first poll.
		assert!(ticks.load(Ordering::SeqCst) >= 1);
		assert!(kernel.is_shutting_down());
	}
}
