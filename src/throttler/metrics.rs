// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::Protocol;

/// Thread-safe counters for ticket acquisition.
///
/// Attempts and denials count individual round trips; grants and failures count whole
/// acquisitions. With the `metrics` feature each of those four is also exported as
/// `osp_throttler_acquire_total{protocol, outcome}`.
#[derive(Debug)]
pub struct AcquireMetrics {
	protocol: Protocol,
	attempts: AtomicU64,
	grants: AtomicU64,
	denials: AtomicU64,
	failures: AtomicU64,
	releases: AtomicU64,
}
impl AcquireMetrics {
	pub(crate) fn new(protocol: Protocol) -> Self {
		Self {
			protocol,
			attempts: AtomicU64::new(0),
			grants: AtomicU64::new(0),
			denials: AtomicU64::new(0),
			failures: AtomicU64::new(0),
			releases: AtomicU64::new(0),
		}
	}

	/// Protocol these counters belong to.
	pub fn protocol(&self) -> Protocol {
		self.protocol
	}

	/// Returns the number of requests sent to the throttling service.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of granted tickets.
	pub fn grants(&self) -> u64 {
		self.grants.load(Ordering::Relaxed)
	}

	/// Returns the number of denied attempts.
	pub fn denials(&self) -> u64 {
		self.denials.load(Ordering::Relaxed)
	}

	/// Returns the number of acquisitions that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of live tickets whose connection has been closed.
	pub fn releases(&self) -> u64 {
		self.releases.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
		self.export("attempt");
	}

	pub(crate) fn record_grant(&self) {
		self.grants.fetch_add(1, Ordering::Relaxed);
		self.export("granted");
	}

	pub(crate) fn record_denial(&self) {
		self.denials.fetch_add(1, Ordering::Relaxed);
		self.export("denied");
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
		self.export("failure");
	}

	pub(crate) fn record_release(&self) {
		self.releases.fetch_add(1, Ordering::Relaxed);
	}

	fn export(&self, outcome: &'static str) {
		#[cfg(feature = "metrics")]
		{
			metrics::counter!(
				"osp_throttler_acquire_total",
				"protocol" => self.protocol.label(),
				"outcome" => outcome
			)
			.increment(1);
		}
		#[cfg(not(feature = "metrics"))]
		let _ = outcome;
	}
}
