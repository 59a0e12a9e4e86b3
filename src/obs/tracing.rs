// self
use crate::{_prelude::*, id::CorrelationId, obs::Protocol};

/// Acquisition future wrapped in its span when the `tracing` feature is on.
#[cfg(feature = "tracing")]
pub type InstrumentedAcquire<F> = tracing::instrument::Instrumented<F>;
/// Acquisition future, unchanged, when the `tracing` feature is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedAcquire<F> = F;

/// Span wrapping one ticket acquisition.
#[derive(Clone, Debug)]
pub struct AcquireSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl AcquireSpan {
	/// Creates a new span tagged with the protocol, provider, and correlation id.
	pub fn new(protocol: Protocol, osp: &str, cid: &CorrelationId) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"osp_throttler.acquire",
				protocol = protocol.label(),
				osp,
				cid = cid.as_str()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (protocol, osp, cid);

			Self {}
		}
	}

	/// Runs `fut` inside the span; the span is entered per poll, never held across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedAcquire<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn attempt_started(attempt: u32) {
	#[cfg(feature = "tracing")]
	tracing::debug!(attempt, "Requesting rate-limiting ticket.");
	#[cfg(not(feature = "tracing"))]
	let _ = attempt;
}

pub(crate) fn ticket_granted(attempt: u32) {
	#[cfg(feature = "tracing")]
	tracing::debug!(attempt, "Acquired rate-limiting ticket.");
	#[cfg(not(feature = "tracing"))]
	let _ = attempt;
}

pub(crate) fn attempt_denied(attempt: u32, message: &str, wait: std::time::Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(
		attempt,
		reason = message,
		wait_ms = wait.as_millis() as u64,
		"Ticket denied; retrying."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, message, wait);
}

pub(crate) fn unexpected_status(status: u16) {
	#[cfg(feature = "tracing")]
	tracing::debug!(status, "Unexpected response from throttling service.");
	#[cfg(not(feature = "tracing"))]
	let _ = status;
}

pub(crate) fn attempts_exhausted(attempts: u32) {
	#[cfg(feature = "tracing")]
	tracing::error!(attempts, "Failed to acquire rate-limiting token after all attempts.");
	#[cfg(not(feature = "tracing"))]
	let _ = attempts;
}

pub(crate) fn deadline_reached(message: Option<&str>) {
	#[cfg(feature = "tracing")]
	tracing::warn!(last_denial = message, "Reached deadline while waiting for a ticket.");
	#[cfg(not(feature = "tracing"))]
	let _ = message;
}

pub(crate) fn connect_backoff(err: &std::io::Error, backoff: Duration) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		error = %err,
		backoff_ms = backoff.whole_milliseconds() as i64,
		"Local descriptors exhausted; redialing the throttling service."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (err, backoff);
}

pub(crate) fn ticket_dropped_live(cid: &CorrelationId) {
	#[cfg(feature = "tracing")]
	tracing::warn!(cid = cid.as_str(), "Ticket dropped without release; closing its connection.");
	#[cfg(not(feature = "tracing"))]
	let _ = cid;
}
