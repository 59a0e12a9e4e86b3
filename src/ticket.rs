//! Granted permission to call a rate-limited provider.
//!
//! A ticket from the ticket service owns the TCP connection it was granted on; the throttling
//! service reclaims the capacity when that connection closes. Tickets from the HTTP backend hold
//! nothing and releasing them is a no-op, so callers handle both the same way.

// crates.io
use tokio::{io::AsyncWriteExt, net::TcpStream};
// self
use crate::{_prelude::*, id::CorrelationId, obs};

/// Permission to perform a rate-limited call, released with [`Ticket::release`].
///
/// The type is move-only: exactly one owner holds the underlying connection. Dropping a live
/// ticket closes the connection as well, but emits a warning because capacity should be
/// released explicitly once the guarded call completes.
pub struct Ticket {
	correlation_id: CorrelationId,
	conn: Option<TcpStream>,
	on_release: Option<Arc<dyn Fn() + Send + Sync>>,
}
impl Ticket {
	/// Wraps the connection a grant arrived on.
	pub(crate) fn live(correlation_id: CorrelationId, conn: TcpStream) -> Self {
		Self { correlation_id, conn: Some(conn), on_release: None }
	}

	/// Creates a ticket with no underlying connection.
	pub fn detached(correlation_id: impl Into<CorrelationId>) -> Self {
		Self { correlation_id: correlation_id.into(), conn: None, on_release: None }
	}

	/// Registers a hook invoked once, when a live ticket is released or dropped.
	pub(crate) fn on_release(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
		self.on_release = Some(hook);

		self
	}

	/// Correlation id the ticket was requested with.
	pub fn correlation_id(&self) -> &CorrelationId {
		&self.correlation_id
	}

	/// Returns `true` while the ticket still holds capacity on the throttling service.
	pub fn is_live(&self) -> bool {
		self.conn.is_some()
	}

	/// Returns the ticket to the throttling service by closing its connection.
	///
	/// Idempotent: releasing twice, or releasing a ticket that never held a connection, does
	/// nothing. Shutdown failures are ignored because the connection is dropped either way.
	pub async fn release(&mut self) {
		if let Some(mut conn) = self.conn.take() {
			let _ = conn.shutdown().await;

			drop(conn);
			self.notify_release();
		}
	}

	fn notify_release(&mut self) {
		if let Some(hook) = self.on_release.take() {
			hook();
		}
	}
}
impl Debug for Ticket {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Ticket")
			.field("correlation_id", &self.correlation_id)
			.field("live", &self.is_live())
			.finish()
	}
}
impl Drop for Ticket {
	fn drop(&mut self) {
		if self.conn.take().is_some() {
			obs::ticket_dropped_live(&self.correlation_id);
			self.notify_release();
		}
	}
}
