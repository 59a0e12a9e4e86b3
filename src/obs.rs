//! Observability shared by both protocol clients.
//!
//! With the `tracing` feature (on by default) every acquisition runs inside an
//! `osp_throttler.acquire` span carrying `protocol`, `osp`, and `cid`, and each attempt, denial,
//! and backoff is logged as an event underneath it. Without the feature the helpers compile away.
//!
//! Counters live with the clients in [`AcquireMetrics`](crate::throttler::AcquireMetrics); the
//! `metrics` feature additionally exports them through the global recorder.

mod tracing;

pub use tracing::*;

// self
use crate::_prelude::*;

/// Wire protocol a client speaks to the throttling service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
	/// `GET <base>/token/<osp>`, polled until `200`.
	Http,
	/// One JSON line each way over a dedicated TCP connection.
	Ticket,
}
impl Protocol {
	/// Value of the `protocol` span field and metric label.
	pub const fn label(self) -> &'static str {
		match self {
			Self::Http => "http",
			Self::Ticket => "ticket",
		}
	}
}
impl Display for Protocol {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.label())
	}
}
