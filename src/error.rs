//! Throttler-level error types shared by both protocols and the dispatcher.

// std
use std::io;
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical throttler error exposed by public APIs.
///
/// Intermediate denials are retried inside the clients; only the final outcome of an
/// acquisition ever reaches the caller.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, HTTP).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The throttling service answered with bytes that do not follow the wire format.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// The HTTP backend kept answering `429` until the attempt budget ran out.
	#[error("Failed to acquire token after {attempts} attempts.")]
	TooManyRequests {
		/// Number of attempts that were made.
		attempts: u32,
	},
	/// The HTTP backend answered with a status other than `200` or `429`.
	#[error("Unexpected response from throttling service: {status}.")]
	UnexpectedStatus {
		/// HTTP status code returned by the backend.
		status: u16,
	},
	/// The ticket service did not grant a ticket before the caller's deadline.
	#[error(
		"Reached deadline before a ticket was granted (last denial: {}).",
		.last_message.as_deref().unwrap_or("none")
	)]
	DeadlineExceeded {
		/// Message attached to the last denial, if any denial was received.
		last_message: Option<String>,
	},
	/// The throttler refused the ticket outright.
	#[error("Ticket denied: {message}.")]
	Denied {
		/// Reason reported by the throttler.
		message: String,
	},
}
impl Error {
	/// Returns `true` when the failure means the quota was not available in time, as opposed
	/// to a broken configuration, transport, or protocol exchange.
	pub fn is_quota_exhausted(&self) -> bool {
		matches!(
			self,
			Self::TooManyRequests { .. } | Self::DeadlineExceeded { .. } | Self::Denied { .. }
		)
	}
}

/// Configuration and validation failures raised while building a context or a request.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Backend address cannot be parsed as a URL.
	#[error("Throttler address is not a valid URL.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Backend address is structurally unusable.
	#[error("Throttler address `{address}` is invalid: {reason}.")]
	InvalidAddress {
		/// Address as supplied by the caller.
		address: String,
		/// Why the address was rejected.
		reason: &'static str,
	},
	/// Backend address uses a scheme no protocol is registered for.
	#[error("Throttler address uses the unsupported scheme `{scheme}`.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// Ticket request does not name a provider.
	#[error("Ticket request must name an OSP.")]
	EmptyOsp,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(e: url::ParseError) -> Self {
		Self::InvalidUrl { source: e }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The ticket service could not be reached.
	#[error("Failed to connect to the throttling service at {address}.")]
	Connect {
		/// Address that was dialed.
		address: String,
		/// Underlying socket failure.
		#[source]
		source: io::Error,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the throttling service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced mid-exchange.
	#[error("I/O error occurred while talking to the throttling service.")]
	Io(#[from] io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Wire format violations on the ticket protocol.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// A frame could not be decoded.
	#[error("Throttling service sent a malformed frame.")]
	Malformed {
		/// Structured parsing failure, including the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A frame carried bytes after its JSON value.
	#[error("Throttling service sent trailing data after a frame.")]
	TrailingData(#[source] serde_json::Error),
	/// A frame could not be encoded.
	#[error("Ticket request could not be encoded.")]
	Encode(#[source] serde_json::Error),
	/// The peer closed the connection before terminating the frame.
	#[error("Connection closed before a complete frame was received.")]
	ConnectionClosed,
	/// The peer sent more bytes than a single frame may hold.
	#[error("Frame exceeds the {limit} byte limit.")]
	FrameTooLarge {
		/// Configured frame size limit.
		limit: usize,
	},
}
