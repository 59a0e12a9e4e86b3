//! Line-delimited JSON frames spoken by the ticket service.
//!
//! Each request and each response occupies exactly one line terminated by `\n`. The JSON
//! encoder never emits raw newlines (string contents are escaped), so a frame can be recovered
//! by reading up to and including the first `\n`.

pub mod retry_at;

// crates.io
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, ProtocolError, TransportError},
	id::CorrelationId,
};

/// Frame terminator.
pub const FRAME_DELIMITER: u8 = b'\n';
/// Default upper bound for a single frame, delimiter included.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Ticket request sent to the throttling service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
	/// Provider the ticket is requested for (e.g. `bac`).
	pub osp: String,
	/// Named quota buckets to enforce; keys and values are provider-defined.
	#[serde(default, deserialize_with = "null_as_default")]
	pub limits: BTreeMap<String, String>,
	/// Opaque tracing token.
	#[serde(rename = "cid", default)]
	pub correlation_id: CorrelationId,
}
impl Request {
	/// Creates a request for the provided OSP without sub-limits.
	pub fn new(osp: impl Into<String>) -> Self {
		Self { osp: osp.into(), ..Default::default() }
	}

	/// Parses a provider spec of the form `name?bucket=value&bucket2=value2`.
	///
	/// Query pairs are percent-decoded and become sub-limits; a later duplicate bucket wins.
	pub fn parse(spec: &str) -> Result<Self, ConfigError> {
		let (name, query) = spec.split_once('?').unwrap_or((spec, ""));
		let name = name.trim();

		if name.is_empty() {
			return Err(ConfigError::EmptyOsp);
		}

		let limits = url::form_urlencoded::parse(query.as_bytes())
			.filter(|(bucket, _)| !bucket.is_empty())
			.map(|(bucket, value)| (bucket.into_owned(), value.into_owned()))
			.collect();

		Ok(Self { osp: name.to_owned(), limits, correlation_id: CorrelationId::default() })
	}

	/// Adds or replaces a sub-limit.
	pub fn with_limit(mut self, bucket: impl Into<String>, value: impl Into<String>) -> Self {
		self.limits.insert(bucket.into(), value.into());

		self
	}

	/// Tags the request with a correlation id.
	pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
		self.correlation_id = id.into();

		self
	}
}

/// Verdict carried by a [`Response`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
	/// The ticket was granted; the connection now represents it.
	Ok,
	/// The ticket was denied.
	Err,
}

/// Reply sent by the throttling service for a single request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
	/// Grant or denial.
	pub status: ResponseStatus,
	/// Human-readable detail, usually the denial reason.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub message: String,
	/// Earliest instant a retry may be attempted. Absent and zero values both decode to `None`.
	#[serde(rename = "retry", default, with = "retry_at", skip_serializing_if = "Option::is_none")]
	pub retry_at: Option<OffsetDateTime>,
	/// Correlation id echoed by the service.
	#[serde(
		rename = "correlationId",
		default,
		skip_serializing_if = "CorrelationId::is_empty"
	)]
	pub correlation_id: CorrelationId,
}
impl Response {
	/// Builds a grant.
	pub fn granted(correlation_id: impl Into<CorrelationId>) -> Self {
		Self {
			status: ResponseStatus::Ok,
			message: String::new(),
			retry_at: None,
			correlation_id: correlation_id.into(),
		}
	}

	/// Builds a denial, optionally carrying a retry hint.
	pub fn denied(message: impl Into<String>, retry_at: Option<OffsetDateTime>) -> Self {
		Self {
			status: ResponseStatus::Err,
			message: message.into(),
			retry_at,
			correlation_id: CorrelationId::default(),
		}
	}

	/// Echoes the provided correlation id.
	pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
		self.correlation_id = id.into();

		self
	}

	/// Returns `true` for a grant.
	pub fn is_granted(&self) -> bool {
		self.status == ResponseStatus::Ok
	}
}

/// Encodes a frame as compact JSON followed by the delimiter.
pub fn encode<T>(value: &T) -> Result<Vec<u8>, ProtocolError>
where
	T: ?Sized + Serialize,
{
	let mut bytes = serde_json::to_vec(value).map_err(ProtocolError::Encode)?;

	bytes.push(FRAME_DELIMITER);

	Ok(bytes)
}

/// Decodes one frame; a trailing delimiter (and `\r`) is tolerated.
pub fn decode<T>(bytes: &[u8]) -> Result<T, ProtocolError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(bytes);
	let value = serde_path_to_error::deserialize(&mut de)
		.map_err(|source| ProtocolError::Malformed { source })?;

	de.end().map_err(ProtocolError::TrailingData)?;

	Ok(value)
}

/// Writes one encoded frame and flushes it.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
	W: ?Sized + Unpin + AsyncWrite,
	T: ?Sized + Serialize,
{
	let bytes = encode(value)?;

	writer.write_all(&bytes).await.map_err(TransportError::from)?;
	writer.flush().await.map_err(TransportError::from)?;

	Ok(())
}

/// Reads bytes up to and including the first delimiter and decodes them.
///
/// Fails with [`ProtocolError::ConnectionClosed`] when the peer hangs up before the delimiter
/// and with [`ProtocolError::FrameTooLarge`] when no delimiter shows up within `max_len` bytes.
pub async fn read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<T>
where
	R: ?Sized + Unpin + AsyncBufRead,
	T: DeserializeOwned,
{
	let mut buf = Vec::new();
	let limit = u64::try_from(max_len).unwrap_or(u64::MAX);
	let read = (&mut *reader)
		.take(limit)
		.read_until(FRAME_DELIMITER, &mut buf)
		.await
		.map_err(TransportError::from)?;

	if buf.last() != Some(&FRAME_DELIMITER) {
		return Err(if read >= max_len {
			ProtocolError::FrameTooLarge { limit: max_len }
		} else {
			ProtocolError::ConnectionClosed
		}
		.into());
	}

	Ok(decode(&buf)?)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: serde::Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn request_encodes_to_a_single_line() {
		let request = Request::new("bac")
			.with_limit("note", "line\nbreak")
			.with_correlation_id("7e3af66b-51ce-4012-8c0a-57827c886981");
		let bytes = encode(&request).expect("Request should encode.");
		let text = std::str::from_utf8(&bytes).expect("Encoded frame should be UTF-8.");

		assert_eq!(text.matches('\n').count(), 1);
		assert!(text.ends_with('\n'));
		assert_eq!(
			text,
			"{\"osp\":\"bac\",\"limits\":{\"note\":\"line\\nbreak\"},\"cid\":\"7e3af66b-51ce-4012-8c0a-57827c886981\"}\n"
		);
	}

	#[test]
	fn request_decodes_null_limits() {
		let request: Request =
			decode(b"{\"osp\":\"bac\",\"limits\":null,\"cid\":\"\"}\n").expect("Request should decode.");

		assert_eq!(request, Request::new("bac"));
	}

	#[test]
	fn parse_splits_sub_limits() {
		let request = Request::parse("zohobooks?views-per-day=10&views-per-min=2")
			.expect("Provider spec should parse.");

		assert_eq!(request.osp, "zohobooks");
		assert_eq!(request.limits.len(), 2);
		assert_eq!(request.limits.get("views-per-day").map(String::as_str), Some("10"));
		assert_eq!(request.limits.get("views-per-min").map(String::as_str), Some("2"));
		assert_eq!(Request::parse("bac").expect("Bare provider should parse."), Request::new("bac"));
		assert_eq!(
			Request::parse("xero?tenant%20id=a%2Fb").expect("Encoded pairs should parse.").limits
				["tenant id"],
			"a/b"
		);
	}

	#[test]
	fn parse_rejects_missing_provider() {
		assert!(matches!(Request::parse("?views-per-day=10"), Err(ConfigError::EmptyOsp)));
		assert!(matches!(Request::parse(""), Err(ConfigError::EmptyOsp)));
	}

	#[test]
	fn response_treats_zero_retry_as_absent() {
		let response: Response = decode(
			b"{\"status\":\"err\",\"message\":\"busy\",\"retry\":\"0001-01-01T00:00:00Z\",\"correlationId\":\"c1\"}\n",
		)
		.expect("Response should decode.");

		assert_eq!(response.status, ResponseStatus::Err);
		assert_eq!(response.message, "busy");
		assert_eq!(response.retry_at, None);
		assert_eq!(response.correlation_id.as_str(), "c1");
	}

	#[test]
	fn response_keeps_retry_hint() {
		let response: Response = decode(
			b"{\"status\":\"err\",\"message\":\"busy\",\"retry\":\"2026-10-16T08:30:00.25+02:00\"}",
		)
		.expect("Response should decode.");

		assert_eq!(response.retry_at, Some(datetime!(2026-10-16 06:30:00.25 UTC)));
	}

	#[test]
	fn response_survives_encoding() {
		let response =
			Response::denied("slow down", Some(datetime!(2026-10-16 06:30:00.125 UTC)))
				.with_correlation_id("c2");
		let decoded: Response =
			decode(&encode(&response).expect("Response should encode.")).expect("Response should decode.");

		assert_eq!(decoded, response);

		let granted = encode(&Response::granted("")).expect("Grant should encode.");

		assert_eq!(granted, b"{\"status\":\"ok\"}\n");
	}

	#[test]
	fn decode_reports_malformed_frames() {
		assert!(matches!(
			decode::<Response>(b"{\"message\":\"no status\"}"),
			Err(ProtocolError::Malformed { .. })
		));
		assert!(matches!(
			decode::<Response>(b"{\"status\":\"maybe\"}"),
			Err(ProtocolError::Malformed { .. })
		));
		assert!(matches!(decode::<Response>(b"not json"), Err(ProtocolError::Malformed { .. })));
		assert!(matches!(
			decode::<Response>(b"{\"status\":\"ok\"} {\"status\":\"ok\"}"),
			Err(ProtocolError::TrailingData(_))
		));

		let err = decode::<Response>(b"{\"status\":\"err\",\"retry\":\"yesterday\"}")
			.expect_err("Invalid timestamps should be rejected.");

		match err {
			ProtocolError::Malformed { source } => assert_eq!(source.path().to_string(), "retry"),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[tokio::test]
	async fn read_frame_stops_at_the_delimiter() {
		let mut input: &[u8] = b"{\"status\":\"ok\"}\n{\"status\":\"err\"}\n";
		let first: Response =
			read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).await.expect("First frame should decode.");
		let second: Response =
			read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).await.expect("Second frame should decode.");

		assert!(first.is_granted());
		assert!(!second.is_granted());
	}

	#[tokio::test]
	async fn read_frame_detects_truncation_and_oversize() {
		let mut truncated: &[u8] = b"{\"status\":\"ok\"}";
		let err = read_frame::<_, Response>(&mut truncated, DEFAULT_MAX_FRAME_LEN)
			.await
			.expect_err("A frame without delimiter should fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::ConnectionClosed)));

		let mut oversized: &[u8] = b"{\"status\":\"ok\",\"message\":\"0123456789\"}\n";
		let err = read_frame::<_, Response>(&mut oversized, 8)
			.await
			.expect_err("Oversized frames should fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::FrameTooLarge { limit: 8 })));
	}
}
