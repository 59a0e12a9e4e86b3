//! Correlation identifiers threaded through ticket requests for log correlation.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Opaque tracing token attached to a ticket request.
///
/// The throttling service never interprets the value; it only echoes it back and logs it.
/// Empty identifiers are allowed and simply omitted from the HTTP backend's headers.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);
impl CorrelationId {
	/// Wraps an existing identifier.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Generates a random version 4 UUID in its canonical hyphenated form.
	pub fn generate() -> Self {
		Self(Uuid::new_v4().to_string())
	}

	/// Returns `true` when no identifier was supplied.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Deref for CorrelationId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for CorrelationId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for CorrelationId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<&str> for CorrelationId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for CorrelationId {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<CorrelationId> for String {
	fn from(value: CorrelationId) -> Self {
		value.0
	}
}
impl Debug for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CorrelationId({})", self.0)
	}
}
impl Display for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
