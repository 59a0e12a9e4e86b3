//! Serde adapter for the `retry` field of a [`Response`](super::Response).
//!
//! The service encodes the hint as RFC 3339 and falls back to the zero instant
//! (`0001-01-01T00:00:00Z`) when it has no opinion, so the zero instant, `null`, an empty string,
//! and an absent field all mean "no hint".

// crates.io
use serde::{Deserializer, Serializer, de::Error as _, ser::Error as _};
use time::format_description::well_known::Rfc3339;
// self
use crate::_prelude::*;

/// Serializes a retry hint as RFC 3339.
pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match value {
		Some(instant) => {
			let text = instant.format(&Rfc3339).map_err(S::Error::custom)?;

			serializer.serialize_str(&text)
		},
		None => serializer.serialize_none(),
	}
}

/// Deserializes a retry hint, mapping every flavor of "no hint" to `None`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(text) = Option::<String>::deserialize(deserializer)? else {
		return Ok(None);
	};
	let text = text.trim();

	if text.is_empty() {
		return Ok(None);
	}

	let instant = OffsetDateTime::parse(text, &Rfc3339).map_err(D::Error::custom)?;

	Ok((instant.year() > 1).then_some(instant))
}
