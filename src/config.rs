//! Backend configuration: which throttling service to talk to and how patiently.
//!
//! The protocol is fixed when a [`Backend`] is built, never inferred per call. Use
//! [`Backend::parse`] to derive it from an address string:
//!
//! | Address                         | Backend                              |
//! |---------------------------------|--------------------------------------|
//! | `tcp://host[:port]`             | [`Backend::Ticket`], port 80 default |
//! | `host[:port]` (no scheme)       | [`Backend::Ticket`], port 80 default |
//! | `http(s)://[id:secret@]host/..` | [`Backend::Http`]                    |

// crates.io
use percent_encoding::percent_decode_str;
// self
use crate::{_prelude::*, error::ConfigError, obs::Protocol, wire::DEFAULT_MAX_FRAME_LEN};

const TICKET_SCHEME: &str = "tcp";
const TICKET_DEFAULT_PORT: u16 = 80;

/// Throttling service backend, tagged by protocol.
#[derive(Clone, Debug)]
pub enum Backend {
	/// Legacy HTTP polling endpoint.
	Http(HttpConfig),
	/// Line-delimited JSON ticket service.
	Ticket(TicketConfig),
}
impl Backend {
	/// Derives the backend from an address string.
	pub fn parse(address: &str) -> Result<Self, ConfigError> {
		if address.is_empty() || address.chars().any(char::is_whitespace) {
			return Err(ConfigError::InvalidAddress {
				address: address.into(),
				reason: "addresses must be non-empty and free of whitespace",
			});
		}

		let url = if address.contains("://") {
			Url::parse(address)?
		} else {
			Url::parse(&format!("{TICKET_SCHEME}://{address}"))?
		};

		match url.scheme() {
			TICKET_SCHEME => Ok(Self::Ticket(TicketConfig::from_url(address, &url)?)),
			"http" | "https" => Ok(Self::Http(HttpConfig::new(url)?)),
			scheme => Err(ConfigError::UnsupportedScheme { scheme: scheme.into() }),
		}
	}

	/// Protocol spoken by this backend.
	pub fn protocol(&self) -> Protocol {
		match self {
			Self::Http(_) => Protocol::Http,
			Self::Ticket(_) => Protocol::Ticket,
		}
	}
}
impl FromStr for Backend {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl From<HttpConfig> for Backend {
	fn from(value: HttpConfig) -> Self {
		Self::Http(value)
	}
}
impl From<TicketConfig> for Backend {
	fn from(value: TicketConfig) -> Self {
		Self::Ticket(value)
	}
}

/// Settings for the legacy HTTP polling backend.
#[derive(Clone, Debug)]
pub struct HttpConfig {
	/// Base URL; requests go to `<base_url>/token/<osp>`.
	pub base_url: Url,
	/// Basic-auth credentials sent with every attempt.
	pub credentials: Option<ClientCredentials>,
	/// Attempts made when the caller does not specify a budget.
	pub default_retries: u32,
	/// Pause between a `429` and the next attempt.
	pub retry_interval: Duration,
}
impl HttpConfig {
	/// Attempt budget applied when callers leave it unset.
	pub const DEFAULT_RETRIES: u32 = 5;
	/// Fixed pause between attempts.
	pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::seconds(5);

	/// Creates a config for the provided base URL.
	///
	/// Userinfo embedded in the URL is moved into [`HttpConfig::credentials`] so it never
	/// appears in logged URLs.
	pub fn new(mut base_url: Url) -> Result<Self, ConfigError> {
		if !matches!(base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { scheme: base_url.scheme().into() });
		}
		if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
			return Err(ConfigError::InvalidAddress {
				address: base_url.to_string(),
				reason: "the HTTP backend needs a hierarchical URL with a host",
			});
		}

		let credentials = (!base_url.username().is_empty()).then(|| {
			let id = decode_userinfo(base_url.username());
			let secret = decode_userinfo(base_url.password().unwrap_or_default());

			ClientCredentials::new(id, secret)
		});
		// Infallible for hierarchical URLs with a host, checked above.
		let _ = base_url.set_username("");
		let _ = base_url.set_password(None);

		Ok(Self {
			base_url,
			credentials,
			default_retries: Self::DEFAULT_RETRIES,
			retry_interval: Self::DEFAULT_RETRY_INTERVAL,
		})
	}

	/// Sets basic-auth credentials.
	pub fn with_credentials(
		mut self,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Self {
		self.credentials = Some(ClientCredentials::new(client_id, client_secret));

		self
	}

	/// Overrides the default attempt budget.
	pub fn with_default_retries(mut self, retries: u32) -> Self {
		self.default_retries = retries.max(1);

		self
	}

	/// Overrides the pause between attempts.
	pub fn with_retry_interval(mut self, interval: Duration) -> Self {
		self.retry_interval = interval;

		self
	}
}

/// Settings for the ticket service backend.
#[derive(Clone, Debug)]
pub struct TicketConfig {
	/// `host:port` dialed for every attempt.
	pub address: String,
	/// Deadline applied when the caller does not specify one.
	pub default_max_wait: Duration,
	/// Delay before retrying a denial that carries no usable retry hint.
	pub default_retry_delay: Duration,
	/// Pause before redialing after local descriptor exhaustion.
	pub connect_backoff: Duration,
	/// Upper bound for a single response frame.
	pub max_frame_len: usize,
}
impl TicketConfig {
	/// Deadline applied when callers leave it unset.
	pub const DEFAULT_MAX_WAIT: Duration = Duration::seconds(60);
	/// Retry delay used when a denial carries no hint.
	pub const DEFAULT_RETRY_DELAY: Duration = Duration::seconds(1);
	/// Pause before redialing after `EMFILE`/`ENFILE`.
	pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::milliseconds(100);

	/// Creates a config for the provided `host:port` address.
	pub fn new(address: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			default_max_wait: Self::DEFAULT_MAX_WAIT,
			default_retry_delay: Self::DEFAULT_RETRY_DELAY,
			connect_backoff: Self::DEFAULT_CONNECT_BACKOFF,
			max_frame_len: DEFAULT_MAX_FRAME_LEN,
		}
	}

	fn from_url(raw: &str, url: &Url) -> Result<Self, ConfigError> {
		let invalid = |reason| ConfigError::InvalidAddress { address: raw.into(), reason };
		let host = url
			.host_str()
			.filter(|host| !host.is_empty())
			.ok_or_else(|| invalid("missing host"))?;

		if !url.username().is_empty() || url.password().is_some() {
			return Err(invalid("the ticket backend does not take credentials"));
		}
		if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
			return Err(invalid("the ticket backend address is host and port only"));
		}

		let port = url.port().unwrap_or(TICKET_DEFAULT_PORT);

		Ok(Self::new(format!("{host}:{port}")))
	}

	/// Overrides the default deadline.
	pub fn with_default_max_wait(mut self, max_wait: Duration) -> Self {
		self.default_max_wait = max_wait;

		self
	}

	/// Overrides the delay used for denials without a retry hint.
	pub fn with_default_retry_delay(mut self, delay: Duration) -> Self {
		self.default_retry_delay = delay;

		self
	}

	/// Overrides the redial pause used after local descriptor exhaustion.
	pub fn with_connect_backoff(mut self, backoff: Duration) -> Self {
		self.connect_backoff = backoff;

		self
	}

	/// Overrides the response frame size limit.
	pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
		self.max_frame_len = max_frame_len;

		self
	}
}

/// Basic-auth credentials for the HTTP backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Client identifier (basic-auth username).
	pub client_id: String,
	/// Client secret (basic-auth password).
	pub client_secret: ClientSecret,
}
impl ClientCredentials {
	/// Bundles an id/secret pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: ClientSecret::new(client_secret) }
	}
}

/// Redacted client secret wrapper keeping credentials out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret(String);
impl ClientSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ClientSecret").field(&"<redacted>").finish()
	}
}
impl Display for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

fn decode_userinfo(raw: &str) -> String {
	percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
