//! Ticket acquisition entry points.
//!
//! [`Context`] is the only type most callers need: it is built once from a [`Backend`] and
//! dispatches every acquisition to the matching protocol client. The protocol clients,
//! [`HttpThrottler`] and [`TicketThrottler`], are public for callers that want to talk to one
//! backend directly.
//!
//! Every acquisition suspends the calling task until a ticket is granted or the retry budget is
//! spent; spawn one task per acquisition to make progress elsewhere in the meantime. A
//! [`Context`] holds no mutable state besides atomic counters, so one instance can be shared
//! by any number of concurrent callers.

pub mod http;
pub mod stream;

mod metrics;

pub use http::HttpThrottler;
pub use metrics::AcquireMetrics;
pub use stream::TicketThrottler;

// self
use crate::{
	_prelude::*,
	config::Backend,
	error::ConfigError,
	id::CorrelationId,
	obs::Protocol,
	ticket::Ticket,
	wire::Request,
};

/// Boxed future returned by [`Throttler::get_ticket`].
pub type TicketFuture<'a> = Pin<Box<dyn Future<Output = Result<Ticket>> + 'a + Send>>;

/// Anything able to hand out tickets; implemented by [`Context`] and the doubles in
/// [`testing`](crate::testing).
pub trait Throttler
where
	Self: Send + Sync,
{
	/// Acquires a ticket for the provided request.
	fn get_ticket<'a>(
		&'a self,
		request: Request,
		options: &'a ThrottlerOptions,
	) -> TicketFuture<'a>;
}

/// Caller-supplied acquisition policy.
///
/// Unset (or zero) budgets fall back to the backend defaults:
/// [`HttpConfig::DEFAULT_RETRIES`](crate::config::HttpConfig::DEFAULT_RETRIES) attempts for the
/// HTTP backend and [`TicketConfig::DEFAULT_MAX_WAIT`](crate::config::TicketConfig::DEFAULT_MAX_WAIT)
/// for the ticket backend, unless the backend config overrides them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThrottlerOptions {
	/// Attempt budget for the HTTP backend.
	pub retries: Option<u32>,
	/// Wall-clock budget for the ticket backend.
	pub max_wait: Option<Duration>,
	/// Correlation id used when the request does not carry one.
	pub correlation_id: CorrelationId,
}
impl ThrottlerOptions {
	/// Creates options that defer every budget to the backend defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the HTTP attempt budget.
	pub fn with_retries(mut self, retries: u32) -> Self {
		self.retries = Some(retries);

		self
	}

	/// Sets the ticket wait budget.
	pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
		self.max_wait = Some(max_wait);

		self
	}

	/// Sets the correlation id.
	pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
		self.correlation_id = id.into();

		self
	}

	pub(crate) fn retries_or(&self, default: u32) -> u32 {
		self.retries.filter(|retries| *retries > 0).unwrap_or(default)
	}

	pub(crate) fn max_wait_or(&self, default: Duration) -> Duration {
		self.max_wait.filter(|wait| wait.is_positive()).unwrap_or(default)
	}

	/// Fills in the correlation id when the request has none.
	pub(crate) fn tag(&self, mut request: Request) -> Request {
		if request.correlation_id.is_empty() {
			request.correlation_id = self.correlation_id.clone();
		}

		request
	}
}

/// Handle into the throttling service, fixed to one protocol at construction.
#[derive(Clone, Debug)]
pub struct Context {
	client: ProtocolClient,
}
impl Context {
	/// Creates a context for the provided backend.
	pub fn new(backend: impl Into<Backend>) -> Result<Self> {
		let client = match backend.into() {
			Backend::Http(config) => ProtocolClient::Http(HttpThrottler::new(config)?),
			Backend::Ticket(config) => ProtocolClient::Ticket(TicketThrottler::new(config)),
		};

		Ok(Self { client })
	}

	/// Creates a context that reuses the caller's reqwest client for the HTTP backend.
	pub fn with_http_client(backend: impl Into<Backend>, http_client: ReqwestClient) -> Self {
		let client = match backend.into() {
			Backend::Http(config) =>
				ProtocolClient::Http(HttpThrottler::with_client(config, http_client)),
			Backend::Ticket(config) => ProtocolClient::Ticket(TicketThrottler::new(config)),
		};

		Self { client }
	}

	/// Parses the address with [`Backend::parse`] and creates a context for it.
	pub fn from_address(address: &str) -> Result<Self> {
		Self::new(Backend::parse(address)?)
	}

	/// Protocol this context speaks.
	pub fn protocol(&self) -> Protocol {
		match &self.client {
			ProtocolClient::Http(_) => Protocol::Http,
			ProtocolClient::Ticket(_) => Protocol::Ticket,
		}
	}

	/// Counters shared by every acquisition made through this context.
	pub fn metrics(&self) -> &AcquireMetrics {
		match &self.client {
			ProtocolClient::Http(client) => client.metrics(),
			ProtocolClient::Ticket(client) => client.metrics(),
		}
	}

	/// Acquires a ticket for `osp`, which may carry sub-limits as a query string
	/// (`zohobooks?views-per-day=10&views-per-min=2`).
	///
	/// Call this before every outbound request to a rate-limited provider and
	/// [`release`](Ticket::release) the ticket once the request completes.
	pub async fn get_token(&self, osp: &str, options: &ThrottlerOptions) -> Result<Ticket> {
		self.get_ticket(Request::parse(osp)?, options).await
	}

	/// Acquires a ticket for a fully built request.
	///
	/// On the HTTP backend the request's sub-limits travel as query parameters and the
	/// returned ticket holds no connection.
	pub async fn get_ticket(&self, request: Request, options: &ThrottlerOptions) -> Result<Ticket> {
		if request.osp.trim().is_empty() {
			return Err(ConfigError::EmptyOsp.into());
		}

		let request = options.tag(request);

		match &self.client {
			ProtocolClient::Http(client) => {
				client.acquire(&request, options).await?;

				Ok(Ticket::detached(request.correlation_id))
			},
			ProtocolClient::Ticket(client) => client.get_ticket(request, options).await,
		}
	}
}
impl Throttler for Context {
	fn get_ticket<'a>(
		&'a self,
		request: Request,
		options: &'a ThrottlerOptions,
	) -> TicketFuture<'a> {
		Box::pin(Context::get_ticket(self, request, options))
	}
}

#[derive(Clone, Debug)]
enum ProtocolClient {
	Http(HttpThrottler),
	Ticket(TicketThrottler),
}

/// Converts a signed duration into a sleepable one; negative values clamp to zero.
pub(crate) fn std_duration(duration: Duration) -> std::time::Duration {
	std::time::Duration::try_from(duration).unwrap_or_default()
}
