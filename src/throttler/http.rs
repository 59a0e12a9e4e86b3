//! Legacy HTTP polling client.
//!
//! Each attempt is an independent `GET <base>/token/<osp>`: `200` grants, `429` asks the caller
//! to come back after [`HttpConfig::retry_interval`], anything else is fatal. Transport failures
//! are surfaced immediately rather than retried. The backend keeps no server-side ticket, so
//! there is nothing to release afterwards.

// crates.io
use reqwest::StatusCode;
// self
use crate::{
	_prelude::*,
	config::HttpConfig,
	error::{ConfigError, TransportError},
	obs::{self, AcquireSpan, Protocol},
	throttler::{AcquireMetrics, ThrottlerOptions, std_duration},
	wire::Request,
};

/// Header carrying the correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

const PROTOCOL: Protocol = Protocol::Http;

/// Client for the HTTP polling backend.
#[derive(Clone, Debug)]
pub struct HttpThrottler {
	client: ReqwestClient,
	config: HttpConfig,
	metrics: Arc<AcquireMetrics>,
}
impl HttpThrottler {
	/// Creates a client with its own reqwest instance.
	pub fn new(config: HttpConfig) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::http_client_build)?;

		Ok(Self::with_client(config, client))
	}

	/// Creates a client that reuses an existing reqwest instance.
	pub fn with_client(config: HttpConfig, client: ReqwestClient) -> Self {
		Self { client, config, metrics: Arc::new(AcquireMetrics::new(PROTOCOL)) }
	}

	/// Backend settings.
	pub fn config(&self) -> &HttpConfig {
		&self.config
	}

	/// Counters for this client.
	pub fn metrics(&self) -> &AcquireMetrics {
		&self.metrics
	}

	/// Polls for permission to call `osp`, which may carry sub-limits as a query string.
	pub async fn get_token(&self, osp: &str, options: &ThrottlerOptions) -> Result<()> {
		let request = options.tag(Request::parse(osp)?);

		self.acquire(&request, options).await
	}

	/// Polls for permission to perform the request.
	///
	/// Makes up to [`ThrottlerOptions::retries`] attempts (or
	/// [`HttpConfig::default_retries`]) and fails with [`Error::TooManyRequests`] once they are
	/// all answered with `429`. No pause follows the final attempt.
	pub async fn acquire(&self, request: &Request, options: &ThrottlerOptions) -> Result<()> {
		let span = AcquireSpan::new(PROTOCOL, &request.osp, &request.correlation_id);
		let result = span.instrument(self.poll(request, options)).await;

		match &result {
			Ok(()) => self.metrics.record_grant(),
			Err(_) => self.metrics.record_failure(),
		}

		result
	}

	/// Builds `<base>/token/<osp>`, carrying sub-limits as query parameters.
	pub fn token_url(&self, request: &Request) -> Result<Url> {
		let mut url = self.config.base_url.clone();

		url.path_segments_mut()
			.map_err(|()| ConfigError::InvalidAddress {
				address: self.config.base_url.to_string(),
				reason: "the HTTP backend needs a hierarchical URL with a host",
			})?
			.pop_if_empty()
			.extend(["token", request.osp.as_str()]);

		if !request.limits.is_empty() {
			url.query_pairs_mut().extend_pairs(&request.limits);
		}

		Ok(url)
	}

	async fn poll(&self, request: &Request, options: &ThrottlerOptions) -> Result<()> {
		let attempts = options.retries_or(self.config.default_retries);
		let url = self.token_url(request)?;

		for attempt in 1..=attempts {
			obs::attempt_started(attempt);
			self.metrics.record_attempt();

			let mut builder = self.client.get(url.clone());

			if let Some(credentials) = &self.config.credentials {
				builder = builder
					.basic_auth(&credentials.client_id, Some(credentials.client_secret.expose()));
			}
			if !request.correlation_id.is_empty() {
				builder = builder.header(CORRELATION_HEADER, request.correlation_id.as_str());
			}

			let response = builder.send().await.map_err(TransportError::from)?;

			match response.status() {
				StatusCode::OK => {
					obs::ticket_granted(attempt);

					return Ok(());
				},
				StatusCode::TOO_MANY_REQUESTS => {
					self.metrics.record_denial();

					if attempt < attempts {
						let interval = std_duration(self.config.retry_interval);

						obs::attempt_denied(attempt, "too many requests", interval);
						tokio::time::sleep(interval).await;
					}
				},
				status => {
					obs::unexpected_status(status.as_u16());

					return Err(Error::UnexpectedStatus { status: status.as_u16() });
				},
			}
		}

		obs::attempts_exhausted(attempts);

		Err(Error::TooManyRequests { attempts })
	}
}
