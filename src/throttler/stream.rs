//! Ticket protocol client.
//!
//! Every attempt dials a fresh connection, writes one [`Request`] line, and reads one
//! [`Response`] line. A grant hands the still-open connection to the returned [`Ticket`]; a
//! denial closes it and, if the service's retry instant falls before the caller's deadline,
//! sleeps until that instant and tries again.

// std
use std::io;
// crates.io
use tokio::{io::BufReader, net::TcpStream, time::Instant};
// self
use crate::{
	_prelude::*,
	config::TicketConfig,
	error::TransportError,
	obs::{self, AcquireSpan, Protocol},
	throttler::{AcquireMetrics, ThrottlerOptions, std_duration},
	ticket::Ticket,
	wire::{self, Request, Response},
};

type DialFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;
type Dialer = Arc<dyn Fn(String) -> DialFuture + Send + Sync>;

const PROTOCOL: Protocol = Protocol::Ticket;
#[cfg(unix)]
const ENFILE: i32 = 23;
#[cfg(unix)]
const EMFILE: i32 = 24;

/// Client for the line-delimited JSON ticket service.
#[derive(Clone)]
pub struct TicketThrottler {
	config: TicketConfig,
	metrics: Arc<AcquireMetrics>,
	dial: Dialer,
}
impl TicketThrottler {
	/// Creates a client for the configured service.
	pub fn new(config: TicketConfig) -> Self {
		Self { config, metrics: Arc::new(AcquireMetrics::new(PROTOCOL)), dial: Arc::new(dial_tcp) }
	}

	#[cfg(test)]
	fn with_dialer(mut self, dial: Dialer) -> Self {
		self.dial = dial;

		self
	}

	/// Backend settings.
	pub fn config(&self) -> &TicketConfig {
		&self.config
	}

	/// Counters for this client.
	pub fn metrics(&self) -> &AcquireMetrics {
		&self.metrics
	}

	/// Asks the service for permission to call the request's provider, waiting up to
	/// [`ThrottlerOptions::max_wait`] (or [`TicketConfig::default_max_wait`]).
	///
	/// Denials are retried at the service's `retry` instant, or after
	/// [`TicketConfig::default_retry_delay`] when it sends none. A denial whose retry instant
	/// falls at or after the deadline fails right away with [`Error::DeadlineExceeded`]
	/// carrying the service's message, rather than sleeping past the deadline. Transport and
	/// protocol failures are never retried, except for local descriptor exhaustion while
	/// dialing, which is redialed after [`TicketConfig::connect_backoff`] without counting as
	/// an attempt. The deadline also bounds dialing and the wait for each response.
	///
	/// The deadline is measured on the monotonic clock. A budget too large for that clock to
	/// represent means waiting without a deadline.
	pub async fn get_ticket(&self, request: Request, options: &ThrottlerOptions) -> Result<Ticket> {
		let request = options.tag(request);
		let span = AcquireSpan::new(PROTOCOL, &request.osp, &request.correlation_id);
		let result = span.instrument(self.acquire(request, options)).await;

		match &result {
			Ok(_) => self.metrics.record_grant(),
			Err(_) => self.metrics.record_failure(),
		}

		result
	}

	async fn acquire(&self, request: Request, options: &ThrottlerOptions) -> Result<Ticket> {
		let max_wait = std_duration(options.max_wait_or(self.config.default_max_wait));
		let deadline = Instant::now().checked_add(max_wait);
		let default_delay = std_duration(self.config.default_retry_delay);
		let mut last_message = None;
		let mut attempt = 0;

		while deadline.is_none_or(|deadline| Instant::now() <= deadline) {
			let round_trip = async {
				let mut conn = self.connect().await?;

				attempt += 1;
				obs::attempt_started(attempt);
				self.metrics.record_attempt();

				let response = self.exchange(&mut conn, &request).await?;

				Ok::<_, Error>((conn, response))
			};
			let outcome = match deadline {
				Some(deadline) => match tokio::time::timeout_at(deadline, round_trip).await {
					Ok(outcome) => outcome,
					Err(_) => break,
				},
				None => round_trip.await,
			};
			let (conn, response) = outcome?;

			if response.is_granted() {
				obs::ticket_granted(attempt);

				let metrics = self.metrics.clone();

				return Ok(Ticket::live(request.correlation_id.clone(), conn)
					.on_release(Arc::new(move || metrics.record_release())));
			}

			// A denied connection is never reused.
			drop(conn);
			self.metrics.record_denial();

			// The hint is wall-clock; convert it once and keep comparing on the monotonic clock.
			let delay = response
				.retry_at
				.map(|retry_at| std_duration(retry_at - OffsetDateTime::now_utc()))
				.unwrap_or(default_delay);
			let past_deadline = deadline.is_some_and(|deadline| {
				Instant::now().checked_add(delay).is_none_or(|resume| resume >= deadline)
			});

			if past_deadline {
				obs::deadline_reached(Some(&response.message));

				return Err(Error::DeadlineExceeded { last_message: Some(response.message) });
			}

			obs::attempt_denied(attempt, &response.message, delay);
			last_message = Some(response.message);

			tokio::time::sleep(delay).await;
		}

		obs::deadline_reached(last_message.as_deref());

		Err(Error::DeadlineExceeded { last_message })
	}

	async fn connect(&self) -> Result<TcpStream> {
		loop {
			match (self.dial)(self.config.address.clone()).await {
				Ok(conn) => return Ok(conn),
				Err(err) if is_descriptor_exhaustion(&err) => {
					obs::connect_backoff(&err, self.config.connect_backoff);
					tokio::time::sleep(std_duration(self.config.connect_backoff)).await;
				},
				Err(source) =>
					return Err(TransportError::Connect {
						address: self.config.address.clone(),
						source,
					}
					.into()),
			}
		}
	}

	async fn exchange(&self, conn: &mut TcpStream, request: &Request) -> Result<Response> {
		let (read_half, mut write_half) = conn.split();

		wire::write_frame(&mut write_half, request).await?;

		let mut reader = BufReader::new(read_half);

		wire::read_frame(&mut reader, self.config.max_frame_len).await
	}
}
impl Debug for TicketThrottler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TicketThrottler")
			.field("config", &self.config)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

fn dial_tcp(address: String) -> DialFuture {
	Box::pin(async move { TcpStream::connect(address).await })
}

fn is_descriptor_exhaustion(err: &io::Error) -> bool {
	#[cfg(unix)]
	{
		matches!(err.raw_os_error(), Some(EMFILE | ENFILE))
	}
	#[cfg(not(unix))]
	{
		let _ = err;

		false
	}
}
