//! Test doubles for code that acquires tickets; enabled via `cfg(test)` or the `test` crate
//! feature.
//!
//! - [`MockThrottlerSuccess`] and [`MockThrottlerErr`] stand in for a [`Context`] behind the
//!   [`Throttler`] trait without any network.
//! - [`FakeTicketServer`] speaks the server side of the ticket protocol on a local port, scripted
//!   per attempt, so the real client can be exercised end to end.
//!
//! [`Context`]: crate::throttler::Context

// std
use std::{
	io,
	net::SocketAddr,
	sync::atomic::{AtomicUsize, Ordering},
};
// crates.io
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt, BufReader},
	net::{TcpListener, TcpStream},
	task::JoinHandle,
};
// self
use crate::{
	_prelude::*,
	throttler::{Throttler, ThrottlerOptions, TicketFuture, std_duration},
	ticket::Ticket,
	wire::{self, DEFAULT_MAX_FRAME_LEN, Request, Response},
};

/// Throttler that grants every request with a ticket holding no connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockThrottlerSuccess;
impl Throttler for MockThrottlerSuccess {
	fn get_ticket<'a>(
		&'a self,
		request: Request,
		options: &'a ThrottlerOptions,
	) -> TicketFuture<'a> {
		let request = options.tag(request);

		Box::pin(async move { Ok(Ticket::detached(request.correlation_id)) })
	}
}

/// Throttler that denies every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockThrottlerErr;
impl Throttler for MockThrottlerErr {
	fn get_ticket<'a>(
		&'a self,
		_request: Request,
		_options: &'a ThrottlerOptions,
	) -> TicketFuture<'a> {
		Box::pin(async { Err(Error::Denied { message: "no ticket available".into() }) })
	}
}

/// Reply for one attempt, given the zero-based connection index and the decoded request.
pub type ReplyFn = dyn Fn(usize, &Request) -> Reply + Send + Sync;

/// What the fake server does with one decoded request.
#[derive(Clone, Debug)]
pub enum Reply {
	/// Writes the response frame.
	Respond(Response),
	/// Writes raw bytes verbatim, e.g. a malformed frame.
	Raw(Vec<u8>),
	/// Writes raw bytes verbatim, then hangs up.
	Truncate(Vec<u8>),
	/// Never answers; the connection stays open until the client gives up.
	Stall,
}
impl From<Response> for Reply {
	fn from(value: Response) -> Self {
		Self::Respond(value)
	}
}

/// In-process ticket service driven by a reply script.
///
/// The server records each decoded request, counts connections, and counts granted
/// connections the client later closes, which is how a ticket release is observed.
pub struct FakeTicketServer {
	address: SocketAddr,
	state: Arc<FakeState>,
	task: JoinHandle<()>,
}
impl FakeTicketServer {
	/// Binds an ephemeral local port and starts serving.
	pub async fn start<F>(reply: F) -> io::Result<Self>
	where
		F: 'static + Fn(usize, &Request) -> Reply + Send + Sync,
	{
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let address = listener.local_addr()?;
		let state = Arc::new(FakeState::default());
		let reply: Arc<ReplyFn> = Arc::new(reply);
		let task = tokio::spawn(serve(listener, state.clone(), reply));

		Ok(Self { address, state, task })
	}

	/// Starts a server that grants every request.
	pub async fn granting() -> io::Result<Self> {
		Self::start(|_, request| Response::granted(request.correlation_id.clone()).into()).await
	}

	/// Starts a server that denies every request without a retry hint.
	pub async fn denying(message: &'static str) -> io::Result<Self> {
		Self::start(move |_, _| Response::denied(message, None).into()).await
	}

	/// `host:port` to configure the client with.
	pub fn address(&self) -> String {
		self.address.to_string()
	}

	/// Requests decoded so far, in arrival order.
	pub fn requests(&self) -> Vec<Request> {
		self.state.requests.lock().clone()
	}

	/// Connections accepted so far.
	pub fn connections(&self) -> usize {
		self.state.connections.load(Ordering::SeqCst)
	}

	/// Granted connections the client has since closed.
	pub fn released(&self) -> usize {
		self.state.released.load(Ordering::SeqCst)
	}

	/// Waits until at least `count` granted connections were closed, up to `timeout`.
	pub async fn wait_released(&self, count: usize, timeout: Duration) -> bool {
		let observed = async {
			while self.released() < count {
				tokio::time::sleep(std::time::Duration::from_millis(5)).await;
			}
		};

		tokio::time::timeout(std_duration(timeout), observed).await.is_ok()
	}
}
impl Debug for FakeTicketServer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FakeTicketServer")
			.field("address", &self.address)
			.field("connections", &self.connections())
			.field("released", &self.released())
			.finish()
	}
}
impl Drop for FakeTicketServer {
	fn drop(&mut self) {
		self.task.abort();
	}
}

#[derive(Debug, Default)]
struct FakeState {
	requests: Mutex<Vec<Request>>,
	connections: AtomicUsize,
	released: AtomicUsize,
}

async fn serve(listener: TcpListener, state: Arc<FakeState>, reply: Arc<ReplyFn>) {
	while let Ok((conn, _)) = listener.accept().await {
		let index = state.connections.fetch_add(1, Ordering::SeqCst);

		tokio::spawn(handle(conn, index, state.clone(), reply.clone()));
	}
}

async fn handle(mut conn: TcpStream, index: usize, state: Arc<FakeState>, reply: Arc<ReplyFn>) {
	let (read_half, mut write_half) = conn.split();
	let mut reader = BufReader::new(read_half);
	let Ok(request) = wire::read_frame::<_, Request>(&mut reader, DEFAULT_MAX_FRAME_LEN).await
	else {
		return;
	};
	let action = reply(index, &request);

	state.requests.lock().push(request);

	let granted = match action {
		Reply::Respond(response) => {
			let granted = response.is_granted();

			if wire::write_frame(&mut write_half, &response).await.is_err() {
				return;
			}

			granted
		},
		Reply::Raw(bytes) => {
			if write_half.write_all(&bytes).await.is_err() {
				return;
			}

			false
		},
		Reply::Truncate(bytes) => {
			let _ = write_half.write_all(&bytes).await;
			let _ = write_half.shutdown().await;

			return;
		},
		Reply::Stall => false,
	};
	// The client closes the connection to release a ticket; drain until EOF.
	let mut sink = [0_u8; 64];

	loop {
		match reader.read(&mut sink).await {
			Ok(0) | Err(_) => break,
			Ok(_) => continue,
		}
	}

	if granted {
		state.released.fetch_add(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn mocks_mirror_grant_and_denial() {
		let options = ThrottlerOptions::new().with_correlation_id("cid-mock");
		let mut ticket = MockThrottlerSuccess
			.get_ticket(Request::new("bac"), &options)
			.await
			.expect("Success mock should grant.");

		assert_eq!(ticket.correlation_id().as_str(), "cid-mock");
		assert!(!ticket.is_live());

		ticket.release().await;

		let err = MockThrottlerErr
			.get_ticket(Request::new("bac"), &options)
			.await
			.expect_err("Error mock should deny.");

		assert!(matches!(err, Error::Denied { .. }));
	}

	#[tokio::test]
	async fn wait_released_gives_up_after_the_timeout() {
		let server = FakeTicketServer::granting().await.expect("Fake server should start.");
		let started = std::time::Instant::now();

		assert!(!server.wait_released(1, Duration::milliseconds(50)).await);
		assert!(started.elapsed() < std::time::Duration::from_secs(1));
		assert!(server.wait_released(0, Duration::ZERO).await);
	}
}
