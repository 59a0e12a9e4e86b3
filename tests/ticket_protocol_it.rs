// std
use std::{sync::Arc, time::Instant};
// self
use osp_throttler::{
	config::TicketConfig,
	error::{Error, ProtocolError},
	testing::{FakeTicketServer, Reply},
	throttler::{Context, ThrottlerOptions, TicketThrottler},
	time::{Duration, OffsetDateTime},
	wire::{Request, Response},
};

fn client(server: &FakeTicketServer) -> TicketThrottler {
	TicketThrottler::new(TicketConfig::new(server.address()))
}

fn wait(max_wait: Duration) -> ThrottlerOptions {
	ThrottlerOptions::new().with_max_wait(max_wait)
}

#[tokio::test]
async fn grant_on_first_attempt_returns_without_sleeping() {
	let server = FakeTicketServer::granting().await.expect("Fake server should start.");
	let client = client(&server);
	let started = Instant::now();
	let mut ticket = client
		.get_ticket(
			Request::new("bac").with_correlation_id("7e3af66b-51ce-4012-8c0a-57827c886981"),
			&wait(Duration::minutes(5)),
		)
		.await
		.expect("Granting server should hand out a ticket.");

	assert!(started.elapsed() < std::time::Duration::from_secs(1));
	assert!(ticket.is_live());
	assert_eq!(ticket.correlation_id().as_str(), "7e3af66b-51ce-4012-8c0a-57827c886981");
	assert_eq!(server.connections(), 1);
	assert_eq!(
		server.requests(),
		vec![Request::new("bac").with_correlation_id("7e3af66b-51ce-4012-8c0a-57827c886981")]
	);

	ticket.release().await;

	assert!(server.wait_released(1, Duration::seconds(2)).await);
	assert_eq!(client.metrics().grants(), 1);
	assert_eq!(client.metrics().releases(), 1);
}

#[tokio::test]
async fn always_denied_request_respects_the_deadline() {
	let server =
		FakeTicketServer::denying("quota exhausted").await.expect("Fake server should start.");
	let client = TicketThrottler::new(
		TicketConfig::new(server.address()).with_default_retry_delay(Duration::milliseconds(100)),
	);
	let max_wait = Duration::milliseconds(350);
	let started = Instant::now();
	let err = client
		.get_ticket(Request::new("bac"), &wait(max_wait))
		.await
		.expect_err("A server that always denies should exhaust the deadline.");
	let elapsed = started.elapsed();

	match err {
		Error::DeadlineExceeded { last_message } =>
			assert_eq!(last_message.as_deref(), Some("quota exhausted")),
		other => panic!("Unexpected error variant: {other:?}."),
	}
	assert!(elapsed <= std::time::Duration::from_millis(350 + 250), "Took {elapsed:?}.");
	assert!((2..=4).contains(&server.connections()), "Saw {} attempts.", server.connections());
	assert_eq!(client.metrics().failures(), 1);
	assert_eq!(client.metrics().grants(), 0);
}

#[tokio::test]
async fn retry_waits_for_the_server_hint() {
	let server = FakeTicketServer::start(|index, request| {
		if index == 0 {
			Response::denied(
				"views-per-min exhausted",
				Some(OffsetDateTime::now_utc() + Duration::milliseconds(200)),
			)
			.into()
		} else {
			Response::granted(request.correlation_id.clone()).into()
		}
	})
	.await
	.expect("Fake server should start.");
	// A default delay this long would blow the deadline, so only the hint can explain a grant.
	let client = TicketThrottler::new(
		TicketConfig::new(server.address()).with_default_retry_delay(Duration::seconds(30)),
	);
	let started = Instant::now();
	let mut ticket = client
		.get_ticket(Request::new("zohobooks"), &wait(Duration::seconds(5)))
		.await
		.expect("Second attempt should be granted.");
	let elapsed = started.elapsed();

	assert!(elapsed >= std::time::Duration::from_millis(150), "Took {elapsed:?}.");
	assert!(elapsed < std::time::Duration::from_millis(1500), "Took {elapsed:?}.");
	assert_eq!(server.connections(), 2);
	assert_eq!(client.metrics().denials(), 1);

	ticket.release().await;
}

#[tokio::test]
async fn zero_retry_hint_uses_the_default_delay() {
	let server = FakeTicketServer::start(|index, request| {
		if index == 0 {
			Reply::Raw(
				b"{\"status\":\"err\",\"message\":\"busy\",\"retry\":\"0001-01-01T00:00:00Z\"}\n".to_vec(),
			)
		} else {
			Response::granted(request.correlation_id.clone()).into()
		}
	})
	.await
	.expect("Fake server should start.");
	let client = TicketThrottler::new(
		TicketConfig::new(server.address()).with_default_retry_delay(Duration::milliseconds(50)),
	);
	let mut ticket = client
		.get_ticket(Request::new("bac"), &wait(Duration::seconds(5)))
		.await
		.expect("Second attempt should be granted.");

	assert_eq!(server.connections(), 2);

	ticket.release().await;
}

#[tokio::test]
async fn denial_past_the_deadline_fails_immediately() {
	let server = FakeTicketServer::start(|_, _| {
		Response::denied("daily quota spent", Some(OffsetDateTime::now_utc() + Duration::hours(1)))
			.into()
	})
	.await
	.expect("Fake server should start.");
	let client = client(&server);
	let started = Instant::now();
	let err = client
		.get_ticket(Request::new("bac"), &wait(Duration::seconds(10)))
		.await
		.expect_err("A retry hint past the deadline should fail the acquisition.");

	assert!(started.elapsed() < std::time::Duration::from_secs(1));
	assert!(matches!(
		err,
		Error::DeadlineExceeded { last_message: Some(ref message) } if message == "daily quota spent"
	));
	assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn release_is_idempotent_and_observed_by_the_server() {
	let server = FakeTicketServer::granting().await.expect("Fake server should start.");
	let client = client(&server);
	let mut ticket = client
		.get_ticket(Request::new("bac"), &wait(Duration::seconds(5)))
		.await
		.expect("Granting server should hand out a ticket.");

	ticket.release().await;
	ticket.release().await;

	assert!(!ticket.is_live());
	assert!(server.wait_released(1, Duration::seconds(2)).await);
	assert_eq!(server.released(), 1);
	assert_eq!(client.metrics().releases(), 1);
}

#[tokio::test]
async fn dropping_a_live_ticket_closes_its_connection() {
	let server = FakeTicketServer::granting().await.expect("Fake server should start.");
	let client = client(&server);
	let ticket = client
		.get_ticket(Request::new("bac"), &wait(Duration::seconds(5)))
		.await
		.expect("Granting server should hand out a ticket.");

	drop(ticket);

	assert!(server.wait_released(1, Duration::seconds(2)).await);
	assert_eq!(client.metrics().releases(), 1);
}

#[tokio::test]
async fn malformed_response_is_not_retried() {
	let server = FakeTicketServer::start(|_, _| Reply::Raw(b"this is not json\n".to_vec()))
		.await
		.expect("Fake server should start.");
	let client = client(&server);
	let err = client
		.get_ticket(Request::new("bac"), &wait(Duration::seconds(5)))
		.await
		.expect_err("Malformed frames should fail the acquisition.");

	assert!(matches!(err, Error::Protocol(ProtocolError::Malformed { .. })));
	assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn server_hanging_up_mid_frame_is_a_protocol_error() {
	let server = FakeTicketServer::start(|_, _| Reply::Truncate(b"{\"status\":".to_vec()))
		.await
		.expect("Fake server should start.");
	let client = client(&server);
	let err = client
		.get_ticket(Request::new("bac"), &wait(Duration::seconds(5)))
		.await
		.expect_err("An unterminated frame should fail the acquisition.");

	assert!(matches!(err, Error::Protocol(ProtocolError::ConnectionClosed)));
	assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn stalled_server_cannot_hold_the_caller_past_the_deadline() {
	let server =
		FakeTicketServer::start(|_, _| Reply::Stall).await.expect("Fake server should start.");
	let client = client(&server);
	let started = Instant::now();
	let err = client
		.get_ticket(Request::new("bac"), &wait(Duration::milliseconds(200)))
		.await
		.expect_err("A stalled server should run into the deadline.");

	assert!(matches!(err, Error::DeadlineExceeded { last_message: None }));
	assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[tokio::test]
async fn one_context_serves_concurrent_callers() -> color_eyre::Result<()> {
	let server = FakeTicketServer::granting().await?;
	let ctx = Arc::new(Context::new(TicketConfig::new(server.address()))?);
	let handles = (0..8)
		.map(|n| {
			let ctx = ctx.clone();

			tokio::spawn(async move {
				let options = ThrottlerOptions::new()
					.with_max_wait(Duration::seconds(5))
					.with_correlation_id(format!("cid-{n}"));

				ctx.get_token("bac", &options).await
			})
		})
		.collect::<Vec<_>>();
	let mut tickets = Vec::new();

	for handle in handles {
		tickets.push(handle.await??);
	}

	assert_eq!(server.connections(), 8);
	assert!(tickets.iter().all(|ticket| ticket.is_live()));

	for ticket in &mut tickets {
		ticket.release().await;
	}

	assert!(server.wait_released(8, Duration::seconds(2)).await);
	assert_eq!(ctx.metrics().grants(), 8);
	assert_eq!(ctx.metrics().releases(), 8);

	Ok(())
}
