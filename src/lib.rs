//! Ticket acquisition client for the OSP throttling service. Outbound calls to rate-limited
//! providers are gated behind one [`Context`](throttler::Context), whichever protocol the
//! configured backend speaks.
//!
//! Two backends are supported:
//!
//! - the legacy HTTP endpoint, polled with `GET <base>/token/<osp>` until it answers `200`;
//! - the ticket service, reached over a raw TCP connection carrying one line of JSON in each
//!   direction. A granted ticket owns that connection and closing it releases the capacity.
//!
//! ```no_run
//! # async fn run() -> osp_throttler::error::Result<()> {
//! use osp_throttler::throttler::{Context, ThrottlerOptions};
//!
//! let ctx = Context::from_address("tcp://throttlerng:7000")?;
//! let options = ThrottlerOptions::new().with_max_wait(osp_throttler::time::Duration::minutes(2));
//! let mut ticket = ctx.get_token("zohobooks?views-per-day=10&views-per-min=2", &options).await?;
//!
//! // ... call the provider ...
//!
//! ticket.release().await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod error;
pub mod id;
pub mod obs;
#[cfg(any(test, feature = "test"))]
pub mod testing;
pub mod throttler;
pub mod ticket;
pub mod wire;

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use time;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
