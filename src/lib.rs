//! measures ships metrics to a StatsD or DogStatsD collector without making the caller wait.
//! Every registration pushes an observation onto a bounded buffer and spawns a flush on the
//! tokio runtime you hand to the [Client]. The flush drains the buffer, samples it, encodes
//! each observation to one line of the line protocol and sends the whole batch as a single
//! UDP datagram. Delivery is best effort: no acknowledgements, no retries, and a failed flush
//! only shows up in your `tracing` logs.
//!
//! ### Example: recording metrics
//!
//! ```no_run
//! use measures::*;
//! use maplit::btreemap;
//!
//! #[tokio::main]
//! pub async fn main() -> Result<()> {
//!     let config = ClientConfig::new("udp://127.0.0.1:8125")?
//!         .with_prefix("shop")
//!         .with_tags(btreemap! {"env" => "prod"});
//!     let client = Client::new(config, tokio::runtime::Handle::current());
//!     client.incr("checkout.started", 1);
//!     client.gauge("cart.size", 3);
//!     client.register(Metric::histogram("cart.value", 42.5).with_rate(0.1));
//!     let total = client.timer("checkout.time").time(|| 40 + 2);
//!     client.event(Event::new("Deploy", "v1.2.3 is live").with_alert_type(AlertType::Success));
//!     client.check(Check::new("shop.db", "ok".parse()?).with_message("all good"));
//!     // Scheduled flushes run on their own, this one is awaited.
//!     client.flush().await?;
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Usage
//!
//! ## Observations
//!
//! An [Observation] is a [Metric], an [Event] or a [Check]. Metrics come in five kinds that only
//! differ in their wire suffix: counting (`c`), gauge (`g`), histogram (`h`), set (`s`) and timing
//! (`ms`). A metric can carry a sampling [Rate], a delta flag and [Tags].
//!
//! ## Sampling
//!
//! Each flush draws one threshold in `[0, 1)` and drops every sampled metric whose rate is below
//! it. Within one flush all metrics sharing a rate are kept or dropped together.
//!
//! ## Configuration
//!
//! [ClientConfig::from_env] reads `STATSD_HOST`/`STATSD_PORT` and tags every observation with
//! `DD_ENV`, `DD_VERSION` and `DD_SERVICE` when they are set.

/// [Address] parsing for collector endpoints.
pub mod address;
/// [Buffer] holds observations until the next flush.
pub mod buffer;
/// [Client] is the entry point for recording observations.
pub mod client;
/// [Encoder] turns observations into lines of the StatsD/DogStatsD protocol.
pub mod encoder;
pub mod error;
/// [Timer](instrument::Timer) measures scoped units of work.
pub mod instrument;
/// [Metric], [Event] and [Check] are the observation types.
pub mod metric;
/// [Reporter] owns the UDP transport.
pub mod reporter;

pub use address::{Address, Protocol, ToAddress};
pub use buffer::{Buffer, OverflowPolicy};
pub use client::{Client, ClientConfig};
pub use encoder::{Dialect, Encoder};
pub use error::{Error, Result};
pub use instrument::{Timer, TimerGuard};
pub use metric::*;
pub use reporter::Reporter;
