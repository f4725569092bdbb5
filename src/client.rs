use std::{env, fmt, sync::Arc};

use rand::Rng;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::{
    address::{Address, ToAddress, DEFAULT_HOST, DEFAULT_PORT},
    buffer::{Buffer, OverflowPolicy, DEFAULT_CAPACITY},
    encoder::{Dialect, Encoder},
    error::{Error, Result},
    instrument::Timer,
    metric::{Check, Event, Metric, MetricValue, Observation, Tags},
    reporter::Reporter,
};

pub const STATSD_HOST_ENV: &str = "STATSD_HOST";
pub const STATSD_PORT_ENV: &str = "STATSD_PORT";

/// Source of the per-flush sampling threshold, expected in `[0, 1)`.
pub type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

fn random_threshold() -> f64 {
    rand::thread_rng().gen::<f64>()
}

pub(crate) fn get_default_tags() -> Vec<String> {
    let env = env::var("DD_ENV").map(|t| format!("env:{}", t));
    let version = env::var("DD_VERSION").map(|t| format!("version:{}", t));
    let service = env::var("DD_SERVICE").map(|t| format!("service:{}", t));
    let optional_tags = vec![env, version, service];
    optional_tags.into_iter().filter_map(|t| t.ok()).collect()
}

#[derive(Clone)]
pub struct ClientConfig {
    pub address: Address,
    /// Prepended to every metric name, joined with a `.`
    pub prefix: Option<String>,
    /// Merged into the tags of every observation.
    pub default_tags: Tags,
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub dialect: Dialect,
    pub sampler: Sampler,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("prefix", &self.prefix)
            .field("default_tags", &self.default_tags)
            .field("capacity", &self.capacity)
            .field("overflow", &self.overflow)
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    pub fn new<A: ToAddress>(addr: A) -> Result<Self> {
        Ok(Self {
            address: addr.to_address()?,
            prefix: None,
            default_tags: Tags::default(),
            capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::default(),
            dialect: Dialect::default(),
            sampler: Arc::new(random_threshold),
        })
    }

    /// Reads the collector from `STATSD_HOST`/`STATSD_PORT` and the default
    /// tags from `DD_ENV`, `DD_VERSION` and `DD_SERVICE`.
    pub fn from_env() -> Result<Self> {
        let host = env::var(STATSD_HOST_ENV).unwrap_or_else(|_| {
            debug!("{STATSD_HOST_ENV} wasn't specified, falling back to {DEFAULT_HOST}");
            DEFAULT_HOST.to_string()
        });
        let port = match env::var(STATSD_PORT_ENV) {
            Ok(port) => port
                .parse::<u16>()
                .map_err(|_| Error::BadAddress(format!("{host}:{port}")))?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self::new((host.as_str(), port))?.with_tags(get_default_tags()))
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
    pub fn with_tags<T: Into<Tags>>(mut self, tags: T) -> Self {
        self.default_tags = tags.into();
        self
    }
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
    pub fn with_overflow_policy(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
    /// Replaces the random sampling threshold, mostly useful in tests.
    pub fn with_sampler<F>(mut self, sampler: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.sampler = Arc::new(sampler);
        self
    }
}

struct Inner {
    buffer: Buffer,
    encoder: Encoder,
    reporter: Reporter,
    sampler: Sampler,
}

impl Inner {
    /// Drains before connecting, so a flush that can't reach the collector
    /// loses its batch instead of leaving it for a later flush.
    async fn flush(&self) -> Result<usize> {
        let threshold = (self.sampler)();
        let lines: Vec<String> = self
            .buffer
            .drain_batch(threshold)
            .filter_map(|observation| match self.encoder.encode(&observation) {
                Ok(line) => Some(line),
                Err(err) => {
                    debug!("Skipping observation that couldn't be encoded, was: {err}");
                    None
                }
            })
            .collect();
        self.reporter.connect().await?;
        self.reporter.send(lines).await
    }
}

/// Records observations and ships them to the collector.
///
/// Every registration is synchronous: the observation is pushed onto the
/// buffer and a detached flush is spawned on the runtime handle the client
/// was built with. Delivery is best effort, flush failures are only logged.
/// Cloning is cheap and clones share the buffer and the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
    handle: Handle,
}

impl Client {
    pub fn new(config: ClientConfig, handle: Handle) -> Self {
        let encoder = Encoder::new(config.dialect)
            .with_prefix(config.prefix)
            .with_default_tags(config.default_tags);
        let inner = Inner {
            buffer: Buffer::new(config.capacity, config.overflow),
            encoder,
            reporter: Reporter::new(config.address),
            sampler: config.sampler,
        };
        Self {
            inner: Arc::new(inner),
            handle,
        }
    }

    /// Buffers the observation, schedules a flush and hands the observation
    /// back. The return value says nothing about delivery.
    pub fn register<O: Into<Observation>>(&self, observation: O) -> Observation {
        let observation = observation.into();
        if self.inner.buffer.push(observation.clone()).is_some() {
            trace!("Buffer overflowed while registering");
        }
        let inner = self.inner.clone();
        self.handle.spawn(async move {
            if let Err(err) = inner.flush().await {
                warn!("Got error flushing metrics, was: {err}");
            }
        });
        observation
    }

    /// Runs one flush cycle in place and returns the number of bytes sent.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.flush().await
    }

    /// Observations waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn address(&self) -> &Address {
        self.inner.reporter.address()
    }

    /// Counts up by `value`, a zero counts as one.
    pub fn incr<S: Into<String>>(&self, name: S, value: i64) -> Observation {
        let value = match value {
            0 => 1,
            v => v.saturating_abs(),
        };
        self.register(Metric::counting(name, value))
    }
    /// Counts down by `value`, a zero counts as one.
    pub fn decr<S: Into<String>>(&self, name: S, value: i64) -> Observation {
        let value = match value {
            0 => -1,
            v => -v.saturating_abs(),
        };
        self.register(Metric::counting(name, value))
    }
    pub fn counter<S: Into<String>, V: Into<MetricValue>>(&self, name: S, value: V) -> Observation {
        self.register(Metric::counting(name, value))
    }
    pub fn gauge<S: Into<String>, V: Into<MetricValue>>(&self, name: S, value: V) -> Observation {
        self.register(Metric::gauge(name, value))
    }
    pub fn histogram<S: Into<String>, V: Into<MetricValue>>(
        &self,
        name: S,
        value: V,
    ) -> Observation {
        self.register(Metric::histogram(name, value))
    }
    pub fn set<S: Into<String>, V: Into<MetricValue>>(&self, name: S, value: V) -> Observation {
        self.register(Metric::set(name, value))
    }
    pub fn timing<S: Into<String>>(&self, name: S, milliseconds: i64) -> Observation {
        self.register(Metric::timing(name, milliseconds))
    }
    pub fn timer<S: Into<String>>(&self, name: S) -> Timer {
        Timer::new(self.clone(), name)
    }
    pub fn event(&self, event: Event) -> Observation {
        self.register(event)
    }
    pub fn check(&self, check: Check) -> Observation {
        self.register(check)
    }

    /// Releases the transport. Later registrations reconnect on their flush.
    pub fn close(&self) {
        self.inner.reporter.close();
    }
}

/// Handle of a runtime nobody drives, so scheduled flushes never run and the
/// test decides when to flush.
#[cfg(test)]
pub(crate) fn idle_handle() -> Handle {
    use once_cell::sync::OnceCell;
    static IDLE_RUNTIME: OnceCell<tokio::runtime::Runtime> = OnceCell::new();
    IDLE_RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("Couldn't build idle runtime")
        })
        .handle()
        .clone()
}
